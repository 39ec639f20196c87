//! Shared application state handed to every handler

use crate::attendance::AttendanceService;
use crate::backend::{AttendanceStore, AuthProvider, HostedBackend, ProfileStore};
use crate::models::BackendError;
use crate::notifications::Notifier;
use crate::session::SessionStore;
use crate::settings::AttendqrSettings;
use crate::utils::logging::LoggingHelper;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct AppState {
    pub session: Arc<SessionStore>,
    pub attendance: Arc<AttendanceService>,
    pub auth: Arc<dyn AuthProvider>,
    pub profiles: Arc<dyn ProfileStore>,
    pub notifier: Arc<Notifier>,
    pub settings: Arc<AttendqrSettings>,
}

impl AppState {
    /// Wire the application around one backend implementing every seam
    pub async fn start<B>(backend: Arc<B>, settings: AttendqrSettings) -> Self
    where
        B: AuthProvider + ProfileStore + AttendanceStore + 'static,
    {
        let notifier = Arc::new(Notifier::default());
        let auth: Arc<dyn AuthProvider> = backend.clone();
        let profiles: Arc<dyn ProfileStore> = backend.clone();
        let attendance_store: Arc<dyn AttendanceStore> = backend;

        let session = SessionStore::start(
            Arc::clone(&auth),
            Arc::clone(&profiles),
            Arc::clone(&notifier),
            Duration::from_secs(settings.session.settle_timeout_secs),
        )
        .await;
        let attendance = Arc::new(AttendanceService::new(
            attendance_store,
            settings.qr.clone(),
        ));

        Self {
            session,
            attendance,
            auth,
            profiles,
            notifier,
            settings: Arc::new(settings),
        }
    }

    /// Wire the application to the hosted backend named in the settings
    ///
    /// # Errors
    ///
    /// Returns an error if the backend client cannot be built
    pub async fn from_settings(settings: AttendqrSettings) -> Result<Self, BackendError> {
        let backend = HostedBackend::from_settings(&settings.backend)?;
        LoggingHelper::log_backend_configured(
            &settings.backend.url,
            !settings.backend.get_anon_key().is_empty(),
        );
        Ok(Self::start(Arc::new(backend), settings).await)
    }

    pub fn shutdown(&self) {
        self.session.shutdown();
    }
}
