#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::{anyhow, Context};
use attendqr::{configure_services, AppState, AttendqrSettings, VERSION};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration from Settings.toml and environment variables
    // This also loads .env file and initializes the logger
    let settings =
        AttendqrSettings::load().map_err(|e| anyhow!("Failed to load settings: {e}"))?;

    // Connect to the hosted backend and project its current session
    let state = AppState::from_settings(settings)
        .await
        .context("Failed to initialize backend")?;

    let result = start_server(state.clone()).await;
    state.shutdown();
    result.context("HTTP server failed")
}

/// Start the HTTP server
///
/// # Errors
///
/// Returns an error if:
/// - Server binding fails
/// - Server fails to start
async fn start_server(state: AppState) -> std::io::Result<()> {
    let bind_address = state.settings.get_bind_address();
    print_startup_info(&bind_address, &state.settings);

    let cors_origins = state.settings.get_cors_origins();

    HttpServer::new(move || {
        let cors_origins = cors_origins.clone();
        let cors = Cors::default()
            .allowed_origin_fn(move |origin, _| {
                cors_origins
                    .iter()
                    .any(|allowed| allowed == origin.to_str().unwrap_or(""))
            })
            .allowed_methods(vec!["GET", "POST", "PATCH", "OPTIONS"])
            .allowed_headers(vec!["Authorization", "Content-Type", "Accept"])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(cors)
            .wrap(Logger::default())
            .configure(configure_services)
    })
    .bind(&bind_address)?
    .run()
    .await
}

fn print_startup_info(bind_address: &str, settings: &AttendqrSettings) {
    println!("Starting AttendQR {VERSION} on http://{bind_address}");
    println!("Backend: {}", settings.backend.url);
    println!();
    println!("Authentication:");
    println!("  GET|POST /login        - Sign in");
    println!("  GET|POST /register     - Create an account");
    println!("  POST     /logout       - Sign out");
    println!();
    println!("Admin:");
    println!("  GET  /admin                      - Dashboard with QR sessions");
    println!("  POST /admin/qr                   - Generate a QR session");
    println!("  GET  /admin/qr/{{id}}/attendance  - Attendance for a session");
    println!();
    println!("Student:");
    println!("  GET  /student          - Dashboard with attendance history");
    println!("  POST /student/scan     - Mark attendance from a scanned code");
    println!("  GET|POST /profile      - View or update the profile");
    println!();
    println!("Diagnostics:");
    println!("  GET  /database-fix, /test-registration");
    println!();
    println!("System endpoints:");
    println!("  GET  /ping              - Health check");
    println!("  GET  /api/session       - Current session");
    println!("  GET  /api/notifications - Drain pending notifications");
    println!(
        "  QR sessions expire after {} hours",
        settings.qr.session_ttl_hours
    );
}
