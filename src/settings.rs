use env_logger::Env;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AttendqrSettings {
    pub application: ApplicationSettings,
    pub backend: BackendSettings,
    pub session: SessionSettings,
    pub qr: QrSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
    pub cors_origins: String,
}

/// Hosted backend connection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSettings {
    /// Project base URL; the auth API lives under `/auth/v1`, the data API under `/rest/v1`
    pub url: String,

    // Direct value (can be overridden by environment variables)
    pub anon_key: String,

    // Environment variable name for the anon key override
    pub anon_key_env: Option<String>,

    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// How long a request waits for the session projection to settle after
    /// sign-in or sign-out before answering with the loading placeholder
    pub settle_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QrSettings {
    /// Validity window of a generated attendance session
    pub session_ttl_hours: u64,
    /// Minimum edge length of the rendered QR image in pixels
    pub image_size: u32,
    pub quiet_zone: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for ApplicationSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            cors_origins: "http://localhost:3000,http://localhost:8080".to_string(),
        }
    }
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            url: "http://localhost:54321".to_string(),
            anon_key: String::new(),
            anon_key_env: None,
            request_timeout_secs: 30,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            settle_timeout_secs: 10,
        }
    }
}

impl Default for QrSettings {
    fn default() -> Self {
        Self {
            session_ttl_hours: 24,
            image_size: 256,
            quiet_zone: true,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl AttendqrSettings {
    /// Load settings from configuration files and environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - A settings file cannot be read
    /// - TOML parsing fails
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        Self::load_env_file();

        let mut settings = Self::load_base_settings()?;
        Self::apply_env_overrides(&mut settings);

        Self::initialize_logging(&settings.logging);
        Ok(settings)
    }

    /// Start the logger; `RUST_LOG` wins over the configured level.
    ///
    /// A logger installed earlier (tests) is left in place.
    fn initialize_logging(logging: &LoggingSettings) {
        let env = Env::default().default_filter_or(logging.level.as_str());
        if env_logger::Builder::from_env(env).try_init().is_err() {
            log::debug!("Logger already initialized");
        }
    }

    /// Load base settings from TOML file(s) or use defaults
    /// Settings are loaded with the following priority (highest to lowest):
    /// 1. Environment variables (applied separately after loading base settings)
    /// 2. Settings.toml in `ATTENDQR_SECRETS_DIR` (if specified and exists)
    /// 3. Settings.toml in current directory (if exists)
    /// 4. Default settings
    ///
    /// # Errors
    ///
    /// Returns an error if a settings file cannot be read or parsed
    fn load_base_settings() -> Result<Self, Box<dyn std::error::Error>> {
        let mut settings = Self::default();

        let default_config_path = Path::new("Settings.toml");
        if default_config_path.exists() {
            settings = Self::from_file(default_config_path)?;
            println!(
                "✓ Loaded base settings from {}",
                default_config_path.display()
            );
        }

        if let Ok(secrets_dir) = std::env::var("ATTENDQR_SECRETS_DIR") {
            let secrets_path = Path::new(&secrets_dir).join("Settings.toml");
            if secrets_path.exists() {
                settings = Self::from_file(&secrets_path)?;
                println!("✓ Overriding settings from {}", secrets_path.display());
            } else {
                println!(
                    "ℹ ATTENDQR_SECRETS_DIR set but no Settings.toml found at: {}",
                    secrets_path.display()
                );
            }
        }

        Ok(settings)
    }

    /// Parse one settings file; missing sections and keys take their defaults
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid TOML
    pub fn from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let toml_content = fs::read_to_string(path)?;
        Ok(basic_toml::from_str(&toml_content)?)
    }

    /// Apply environment variable overrides to settings
    pub fn apply_env_overrides(settings: &mut Self) {
        Self::apply_application_env_overrides(&mut settings.application);
        Self::apply_backend_env_overrides(&mut settings.backend);
        Self::apply_numeric_env_override(
            "SESSION_SETTLE_TIMEOUT_SECS",
            &mut settings.session.settle_timeout_secs,
        );
        Self::apply_qr_env_overrides(&mut settings.qr);
        Self::apply_logging_env_overrides(&mut settings.logging);
    }

    fn apply_application_env_overrides(app_settings: &mut ApplicationSettings) {
        if let Ok(host) = std::env::var("HOST") {
            app_settings.host = host;
        }
        if let Ok(port_str) = std::env::var("PORT") {
            if let Ok(port) = port_str.parse::<u16>() {
                app_settings.port = port;
            }
        }
        if let Ok(cors_origins) = std::env::var("CORS_ORIGINS") {
            app_settings.cors_origins = cors_origins;
        }
    }

    fn apply_backend_env_overrides(backend_settings: &mut BackendSettings) {
        if let Ok(url) = std::env::var("BACKEND_URL") {
            backend_settings.url = url;
        }
        if let Ok(anon_key) = std::env::var("BACKEND_ANON_KEY") {
            if !anon_key.is_empty() {
                backend_settings.anon_key = anon_key;
            }
        }
        Self::apply_numeric_env_override(
            "BACKEND_TIMEOUT_SECS",
            &mut backend_settings.request_timeout_secs,
        );
    }

    fn apply_qr_env_overrides(qr_settings: &mut QrSettings) {
        Self::apply_numeric_env_override("QR_SESSION_TTL_HOURS", &mut qr_settings.session_ttl_hours);
        if let Ok(size_str) = std::env::var("QR_IMAGE_SIZE") {
            if let Ok(size) = size_str.parse::<u32>() {
                qr_settings.image_size = size;
            }
        }
    }

    /// Helper function to apply numeric environment variable overrides
    fn apply_numeric_env_override(env_var: &str, target: &mut u64) {
        if let Ok(value_str) = std::env::var(env_var) {
            if let Ok(value) = value_str.parse::<u64>() {
                *target = value;
            }
        }
    }

    fn apply_logging_env_overrides(logging_settings: &mut LoggingSettings) {
        if let Ok(log_level) = std::env::var("RUST_LOG") {
            logging_settings.level = log_level;
        }
    }

    /// Load environment variables from .env file
    fn load_env_file() {
        if let Ok(contents) = fs::read_to_string(".env") {
            for line in contents.lines() {
                let line = line.trim();
                if line.starts_with('#') {
                    continue;
                }
                if let Some((key, value)) = line.split_once('=') {
                    std::env::set_var(key.trim(), value.trim());
                }
            }
        }
    }

    /// Get the bind address for the server
    #[must_use]
    pub fn get_bind_address(&self) -> String {
        format!("{}:{}", self.application.host, self.application.port)
    }

    /// Get CORS origins as a vector of strings
    #[must_use]
    pub fn get_cors_origins(&self) -> Vec<String> {
        self.application
            .cors_origins
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

impl BackendSettings {
    /// Get the anon key, checking the configured environment variable first,
    /// then falling back to the direct value
    #[must_use]
    pub fn get_anon_key(&self) -> String {
        if let Some(env_var) = &self.anon_key_env {
            if let Ok(value) = std::env::var(env_var) {
                return value;
            }
        }
        self.anon_key.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    // Helper function to clean all relevant environment variables for tests
    fn clean_env_vars() {
        for var in [
            "HOST",
            "PORT",
            "CORS_ORIGINS",
            "BACKEND_URL",
            "BACKEND_ANON_KEY",
            "BACKEND_TIMEOUT_SECS",
            "SESSION_SETTLE_TIMEOUT_SECS",
            "QR_SESSION_TTL_HOURS",
            "QR_IMAGE_SIZE",
            "ATTENDQR_SECRETS_DIR",
            "TEST_PROJECT_ANON_KEY",
        ] {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn test_defaults() {
        let settings = AttendqrSettings::default();
        assert_eq!(settings.qr.session_ttl_hours, 24);
        assert_eq!(settings.session.settle_timeout_secs, 10);
        assert_eq!(settings.get_bind_address(), "0.0.0.0:8080");
    }

    #[test]
    #[serial]
    fn test_backend_env_override() {
        clean_env_vars();

        let mut settings = AttendqrSettings::default();
        std::env::set_var("BACKEND_URL", "https://project.example.co");
        std::env::set_var("BACKEND_ANON_KEY", "env-anon-key");
        std::env::set_var("BACKEND_TIMEOUT_SECS", "5");

        AttendqrSettings::apply_env_overrides(&mut settings);

        assert_eq!(settings.backend.url, "https://project.example.co");
        assert_eq!(settings.backend.get_anon_key(), "env-anon-key");
        assert_eq!(settings.backend.request_timeout_secs, 5);

        clean_env_vars();
    }

    #[test]
    #[serial]
    fn test_invalid_numeric_override_is_ignored() {
        clean_env_vars();

        let mut settings = AttendqrSettings::default();
        std::env::set_var("QR_SESSION_TTL_HOURS", "a day");
        std::env::set_var("QR_IMAGE_SIZE", "-1");
        std::env::set_var("PORT", "70000");

        AttendqrSettings::apply_env_overrides(&mut settings);

        assert_eq!(settings.qr.session_ttl_hours, 24);
        assert_eq!(settings.qr.image_size, 256);
        assert_eq!(settings.application.port, 8080);

        clean_env_vars();
    }

    #[test]
    #[serial]
    fn test_anon_key_env_indirection() {
        clean_env_vars();

        let backend = BackendSettings {
            anon_key: "file-key".to_string(),
            anon_key_env: Some("TEST_PROJECT_ANON_KEY".to_string()),
            ..BackendSettings::default()
        };
        assert_eq!(backend.get_anon_key(), "file-key");

        std::env::set_var("TEST_PROJECT_ANON_KEY", "indirect-key");
        assert_eq!(backend.get_anon_key(), "indirect-key");

        clean_env_vars();
    }

    #[test]
    fn test_cors_origins_skip_blanks() {
        let mut settings = AttendqrSettings::default();
        settings.application.cors_origins = "http://a.test, ,http://b.test,".to_string();
        assert_eq!(
            settings.get_cors_origins(),
            vec!["http://a.test".to_string(), "http://b.test".to_string()]
        );
    }
}
