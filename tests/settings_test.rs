// Settings file parsing and environment override precedence
use attendqr::settings::AttendqrSettings;
use serial_test::serial;
use std::io::Write;
use tempfile::NamedTempFile;

const OVERRIDE_VARS: &[&str] = &[
    "HOST",
    "PORT",
    "CORS_ORIGINS",
    "BACKEND_URL",
    "BACKEND_ANON_KEY",
    "BACKEND_TIMEOUT_SECS",
    "SESSION_SETTLE_TIMEOUT_SECS",
    "QR_SESSION_TTL_HOURS",
    "QR_IMAGE_SIZE",
    "RUST_LOG",
    "TEST_ATTENDQR_ANON_KEY",
];

fn clean_env_vars() {
    for var in OVERRIDE_VARS {
        std::env::remove_var(var);
    }
}

fn settings_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file");
    file.write_all(contents.as_bytes()).expect("write settings");
    file
}

#[test]
#[serial]
fn test_partial_file_keeps_defaults() {
    clean_env_vars();
    let file = settings_file(
        r#"
[backend]
url = "https://project.example.co"

[qr]
session_ttl_hours = 2
"#,
    );

    let settings = AttendqrSettings::from_file(file.path()).unwrap();

    assert_eq!(settings.backend.url, "https://project.example.co");
    assert_eq!(settings.backend.request_timeout_secs, 30);
    assert_eq!(settings.qr.session_ttl_hours, 2);
    assert_eq!(settings.qr.image_size, 256);
    assert_eq!(settings.application.port, 8080);
    assert_eq!(settings.session.settle_timeout_secs, 10);
}

#[test]
#[serial]
fn test_env_overrides_win_over_file() {
    clean_env_vars();
    let file = settings_file(
        r#"
[application]
host = "127.0.0.1"
port = 3000

[session]
settle_timeout_secs = 5
"#,
    );
    std::env::set_var("PORT", "9090");
    std::env::set_var("SESSION_SETTLE_TIMEOUT_SECS", "3");
    std::env::set_var("QR_IMAGE_SIZE", "512");

    let mut settings = AttendqrSettings::from_file(file.path()).unwrap();
    AttendqrSettings::apply_env_overrides(&mut settings);

    assert_eq!(settings.get_bind_address(), "127.0.0.1:9090");
    assert_eq!(settings.session.settle_timeout_secs, 3);
    assert_eq!(settings.qr.image_size, 512);

    clean_env_vars();
}

#[test]
#[serial]
fn test_anon_key_from_named_variable() {
    clean_env_vars();
    let file = settings_file(
        r#"
[backend]
anon_key = "from-file"
anon_key_env = "TEST_ATTENDQR_ANON_KEY"
"#,
    );
    let settings = AttendqrSettings::from_file(file.path()).unwrap();
    assert_eq!(settings.backend.get_anon_key(), "from-file");

    std::env::set_var("TEST_ATTENDQR_ANON_KEY", "from-env");
    assert_eq!(settings.backend.get_anon_key(), "from-env");

    clean_env_vars();
}

#[test]
#[serial]
fn test_malformed_file_is_an_error() {
    clean_env_vars();
    let file = settings_file("[application\nport = ");
    assert!(AttendqrSettings::from_file(file.path()).is_err());
}
