// HTTP request handlers
pub mod auth;
pub mod dashboard;
pub mod diagnostics;
pub mod helpers;
pub mod system;

use actix_web::web;

pub use system::health;

/// Register every route of the application
pub fn configure_services(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(system::index))
        .route("/ping", web::get().to(system::health))
        .route("/api/session", web::get().to(system::session_state))
        .route("/api/notifications", web::get().to(system::notifications))
        // Authentication
        .route("/login", web::get().to(auth::login_page))
        .route("/login", web::post().to(auth::login))
        .route("/register", web::get().to(auth::register_page))
        .route("/register", web::post().to(auth::register))
        .route("/logout", web::post().to(auth::logout))
        // Admin
        .route("/admin", web::get().to(dashboard::admin_dashboard))
        .route("/admin-dashboard", web::get().to(dashboard::admin_dashboard))
        .route("/admin/qr", web::post().to(dashboard::generate_qr))
        .route(
            "/admin/qr/{id}/attendance",
            web::get().to(dashboard::session_attendance),
        )
        // Student
        .route("/student", web::get().to(dashboard::student_dashboard))
        .route(
            "/student-dashboard",
            web::get().to(dashboard::student_dashboard),
        )
        .route("/student/scan", web::post().to(dashboard::scan))
        // Profile
        .route("/profile", web::get().to(dashboard::profile_page))
        .route("/profile", web::post().to(dashboard::update_profile))
        .route("/profile", web::patch().to(dashboard::update_profile))
        // Diagnostics
        .route("/database-fix", web::get().to(diagnostics::database_fix_page))
        .route(
            "/database-fix/test-connection",
            web::post().to(diagnostics::test_connection),
        )
        .route(
            "/database-fix/create-profile",
            web::post().to(diagnostics::create_profile),
        )
        .route(
            "/test-registration",
            web::get().to(diagnostics::test_registration_page),
        )
        .route(
            "/test-registration",
            web::post().to(diagnostics::run_test_registration),
        )
        .route(
            "/test-registration/cleanup",
            web::post().to(diagnostics::cleanup_test_registration),
        )
        .default_service(web::to(system::not_found));
}
