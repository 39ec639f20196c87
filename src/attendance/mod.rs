//! QR attendance sessions
//!
//! - [`qr`] - token format and QR image rendering
//! - [`service`] - issuing sessions, marking attendance and dashboard queries

pub mod qr;
pub mod service;

pub use qr::QrError;
pub use service::{
    AttendanceError, AttendanceService, GeneratedQr, MarkOutcome, SessionSummary,
};
