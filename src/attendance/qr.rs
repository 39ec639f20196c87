//! Attendance tokens and their QR images
use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Utc};
use qrcode::render::svg;
use qrcode::QrCode;
use rand::Rng;
use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

/// Every attendance token starts with this prefix
pub const TOKEN_PREFIX: &str = "ATTENDQR_";

const SUFFIX_LEN: usize = 9;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

static UNSAFE_FILENAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)[^a-z0-9]").expect("valid filename pattern"));

#[derive(Debug, Error)]
pub enum QrError {
    #[error("could not encode QR code: {0}")]
    Encode(#[from] qrcode::types::QrError),
}

/// `ATTENDQR_{unix millis}_{9 random base-36 chars}`
#[must_use]
pub fn generate_token(now: DateTime<Utc>) -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..SUFFIX_LEN)
        .map(|_| char::from(BASE36[rng.random_range(0..BASE36.len())]))
        .collect();
    format!("{TOKEN_PREFIX}{}_{suffix}", now.timestamp_millis())
}

#[must_use]
pub fn is_attendance_token(value: &str) -> bool {
    value.starts_with(TOKEN_PREFIX)
}

/// Render `data` as a black-on-white SVG QR code
///
/// # Errors
///
/// Returns [`QrError::Encode`] if the data does not fit in a QR code
pub fn render_svg(data: &str, size: u32, quiet_zone: bool) -> Result<String, QrError> {
    let code = QrCode::new(data.as_bytes())?;
    Ok(code
        .render::<svg::Color>()
        .min_dimensions(size, size)
        .quiet_zone(quiet_zone)
        .dark_color(svg::Color("#000000"))
        .light_color(svg::Color("#ffffff"))
        .build())
}

#[must_use]
pub fn svg_data_url(svg: &str) -> String {
    format!(
        "data:image/svg+xml;base64,{}",
        general_purpose::STANDARD.encode(svg)
    )
}

/// Download name for a session's QR image: every character outside
/// `[a-z0-9]` (any case) becomes `_`, then lower-cased
#[must_use]
pub fn download_filename(session_name: &str) -> String {
    let safe = UNSAFE_FILENAME_CHARS.replace_all(session_name, "_");
    format!("{}_qr.svg", safe.to_lowercase())
}
