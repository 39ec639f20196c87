pub mod logging;
pub mod responses;
