//! Session-wide settings.

use std::env;

/// Environment variable enabling the pump timing report.
pub const PRINT_TIMINGS_ENV: &str = "EVCAM_PRINT_TIMINGS";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CameraConfig {
    /// Log time spent polling and processing when the acquisition loop ends.
    pub print_timings: bool,
}

impl CameraConfig {
    pub fn from_env() -> Self {
        Self {
            print_timings: env::var(PRINT_TIMINGS_ENV)
                .map(|v| parse_flag(&v))
                .unwrap_or(false),
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
