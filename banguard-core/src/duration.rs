//! Duration formatting for logs, reports and JSON output.

use serde::Serializer;
use std::time::Duration;

/// Format duration as string (e.g., "10s", "2m", "1h", "150ms")
pub fn format_duration(duration: &Duration) -> String {
    let millis = duration.as_millis() as u64;

    if millis == 0 {
        return "0s".to_string();
    }

    // Largest unit that divides evenly
    if millis.is_multiple_of(60 * 60 * 1000) {
        format!("{}h", millis / (60 * 60 * 1000))
    } else if millis.is_multiple_of(60 * 1000) {
        format!("{}m", millis / (60 * 1000))
    } else if millis.is_multiple_of(1000) {
        format!("{}s", millis / 1000)
    } else if millis >= 1000 {
        format!("{:.1}s", duration.as_secs_f64())
    } else {
        format!("{}ms", millis)
    }
}

pub fn serialize_optional_duration<S>(
    duration: &Option<Duration>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match duration {
        Some(d) => serializer.serialize_some(&format_duration(d)),
        None => serializer.serialize_none(),
    }
}
