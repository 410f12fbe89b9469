//! Timestamp conversion between Stripe's unix seconds and the ISO 8601
//! strings stored on local records.

use chrono::{DateTime, SecondsFormat, Utc};

/// Convert unix seconds to an ISO 8601 string (millisecond precision, `Z`
/// suffix). Returns `None` for timestamps outside chrono's range.
pub(crate) fn unix_to_iso(timestamp: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Parse an ISO 8601 string back to unix seconds.
pub(crate) fn iso_to_unix(iso: &str) -> Option<i64> {
    DateTime::parse_from_rfc3339(iso).ok().map(|dt| dt.timestamp())
}

/// Current time as an ISO 8601 string.
pub(crate) fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unix_to_iso() {
        assert_eq!(
            unix_to_iso(1_700_000_000).as_deref(),
            Some("2023-11-14T22:13:20.000Z")
        );
        assert_eq!(unix_to_iso(0).as_deref(), Some("1970-01-01T00:00:00.000Z"));
    }

    #[test]
    fn test_round_trip() {
        let iso = unix_to_iso(1_700_000_000).unwrap();
        assert_eq!(iso_to_unix(&iso), Some(1_700_000_000));
    }

    #[test]
    fn test_iso_to_unix_rejects_garbage() {
        assert_eq!(iso_to_unix("not a date"), None);
    }
}
