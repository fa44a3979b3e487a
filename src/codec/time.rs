//! CoT timestamp handling.
//!
//! Times are UTC with millisecond precision, written as
//! `YYYY-MM-DDTHH:MM:SS.mmmZ` so they sort lexically.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, SubsecRound, Utc};

/// Truncate a timestamp to the precision carried on the wire.
pub fn normalize(time: DateTime<Utc>) -> DateTime<Utc> {
    time.trunc_subsecs(3)
}

/// Current time at wire precision.
pub fn now() -> DateTime<Utc> {
    normalize(Utc::now())
}

/// Format a timestamp for the wire.
pub fn format_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a wire timestamp.
///
/// Accepts RFC 3339 with any offset and any fractional precision, and the
/// offset-less form some servers emit (read as UTC).
pub fn parse_time(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(text) {
        return Some(normalize(t.with_timezone(&Utc)));
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|t| normalize(t.and_utc()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_format_is_fixed_width_utc() {
        let t = Utc.with_ymd_and_hms(2024, 3, 9, 4, 5, 6).unwrap();
        assert_eq!(format_time(&t), "2024-03-09T04:05:06.000Z");
    }

    #[test]
    fn test_parse_variants() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 9, 4, 5, 6).unwrap() + Duration::milliseconds(120);

        assert_eq!(parse_time("2024-03-09T04:05:06.120Z"), Some(expected));
        assert_eq!(parse_time("2024-03-09T04:05:06.120999Z"), Some(expected));
        assert_eq!(parse_time("2024-03-09T06:05:06.12+02:00"), Some(expected));
        assert_eq!(parse_time("2024-03-09T04:05:06.12"), Some(expected));
        assert_eq!(
            parse_time("2024-03-09T04:05:06Z"),
            Some(Utc.with_ymd_and_hms(2024, 3, 9, 4, 5, 6).unwrap())
        );
        assert_eq!(parse_time("yesterday"), None);
    }

    #[test]
    fn test_normalized_round_trip() {
        let t = now();
        assert_eq!(parse_time(&format_time(&t)), Some(t));
    }
}
