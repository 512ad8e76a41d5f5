//! Human readable renderings used in progress and status lines.

use chrono::{DateTime, FixedOffset, Local, NaiveDateTime};

const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// `1536` -> `1.5KB`, `1048576` -> `1MB`. One decimal, trailing `.0` dropped.
pub fn humanize_bytes(bytes: u64) -> String {
    if bytes == 0 {
        return "0B".to_string();
    }

    let mut exponent = 0;
    while exponent < UNITS.len() - 1 && bytes >= 1024u64.pow(exponent as u32 + 1) {
        exponent += 1;
    }
    let scaled = bytes as f64 / 1024f64.powi(exponent as i32);

    let formatted = format!("{:.1}", scaled);
    let trimmed = formatted.strip_suffix(".0").unwrap_or(&formatted);
    format!("{}{}", trimmed, UNITS[exponent])
}

/// `0.421` -> `42%`
pub fn percentify(fraction: f64) -> String {
    if !fraction.is_finite() {
        return "100%".to_string();
    }
    format!("{:.0}%", fraction * 100.0)
}

/// Parses the timestamp formats the dump server has been seen to emit.
pub fn parse_timestamp(value: &str) -> Option<DateTime<FixedOffset>> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed);
    }
    for format in ["%Y-%m-%d %H:%M:%S %z", "%Y-%m-%d %H:%M:%S%.f %z"] {
        if let Ok(parsed) = DateTime::parse_from_str(value, format) {
            return Some(parsed);
        }
    }
    // naive values are UTC
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc().fixed_offset())
}

/// Renders a timestamp in local time with `format`, or `unknown`.
pub fn local_timestamp(value: Option<&str>, format: &str) -> String {
    value
        .and_then(parse_timestamp)
        .map(|ts| ts.with_timezone(&Local).format(format).to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_humanize_bytes() {
        assert_eq!(humanize_bytes(0), "0B");
        assert_eq!(humanize_bytes(512), "512B");
        assert_eq!(humanize_bytes(1024), "1KB");
        assert_eq!(humanize_bytes(1536), "1.5KB");
        assert_eq!(humanize_bytes(10 * 1024 * 1024), "10MB");
        assert_eq!(humanize_bytes(3 * 1024 * 1024 * 1024 + 512 * 1024 * 1024), "3.5GB");
    }

    #[test]
    fn test_humanize_bytes_caps_at_terabytes() {
        let five_pb = 5 * 1024u64.pow(5);
        assert_eq!(humanize_bytes(five_pb), "5120TB");
    }

    #[test]
    fn test_percentify() {
        assert_eq!(percentify(0.0), "0%");
        assert_eq!(percentify(0.421), "42%");
        assert_eq!(percentify(1.0), "100%");
        assert_eq!(percentify(f64::NAN), "100%");
    }

    #[test]
    fn test_parse_timestamp_formats() {
        assert!(parse_timestamp("2013-05-01T12:30:00-04:00").is_some());
        assert!(parse_timestamp("2013-05-01T16:30:00Z").is_some());
        assert!(parse_timestamp("2013-05-01 12:30:00 -0400").is_some());
        assert!(parse_timestamp("2013-05-01 16:30:00").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_local_timestamp_unknown() {
        assert_eq!(local_timestamp(None, "%Y"), "unknown");
        assert_eq!(local_timestamp(Some("garbage"), "%Y"), "unknown");
        assert_eq!(local_timestamp(Some("2013-05-01T12:30:00Z"), "%Y"), "2013");
    }
}
