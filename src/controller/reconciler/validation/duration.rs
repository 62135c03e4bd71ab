//! # Duration Validation
//!
//! Validates Go-style duration strings passed through to the execution engine.

use anyhow::Result;
use regex::Regex;
use std::time::Duration;

/// Parse a Go duration string ("30s", "45m", "1h30m", "1.5h") into a Duration
pub fn parse_go_duration(duration_str: &str) -> Result<Duration> {
    let duration_trimmed = duration_str.trim();

    if duration_trimmed.is_empty() {
        return Err(anyhow::anyhow!("Duration string cannot be empty"));
    }

    // One or more <number><unit> segments, e.g. 1h30m or 1.5h
    let full_regex = Regex::new(r"^(\d+(\.\d+)?(ns|us|µs|ms|s|m|h))+$")
        .map_err(|e| anyhow::anyhow!("Failed to compile regex: {e}"))?;
    if !full_regex.is_match(duration_trimmed) {
        return Err(anyhow::anyhow!(
            "Invalid duration format '{duration_trimmed}'. Expected a Go duration (e.g., '30s', '45m', '1h30m')"
        ));
    }

    let segment_regex = Regex::new(r"(?P<number>\d+(\.\d+)?)(?P<unit>ns|us|µs|ms|s|m|h)")
        .map_err(|e| anyhow::anyhow!("Failed to compile regex: {e}"))?;

    let mut total_secs = 0f64;
    for captures in segment_regex.captures_iter(duration_trimmed) {
        let number: f64 = captures["number"].parse().map_err(|e| {
            anyhow::anyhow!(
                "Invalid duration number '{}' in '{}': {}",
                &captures["number"],
                duration_trimmed,
                e
            )
        })?;
        let scale = match &captures["unit"] {
            "h" => 3600.0,
            "m" => 60.0,
            "s" => 1.0,
            "ms" => 1e-3,
            "us" | "µs" => 1e-6,
            _ => 1e-9,
        };
        total_secs += number * scale;
    }

    if total_secs <= 0.0 {
        return Err(anyhow::anyhow!(
            "Duration must be greater than 0, got '{duration_trimmed}'"
        ));
    }

    Ok(Duration::from_secs_f64(total_secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_durations() {
        assert_eq!(parse_go_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_go_duration("45m").unwrap(), Duration::from_secs(2700));
        assert_eq!(parse_go_duration("2h").unwrap(), Duration::from_secs(7200));
    }

    #[test]
    fn test_parse_compound_and_fractional() {
        assert_eq!(parse_go_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_go_duration("1.5h").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_go_duration("500ms").unwrap(), Duration::from_millis(500));
    }

    #[test]
    fn test_parse_rejects_invalid() {
        assert!(parse_go_duration("").is_err());
        assert!(parse_go_duration("10").is_err());
        assert!(parse_go_duration("1d").is_err());
        assert!(parse_go_duration("abc").is_err());
        assert!(parse_go_duration("0s").is_err());
        assert!(parse_go_duration("-5m").is_err());
    }
}
