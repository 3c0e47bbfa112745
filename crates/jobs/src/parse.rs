//! Parsing utilities for durations and absolute timestamps.

use std::time::Duration;

use {
    anyhow::{Result, bail},
    chrono::{DateTime, Utc},
};

/// Parse a human-friendly duration string.
///
/// Supported suffixes: `ms`, `s` (seconds), `m` (minutes), `h` (hours), `d` (days).
/// Examples: `"250ms"`, `"30s"`, `"5m"`, `"2h"`, `"1d"`.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let input = input.trim();
    if input.is_empty() {
        bail!("empty duration string");
    }

    let (num_str, suffix) = match input.find(|c: char| c.is_alphabetic()) {
        Some(i) => (input[..i].trim_end(), &input[i..]),
        None => bail!("duration missing unit suffix (ms/s/m/h/d): {input}"),
    };

    let value: u64 = num_str
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid number in duration: {num_str}"))?;

    if value == 0 {
        bail!("duration must be > 0");
    }

    let ms = match suffix {
        "ms" => Some(value),
        "s" => value.checked_mul(1_000),
        "m" => value.checked_mul(60_000),
        "h" => value.checked_mul(3_600_000),
        "d" => value.checked_mul(86_400_000),
        _ => bail!("unknown duration suffix: {suffix} (expected ms/s/m/h/d)"),
    };

    match ms {
        Some(ms) => Ok(Duration::from_millis(ms)),
        None => bail!("duration too large: {input}"),
    }
}

/// Render a duration using the largest suffix that divides it evenly.
pub fn format_duration(duration: Duration) -> String {
    let ms = duration.as_millis();
    if ms == 0 {
        return "0s".into();
    }
    for (unit, suffix) in [(86_400_000, "d"), (3_600_000, "h"), (60_000, "m"), (1_000, "s")] {
        if ms % unit == 0 {
            return format!("{}{suffix}", ms / unit);
        }
    }
    format!("{ms}ms")
}

/// Parse an RFC 3339 timestamp string into a UTC instant.
///
/// Accepts formats like `"2026-01-12T18:00:00Z"` or with a timezone offset.
pub fn parse_timestamp(input: &str) -> Result<DateTime<Utc>> {
    let dt = input
        .trim()
        .parse::<DateTime<Utc>>()
        .map_err(|e| anyhow::anyhow!("invalid RFC 3339 timestamp: {e}"))?;

    if dt.timestamp_millis() < 0 {
        bail!("timestamp is before epoch");
    }
    Ok(dt)
}
