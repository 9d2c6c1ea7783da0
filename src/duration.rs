//! Go-style duration grammar
//!
//! The scenario DSL's `within` clause and the `np.runDuration` pod label
//! both use the control plane's duration spelling: an integer value per
//! unit, units `ns`, `us`, `ms`, `s`, `m`, `h`, and multiple components
//! concatenated (`1h30m`, `90s`, `300ms`).

use std::time::Duration;

/// Parse a duration string like `10s`, `2m`, `300ms` or `1h30m`.
pub fn parse(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("duration cannot be empty".to_string());
    }

    let mut total = Duration::ZERO;
    let mut remaining = s;

    while !remaining.is_empty() {
        let num_end = remaining
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(remaining.len());
        if num_end == 0 {
            return Err(format!("expected a number in duration `{s}`"));
        }
        let value: u64 = remaining[..num_end]
            .parse()
            .map_err(|_| format!("invalid number in duration `{s}`"))?;
        remaining = &remaining[num_end..];

        let unit_end = remaining
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(remaining.len());
        let component = match &remaining[..unit_end] {
            "ns" => Duration::from_nanos(value),
            "us" => Duration::from_micros(value),
            "ms" => Duration::from_millis(value),
            "s" => Duration::from_secs(value),
            "m" => Duration::from_secs(value * 60),
            "h" => Duration::from_secs(value * 3600),
            "" => return Err(format!("missing unit suffix in duration `{s}`")),
            unit => return Err(format!("invalid duration unit `{unit}` in `{s}`")),
        };
        total += component;
        remaining = &remaining[unit_end..];
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_units() {
        assert_eq!(parse("10s").unwrap(), Duration::from_secs(10));
        assert_eq!(parse("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse("300ms").unwrap(), Duration::from_millis(300));
        assert_eq!(parse("250us").unwrap(), Duration::from_micros(250));
        assert_eq!(parse("99ns").unwrap(), Duration::from_nanos(99));
    }

    #[test]
    fn test_compound_durations() {
        assert_eq!(parse("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse("2m30s").unwrap(), Duration::from_secs(150));
        assert_eq!(parse("1s500ms").unwrap(), Duration::from_millis(1500));
    }

    #[test]
    fn test_zero_duration() {
        assert_eq!(parse("0s").unwrap(), Duration::ZERO);
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(parse("").is_err());
        assert!(parse("abc").is_err());
        assert!(parse("10").is_err());
        assert!(parse("s").is_err());
        assert!(parse("4x").is_err());
        assert!(parse("-5s").is_err());
        assert!(parse("1h30").is_err());
    }
}
