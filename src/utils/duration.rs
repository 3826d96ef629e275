//! Duration parsing utilities.
//!
//! Scenario files express every point in simulated time as a compact
//! duration string ("30s", "5m", "2h30m"). Parsing is strict: each segment
//! must carry a single-letter unit, so ambiguous inputs like "1800" or
//! "10 minutes" are rejected instead of guessed at.

/// Parse a duration string (e.g. "5h", "30m", "1800s", "2h30m") to seconds.
///
/// A duration is one or more segments, each a decimal number followed by a
/// unit (`h`, `m`, or `s`). Segments may be separated by whitespace
/// ("1h 30s") or run together ("2h30m").
///
/// # Examples
/// ```
/// use monerosim::utils::duration::parse_duration_to_seconds;
///
/// assert_eq!(parse_duration_to_seconds("1800s"), Ok(1800));
/// assert_eq!(parse_duration_to_seconds("30m"), Ok(1800));
/// assert_eq!(parse_duration_to_seconds("2h30m"), Ok(9000));
/// assert!(parse_duration_to_seconds("1800").is_err());
/// assert!(parse_duration_to_seconds("10 minutes").is_err());
/// ```
pub fn parse_duration_to_seconds(duration: &str) -> Result<u64, String> {
    let input = duration.trim();
    if input.is_empty() {
        return Err("Empty duration string".to_string());
    }

    let mut total: u64 = 0;
    let mut chars = input.chars().peekable();

    while chars.peek().is_some() {
        // Skip whitespace between segments
        while matches!(chars.peek(), Some(c) if c.is_whitespace()) {
            chars.next();
        }
        if chars.peek().is_none() {
            break;
        }

        let mut digits = String::new();
        while matches!(chars.peek(), Some(c) if c.is_ascii_digit()) {
            digits.push(chars.next().unwrap());
        }
        if digits.is_empty() {
            return Err(format!("Invalid duration format: {}", duration));
        }
        let value: u64 = digits
            .parse()
            .map_err(|_| format!("Invalid number in duration: {}", duration))?;

        let multiplier = match chars.next() {
            Some('h') => 3600,
            Some('m') => 60,
            Some('s') => 1,
            Some(other) => {
                return Err(format!("Unknown duration unit '{}' in: {}", other, duration));
            }
            None => {
                return Err(format!(
                    "Missing unit in duration '{}' (expected h, m, or s)",
                    duration
                ));
            }
        };

        // A unit must end its segment; "10 minutes" reaches here with a
        // trailing "inutes" after the 'm'.
        if matches!(chars.peek(), Some(c) if !c.is_ascii_digit() && !c.is_whitespace()) {
            return Err(format!("Invalid duration format: {}", duration));
        }

        let segment = value
            .checked_mul(multiplier)
            .ok_or_else(|| format!("Duration overflows: {}", duration))?;
        total = total
            .checked_add(segment)
            .ok_or_else(|| format!("Duration overflows: {}", duration))?;
    }

    Ok(total)
}

/// Render seconds in the canonical manifest form ("300s").
pub fn format_seconds(seconds: u64) -> String {
    format!("{}s", seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_units() {
        assert_eq!(parse_duration_to_seconds("30s"), Ok(30));
        assert_eq!(parse_duration_to_seconds("5m"), Ok(300));
        assert_eq!(parse_duration_to_seconds("1h"), Ok(3600));
        assert_eq!(parse_duration_to_seconds("3600s"), Ok(3600));
        assert_eq!(parse_duration_to_seconds("0s"), Ok(0));
    }

    #[test]
    fn test_parse_compound() {
        assert_eq!(parse_duration_to_seconds("2h30m"), Ok(9000));
        assert_eq!(parse_duration_to_seconds("1h 30s"), Ok(3630));
        assert_eq!(parse_duration_to_seconds("1h30m15s"), Ok(5415));
        assert_eq!(parse_duration_to_seconds(" 45s "), Ok(45));
    }

    #[test]
    fn test_rejects_missing_unit() {
        assert!(parse_duration_to_seconds("1800").is_err());
        assert!(parse_duration_to_seconds("1h30").is_err());
    }

    #[test]
    fn test_rejects_spelled_out_units() {
        assert!(parse_duration_to_seconds("10 minutes").is_err());
        assert!(parse_duration_to_seconds("5min").is_err());
        assert!(parse_duration_to_seconds("2hours").is_err());
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(parse_duration_to_seconds("").is_err());
        assert!(parse_duration_to_seconds("invalid").is_err());
        assert!(parse_duration_to_seconds("5x").is_err());
        assert!(parse_duration_to_seconds("h30m").is_err());
    }

    #[test]
    fn test_format_seconds() {
        assert_eq!(format_seconds(0), "0s");
        assert_eq!(format_seconds(3900), "3900s");
    }
}
