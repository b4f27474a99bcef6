//! # Duration Parsing
//!
//! Parses Kubernetes-style duration strings such as `"30s"`, `"5m"`, `"8760h"` or `"365d"`.

use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;

static DURATION_REGEX: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(?P<number>\d+)(?P<unit>[smhd])$").ok());

/// Parse a Kubernetes duration string into a `Duration`
///
/// Accepts `<number><unit>` with unit `s`, `m`, `h` or `d` (case insensitive).
/// Zero durations are rejected.
pub fn parse_kubernetes_duration(duration_str: &str) -> Result<Duration, String> {
    let duration_trimmed = duration_str.trim();

    if duration_trimmed.is_empty() {
        return Err("duration string cannot be empty".to_string());
    }

    let duration_regex = DURATION_REGEX
        .as_ref()
        .ok_or_else(|| "failed to compile duration regex".to_string())?;

    let interval_lower = duration_trimmed.to_lowercase();

    let captures = duration_regex.captures(&interval_lower).ok_or_else(|| {
        format!(
            "invalid duration format '{duration_trimmed}', expected <number><unit> (e.g. '1m', '5m', '8760h')"
        )
    })?;

    let number_str = captures
        .name("number")
        .ok_or_else(|| format!("failed to extract number from duration '{duration_trimmed}'"))?
        .as_str();

    let unit = captures
        .name("unit")
        .ok_or_else(|| format!("failed to extract unit from duration '{duration_trimmed}'"))?
        .as_str();

    let number: u64 = number_str
        .parse()
        .map_err(|e| format!("invalid duration number '{number_str}' in '{duration_trimmed}': {e}"))?;

    if number == 0 {
        return Err(format!(
            "duration must be greater than 0, got '{duration_trimmed}'"
        ));
    }

    let multiplier = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        "d" => 86400,
        _ => {
            return Err(format!(
                "invalid unit '{unit}' in duration '{duration_trimmed}', expected s, m, h or d"
            ));
        }
    };

    number
        .checked_mul(multiplier)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration '{duration_trimmed}' is too large"))
}
