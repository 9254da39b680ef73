//! Sampling interval parsing. Client-supplied intervals never fail: anything
//! unusable falls back to the configured default.

use std::time::Duration;

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Longest accepted duration: `i64::MAX` nanoseconds, roughly 2562047h.
pub const MAX_DURATION: Duration = Duration::from_nanos(i64::MAX as u64);

fn unit_nanos(unit: &str) -> Option<u128> {
    match unit {
        "ns" => Some(1),
        "us" | "µs" | "μs" => Some(1_000),
        "ms" => Some(1_000_000),
        "s" => Some(NANOS_PER_SEC),
        "m" => Some(60 * NANOS_PER_SEC),
        "h" => Some(3_600 * NANOS_PER_SEC),
        _ => None,
    }
}

/// Parse a duration string such as `"300ms"`, `"1.5h"` or `"2h45m"`.
///
/// Every number needs a unit, except a lone `"0"`. Negative durations and
/// anything past [`MAX_DURATION`] are rejected.
pub fn parse_duration(input: &str) -> Option<Duration> {
    let mut rest = input.strip_prefix('+').unwrap_or(input);
    if rest == "0" {
        return Some(Duration::ZERO);
    }
    if rest.is_empty() || rest.starts_with('-') {
        return None;
    }

    let mut total: u128 = 0;
    while !rest.is_empty() {
        let int_len = rest.bytes().take_while(u8::is_ascii_digit).count();
        let (int_part, after) = rest.split_at(int_len);
        let (frac_part, after) = match after.strip_prefix('.') {
            Some(f) => f.split_at(f.bytes().take_while(u8::is_ascii_digit).count()),
            None => ("", after),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return None;
        }

        let unit_len = after
            .find(|c: char| c == '.' || c.is_ascii_digit())
            .unwrap_or(after.len());
        let (unit, after) = after.split_at(unit_len);
        let scale = unit_nanos(unit)?;

        let whole: u128 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().ok()?
        };
        let mut value = whole.checked_mul(scale)?;
        if !frac_part.is_empty() {
            // digits past nanosecond precision can't change the result
            let digits = &frac_part[..frac_part.len().min(18)];
            let frac: u128 = digits.parse().ok()?;
            value = value.checked_add(frac * scale / 10u128.pow(digits.len() as u32))?;
        }
        total = total.checked_add(value)?;
        rest = after;
    }

    if total > MAX_DURATION.as_nanos() {
        return None;
    }
    let secs = u64::try_from(total / NANOS_PER_SEC).ok()?;
    Some(Duration::new(secs, (total % NANOS_PER_SEC) as u32))
}

/// Resolve a client-supplied interval. Absent, empty, unparsable and zero
/// values all yield `default`.
pub fn parse_interval(value: Option<&str>, default: Duration) -> Duration {
    value
        .filter(|v| !v.is_empty())
        .and_then(parse_duration)
        .filter(|d| !d.is_zero())
        .unwrap_or(default)
}
