//! Validation of operator-supplied values, shaped as `clap` value parsers.
//!
//! The session trusts what it is given; everything checked here is checked
//! exactly once, on the way in.

use crate::state::{Class, JoinMode, WorkMode};
use core::time::Duration;

pub const REGIONS: [&str; 10] = [
    "AS923",
    "AU915",
    "CN470",
    "CN779",
    "EU433",
    "EU868",
    "IN865",
    "KR920",
    "US915",
    "US915_HYBRID",
];

fn parse_hex(value: &str, bytes: usize, what: &str) -> Result<String, String> {
    let value = value.trim();
    match hex::decode(value) {
        Ok(decoded) if decoded.len() == bytes => Ok(value.to_ascii_uppercase()),
        Ok(_) => Err(format!("{} must be {} hex characters", what, bytes * 2)),
        Err(err) => Err(format!("{} is not hex: {}", what, err)),
    }
}

/// A device or application EUI: 16 hex characters, returned upper-cased.
pub fn parse_eui(value: &str) -> Result<String, String> {
    parse_hex(value, 8, "EUI")
}

/// An application key: 32 hex characters, returned upper-cased.
pub fn parse_app_key(value: &str) -> Result<String, String> {
    parse_hex(value, 16, "application key")
}

pub fn parse_region(value: &str) -> Result<String, String> {
    let region = value.trim().to_ascii_uppercase();
    if REGIONS.contains(&region.as_str()) {
        Ok(region)
    } else {
        Err(format!("unknown region '{}', expected one of {}", value, REGIONS.join(", ")))
    }
}

pub fn parse_class(value: &str) -> Result<Class, String> {
    value.parse()
}

pub fn parse_join_mode(value: &str) -> Result<JoinMode, String> {
    value.parse()
}

pub fn parse_work_mode(value: &str) -> Result<WorkMode, String> {
    value.parse()
}

pub fn parse_switch(value: &str) -> Result<bool, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Ok(true),
        "off" | "false" | "no" | "0" => Ok(false),
        _ => Err(format!("expected on or off, got '{}'", value)),
    }
}

/// Seconds between uplinks, or `off`.
pub fn parse_interval(value: &str) -> Result<Option<u32>, String> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("off") {
        return Ok(None);
    }
    match value.parse::<u32>() {
        Ok(0) | Err(_) => Err(format!("expected a positive number of seconds or 'off', got '{}'", value)),
        Ok(seconds) => Ok(Some(seconds)),
    }
}

/// Fractional seconds to wait for a reply.
pub fn parse_timeout(value: &str) -> Result<Duration, String> {
    let seconds: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("expected a number of seconds, got '{}'", value))?;
    Duration::try_from_secs_f64(seconds).map_err(|err| format!("timeout '{}': {}", value, err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn euis() {
        assert_eq!(parse_eui("60c5a8fffe000001").unwrap(), "60C5A8FFFE000001");
        assert!(parse_eui("60C5A8FFFE0000").is_err());
        assert!(parse_eui("60C5A8FFFE00000G").is_err());
    }

    #[test]
    fn app_keys() {
        assert_eq!(
            parse_app_key("00112233445566778899aabbccddeeff").unwrap(),
            "00112233445566778899AABBCCDDEEFF"
        );
        assert!(parse_app_key("60C5A8FFFE000001").is_err());
    }

    #[test]
    fn regions() {
        assert_eq!(parse_region("eu868").unwrap(), "EU868");
        assert_eq!(parse_region("US915_hybrid").unwrap(), "US915_HYBRID");
        assert!(parse_region("EU999").is_err());
    }

    #[test]
    fn switches_and_intervals() {
        assert_eq!(parse_switch("ON"), Ok(true));
        assert_eq!(parse_switch("0"), Ok(false));
        assert!(parse_switch("maybe").is_err());
        assert_eq!(parse_interval("600"), Ok(Some(600)));
        assert_eq!(parse_interval("off"), Ok(None));
        assert!(parse_interval("0").is_err());
        assert!(parse_interval("-5").is_err());
    }

    #[test]
    fn timeouts() {
        assert_eq!(parse_timeout("2"), Ok(Duration::from_secs(2)));
        assert_eq!(parse_timeout("0.25"), Ok(Duration::from_millis(250)));
        assert!(parse_timeout("-1").is_err());
        assert!(parse_timeout("inf").is_err());
        assert!(parse_timeout("NaN").is_err());
        assert!(parse_timeout("1e300").is_err());
        assert!(parse_timeout("soon").is_err());
    }
}
