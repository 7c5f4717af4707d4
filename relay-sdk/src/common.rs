//! Small shared helpers used across the core: duration (de)serialization in
//! the `"30s"`/`"5m"`/`"1h"` shorthand the configuration layer accepts.

use serde::{Deserializer, Serializer};
use std::time::Duration;

pub mod duration_serde {
    use super::*;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}ms", duration.as_millis()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error;
        use serde_json::Value;

        let value = Value::deserialize(deserializer)?;
        match value {
            Value::String(s) => parse_duration_string(&s).map_err(Error::custom),
            Value::Number(n) => {
                let secs = n.as_u64().ok_or_else(|| Error::custom("invalid duration"))?;
                Ok(Duration::from_secs(secs))
            }
            _ => Err(Error::custom("invalid duration format")),
        }
    }

    pub fn parse_duration_string(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        if s.is_empty() {
            return Err("empty duration string".to_string());
        }
        if let Some(stripped) = s.strip_suffix("ms") {
            let num: u64 = stripped
                .parse()
                .map_err(|_| format!("invalid number: {stripped}"))?;
            return Ok(Duration::from_millis(num));
        }
        if let Some(stripped) = s.strip_suffix('s') {
            let num: u64 = stripped
                .parse()
                .map_err(|_| format!("invalid number: {stripped}"))?;
            return Ok(Duration::from_secs(num));
        }
        if let Some(stripped) = s.strip_suffix('m') {
            let num: u64 = stripped
                .parse()
                .map_err(|_| format!("invalid number: {stripped}"))?;
            return Ok(Duration::from_secs(num * 60));
        }
        if let Some(stripped) = s.strip_suffix('h') {
            let num: u64 = stripped
                .parse()
                .map_err(|_| format!("invalid number: {stripped}"))?;
            return Ok(Duration::from_secs(num * 3600));
        }
        Err(format!("unrecognized duration suffix: {s}"))
    }
}

/// Milliseconds since the Unix epoch, used for the sliding-window buckets in
/// `capacity` and the latency ring in `health`. Centralized so bucket math
/// stays consistent between modules.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::duration_serde::parse_duration_string;
    use std::time::Duration;

    #[test]
    fn parses_known_suffixes() {
        assert_eq!(parse_duration_string("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration_string("1m").unwrap(), Duration::from_secs(60));
        assert_eq!(parse_duration_string("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_duration_string("500ms").unwrap(), Duration::from_millis(500));
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_duration_string("").is_err());
        assert!(parse_duration_string("abc").is_err());
        assert!(parse_duration_string("30x").is_err());
    }
}
