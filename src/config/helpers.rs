use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;

use crate::error::ConfigError;

/// Read an environment variable, treating empty values as unset.
pub(crate) fn optional_env(key: &str) -> Result<Option<String>, ConfigError> {
    match std::env::var(key) {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => Ok(Some(value)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
    }
}

/// Parse a raw value, falling back to `default` when absent.
pub(crate) fn parse_value<T>(key: &str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match raw {
        Some(raw) => raw.trim().parse().map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("'{raw}': {e}"),
        }),
        None => Ok(default),
    }
}

/// Parse a boolean flag. Accepts `true`/`false`, `1`/`0`, `yes`/`no`.
pub(crate) fn parse_bool(
    key: &str,
    raw: Option<String>,
    default: bool,
) -> Result<bool, ConfigError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("must be 'true' or 'false', got '{other}'"),
        }),
    }
}

/// Parse `k=v,k=v` pairs.
pub(crate) fn parse_key_values(
    key: &str,
    raw: &str,
) -> Result<BTreeMap<String, String>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) if !k.trim().is_empty() => {
                Ok((k.trim().to_string(), v.trim().to_string()))
            }
            _ => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("expected key=value, got '{pair}'"),
            }),
        })
        .collect()
}
