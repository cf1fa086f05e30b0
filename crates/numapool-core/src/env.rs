//! Environment variable helpers
//!
//! All pool knobs are read through these so a bad value silently falls back
//! to the default instead of failing initialization.
//!
//! ```ignore
//! use numapool_core::env::{env_get, env_get_bool, env_get_pair};
//!
//! let gangs: usize = env_get("NPL_GANGS", 1);
//! let bind = env_get_bool("NPL_BIND", true);
//! let shape = env_get_pair("NPL_SHAPE"); // "2x8" -> Some((2, 8))
//! ```

use std::str::FromStr;

/// Get environment variable parsed as `T`, or `default` when unset or unparsable
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env_get_opt(key).unwrap_or(default)
}

/// Get environment variable parsed as `T`, `None` when unset or unparsable
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Get environment variable as boolean
///
/// "1", "true", "yes", "on" (any case) are true; "0", "false", "no", "off"
/// are false; anything else keeps the default.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => parse_bool(&val).unwrap_or(default),
        Err(_) => default,
    }
}

/// Get an `AxB` pair such as `2x8` (also accepts `2X8`, `2,8`, `2:8`)
pub fn env_get_pair(key: &str) -> Option<(usize, usize)> {
    std::env::var(key).ok().and_then(|v| parse_pair(&v))
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse `AxB`; both halves must be plain unsigned integers
pub fn parse_pair(s: &str) -> Option<(usize, usize)> {
    let s = s.trim();
    let (a, b) = s.split_once(|c| matches!(c, 'x' | 'X' | ',' | ':'))?;
    Some((a.trim().parse().ok()?, b.trim().parse().ok()?))
}
