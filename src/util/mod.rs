//! util — small shared helpers.
//!
//! Contains:
//! - env_flag()/env_parse(): environment lookups used by `SddsConfig::from_env`.
//! - fixed_row_boundary(): row-count stride rounding for fixed-row-count pages.
//! - try_reserve(): fallible growth that reports `SddsError::Allocation`.

use anyhow::Result;

use crate::error::SddsError;

/// Read a boolean-ish env var ("1|true|on|yes" => true). `None` if unset.
pub fn env_flag(key: &str) -> Option<bool> {
    std::env::var(key).ok().map(|v| {
        let s = v.trim().to_ascii_lowercase();
        s == "1" || s == "true" || s == "on" || s == "yes"
    })
}

/// Parse an env var into `T`; unset or unparsable values yield `None`.
pub fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

/// Next multiple of `increment` strictly above `rows`.
///
/// `increment == 0` degrades to the exact count.
#[inline]
pub fn fixed_row_boundary(rows: u64, increment: u64) -> u64 {
    if increment == 0 {
        return rows;
    }
    (rows / increment + 1) * increment
}

/// Reserve room for `additional` more elements or fail with an allocation error.
pub fn try_reserve<T>(v: &mut Vec<T>, additional: usize, what: &str) -> Result<()> {
    v.try_reserve(additional).map_err(|e| {
        anyhow::Error::new(SddsError::Allocation(format!(
            "cannot grow {} by {} elements: {}",
            what, additional, e
        )))
    })
}
