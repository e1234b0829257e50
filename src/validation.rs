//! Input validation for configuration values and CLI overrides.
//!
//! - Country codes (ISO 3166 alpha-2)
//! - iptables chain names
//! - Time intervals (`30s`, `5m`, `4h`, `1d`)

use anyhow::{bail, Result};
use std::time::Duration;

/// iptables limits chain names to 28 characters
const MAX_CHAIN_NAME_LEN: usize = 28;

/// Built-in chains and targets a user chain must not shadow
const RESERVED_CHAIN_NAMES: &[&str] = &[
    "INPUT",
    "OUTPUT",
    "FORWARD",
    "PREROUTING",
    "POSTROUTING",
    "ACCEPT",
    "DROP",
    "REJECT",
    "RETURN",
    "QUEUE",
    "LOG",
];

/// Validate a two-letter country code.
///
/// Case is not significant; registry feeds are matched case-insensitively.
///
/// # Examples
/// ```
/// use geowall::validation::validate_country_code;
/// assert!(validate_country_code("AU").is_ok());
/// assert!(validate_country_code("nz").is_ok());
/// assert!(validate_country_code("AUS").is_err());
/// ```
pub fn validate_country_code(code: &str) -> Result<()> {
    if code.len() != 2 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        bail!(
            "Invalid country code '{}'. Use a two-letter ISO 3166 code like 'AU'",
            code
        );
    }
    Ok(())
}

/// Validate a user-defined iptables chain name.
///
/// # Examples
/// ```
/// use geowall::validation::validate_chain_name;
/// assert!(validate_chain_name("AU_WHITELIST").is_ok());
/// assert!(validate_chain_name("INPUT").is_err());
/// assert!(validate_chain_name("has space").is_err());
/// ```
pub fn validate_chain_name(name: &str) -> Result<()> {
    if name.is_empty() {
        bail!("Chain name cannot be empty");
    }
    if name.len() > MAX_CHAIN_NAME_LEN {
        bail!(
            "Chain name '{}' is too long ({} > {} characters)",
            name,
            name.len(),
            MAX_CHAIN_NAME_LEN
        );
    }
    // Reject anything iptables would read as an option or split as an argument
    if name.starts_with('-') || !name.chars().all(|c| c.is_ascii_graphic()) {
        bail!("Chain name '{}' contains invalid characters", name);
    }
    if RESERVED_CHAIN_NAMES.contains(&name) {
        bail!("Chain name '{}' is a built-in chain or target", name);
    }
    Ok(())
}

/// Timer interval validation (e.g., "4h", "30m", "1d").
///
/// Requires ASCII-only input to prevent Unicode-related edge cases.
///
/// # Examples
/// ```
/// use geowall::validation::is_valid_interval;
/// assert!(is_valid_interval("4h"));
/// assert!(!is_valid_interval("4x"));
/// assert!(!is_valid_interval(""));
/// ```
pub fn is_valid_interval(interval: &str) -> bool {
    interval_to_duration(interval).is_some()
}

/// Convert an interval like `30m` into a [`Duration`].
///
/// Returns `None` for malformed input.
pub fn interval_to_duration(interval: &str) -> Option<Duration> {
    if !interval.is_ascii() || interval.len() < 2 {
        return None;
    }

    let (num_part, suffix) = interval.split_at(interval.len() - 1);
    let multiplier = match suffix {
        "s" => 1,
        "m" => 60,
        "h" => 3_600,
        "d" => 86_400,
        _ => return None,
    };

    let n: u32 = num_part.parse().ok()?;
    Some(Duration::from_secs(u64::from(n) * multiplier))
}
