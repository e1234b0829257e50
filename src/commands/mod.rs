//! CLI command implementations.

pub mod install;
pub mod ranges;
pub mod remove;
pub mod status;

use anyhow::{Context, Result};
use std::path::Path;

use crate::config::Config;
use crate::enforcer::IptablesBackend;

/// Per-run overrides from global CLI flags.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub country: Option<String>,
    pub chain: Option<String>,
}

/// Load the config file (defaults if absent) and apply CLI overrides.
///
/// When only the country is overridden and the chain still has the
/// `<COUNTRY>_WHITELIST` name derived from the configured country, the chain
/// name follows the new country.
pub fn load_config(path: &Path, overrides: &Overrides) -> Result<Config> {
    let mut config = Config::load_or_default(path)
        .with_context(|| format!("Failed to load config from {:?}", path))?;

    if let Some(country) = &overrides.country {
        if overrides.chain.is_none() && config.chain_name == default_chain_name(&config.country) {
            config.chain_name = default_chain_name(country);
        }
        config.country = country.clone();
    }
    if let Some(chain) = &overrides.chain {
        config.chain_name = chain.clone();
    }

    config.validate()?;
    Ok(config)
}

fn default_chain_name(country: &str) -> String {
    format!("{}_WHITELIST", country.to_ascii_uppercase())
}

/// Real iptables backend for the configured binary.
pub fn iptables_backend(config: &Config) -> IptablesBackend {
    IptablesBackend::with_program(&config.iptables_path)
}
