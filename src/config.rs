//! Configuration management for geowall.

use anyhow::{Context, Result};
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::validation::{interval_to_duration, validate_chain_name, validate_country_code};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/geowall/config.yaml";

/// Order in which the whitelist is linked into the inbound path.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LinkPolicy {
    /// Insert the jump rule before appending the default-deny rule.
    /// Until the deny rule exists, unmatched traffic is still accepted.
    #[default]
    FailOpen,
    /// Append the default-deny rule before inserting the jump rule.
    /// Until the jump exists, all inbound traffic is dropped.
    FailClosed,
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// ISO 3166 alpha-2 country whose ranges are whitelisted
    pub country: String,

    /// Registry delegated statistics feed
    pub feed_url: String,

    /// Name of the whitelist chain
    pub chain_name: String,

    /// Ranges always accepted ahead of the country ranges (loopback, private,
    /// link-local, multicast)
    pub mandatory_ranges: Vec<String>,

    pub link_policy: LinkPolicy,

    /// Wall-clock bound on the feed download, retries included
    pub fetch_timeout_secs: u64,

    /// Local copy of the last downloaded feed
    pub cache_path: Option<PathBuf>,

    /// Maximum age of the cached feed before it is downloaded again (e.g. "12h", "1d")
    pub cache_max_age: String,

    /// iptables binary
    pub iptables_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            country: "AU".to_string(),
            feed_url: "https://ftp.apnic.net/stats/apnic/delegated-apnic-latest".to_string(),
            chain_name: "AU_WHITELIST".to_string(),
            mandatory_ranges: default_mandatory_ranges(),
            link_policy: LinkPolicy::FailOpen,
            fetch_timeout_secs: 30,
            cache_path: Some(PathBuf::from("/var/cache/geowall/delegated-latest")),
            cache_max_age: "1d".to_string(),
            iptables_path: "iptables".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path.as_ref()))?;

        config.validate()?;

        Ok(config)
    }

    /// Load the file if it exists, otherwise use defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        validate_country_code(&self.country)?;
        validate_chain_name(&self.chain_name)?;

        if !self.feed_url.starts_with("https://") {
            anyhow::bail!("Feed URL must use HTTPS: {}", self.feed_url);
        }

        self.mandatory_nets()?;

        if interval_to_duration(&self.cache_max_age).is_none() {
            anyhow::bail!(
                "Invalid cache_max_age '{}'. Use format like '12h', '30m', '1d'",
                self.cache_max_age
            );
        }

        if self.fetch_timeout_secs == 0 {
            anyhow::bail!("fetch_timeout_secs must be greater than zero");
        }

        if self.iptables_path.trim().is_empty() {
            anyhow::bail!("iptables_path cannot be empty");
        }

        Ok(())
    }

    /// Mandatory ranges parsed as IPv4 networks, in configured order.
    pub fn mandatory_nets(&self) -> Result<Vec<Ipv4Net>> {
        self.mandatory_ranges
            .iter()
            .map(|s| {
                s.trim()
                    .parse::<Ipv4Net>()
                    .with_context(|| format!("Invalid mandatory range '{}' (IPv4 CIDR expected)", s))
            })
            .collect()
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn cache_max_age(&self) -> Duration {
        interval_to_duration(&self.cache_max_age).unwrap_or(Duration::from_secs(86_400))
    }
}

/// Loopback, RFC1918, link-local and multicast blocks.
fn default_mandatory_ranges() -> Vec<String> {
    vec![
        "127.0.0.0/8".to_string(),    // Loopback
        "10.0.0.0/8".to_string(),     // RFC1918
        "172.16.0.0/12".to_string(),  // RFC1918
        "192.168.0.0/16".to_string(), // RFC1918
        "169.254.0.0/16".to_string(), // Link-local
        "224.0.0.0/4".to_string(),    // Multicast
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.country, "AU");
        assert_eq!(config.chain_name, "AU_WHITELIST");
        assert_eq!(config.link_policy, LinkPolicy::FailOpen);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_mandatory_ranges_order() {
        let nets = Config::default().mandatory_nets().unwrap();
        assert_eq!(nets.len(), 6);
        assert_eq!(nets[0].to_string(), "127.0.0.0/8");
        assert_eq!(nets[5].to_string(), "224.0.0.0/4");
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "country: nz\nchain_name: NZ_WHITELIST\nlink_policy: fail_closed\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.country, "nz");
        assert_eq!(config.chain_name, "NZ_WHITELIST");
        assert_eq!(config.link_policy, LinkPolicy::FailClosed);
        assert_eq!(config.fetch_timeout_secs, 30);
        assert_eq!(config.mandatory_ranges, default_mandatory_ranges());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_link_policy_rejected() {
        let result: Result<Config, _> = serde_yaml::from_str("link_policy: sometimes\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_rejects_bad_country() {
        let config = Config {
            country: "AUS".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_http_feed() {
        let config = Config {
            feed_url: "http://ftp.apnic.net/stats/apnic/delegated-apnic-latest".to_string(),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("HTTPS"));
    }

    #[test]
    fn test_validation_rejects_ipv6_mandatory_range() {
        let config = Config {
            mandatory_ranges: vec!["127.0.0.0/8".to_string(), "fe80::/10".to_string()],
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("fe80::/10"));
    }

    #[test]
    fn test_validation_rejects_bad_cache_age() {
        let config = Config {
            cache_max_age: "tomorrow".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_zero_timeout() {
        let config = Config {
            fetch_timeout_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_builtin_chain() {
        let config = Config {
            chain_name: "INPUT".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_serialized_config_loads_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        let config = Config {
            country: "NZ".to_string(),
            chain_name: "NZ_WHITELIST".to_string(),
            link_policy: LinkPolicy::FailClosed,
            ..Default::default()
        };
        std::fs::write(&path, serde_yaml::to_string(&config).unwrap()).unwrap();
        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_or_default(dir.path().join("absent.yaml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_invalid_yaml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "country: [unclosed").unwrap();
        let err = Config::load(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_cache_max_age_duration() {
        let config = Config {
            cache_max_age: "12h".to_string(),
            ..Default::default()
        };
        assert_eq!(config.cache_max_age(), Duration::from_secs(12 * 3600));
        assert_eq!(config.fetch_timeout(), Duration::from_secs(30));
    }
}
