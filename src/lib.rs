//! # geowall - Country IPv4 whitelist firewall for Linux hosts
//!
//! Downloads a regional internet registry's delegated statistics feed, extracts
//! the IPv4 ranges allocated to one country, and installs them as an iptables
//! whitelist: inbound traffic from anywhere else is dropped.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        geowall                              │
//! ├─────────────────────────────────────────────────────────────┤
//! │  CLI (clap)                                                 │
//! │    └── Commands: install, remove, status, ranges, version   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Config (serde_yaml)                                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Fetcher (reqwest + rustls) + feed cache                    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Registry parser (ipnet)                                    │
//! │    └── count -> prefix, per-line classification            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Reconciler                                                 │
//! │    └── reset chain, mandatory + country rules, link INPUT   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Enforcer (FirewallBackend trait)                           │
//! │    ├── IptablesBackend                                      │
//! │    └── MemoryBackend (dry run, tests)                       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```no_run
//! use geowall::config::Config;
//! use geowall::enforcer::{check_root, IptablesBackend};
//! use geowall::fetcher::load_feed;
//! use geowall::reconciler::FirewallReconciler;
//! use geowall::registry;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     check_root()?;
//!
//!     let config = Config::load("/etc/geowall/config.yaml")?;
//!     let feed = load_feed(&config, false).await?;
//!     let report = registry::parse_bytes(&feed.bytes, &config.country);
//!
//!     let backend = IptablesBackend::with_program(&config.iptables_path);
//!     FirewallReconciler::new(&backend, &config.chain_name)
//!         .with_policy(config.link_policy)
//!         .install(&report.ranges, &config.mandatory_nets()?)?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`registry`] - Delegated statistics parser
//! - [`reconciler`] - Whitelist chain lifecycle (install, uninstall, status)
//! - [`enforcer`] - Firewall backend abstraction (iptables, in-memory)
//! - [`fetcher`] - Feed download and local cache
//! - [`config`] - Configuration parsing and validation
//! - [`cli`] - Command-line interface definitions
//! - [`commands`] - CLI command implementations
//! - [`lock`] - File locking for concurrent execution prevention
//! - [`state`] - Record of the last install
//! - [`utils`] - Formatting helpers

pub mod cli;
pub mod cmd_abstraction;
pub mod commands;
pub mod config;
pub mod enforcer;
pub mod error;
pub mod fetcher;
pub mod lock;
pub mod reconciler;
pub mod registry;
pub mod state;
pub mod utils;
pub mod validation;

pub use cli::{Cli, Commands};
pub use config::Config;
pub use error::{FirewallError, GeowallError};
pub use reconciler::{FirewallReconciler, RuleCount};
