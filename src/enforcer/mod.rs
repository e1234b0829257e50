//! Firewall backends.
//!
//! A backend exposes the primitive filter-table operations the reconciler is
//! built from. [`IptablesBackend`] drives the real kernel through `iptables`;
//! [`MemoryBackend`] simulates a filter table for dry runs and tests.

mod iptables;
mod memory;

use anyhow::Result;
use ipnet::Ipv4Net;
use std::fmt;

pub use iptables::IptablesBackend;
pub use memory::MemoryBackend;

use crate::error::{BackendError, GeowallError};

/// Built-in chain carrying traffic destined for this host
pub const INPUT_CHAIN: &str = "INPUT";

/// Result of a mutating backend primitive
pub type BackendResult = std::result::Result<(), BackendError>;

/// What happens to a packet matching a rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RuleAction {
    Accept,
    Drop,
    Jump(String),
}

impl RuleAction {
    /// The `-j` target name
    pub fn target(&self) -> &str {
        match self {
            RuleAction::Accept => "ACCEPT",
            RuleAction::Drop => "DROP",
            RuleAction::Jump(chain) => chain,
        }
    }
}

/// A match specification plus action.
///
/// Only source-address matching is supported; a rule without a source matches
/// every packet.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Rule {
    pub source: Option<Ipv4Net>,
    pub action: RuleAction,
}

impl Rule {
    /// Accept packets whose source is inside `net`.
    pub fn accept_from(net: Ipv4Net) -> Self {
        Self {
            source: Some(net),
            action: RuleAction::Accept,
        }
    }

    /// Unconditional drop.
    pub fn drop_all() -> Self {
        Self {
            source: None,
            action: RuleAction::Drop,
        }
    }

    /// Unconditional jump to `chain`.
    pub fn jump(chain: &str) -> Self {
        Self {
            source: None,
            action: RuleAction::Jump(chain.to_string()),
        }
    }

    /// Same rule with the source truncated to its network address, the way the
    /// kernel stores it.
    pub fn normalized(&self) -> Self {
        Self {
            source: self.source.map(|net| net.trunc()),
            action: self.action.clone(),
        }
    }

    /// Match/target arguments in iptables syntax.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(4);
        if let Some(source) = self.source {
            args.push("-s".to_string());
            args.push(source.to_string());
        }
        args.push("-j".to_string());
        args.push(self.action.target().to_string());
        args
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_args().join(" "))
    }
}

/// Primitive filter-table operations.
///
/// Every mutating call reports failure with the backend's raw diagnostic text.
/// Implementations hold no reconciliation logic of their own.
pub trait FirewallBackend: Send + Sync {
    /// Short name used in log output
    fn name(&self) -> &str;

    /// Whether the backend tool can be executed at all
    fn is_available(&self) -> bool;

    fn chain_exists(&self, chain: &str) -> bool;

    fn create_chain(&self, chain: &str) -> BackendResult;

    fn flush_chain(&self, chain: &str) -> BackendResult;

    fn delete_chain(&self, chain: &str) -> BackendResult;

    fn append_rule(&self, chain: &str, rule: &Rule) -> BackendResult;

    /// Insert at a 1-based position.
    fn insert_rule(&self, chain: &str, position: u32, rule: &Rule) -> BackendResult;

    /// Delete the first rule equal to `rule`.
    fn delete_rule(&self, chain: &str, rule: &Rule) -> BackendResult;

    /// Whether `chain` contains `rule`. A missing chain yields `Ok(false)`.
    fn rule_exists(&self, chain: &str, rule: &Rule) -> std::result::Result<bool, BackendError>;

    /// Rules of `chain`, one per line, in `-A <chain> ...` form.
    fn list_rules(&self, chain: &str) -> std::result::Result<Vec<String>, BackendError>;
}

/// Verify the backend tool is present before touching any state.
pub fn check_backend(backend: &dyn FirewallBackend) -> Result<()> {
    if !backend.is_available() {
        anyhow::bail!(
            "{} not found. Please install {} first.",
            backend.name(),
            backend.name()
        );
    }
    Ok(())
}

/// Check if running as root (effective UID == 0)
///
/// Root covers the common `sudo` case; CAP_NET_ADMIN alone would also suffice
/// for iptables but is not checked.
pub fn check_root() -> Result<()> {
    // SAFETY: geteuid() has no preconditions, never fails and does not modify
    // any state.
    let euid = unsafe { libc::geteuid() };

    if euid != 0 {
        return Err(GeowallError::Permission(
            "this operation must be run as root (use sudo)".to_string(),
        )
        .into());
    }
    Ok(())
}
