//! Whitelist chain reconciliation.
//!
//! Drives a [`FirewallBackend`] from whatever state a previous run left behind
//! to the desired configuration:
//!
//! ```text
//! INPUT:        [1] -j <chain>   ...existing rules...   [n] -j DROP
//! <chain>:      -s <mandatory...> -j ACCEPT, -s <country ranges...> -j ACCEPT
//! ```
//!
//! Cleanup commands whose only purpose is idempotency (removing residual rules
//! or chains) are best-effort. Commands the final state depends on fail fast
//! with the step, command line and backend diagnostic. No rollback is attempted;
//! re-running `install` converges from any partial state.

use ipnet::Ipv4Net;
use tracing::{debug, error, info, warn};

use crate::config::LinkPolicy;
use crate::enforcer::{BackendResult, FirewallBackend, Rule, INPUT_CHAIN};
use crate::error::{BackendError, FirewallError, InstallStep};
use crate::registry::AddressRange;

/// Progress is logged every this many appended ranges
const PROGRESS_INTERVAL: usize = 100;

/// Individually logged range append failures
const MAX_LOGGED_FAILURES: usize = 5;

/// Upper bound on duplicate link rules removed in one pass
const MAX_DUPLICATE_LINKS: usize = 64;

/// Rules appended to the whitelist chain by one install.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuleCount {
    pub mandatory: usize,
    pub ranges: usize,
    /// Country ranges the backend refused
    pub failed: usize,
}

impl RuleCount {
    /// Total rules present in the chain
    pub fn total(&self) -> usize {
        self.mandatory + self.ranges
    }
}

/// Observed state of the whitelist and its linkage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WhitelistStatus {
    pub chain_present: bool,
    pub rule_count: usize,
    pub jump_linked: bool,
    pub deny_linked: bool,
}

impl WhitelistStatus {
    /// Chain present and both link rules in place.
    pub fn is_active(&self) -> bool {
        self.chain_present && self.jump_linked && self.deny_linked
    }

    /// No trace of the whitelist at all.
    pub fn is_clean(&self) -> bool {
        !self.chain_present && !self.jump_linked && !self.deny_linked
    }
}

/// Owns the lifecycle of one whitelist chain and its INPUT linkage.
pub struct FirewallReconciler<'a, B: FirewallBackend + ?Sized> {
    backend: &'a B,
    chain: String,
    policy: LinkPolicy,
}

impl<'a, B: FirewallBackend + ?Sized> FirewallReconciler<'a, B> {
    pub fn new(backend: &'a B, chain: &str) -> Self {
        Self {
            backend,
            chain: chain.to_string(),
            policy: LinkPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: LinkPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Rebuild the whitelist chain and link it into INPUT.
    ///
    /// Mandatory ranges are appended first, in order, followed by `ranges` in
    /// feed order.
    pub fn install(
        &self,
        ranges: &[AddressRange],
        mandatory: &[Ipv4Net],
    ) -> Result<RuleCount, FirewallError> {
        self.ensure_available()?;

        self.reset_chain()?;
        let count = self.populate(ranges, mandatory)?;
        self.link()?;

        info!(
            "Firewall rules applied: {} rules in {}, unmatched inbound traffic is dropped",
            count.total(),
            self.chain
        );
        Ok(count)
    }

    /// Unlink and delete the whitelist chain. A no-op on a clean host.
    pub fn uninstall(&self) -> Result<(), FirewallError> {
        self.ensure_available()?;
        info!("Removing firewall rules...");

        // Reverse order of linking: deny first so traffic is never cut off
        self.remove_all(INPUT_CHAIN, &Rule::drop_all())?;
        self.remove_all(INPUT_CHAIN, &Rule::jump(&self.chain))?;

        if self.backend.chain_exists(&self.chain) {
            self.required(
                InstallStep::DeleteChain,
                self.backend.flush_chain(&self.chain),
            )?;
            self.required(
                InstallStep::DeleteChain,
                self.backend.delete_chain(&self.chain),
            )?;
            info!("Deleted chain '{}'", self.chain);
        } else {
            debug!("Chain '{}' not present", self.chain);
        }

        info!("Firewall rules removed");
        Ok(())
    }

    /// Inspect the current whitelist state.
    pub fn status(&self) -> Result<WhitelistStatus, FirewallError> {
        self.ensure_available()?;

        let chain_present = self.backend.chain_exists(&self.chain);
        let rule_count = if chain_present {
            self.backend
                .list_rules(&self.chain)
                .map_err(|e| FirewallError::at(InstallStep::Inspect, e))?
                .len()
        } else {
            0
        };

        let jump_linked = self
            .backend
            .rule_exists(INPUT_CHAIN, &Rule::jump(&self.chain))
            .map_err(|e| FirewallError::at(InstallStep::Inspect, e))?;
        let deny_linked = self
            .backend
            .rule_exists(INPUT_CHAIN, &Rule::drop_all())
            .map_err(|e| FirewallError::at(InstallStep::Inspect, e))?;

        Ok(WhitelistStatus {
            chain_present,
            rule_count,
            jump_linked,
            deny_linked,
        })
    }

    fn ensure_available(&self) -> Result<(), FirewallError> {
        if self.backend.is_available() {
            Ok(())
        } else {
            Err(FirewallError::BackendUnavailable(format!(
                "{} not found",
                self.backend.name()
            )))
        }
    }

    /// Step 1: drop any residual chain, then create it empty.
    ///
    /// A linked chain cannot be deleted, so the jump rules go first. Under
    /// [`LinkPolicy::FailClosed`] the default-deny rule stays in place while the
    /// chain is rebuilt.
    fn reset_chain(&self) -> Result<(), FirewallError> {
        info!("Setting up chain '{}'...", self.chain);

        if self.backend.chain_exists(&self.chain) {
            info!("Removing existing chain...");
            if self.policy == LinkPolicy::FailOpen {
                self.remove_all(INPUT_CHAIN, &Rule::drop_all())?;
            }
            self.remove_all(INPUT_CHAIN, &Rule::jump(&self.chain))?;
            self.best_effort(InstallStep::ResetChain, self.backend.flush_chain(&self.chain))?;
            self.best_effort(InstallStep::ResetChain, self.backend.delete_chain(&self.chain))?;
        }

        self.required(InstallStep::CreateChain, self.backend.create_chain(&self.chain))?;
        info!("Created chain '{}'", self.chain);
        Ok(())
    }

    /// Step 2: mandatory ranges first, then country ranges.
    fn populate(
        &self,
        ranges: &[AddressRange],
        mandatory: &[Ipv4Net],
    ) -> Result<RuleCount, FirewallError> {
        let mut count = RuleCount::default();

        info!("Adding {} mandatory local ranges...", mandatory.len());
        for net in mandatory {
            self.required(
                InstallStep::AppendMandatory,
                self.backend.append_rule(&self.chain, &Rule::accept_from(*net)),
            )?;
            count.mandatory += 1;
        }

        info!("Adding {} ranges to {}...", ranges.len(), self.chain);
        for (idx, range) in ranges.iter().enumerate() {
            match self
                .backend
                .append_rule(&self.chain, &Rule::accept_from(range.net()))
            {
                Ok(()) => count.ranges += 1,
                Err(BackendError::Unavailable(msg)) => {
                    return Err(FirewallError::BackendUnavailable(msg))
                }
                Err(e) => {
                    count.failed += 1;
                    if count.failed <= MAX_LOGGED_FAILURES {
                        warn!("Skipping range {} ({}): {}", range, InstallStep::AppendRange, e);
                    }
                }
            }

            if (idx + 1) % PROGRESS_INTERVAL == 0 {
                info!("Added {}/{} ranges...", idx + 1, ranges.len());
            }
        }

        if count.failed > 0 {
            warn!("{} ranges could not be added", count.failed);
        }
        info!(
            "Finished adding {} ranges to {}",
            count.ranges, self.chain
        );
        Ok(count)
    }

    /// Step 3: replace the INPUT linkage.
    fn link(&self) -> Result<(), FirewallError> {
        info!("Linking {} into {}...", self.chain, INPUT_CHAIN);

        self.remove_all(INPUT_CHAIN, &Rule::jump(&self.chain))?;

        match self.policy {
            LinkPolicy::FailOpen => {
                self.remove_all(INPUT_CHAIN, &Rule::drop_all())?;
                self.link_jump()?;
                self.link_deny()?;
            }
            LinkPolicy::FailClosed => {
                self.replace_deny()?;
                self.link_jump()?;
            }
        }
        Ok(())
    }

    /// Append a fresh default-deny rule, then remove the older copies.
    ///
    /// INPUT is never without a DROP rule once one exists. `delete_rule` removes
    /// the first match, so the older copies go and the new tail rule stays.
    fn replace_deny(&self) -> Result<(), FirewallError> {
        let deny = Rule::drop_all();
        let listed = format!("-A {} {}", INPUT_CHAIN, deny);
        let existing = self
            .backend
            .list_rules(INPUT_CHAIN)
            .map_err(|e| FirewallError::at(InstallStep::LinkDeny, e))?
            .iter()
            .filter(|line| **line == listed)
            .count();

        self.link_deny()?;

        for _ in 0..existing {
            self.best_effort(
                InstallStep::LinkDeny,
                self.backend.delete_rule(INPUT_CHAIN, &deny),
            )?;
        }
        if existing > 0 {
            debug!("Replaced {} '{}' rule(s) in {}", existing, deny, INPUT_CHAIN);
        }
        Ok(())
    }

    fn link_jump(&self) -> Result<(), FirewallError> {
        self.required(
            InstallStep::LinkJump,
            self.backend
                .insert_rule(INPUT_CHAIN, 1, &Rule::jump(&self.chain)),
        )
    }

    fn link_deny(&self) -> Result<(), FirewallError> {
        self.required(
            InstallStep::LinkDeny,
            self.backend.append_rule(INPUT_CHAIN, &Rule::drop_all()),
        )
    }

    /// Delete every copy of `rule` from `chain`.
    ///
    /// Stops at the first failed delete, which is the normal outcome once no
    /// copy remains.
    fn remove_all(&self, chain: &str, rule: &Rule) -> Result<usize, FirewallError> {
        let mut removed = 0;
        while removed < MAX_DUPLICATE_LINKS {
            match self.backend.delete_rule(chain, rule) {
                Ok(()) => removed += 1,
                Err(BackendError::Unavailable(msg)) => {
                    return Err(FirewallError::BackendUnavailable(msg))
                }
                Err(e) => {
                    debug!("No more '{}' rules in {}: {}", rule, chain, e);
                    break;
                }
            }
        }
        if removed > 0 {
            debug!("Removed {} '{}' rule(s) from {}", removed, rule, chain);
        }
        Ok(removed)
    }

    /// Cleanup command: log and continue on failure, unless the backend is gone.
    fn best_effort(&self, step: InstallStep, result: BackendResult) -> Result<(), FirewallError> {
        match result {
            Ok(()) => Ok(()),
            Err(BackendError::Unavailable(msg)) => Err(FirewallError::BackendUnavailable(msg)),
            Err(e) => {
                warn!("Ignoring failure during '{}': {}", step, e);
                Ok(())
            }
        }
    }

    /// Structural command: the first failure aborts the operation.
    fn required(&self, step: InstallStep, result: BackendResult) -> Result<(), FirewallError> {
        result.map_err(|e| {
            let err = FirewallError::at(step, e);
            error!("{}", err);
            err
        })
    }
}
