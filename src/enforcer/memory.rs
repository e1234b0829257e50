//! In-memory filter table.
//!
//! Mirrors the iptables behaviours the reconciler depends on: built-in chains
//! cannot be created or deleted, a chain must be empty and unreferenced before
//! it can be deleted, deleting an absent rule fails, and sources are stored
//! truncated to their network address. Every mutating command is recorded in
//! iptables syntax, which is what `install --dry-run` prints.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use super::{BackendResult, FirewallBackend, Rule, RuleAction};
use crate::error::BackendError;

const BUILTIN_CHAINS: &[&str] = &["INPUT", "FORWARD", "OUTPUT"];

const NO_CHAIN: &str = "iptables: No chain/target/match by that name.";
const BAD_RULE: &str = "iptables: Bad rule (does a matching rule exist in that chain?).";

#[derive(Debug, Default)]
struct TableState {
    chains: BTreeMap<String, Vec<Rule>>,
    commands: Vec<String>,
    /// Commands containing any of these fragments fail
    failures: Vec<String>,
    unavailable: bool,
}

/// Simulated `filter` table.
#[derive(Debug)]
pub struct MemoryBackend {
    state: Mutex<TableState>,
}

impl MemoryBackend {
    /// A fresh host: empty built-in chains, nothing else.
    pub fn new() -> Self {
        let chains = BUILTIN_CHAINS
            .iter()
            .map(|c| (c.to_string(), Vec::new()))
            .collect();
        Self {
            state: Mutex::new(TableState {
                chains,
                ..Default::default()
            }),
        }
    }

    /// A host where the backend tool is missing.
    pub fn unavailable() -> Self {
        let backend = Self::new();
        backend.lock().unavailable = true;
        backend
    }

    /// Make every later command whose text contains `fragment` fail.
    pub fn fail_on(&self, fragment: &str) {
        self.lock().failures.push(fragment.to_string());
    }

    /// Stop injecting failures.
    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    /// Rules of `chain` in evaluation order, or `None` if it does not exist.
    pub fn rules(&self, chain: &str) -> Option<Vec<Rule>> {
        self.lock().chains.get(chain).cloned()
    }

    /// Names of all chains, built-in ones included.
    pub fn chain_names(&self) -> Vec<String> {
        self.lock().chains.keys().cloned().collect()
    }

    /// Mutating commands received so far, in iptables syntax.
    pub fn commands(&self) -> Vec<String> {
        self.lock().commands.clone()
    }

    fn lock(&self) -> MutexGuard<'_, TableState> {
        // A poisoned lock only means a test panicked mid-command
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record `command`, then apply `op` unless a failure is injected for it.
    fn apply<F>(&self, args: Vec<String>, op: F) -> BackendResult
    where
        F: FnOnce(&mut TableState) -> Result<(), &'static str>,
    {
        let command = format!("iptables {}", args.join(" "));
        let mut state = self.lock();
        if state.unavailable {
            return Err(BackendError::Unavailable(
                "iptables: No such file or directory".to_string(),
            ));
        }
        state.commands.push(command.clone());

        if state.failures.iter().any(|f| command.contains(f.as_str())) {
            return Err(BackendError::Command {
                command,
                diagnostic: "injected failure".to_string(),
            });
        }

        op(&mut *state).map_err(|diagnostic| BackendError::Command {
            command,
            diagnostic: diagnostic.to_string(),
        })
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl TableState {
    fn is_referenced(&self, chain: &str) -> bool {
        self.chains
            .values()
            .flatten()
            .any(|r| matches!(&r.action, RuleAction::Jump(target) if target == chain))
    }

    fn check_target(&self, rule: &Rule) -> Result<(), &'static str> {
        match &rule.action {
            RuleAction::Jump(target) if !self.chains.contains_key(target) => {
                Err("iptables: Couldn't load target.")
            }
            _ => Ok(()),
        }
    }
}

impl FirewallBackend for MemoryBackend {
    fn name(&self) -> &str {
        "iptables"
    }

    fn is_available(&self) -> bool {
        !self.lock().unavailable
    }

    fn chain_exists(&self, chain: &str) -> bool {
        let state = self.lock();
        !state.unavailable && state.chains.contains_key(chain)
    }

    fn create_chain(&self, chain: &str) -> BackendResult {
        let name = chain.to_string();
        self.apply(vec!["-N".to_string(), name.clone()], move |state| {
            if state.chains.contains_key(&name) {
                return Err("iptables: Chain already exists.");
            }
            state.chains.insert(name, Vec::new());
            Ok(())
        })
    }

    fn flush_chain(&self, chain: &str) -> BackendResult {
        self.apply(vec!["-F".to_string(), chain.to_string()], |state| {
            state.chains.get_mut(chain).ok_or(NO_CHAIN)?.clear();
            Ok(())
        })
    }

    fn delete_chain(&self, chain: &str) -> BackendResult {
        self.apply(vec!["-X".to_string(), chain.to_string()], |state| {
            if BUILTIN_CHAINS.contains(&chain) {
                return Err("iptables: Invalid argument. Run `dmesg' for more information.");
            }
            let rules = state.chains.get(chain).ok_or(NO_CHAIN)?;
            if !rules.is_empty() {
                return Err("iptables: Directory not empty.");
            }
            if state.is_referenced(chain) {
                return Err("iptables: Too many links.");
            }
            state.chains.remove(chain);
            Ok(())
        })
    }

    fn append_rule(&self, chain: &str, rule: &Rule) -> BackendResult {
        let mut args = vec!["-A".to_string(), chain.to_string()];
        args.extend(rule.to_args());
        self.apply(args, |state| {
            state.check_target(rule)?;
            state
                .chains
                .get_mut(chain)
                .ok_or(NO_CHAIN)?
                .push(rule.normalized());
            Ok(())
        })
    }

    fn insert_rule(&self, chain: &str, position: u32, rule: &Rule) -> BackendResult {
        let mut args = vec!["-I".to_string(), chain.to_string(), position.to_string()];
        args.extend(rule.to_args());
        self.apply(args, |state| {
            state.check_target(rule)?;
            let rules = state.chains.get_mut(chain).ok_or(NO_CHAIN)?;
            let index = position as usize;
            if index == 0 || index > rules.len() + 1 {
                return Err("iptables: Index of insertion too big.");
            }
            rules.insert(index - 1, rule.normalized());
            Ok(())
        })
    }

    fn delete_rule(&self, chain: &str, rule: &Rule) -> BackendResult {
        let mut args = vec!["-D".to_string(), chain.to_string()];
        args.extend(rule.to_args());
        let wanted = rule.normalized();
        self.apply(args, |state| {
            let rules = state.chains.get_mut(chain).ok_or(NO_CHAIN)?;
            let index = rules.iter().position(|r| *r == wanted).ok_or(BAD_RULE)?;
            rules.remove(index);
            Ok(())
        })
    }

    fn rule_exists(&self, chain: &str, rule: &Rule) -> Result<bool, BackendError> {
        let state = self.lock();
        if state.unavailable {
            return Err(BackendError::Unavailable(
                "iptables: No such file or directory".to_string(),
            ));
        }
        let wanted = rule.normalized();
        Ok(state
            .chains
            .get(chain)
            .is_some_and(|rules| rules.contains(&wanted)))
    }

    fn list_rules(&self, chain: &str) -> Result<Vec<String>, BackendError> {
        let state = self.lock();
        if state.unavailable {
            return Err(BackendError::Unavailable(
                "iptables: No such file or directory".to_string(),
            ));
        }
        // Queries are not recorded but honour injected failures
        let command = format!("iptables -S {}", chain);
        if state.failures.iter().any(|f| command.contains(f.as_str())) {
            return Err(BackendError::Command {
                command,
                diagnostic: "injected failure".to_string(),
            });
        }
        let rules = state.chains.get(chain).ok_or_else(|| BackendError::Command {
            command,
            diagnostic: NO_CHAIN.to_string(),
        })?;
        Ok(rules.iter().map(|r| format!("-A {} {}", chain, r)).collect())
    }
}
