//! Remove command implementation.

use anyhow::Result;
use tracing::{info, warn};

use crate::config::Config;
use crate::enforcer::{check_backend, check_root};
use crate::lock::LockGuard;
use crate::reconciler::FirewallReconciler;
use crate::state::InstallState;

use super::iptables_backend;

/// Run the remove command
pub async fn run(config: &Config) -> Result<()> {
    check_root()?;
    let backend = iptables_backend(config);
    check_backend(&backend)?;

    let _lock = LockGuard::acquire()?;

    info!("Removing whitelist '{}'...", config.chain_name);
    FirewallReconciler::new(&backend, &config.chain_name).uninstall()?;

    if let Err(e) = InstallState::clear() {
        warn!("Failed to clear install state: {:#}", e);
    }

    println!("Whitelist removed; inbound traffic is no longer filtered by geowall.");
    Ok(())
}
