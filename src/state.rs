//! Record of the last successful install.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;

pub const STATE_FILE: &str = "/var/lib/geowall/state.json";

/// Persistent state for geowall
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstallState {
    pub installed_at: DateTime<Utc>,
    pub country: String,
    pub chain: String,
    /// Country ranges found in the feed
    pub range_count: usize,
    /// Rules appended to the chain, mandatory ranges included
    pub rule_count: usize,
    /// Total IPv4 addresses covered by the country ranges
    #[serde(default)]
    pub address_count: u64,
}

impl InstallState {
    /// Load state from the default location; `None` if nothing is installed.
    pub fn load() -> Result<Option<Self>> {
        Self::load_from(STATE_FILE)
    }

    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Option<Self>> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file: {:?}", path))?;
        let state = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse state file: {:?}", path))?;
        Ok(Some(state))
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(STATE_FILE)
    }

    /// Save state atomically (tempfile + rename)
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let parent_dir = path.parent().unwrap_or(Path::new("."));
        fs::create_dir_all(parent_dir)
            .with_context(|| format!("Failed to create {:?}", parent_dir))?;

        let content = serde_json::to_string_pretty(self)?;
        let mut temp_file = tempfile::NamedTempFile::new_in(parent_dir)
            .context("Failed to create temporary file for state")?;
        temp_file.write_all(content.as_bytes())?;
        temp_file.as_file().sync_all()?;
        temp_file
            .persist(path)
            .with_context(|| format!("Failed to persist state file: {:?}", path))?;
        Ok(())
    }

    pub fn clear() -> Result<()> {
        Self::clear_at(STATE_FILE)
    }

    /// Remove the state file. Missing is fine.
    pub fn clear_at<P: AsRef<Path>>(path: P) -> Result<()> {
        match fs::remove_file(path.as_ref()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                Err(e).with_context(|| format!("Failed to remove state file: {:?}", path.as_ref()))
            }
        }
    }
}

/// Format duration since a timestamp
pub fn format_duration_ago(dt: DateTime<Utc>) -> String {
    let seconds = Utc::now().signed_duration_since(dt).num_seconds();
    if seconds < 60 {
        "just now".to_string()
    } else if seconds < 3600 {
        format!("{}m ago", seconds / 60)
    } else if seconds < 86400 {
        format!("{}h ago", seconds / 3600)
    } else {
        format!("{}d ago", seconds / 86400)
    }
}
