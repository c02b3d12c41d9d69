//! Bridge credentials and state-dir handling.
//!
//! Credentials live in `bridge.json` inside the state directory and are the
//! only thing this process persists. Environment variables override the file
//! so containerized deployments can skip setup entirely.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const CREDENTIALS_FILE: &str = "bridge.json";

pub const ENV_BRIDGE_IP: &str = "GLOWHOUSE_BRIDGE_IP";
pub const ENV_USERNAME: &str = "GLOWHOUSE_USERNAME";

/// Where the bridge lives and who we are to it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeSettings {
    pub ip: Option<String>,
    pub username: Option<String>,
}

impl BridgeSettings {
    /// Load from the state dir, then let the environment win. A missing file
    /// is an unconfigured gateway, not an error.
    pub fn load(state_dir: &Path) -> Result<Self> {
        let path = state_dir.join(CREDENTIALS_FILE);
        let mut settings = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        } else {
            Self::default()
        };

        if let Ok(ip) = std::env::var(ENV_BRIDGE_IP) {
            settings.ip = Some(ip);
        }
        if let Ok(username) = std::env::var(ENV_USERNAME) {
            settings.username = Some(username);
        }

        Ok(settings)
    }

    pub fn save(&self, state_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(state_dir)
            .with_context(|| format!("Failed to create {}", state_dir.display()))?;
        let path = state_dir.join(CREDENTIALS_FILE);
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, text)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    /// Both halves present: the serving paths may talk to the bridge.
    pub fn is_complete(&self) -> bool {
        self.ip.is_some() && self.username.is_some()
    }
}

/// Default state directory, `~/.local/share/glowhouse`.
pub fn default_state_dir() -> PathBuf {
    if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home).join(".local/share/glowhouse")
    } else {
        PathBuf::from("/var/lib/glowhouse")
    }
}
