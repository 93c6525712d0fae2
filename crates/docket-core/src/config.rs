use crate::model::Millis;
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Engine timing tunables.
///
/// All values are milliseconds so they line up with the virtual-time entry
/// points on the engine. The defaults mirror the production dashboard: a 5 s
/// undo grace window, a 5 s fixed reconnect delay (deliberately not
/// exponential), and a 15 s poll interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Grace period before a staged destructive action commits.
    pub undo_grace_millis: Millis,
    /// Fixed delay before a single reconnect attempt after a channel error.
    pub reconnect_delay_millis: Millis,
    /// Recurring full-snapshot poll interval.
    pub poll_interval_millis: Millis,
}

/// Valid poll interval range observed across the monitor views.
pub const POLL_INTERVAL_RANGE_MILLIS: (Millis, Millis) = (10_000, 30_000);

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            undo_grace_millis: 5_000,
            reconnect_delay_millis: 5_000,
            poll_interval_millis: 15_000,
        }
    }
}

impl EngineConfig {
    /// Validate tunables before constructing an engine.
    ///
    /// # Errors
    ///
    /// Returns an error if any timer is non-positive or the poll interval
    /// falls outside [`POLL_INTERVAL_RANGE_MILLIS`].
    pub fn validate(&self) -> Result<()> {
        if self.undo_grace_millis <= 0 {
            bail!("undo_grace_millis must be positive");
        }
        if self.reconnect_delay_millis <= 0 {
            bail!("reconnect_delay_millis must be positive");
        }
        let (lo, hi) = POLL_INTERVAL_RANGE_MILLIS;
        if self.poll_interval_millis < lo || self.poll_interval_millis > hi {
            bail!(
                "poll_interval_millis must be within {lo}..={hi}, got {}",
                self.poll_interval_millis
            );
        }
        Ok(())
    }
}

/// User-level configuration loaded from `<config dir>/docket/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct UserConfig {
    /// Backend base URL, e.g. `https://dashboard.internal`.
    pub base_url: Option<String>,
    /// Operator identity recorded on mutations.
    pub operator: Option<String>,
    /// Preferred output mode for one-shot commands (`human` or `json`).
    pub output: Option<String>,
    /// Engine timing overrides.
    pub engine: EngineConfig,
}

/// Load the user config file, falling back to defaults when absent.
///
/// # Errors
///
/// Returns an error when the file exists but cannot be read or parsed.
pub fn load_user_config() -> Result<UserConfig> {
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(UserConfig::default());
    };
    load_user_config_from(&config_dir.join("docket/config.toml"))
}

/// Load a user config from an explicit path (test seam).
///
/// # Errors
///
/// Returns an error when the file exists but cannot be read or parsed.
pub fn load_user_config_from(path: &Path) -> Result<UserConfig> {
    if !path.exists() {
        return Ok(UserConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<UserConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Resolve the backend base URL from CLI flag, environment, then config.
#[must_use]
pub fn resolve_base_url(
    cli_url: Option<&str>,
    env_url: Option<&str>,
    config: &UserConfig,
) -> Option<String> {
    cli_url
        .map(str::to_string)
        .or_else(|| env_url.map(str::to_string))
        .or_else(|| config.base_url.clone())
        .map(|url| url.trim_end_matches('/').to_string())
}
