//! Configuration: `~/.regdesk/config.json`, with environment overrides for
//! the two endpoint URLs so the CLI can run without a config file.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::types::KpiSourcePref;

/// Environment override for the registration endpoint.
pub const ENV_ROWS_URL: &str = "REGDESK_ROWS_URL";
/// Environment override for the KPI endpoint.
pub const ENV_STATS_URL: &str = "REGDESK_STATS_URL";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Registration row feed (GET rows, POST updates).
    #[serde(alias = "registrationEndpoint")]
    pub rows_url: String,
    /// Aggregate KPI feed.
    #[serde(alias = "kpiEndpoint")]
    pub stats_url: String,
    /// Audit log sink; `None` disables audit writes.
    pub audit_url: Option<String>,
    /// E-mails allowed to edit. Empty list leaves editing open (gating not
    /// configured).
    pub admin_emails: Vec<String>,
    pub kpi_source: KpiSourcePref,
    pub live_sync: bool,
    pub poll_interval_secs: u64,
    pub page_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            rows_url: String::new(),
            stats_url: String::new(),
            audit_url: None,
            admin_emails: Vec::new(),
            kpi_source: KpiSourcePref::default(),
            live_sync: false,
            poll_interval_secs: 25,
            page_size: 50,
        }
    }
}

/// Canonical config file path (`~/.regdesk/config.json`).
pub fn config_path() -> Result<PathBuf, String> {
    let home = dirs::home_dir().ok_or("Could not find home directory")?;
    Ok(home.join(".regdesk").join("config.json"))
}

/// Apply `REGDESK_ROWS_URL` / `REGDESK_STATS_URL` on top of a parsed config.
fn apply_env_overrides(config: &mut Config) {
    if let Ok(url) = std::env::var(ENV_ROWS_URL) {
        if !url.is_empty() {
            config.rows_url = url;
        }
    }
    if let Ok(url) = std::env::var(ENV_STATS_URL) {
        if !url.is_empty() {
            config.stats_url = url;
        }
    }
}

/// Load configuration, falling back to defaults when no file exists (the
/// env overrides may still supply working endpoints). Errors only on an
/// unreadable or unparseable file.
pub fn load_config() -> Result<Config, String> {
    let path = config_path()?;
    let mut config = if path.exists() {
        let content =
            fs::read_to_string(&path).map_err(|e| format!("Failed to read config: {}", e))?;
        serde_json::from_str(&content).map_err(|e| format!("Failed to parse config: {}", e))?
    } else {
        Config::default()
    };
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Write the config back, creating `~/.regdesk/` if needed.
pub fn save_config(config: &Config) -> Result<(), String> {
    let path = config_path()?;
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| format!("Failed to create config dir: {}", e))?;
        }
    }
    let content = serde_json::to_string_pretty(config)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;
    fs::write(&path, content).map_err(|e| format!("Failed to write config: {}", e))?;
    Ok(())
}
