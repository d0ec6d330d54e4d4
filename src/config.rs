//! Configuration management

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::Result;

/// Directory name under the platform config dir
pub const APP_DIR: &str = "iptv_web_player";

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/138.0.0.0 Safari/537.36";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Player command or path, empty means ffplay
    #[serde(default)]
    pub external_player: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_true")]
    pub pass_user_agent_to_player: bool,
    #[serde(default = "default_true")]
    pub dark_mode: bool,
    #[serde(default = "default_true")]
    pub single_window_mode: bool,
    /// Play the last watched channel once the playlist is loaded
    #[serde(default = "default_true")]
    pub resume_last_channel: bool,
    /// Look up the viewer's country and preselect it in the country filter
    #[serde(default = "default_true")]
    pub geo_lookup: bool,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_user_agent() -> String { DEFAULT_USER_AGENT.to_string() }
fn default_true() -> bool { true }
fn default_request_timeout() -> u64 { 120 }
fn default_connect_timeout() -> u64 { 30 }

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            external_player: String::new(),
            user_agent: default_user_agent(),
            pass_user_agent_to_player: true,
            dark_mode: true,
            single_window_mode: true,
            resume_last_channel: true,
            geo_lookup: true,
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

/// `<config_dir>/iptv_web_player/<file_name>`, creating the directory if needed
pub fn app_file_path(file_name: &str) -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push(APP_DIR);
    fs::create_dir_all(&path).ok();
    path.push(file_name);
    path
}

impl AppConfig {
    fn config_path() -> PathBuf {
        app_file_path("config.json")
    }

    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &std::path::Path) -> Self {
        if path.exists() {
            match fs::read_to_string(path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => tracing::warn!("Ignoring invalid config {}: {}", path.display(), e),
                },
                Err(e) => tracing::warn!("Failed to read config {}: {}", path.display(), e),
            }
        }

        Self::default()
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Player command with the ffplay fallback applied
    pub fn player_command(&self) -> &str {
        let player = self.external_player.trim();
        if player.is_empty() { "ffplay" } else { player }
    }

    /// HTTP agent carrying the configured timeouts
    pub fn http_agent(&self) -> ureq::Agent {
        ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(self.request_timeout_secs)))
            .timeout_connect(Some(Duration::from_secs(self.connect_timeout_secs)))
            .build()
            .new_agent()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_use_defaults() {
        let config: AppConfig = serde_json::from_str(r#"{"external_player": "mpv"}"#).unwrap();
        assert_eq!(config.external_player, "mpv");
        assert!(config.dark_mode);
        assert!(config.geo_lookup);
        assert_eq!(config.request_timeout_secs, 120);
        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
    }

    #[test]
    fn test_player_command_fallback() {
        let mut config = AppConfig::default();
        assert_eq!(config.player_command(), "ffplay");
        config.external_player = "  vlc ".to_string();
        assert_eq!(config.player_command(), "vlc");
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let path = std::env::temp_dir().join(format!("iptv_web_player_config_{}.json", std::process::id()));
        let mut config = AppConfig::default();
        config.external_player = "mpv".to_string();
        config.dark_mode = false;
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path);
        let _ = fs::remove_file(&path);
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_invalid_file_falls_back_to_default() {
        let path = std::env::temp_dir().join(format!("iptv_web_player_bad_config_{}.json", std::process::id()));
        fs::write(&path, "not json").unwrap();
        let loaded = AppConfig::load_from(&path);
        let _ = fs::remove_file(&path);
        assert_eq!(loaded, AppConfig::default());
    }
}
