//! Configuration management for bugreaper
//!
//! Stores settings in ~/.config/bugreaper/config.json. Environment
//! variables always win over the file, so CI can run without one.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

const DEFAULT_ORACLE_ENDPOINT: &str = "https://openrouter.ai/api/v1/chat/completions";
const DEFAULT_ORACLE_MODEL: &str = "google/gemini-2.0-flash-001";
const DEFAULT_REVIEW_API: &str = "http://localhost:8080";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// API key for the fix oracle. `ORACLE_API_KEY` overrides.
    pub oracle_api_key: Option<String>,
    /// Chat-completions endpoint. `ORACLE_ENDPOINT` overrides.
    pub oracle_endpoint: Option<String>,
    /// Model name sent with oracle requests.
    pub oracle_model: Option<String>,
    /// Base URL of the review (pull request) API. `REVIEW_API_URL` overrides.
    pub review_api_url: Option<String>,
    /// Default repository slug for pull requests, e.g. "org/project".
    pub repository: Option<String>,
}

impl Config {
    fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("bugreaper"))
    }

    fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("config.json"))
    }

    /// Load config from disk, or return defaults. A corrupt file is set
    /// aside rather than silently overwritten.
    pub fn load() -> Self {
        if let Some(path) = Self::config_path() {
            if let Ok(content) = fs::read_to_string(&path) {
                match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(err) => {
                        preserve_corrupt_config(&path, &content);
                        eprintln!(
                            "  Warning: Config file was corrupted ({}). A backup was saved and defaults were loaded.",
                            err
                        );
                    }
                }
            }
        }
        Self::default()
    }

    /// Save config to disk.
    pub fn save(&self) -> Result<(), String> {
        let dir = Self::config_dir()
            .ok_or_else(|| "Could not determine config directory".to_string())?;
        fs::create_dir_all(&dir)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) = fs::set_permissions(&dir, fs::Permissions::from_mode(0o700)) {
                eprintln!("  Warning: Failed to set config directory permissions: {}", e);
            }
        }

        let path = dir.join("config.json");
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;
        fs::write(&path, content).map_err(|e| format!("Failed to write config: {}", e))
    }

    /// Oracle API key, environment first.
    pub fn api_key(&self) -> Option<String> {
        if let Ok(key) = std::env::var("ORACLE_API_KEY") {
            return Some(key);
        }
        self.oracle_api_key.clone()
    }

    pub fn oracle_endpoint(&self) -> String {
        std::env::var("ORACLE_ENDPOINT")
            .ok()
            .or_else(|| self.oracle_endpoint.clone())
            .unwrap_or_else(|| DEFAULT_ORACLE_ENDPOINT.to_string())
    }

    pub fn oracle_model(&self) -> String {
        self.oracle_model
            .clone()
            .unwrap_or_else(|| DEFAULT_ORACLE_MODEL.to_string())
    }

    pub fn review_api_url(&self) -> String {
        std::env::var("REVIEW_API_URL")
            .ok()
            .or_else(|| self.review_api_url.clone())
            .unwrap_or_else(|| DEFAULT_REVIEW_API.to_string())
    }

    pub fn repository(&self) -> String {
        self.repository
            .clone()
            .unwrap_or_else(|| "demo/buggy-apps".to_string())
    }

    /// Config file location for display.
    pub fn config_location() -> String {
        Self::config_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "~/.config/bugreaper/config.json".to_string())
    }
}

fn preserve_corrupt_config(path: &std::path::Path, content: &str) {
    let corrupt_path = path.with_extension("json.corrupt");
    if fs::rename(path, &corrupt_path).is_err() {
        let _ = fs::write(&corrupt_path, content);
    }
}
