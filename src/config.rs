//! Configuration management for codelens
//!
//! Stores settings in ~/.config/codelens/config.json. Secrets live in the
//! system keychain with environment variable fallbacks.

use keyring::Entry;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use crate::execute::PollPolicy;

const KEYRING_SERVICE: &str = "codelens";
const KEYRING_API_KEY: &str = "llm_api_key";
const KEYRING_JUDGE_KEY: &str = "judge_api_key";

const API_KEY_VARS: &[&str] = &["GROQ_API_KEY", "OPENAI_API_KEY"];
const JUDGE_KEY_VAR: &str = "JUDGE0_API_KEY";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// OpenAI-compatible chat completions endpoint
    pub api_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub request_timeout_secs: u64,
    /// Upper bound on in-flight review requests (0 = no limit)
    pub max_concurrent_requests: usize,
    /// Base URL of the Judge0-compatible execution service
    pub judge_url: String,
    /// Sent as `X-RapidAPI-Host` when a judge key is configured
    pub judge_rapidapi_host: Option<String>,
    pub poll_initial_delay_ms: u64,
    pub poll_interval_ms: u64,
    pub poll_backoff_factor: f64,
    pub poll_max_interval_ms: u64,
    /// `None` polls until the judge reports a terminal status
    pub poll_max_attempts: Option<u32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: "https://api.groq.com/openai/v1/chat/completions".to_string(),
            model: "deepseek-r1-distill-llama-70b".to_string(),
            temperature: 0.7,
            max_tokens: 2048,
            request_timeout_secs: 120,
            max_concurrent_requests: 4,
            judge_url: "https://judge0-ce.p.rapidapi.com".to_string(),
            judge_rapidapi_host: Some("judge0-ce.p.rapidapi.com".to_string()),
            poll_initial_delay_ms: 1000,
            poll_interval_ms: 1000,
            poll_backoff_factor: 1.5,
            poll_max_interval_ms: 8000,
            poll_max_attempts: Some(60),
        }
    }
}

fn keyring_entry(user: &str) -> Result<Entry, keyring::Error> {
    Entry::new(KEYRING_SERVICE, user)
}

fn read_keyring(user: &str) -> Result<Option<String>, keyring::Error> {
    let entry = keyring_entry(user)?;
    match entry.get_password() {
        Ok(key) => Ok(Some(key)),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(err) => Err(err),
    }
}

fn write_keyring(user: &str, secret: &str) -> Result<(), keyring::Error> {
    keyring_entry(user)?.set_password(secret)
}

fn secret_from(user: &str, env_vars: &[&str]) -> Option<String> {
    match read_keyring(user) {
        Ok(Some(key)) => return Some(key),
        Ok(None) => {}
        Err(err) => {
            tracing::warn!("Failed to read {} from system keychain: {}", user, err);
        }
    }
    env_vars
        .iter()
        .find_map(|var| std::env::var(var).ok())
        .filter(|key| !key.trim().is_empty())
}

impl Config {
    /// Get the config directory path
    fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("codelens"))
    }

    /// Get the config file path
    fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("config.json"))
    }

    /// Load config from disk, or return default
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load from an explicit path. A corrupt file is preserved beside the
    /// original and defaults are returned.
    pub fn load_from(path: &std::path::Path) -> Self {
        let Ok(content) = fs::read_to_string(path) else {
            return Self::default();
        };
        match serde_json::from_str::<Config>(&content) {
            Ok(mut config) => {
                config.sanitize();
                config
            }
            Err(err) => {
                preserve_corrupt_config(path, &content);
                tracing::warn!(
                    "Config file was corrupted ({}). A backup was saved and defaults were loaded.",
                    err
                );
                Self::default()
            }
        }
    }

    fn sanitize(&mut self) {
        self.temperature = self.temperature.clamp(0.0, 2.0);
        if self.max_tokens == 0 {
            self.max_tokens = Self::default().max_tokens;
        }
        if !self.poll_backoff_factor.is_finite() || self.poll_backoff_factor < 1.0 {
            self.poll_backoff_factor = 1.0;
        }
    }

    /// Save config to disk
    pub fn save(&self) -> Result<(), String> {
        let dir =
            Self::config_dir().ok_or_else(|| "Could not determine config directory".to_string())?;

        fs::create_dir_all(&dir)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) = fs::set_permissions(&dir, fs::Permissions::from_mode(0o700)) {
                tracing::warn!("Failed to set config directory permissions: {}", e);
            }
        }

        self.save_to(&dir.join("config.json"))
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<(), String> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;

        #[cfg(unix)]
        {
            write_config_atomic(path, &content)
                .map_err(|e| format!("Failed to write config: {}", e))?;
        }

        #[cfg(not(unix))]
        {
            fs::write(path, content).map_err(|e| format!("Failed to write config: {}", e))?;
        }

        Ok(())
    }

    /// Get the model API key (keychain first, environment fallback)
    pub fn api_key(&self) -> Option<String> {
        secret_from(KEYRING_API_KEY, API_KEY_VARS)
    }

    /// Get the judge API key (keychain first, environment fallback)
    pub fn judge_api_key(&self) -> Option<String> {
        secret_from(KEYRING_JUDGE_KEY, &[JUDGE_KEY_VAR])
    }

    /// Store the model API key in the system keychain and verify it reads back
    pub fn set_api_key(&self, key: &str) -> Result<(), String> {
        store_secret(KEYRING_API_KEY, key, API_KEY_VARS[0])
    }

    pub fn set_judge_api_key(&self, key: &str) -> Result<(), String> {
        store_secret(KEYRING_JUDGE_KEY, key, JUDGE_KEY_VAR)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            initial_delay: Duration::from_millis(self.poll_initial_delay_ms),
            interval: Duration::from_millis(self.poll_interval_ms),
            backoff_factor: self.poll_backoff_factor,
            max_interval: Duration::from_millis(self.poll_max_interval_ms),
            max_attempts: self.poll_max_attempts,
        }
    }

    /// Get the config file location for display
    pub fn config_location() -> String {
        Self::config_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "~/.config/codelens/config.json".to_string())
    }
}

fn store_secret(user: &str, secret: &str, env_hint: &str) -> Result<(), String> {
    write_keyring(user, secret).map_err(|e| {
        format!(
            "Failed to store key in system keychain: {}. \
             You can set the {} environment variable instead.",
            e, env_hint
        )
    })?;

    match read_keyring(user) {
        Ok(Some(stored)) if stored == secret => Ok(()),
        Ok(_) => Err(format!(
            "Key verification failed: key was not persisted to keychain. \
             You can set the {} environment variable instead.",
            env_hint
        )),
        Err(e) => Err(format!(
            "Key verification failed: couldn't read back from keychain ({}). \
             You can set the {} environment variable instead.",
            e, env_hint
        )),
    }
}

fn preserve_corrupt_config(path: &std::path::Path, content: &str) {
    let corrupt_path = path.with_extension("json.corrupt");
    if fs::rename(path, &corrupt_path).is_err() {
        let _ = fs::write(&corrupt_path, content);
    }
}

#[cfg(unix)]
fn write_config_atomic(path: &std::path::Path, content: &str) -> Result<(), String> {
    use std::fs::OpenOptions;
    use std::os::unix::fs::PermissionsExt;

    let tmp_path = path.with_extension("tmp");
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&tmp_path)
        .map_err(|e| e.to_string())?;

    if let Err(e) = file.set_permissions(fs::Permissions::from_mode(0o600)) {
        tracing::warn!("Failed to set temp config file permissions: {}", e);
    }

    file.write_all(content.as_bytes())
        .map_err(|e| e.to_string())?;

    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err.to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.temperature, 0.7);
        assert_eq!(config.max_tokens, 2048);
        assert_eq!(config.max_concurrent_requests, 4);
        assert_eq!(config.poll_max_attempts, Some(60));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"model": "llama-3.3-70b", "max_concurrent_requests": 0}"#).unwrap();

        let config = Config::load_from(&path);
        assert_eq!(config.model, "llama-3.3-70b");
        assert_eq!(config.max_concurrent_requests, 0);
        assert_eq!(config.max_tokens, 2048);
    }

    #[test]
    fn test_corrupt_file_is_preserved() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{not json").unwrap();

        let config = Config::load_from(&path);
        assert_eq!(config, Config::default());
        assert!(dir.path().join("config.json.corrupt").exists());
    }

    #[test]
    fn test_save_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        let config = Config {
            poll_max_attempts: None,
            ..Config::default()
        };
        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path), config);
    }

    #[test]
    fn test_sanitize_rejects_shrinking_backoff() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"poll_backoff_factor": 0.5, "temperature": 9.0}"#).unwrap();

        let config = Config::load_from(&path);
        assert_eq!(config.poll_backoff_factor, 1.0);
        assert_eq!(config.temperature, 2.0);
    }
}
