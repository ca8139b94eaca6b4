//! Application settings
//!
//! Stored as JSON in the user's data directory. Environment variables override
//! the file, and the binaries apply command-line flags last. One `Settings`
//! value is built at startup and passed to whatever needs it.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_MODEL: &str = "claude-haiku-4-5-20251001";
pub const DEFAULT_API_URL: &str = "https://api.anthropic.com/v1/messages";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub anthropic_api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// None = `<data dir>/studymap/studymap.db`
    #[serde(default)]
    pub db_path: Option<String>,
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Request body cap for the HTTP server
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_bind() -> String {
    "127.0.0.1:3741".to_string()
}

fn default_body_limit() -> usize {
    64 * 1024
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            anthropic_api_key: None,
            model: default_model(),
            max_tokens: default_max_tokens(),
            api_url: default_api_url(),
            db_path: None,
            bind: default_bind(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

/// `<data dir>/studymap`, falling back to the working directory.
pub fn data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("studymap"))
        .unwrap_or_else(|| PathBuf::from("."))
}

pub fn default_path() -> PathBuf {
    data_dir().join("settings.json")
}

impl Settings {
    /// Load settings from disk, or defaults when the file is missing or unreadable.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            return Settings::default();
        }
        match fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("[Settings] Ignoring malformed {}: {}", path.display(), e);
                Settings::default()
            }),
            Err(e) => {
                tracing::warn!("[Settings] Failed to read {}: {}", path.display(), e);
                Settings::default()
            }
        }
    }

    /// Save settings to disk
    pub fn save(&self, path: &Path) -> Result<(), String> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize settings: {}", e))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config directory: {}", e))?;
        }

        fs::write(path, content)
            .map_err(|e| format!("Failed to write settings: {}", e))?;

        Ok(())
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply overrides from any variable source. Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(key) = get("ANTHROPIC_API_KEY") {
            self.anthropic_api_key = Some(key);
        }
        if let Some(model) = get("STUDYMAP_MODEL") {
            self.model = model;
        }
        if let Some(raw) = get("STUDYMAP_MAX_TOKENS") {
            match raw.trim().parse() {
                Ok(n) => self.max_tokens = n,
                Err(_) => tracing::warn!("[Settings] STUDYMAP_MAX_TOKENS={} is not a number", raw),
            }
        }
        if let Some(url) = get("STUDYMAP_API_URL") {
            self.api_url = url;
        }
        if let Some(db) = get("STUDYMAP_DB") {
            self.db_path = Some(db);
        }
        if let Some(bind) = get("STUDYMAP_BIND") {
            self.bind = bind;
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.anthropic_api_key.as_deref().map(|k| !k.is_empty()).unwrap_or(false)
    }

    /// Masked API key for display (shows first 8 and last 4 chars)
    pub fn masked_api_key(&self) -> Option<String> {
        self.anthropic_api_key.as_deref().filter(|k| !k.is_empty()).map(mask_key)
    }

    pub fn database_path(&self) -> PathBuf {
        match &self.db_path {
            Some(p) => PathBuf::from(p),
            None => data_dir().join("studymap.db"),
        }
    }

    /// Copy suitable for printing: the key is masked.
    pub fn redacted(&self) -> Settings {
        Settings { anthropic_api_key: self.masked_api_key(), ..self.clone() }
    }
}

fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() > 12 {
        let head: String = chars[..8].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", head, tail)
    } else {
        "*".repeat(chars.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_missing_fields_use_defaults() {
        let s: Settings = serde_json::from_str(r#"{"model": "claude-x"}"#).unwrap();
        assert_eq!(s.model, "claude-x");
        assert_eq!(s.max_tokens, 1024);
        assert_eq!(s.api_url, DEFAULT_API_URL);
        assert_eq!(s.bind, "127.0.0.1:3741");
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let mut s = Settings::default();
        s.anthropic_api_key = Some("sk-ant-test-key-123456".to_string());
        s.max_tokens = 256;
        s.save(&path).unwrap();

        assert_eq!(Settings::load(&path), s);
    }

    #[test]
    fn test_load_missing_or_malformed_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        assert_eq!(Settings::load(&path), Settings::default());

        fs::write(&path, "{ nope").unwrap();
        assert_eq!(Settings::load(&path), Settings::default());
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("ANTHROPIC_API_KEY", "sk-env"),
            ("STUDYMAP_MAX_TOKENS", "99"),
            ("STUDYMAP_BIND", "0.0.0.0:8080"),
            ("STUDYMAP_MODEL", "  "),
        ]
        .into_iter()
        .collect();

        let mut s = Settings::default();
        s.apply_overrides(|name| vars.get(name).map(|v| v.to_string()));
        assert_eq!(s.anthropic_api_key.as_deref(), Some("sk-env"));
        assert_eq!(s.max_tokens, 99);
        assert_eq!(s.bind, "0.0.0.0:8080");
        assert_eq!(s.model, DEFAULT_MODEL);
    }

    #[test]
    fn test_bad_max_tokens_is_ignored() {
        let mut s = Settings::default();
        s.apply_overrides(|name| (name == "STUDYMAP_MAX_TOKENS").then(|| "lots".to_string()));
        assert_eq!(s.max_tokens, 1024);
    }

    #[test]
    fn test_masked_api_key() {
        let mut s = Settings::default();
        assert_eq!(s.masked_api_key(), None);
        assert!(!s.has_api_key());

        s.anthropic_api_key = Some("sk-ant-abcdefgh-wxyz".to_string());
        assert_eq!(s.masked_api_key().as_deref(), Some("sk-ant-a...wxyz"));
        assert!(s.has_api_key());

        s.anthropic_api_key = Some("short".to_string());
        assert_eq!(s.masked_api_key().as_deref(), Some("*****"));
        assert_eq!(s.redacted().anthropic_api_key.as_deref(), Some("*****"));
    }
}
