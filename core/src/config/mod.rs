use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const TOOLLOOP_DIR: &str = ".toolloop";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub provider: Option<String>,
    pub api_key: String,
    pub base_url: Option<String>,
    pub model: String,
    pub temperature: f64,
    pub system_prompt: String,
    pub memory_path: PathBuf,
    /// Directory of `*.toml` tool manifests loaded on every registry refresh.
    pub tools_dir: Option<PathBuf>,
    pub bind: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            provider: None,
            api_key: String::new(),
            base_url: None,
            model: "gpt-4o".to_string(),
            temperature: 1.0,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            memory_path: get_toolloop_dir().join("memories.jsonl"),
            tools_dir: None,
            bind: "127.0.0.1:3000".to_string(),
        }
    }
}

pub fn get_toolloop_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(TOOLLOOP_DIR)
}

pub fn get_config_path() -> PathBuf {
    get_toolloop_dir().join("config.toml")
}

impl Config {
    /// Loads `path`, falling back to defaults when the file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            load_config(path)
        } else {
            tracing::debug!("No config at {}, using defaults", path.display());
            Ok(Config::default())
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config from {}", path.display()))?;

    Ok(config)
}

pub fn save_config(config: &Config, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory {}", parent.display()))?;
    }

    let content =
        toml::to_string_pretty(config).with_context(|| "Failed to serialize config to TOML")?;

    std::fs::write(path, content)
        .with_context(|| format!("Failed to write config to {}", path.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_gives_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = Config::load_or_default(&tmp.path().join("config.toml")).unwrap();
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.system_prompt, DEFAULT_SYSTEM_PROMPT);
        assert!(config.tools_dir.is_none());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "model = \"gpt-4o-mini\"\ntools_dir = \"/srv/tools\"\n").unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.tools_dir, Some(PathBuf::from("/srv/tools")));
        assert_eq!(config.bind, "127.0.0.1:3000");
    }

    #[test]
    fn save_then_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested/config.toml");
        let config = Config {
            api_key: "sk-test".to_string(),
            ..Config::default()
        };
        save_config(&config, &path).unwrap();

        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded.api_key, "sk-test");
    }

    #[test]
    fn malformed_file_is_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "model = [").unwrap();
        assert!(Config::load_or_default(&path).is_err());
    }
}
