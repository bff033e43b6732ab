use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG_PATH: &str = "config.json";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(alias = "TELOXIDE_TOKEN", default)]
    pub teloxide_token: Option<String>,
    #[serde(alias = "CHANNEL_ID", default)]
    pub channel_id: Option<i64>,
    #[serde(alias = "DB_PATH", default = "default_db_path")]
    pub db_path: String,
    #[serde(alias = "FONTS_CONFIG", default = "default_fonts_config")]
    pub fonts_config: String,
    #[serde(alias = "FONTS_PLATFORM", default)]
    pub fonts_platform: Option<String>,
    #[serde(alias = "LOG_LEVEL", default)]
    pub log_level: Option<String>,
    /// File this config was read from; `save` writes back here.
    #[serde(skip)]
    path: Option<PathBuf>,
}

fn default_db_path() -> String {
    "bot.db".to_string()
}

fn default_fonts_config() -> String {
    "assets/fonts.json".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            teloxide_token: None,
            channel_id: None,
            db_path: default_db_path(),
            fonts_config: default_fonts_config(),
            fonts_platform: None,
            log_level: None,
            path: None,
        }
    }
}

impl Config {
    /// Load from `CONFIG_PATH` (default `config.json`), then apply env overrides.
    /// A missing file is not an error: defaults are used.
    pub fn load() -> Result<Self> {
        let path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut cfg = if Path::new(&path).exists() {
            load_config(&path)?
        } else {
            Config::default()
        };
        cfg.apply_env(|key| std::env::var(key).ok())?;
        Ok(cfg)
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let mut cfg: Config = serde_json::from_str(raw).context("invalid config JSON")?;
        cfg.apply_env(|key| std::env::var(key).ok())?;
        Ok(cfg)
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(token) = var("TELOXIDE_TOKEN") {
            self.teloxide_token = Some(token);
        }
        if let Some(raw) = var("CHANNEL_ID") {
            let id = raw
                .trim()
                .parse::<i64>()
                .with_context(|| format!("CHANNEL_ID is not a number: {}", raw))?;
            self.channel_id = Some(id);
        }
        if let Some(path) = var("DB_PATH") {
            self.db_path = path;
        }
        if let Some(path) = var("FONTS_CONFIG") {
            self.fonts_config = path;
        }
        if let Some(platform) = var("FONTS_PLATFORM") {
            self.fonts_platform = Some(platform);
        }
        Ok(())
    }

    /// Platform key to look fonts up under.
    pub fn platform(&self) -> &str {
        self.fonts_platform
            .as_deref()
            .unwrap_or(std::env::consts::OS)
    }

    /// Write `channel_id` back to the file the config was loaded from. No-op otherwise.
    ///
    /// Only that key is touched: values that came from the environment
    /// (the bot token included) never reach the file.
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let mut doc = match fs::read_to_string(path) {
            Ok(raw) => serde_json::from_str::<serde_json::Value>(&raw)
                .with_context(|| format!("invalid JSON: {}", path.display()))?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => serde_json::Value::Null,
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read config: {}", path.display()))
            }
        };
        if !doc.is_object() {
            doc = serde_json::Value::Object(serde_json::Map::new());
        }
        if let Some(fields) = doc.as_object_mut() {
            // The alias would clash with the canonical key on the next load
            fields.remove("CHANNEL_ID");
            fields.insert("channel_id".to_string(), serde_json::json!(self.channel_id));
        }
        let raw = serde_json::to_string_pretty(&doc)?;
        fs::write(path, raw).with_context(|| format!("failed to write config: {}", path.display()))?;
        Ok(())
    }
}

pub fn load_config(path: &str) -> Result<Config> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config: {}", path))?;
    let mut cfg: Config =
        serde_json::from_str(&raw).with_context(|| format!("invalid JSON: {}", path))?;
    cfg.path = Some(PathBuf::from(path));
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_aliases_and_defaults() {
        let cfg: Config = serde_json::from_str(r#"{"CHANNEL_ID": -1001, "LOG_LEVEL": "debug"}"#).unwrap();
        assert_eq!(cfg.channel_id, Some(-1001));
        assert_eq!(cfg.log_level.as_deref(), Some("debug"));
        assert_eq!(cfg.db_path, "bot.db");
        assert_eq!(cfg.fonts_config, "assets/fonts.json");
        assert!(cfg.teloxide_token.is_none());
    }

    #[test]
    fn env_overrides_file_values() {
        let mut cfg: Config = serde_json::from_str(r#"{"db_path": "file.db"}"#).unwrap();
        cfg.apply_env(|key| match key {
            "DB_PATH" => Some("env.db".to_string()),
            "CHANNEL_ID" => Some(" -42 ".to_string()),
            "FONTS_PLATFORM" => Some("macos".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(cfg.db_path, "env.db");
        assert_eq!(cfg.channel_id, Some(-42));
        assert_eq!(cfg.platform(), "macos");
    }

    #[test]
    fn rejects_non_numeric_channel_env() {
        let mut cfg = Config::default();
        let err = cfg
            .apply_env(|key| (key == "CHANNEL_ID").then(|| "@channel".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("CHANNEL_ID"));
    }

    #[test]
    fn platform_defaults_to_host_os() {
        assert_eq!(Config::default().platform(), std::env::consts::OS);
    }

    #[test]
    fn save_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"db_path": "a.db"}"#).unwrap();

        let mut cfg = load_config(path.to_str().unwrap()).unwrap();
        cfg.channel_id = Some(-100500);
        cfg.save().unwrap();

        let reloaded = load_config(path.to_str().unwrap()).unwrap();
        assert_eq!(reloaded.channel_id, Some(-100500));
        assert_eq!(reloaded.db_path, "a.db");
    }

    #[test]
    fn save_keeps_env_values_out_of_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"db_path": "a.db", "CHANNEL_ID": -1, "LOG_LEVEL": "debug"}"#).unwrap();

        let mut cfg = load_config(path.to_str().unwrap()).unwrap();
        cfg.apply_env(|key| match key {
            "TELOXIDE_TOKEN" => Some("secret-token".to_string()),
            "DB_PATH" => Some("env.db".to_string()),
            "FONTS_CONFIG" => Some("env-fonts.json".to_string()),
            _ => None,
        })
        .unwrap();
        cfg.channel_id = Some(-100500);
        cfg.save().unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert!(!raw.contains("secret-token"));
        assert!(!raw.contains("env.db"));
        assert!(!raw.contains("env-fonts.json"));
        assert!(!raw.contains("CHANNEL_ID"));

        let reloaded = load_config(path.to_str().unwrap()).unwrap();
        assert_eq!(reloaded.channel_id, Some(-100500));
        assert!(reloaded.teloxide_token.is_none());
        assert_eq!(reloaded.db_path, "a.db");
        assert_eq!(reloaded.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn save_without_file_is_noop() {
        assert!(Config::default().save().is_ok());
    }
}
