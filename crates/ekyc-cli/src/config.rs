use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use ekyc_core::RegistrationConfig;
use serde::Deserialize;

/// CLI configuration: a TOML file, then `EKYC_*` environment overrides.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub models: ModelConfig,
    pub registration: RegistrationConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: data_dir().join("ekyc.db"),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Directory containing ONNX model files.
    pub dir: PathBuf,
    pub detector: String,
    pub embedder: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            dir: data_dir().join("models"),
            detector: "det_10g.onnx".to_string(),
            embedder: "facenet512.onnx".to_string(),
        }
    }
}

impl ModelConfig {
    pub fn detector_path(&self) -> String {
        self.dir.join(&self.detector).to_string_lossy().into_owned()
    }

    pub fn embedder_path(&self) -> String {
        self.dir.join(&self.embedder).to_string_lossy().into_owned()
    }
}

impl Config {
    /// Load from `explicit`, else `EKYC_CONFIG`, else the XDG default path if
    /// it exists, then apply environment overrides.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os("EKYC_CONFIG").map(PathBuf::from));

        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => {
                let default = default_config_path();
                if default.exists() {
                    Self::from_file(&default)?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config
            .registration
            .validate()
            .context("invalid [registration] settings")?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config = toml::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        tracing::debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(path) = var("EKYC_DB_PATH") {
            self.database.path = PathBuf::from(path);
        }
        if let Some(dir) = var("EKYC_MODEL_DIR") {
            self.models.dir = PathBuf::from(dir);
        }
        if let Some(raw) = var("EKYC_MATCH_THRESHOLD") {
            let threshold: f32 = match raw.trim().parse() {
                Ok(t) => t,
                Err(_) => bail!("EKYC_MATCH_THRESHOLD is not a number: {raw:?}"),
            };
            self.registration.match_threshold = threshold;
        }
        Ok(())
    }
}

fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home().join(".local/share"))
        .join("ekyc")
}

fn default_config_path() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home().join(".config"))
        .join("ekyc")
        .join("config.toml")
}

fn home() -> PathBuf {
    PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string()))
}
