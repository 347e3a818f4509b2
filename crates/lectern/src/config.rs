//! Service configuration.
//!
//! Settings load from a JSON file, then environment variables override
//! individual fields. Everything has a default so a bare deployment
//! works out of the box.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// SQLite database file. None means the per-user default path.
    pub database_path: Option<PathBuf>,
    /// Directory rendered export files are written to.
    pub export_dir: PathBuf,
    pub pipeline_workers: usize,
    pub export_workers: usize,
    pub export_expiry_days: i64,
    pub max_slides: usize,
    /// Speech-to-text endpoint.
    pub transcription_endpoint: String,
    pub generation: GenerationSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_path: None,
            export_dir: PathBuf::from("exports"),
            pipeline_workers: 4,
            export_workers: 2,
            export_expiry_days: 7,
            max_slides: 20,
            transcription_endpoint: "http://127.0.0.1:9000/asr".to_string(),
            generation: GenerationSettings::default(),
        }
    }
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8000/v1/chat/completions".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
        }
    }
}

impl Settings {
    /// Loads settings from a JSON file. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No config file at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };
        let settings: Settings = serde_json::from_str(&raw).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Applies overrides from a key lookup. In production the lookup is
    /// `std::env::var`; tests pass a closure over a map.
    pub fn apply_overrides(
        mut self,
        get: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(v) = get("LECTERN_DATABASE_PATH") {
            self.database_path = Some(PathBuf::from(v));
        }
        if let Some(v) = get("LECTERN_EXPORT_DIR") {
            self.export_dir = PathBuf::from(v);
        }
        if let Some(v) = get("LECTERN_PIPELINE_WORKERS") {
            self.pipeline_workers = parse_field("LECTERN_PIPELINE_WORKERS", &v)?;
        }
        if let Some(v) = get("LECTERN_EXPORT_WORKERS") {
            self.export_workers = parse_field("LECTERN_EXPORT_WORKERS", &v)?;
        }
        if let Some(v) = get("LECTERN_EXPORT_EXPIRY_DAYS") {
            self.export_expiry_days = parse_field("LECTERN_EXPORT_EXPIRY_DAYS", &v)?;
        }
        if let Some(v) = get("LECTERN_MAX_SLIDES") {
            self.max_slides = parse_field("LECTERN_MAX_SLIDES", &v)?;
        }
        if let Some(v) = get("LECTERN_TRANSCRIPTION_ENDPOINT") {
            self.transcription_endpoint = v;
        }
        if let Some(v) = get("LECTERN_GENERATION_ENDPOINT") {
            self.generation.endpoint = v;
        }
        if let Some(v) = get("LECTERN_GENERATION_MODEL") {
            self.generation.model = v;
        }
        if let Some(v) = get("LECTERN_GENERATION_API_KEY") {
            self.generation.api_key = Some(v);
        }
        self.validate()?;
        Ok(self)
    }

    /// Applies overrides from the process environment.
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pipeline_workers == 0 {
            return Err(ConfigError::Invalid(
                "pipeline_workers must be at least 1".to_string(),
            ));
        }
        if self.export_workers == 0 {
            return Err(ConfigError::Invalid(
                "export_workers must be at least 1".to_string(),
            ));
        }
        if self.export_expiry_days < 1 {
            return Err(ConfigError::Invalid(
                "export_expiry_days must be at least 1".to_string(),
            ));
        }
        if self.max_slides == 0 {
            return Err(ConfigError::Invalid(
                "max_slides must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_field<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("{} has invalid value '{}'", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.pipeline_workers, 4);
        assert_eq!(settings.export_workers, 2);
        assert_eq!(settings.export_expiry_days, 7);
        assert_eq!(settings.max_slides, 20);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_load_missing_file_falls_back_to_defaults() {
        let settings = Settings::load(Path::new("/nonexistent/lectern.json")).unwrap();
        assert_eq!(settings.pipeline_workers, 4);
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(br#"{"pipeline_workers": 8, "generation": {"model": "local-llm"}}"#)
            .unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.pipeline_workers, 8);
        assert_eq!(settings.generation.model, "local-llm");
        // Untouched fields keep their defaults.
        assert_eq!(settings.export_workers, 2);
    }

    #[test]
    fn test_load_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            Settings::load(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_overrides() {
        let mut env = HashMap::new();
        env.insert("LECTERN_PIPELINE_WORKERS", "6");
        env.insert("LECTERN_GENERATION_API_KEY", "secret");
        env.insert("LECTERN_EXPORT_DIR", "/var/lectern/exports");

        let settings = Settings::default()
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(settings.pipeline_workers, 6);
        assert_eq!(settings.generation.api_key.as_deref(), Some("secret"));
        assert_eq!(settings.export_dir, PathBuf::from("/var/lectern/exports"));
        // Others untouched.
        assert_eq!(settings.max_slides, 20);
    }

    #[test]
    fn test_invalid_override_rejected() {
        let result = Settings::default()
            .apply_overrides(|key| (key == "LECTERN_MAX_SLIDES").then(|| "lots".to_string()));
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let result = Settings::default()
            .apply_overrides(|key| (key == "LECTERN_PIPELINE_WORKERS").then(|| "0".to_string()));
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }
}
