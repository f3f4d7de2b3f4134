use serde::Deserialize;
use std::{fs, path::Path};

use crate::roster::{RosterEntry, RosterError, RosterRegistry};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Rate must be a finite fraction; 0.01 means one percent.
    #[error("commission_rate must be within 0..=1, got {0}")]
    Rate(f64),

    #[error(transparent)]
    Roster(#[from] RosterError),
}

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default = "default_rate")]
    pub commission_rate: f64,
    /// Emit a zero row for every roster member, observed or not.
    #[serde(default = "default_fill_roster")]
    pub fill_roster: bool,
    #[serde(default = "default_fallback_dir")]
    pub fallback_dir: String,
    #[serde(default)]
    pub roster_version: Option<String>,
    #[serde(default)]
    pub roster: Vec<RosterEntry>,
}

fn default_db_path() -> String {
    "ledger/commission.db".to_string()
}

fn default_rate() -> f64 {
    0.01
}

fn default_fill_roster() -> bool {
    true
}

fn default_fallback_dir() -> String {
    "exports".to_string()
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let cfg: Config = toml::from_str(content)?;
        if !cfg.commission_rate.is_finite() || !(0.0..=1.0).contains(&cfg.commission_rate) {
            return Err(ConfigError::Rate(cfg.commission_rate));
        }
        Ok(cfg)
    }

    /// Build the immutable roster described by the `[[roster]]` tables.
    pub fn roster(&self) -> Result<RosterRegistry, ConfigError> {
        Ok(RosterRegistry::new(
            self.roster.clone(),
            self.roster_version.clone(),
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
db_path = "ledger/test.db"
commission_rate = 0.02
fill_roster = false
roster_version = "2025-03"

[[roster]]
name = "TIAGO FERNANDES DE LIMA"
aliases = ["TIAGO LIMA"]

[[roster]]
name = "ROSEANE CRUZ"
"#;

    #[test]
    fn test_load_full_config() {
        let cfg = Config::from_toml(SAMPLE).unwrap();
        assert_eq!(cfg.db_path, "ledger/test.db");
        assert_eq!(cfg.commission_rate, 0.02);
        assert!(!cfg.fill_roster);
        assert_eq!(cfg.fallback_dir, "exports");

        let roster = cfg.roster().unwrap();
        assert_eq!(roster.identities().len(), 2);
        assert_eq!(roster.label(), Some("2025-03"));
    }

    #[test]
    fn test_defaults() {
        let cfg = Config::from_toml("[[roster]]\nname = \"ANA\"\n").unwrap();
        assert_eq!(cfg.db_path, "ledger/commission.db");
        assert_eq!(cfg.commission_rate, 0.01);
        assert!(cfg.fill_roster);
    }

    #[test]
    fn test_rate_out_of_range() {
        let err = Config::from_toml("commission_rate = 1.5\n").unwrap_err();
        assert!(matches!(err, ConfigError::Rate(_)));
    }

    #[test]
    fn test_empty_roster_rejected() {
        let cfg = Config::from_toml("").unwrap();
        assert!(matches!(
            cfg.roster(),
            Err(ConfigError::Roster(RosterError::Empty))
        ));
    }

    #[test]
    fn test_shipped_config_loads() {
        let cfg = Config::from_toml(include_str!("../.config/commission.toml")).unwrap();
        let roster = cfg.roster().unwrap();
        assert_eq!(roster.identities().len(), 5);
        assert!(roster.version().starts_with("2025-03@"));
    }

    #[test]
    fn test_missing_file() {
        let err = Config::load("/nonexistent/commission.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
