//! Layered CLI settings.
//!
//! Sources, lowest precedence first: built-in defaults, the YAML config
//! file, then `TALLY__SECTION__KEY` environment variables. A bare
//! `DATABASE_URL` is honored when no store URL was configured otherwise.

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tally_billing::{MeterCosts, PlanCatalog};
use tally_ledger::LedgerConfig;
use tally_store::StoreConfig;
use tally_trace::TracingConfig;

const ENV_PREFIX: &str = "TALLY";
const ENV_SEPARATOR: &str = "__";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub metering: MeteringSettings,
    #[serde(default)]
    pub plans: PlanCatalog,
    #[serde(default)]
    pub logging: TracingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeteringSettings {
    #[serde(default)]
    pub costs: MeterCosts,
    /// Credit back the charge when a metered operation fails.
    #[serde(default = "default_refund")]
    pub refund_on_failure: bool,
}

fn default_refund() -> bool {
    true
}

impl Default for MeteringSettings {
    fn default() -> Self {
        Self {
            costs: MeterCosts::default(),
            refund_on_failure: default_refund(),
        }
    }
}

impl Settings {
    /// Load from `path` (must exist) or the default location (optional),
    /// then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (file, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (Self::default_path()?, false),
        };
        let env = Environment::with_prefix(ENV_PREFIX)
            .prefix_separator(ENV_SEPARATOR)
            .separator(ENV_SEPARATOR)
            .try_parsing(true);

        let mut settings = Self::from_sources(&file, required, env)?;
        if settings.store.database_url.is_none() {
            settings.store.database_url = std::env::var("DATABASE_URL").ok();
        }
        Ok(settings)
    }

    fn from_sources(file: &Path, required: bool, env: Environment) -> Result<Self> {
        Config::builder()
            .add_source(File::from(file).required(required))
            .add_source(env)
            .build()
            .with_context(|| format!("Failed to read configuration from {}", file.display()))?
            .try_deserialize()
            .context("Invalid configuration")
    }

    /// `<config dir>/tally/config.yaml`.
    pub fn default_path() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("io", "tally", "tally")
            .context("Could not determine config directory")?;
        Ok(dirs.config_dir().join("config.yaml"))
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

/// Environment source over a fixed map instead of the process environment.
#[cfg(test)]
fn env_from(vars: &[(&str, &str)]) -> Environment {
    let map: std::collections::HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator(ENV_SEPARATOR)
        .separator(ENV_SEPARATOR)
        .try_parsing(true)
        .source(Some(map))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("config.yaml");

        let settings = Settings::from_sources(&missing, false, env_from(&[])).unwrap();
        assert!(settings.store.database_url.is_none());
        assert_eq!(settings.ledger.daily_claim_credits, 15);
        assert_eq!(settings.metering.costs, MeterCosts::default());
        assert!(settings.metering.refund_on_failure);
        assert_eq!(settings.plans, PlanCatalog::default());
    }

    #[test]
    fn test_required_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.yaml");
        assert!(Settings::from_sources(&missing, true, env_from(&[])).is_err());
    }

    #[test]
    fn test_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            r#"
store:
  data_dir: /var/lib/tally
  operation_timeout_ms: 750
ledger:
  daily_claim_credits: 20
metering:
  costs:
    video: 40
  refund_on_failure: false
plans:
  - id: mini
    name: Mini
    credits: 50
    price_id: price_mini
logging:
  format: json
"#,
        )
        .unwrap();

        let settings = Settings::from_sources(&path, true, env_from(&[])).unwrap();
        assert_eq!(settings.store.data_dir, PathBuf::from("/var/lib/tally"));
        assert_eq!(settings.store.operation_timeout_ms, 750);
        assert_eq!(settings.ledger.daily_claim_credits, 20);
        assert_eq!(settings.metering.costs.video, 40);
        assert_eq!(settings.metering.costs.image, 1);
        assert!(!settings.metering.refund_on_failure);
        assert_eq!(settings.plans.resolve("price_mini").unwrap().credits, 50);
        assert_eq!(settings.logging.format, tally_trace::LogFormat::Json);
    }

    #[test]
    fn test_environment_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "ledger:\n  daily_claim_credits: 20\n").unwrap();

        let env = env_from(&[
            ("TALLY__LEDGER__DAILY_CLAIM_CREDITS", "30"),
            ("TALLY__STORE__DATABASE_URL", "postgres://db/tally"),
            ("TALLY__STORE__FALLBACK_TO_LOCAL", "false"),
        ]);
        let settings = Settings::from_sources(&path, true, env).unwrap();
        assert_eq!(settings.ledger.daily_claim_credits, 30);
        assert_eq!(settings.store.database_url.as_deref(), Some("postgres://db/tally"));
        assert!(!settings.store.fallback_to_local);
    }

    #[test]
    fn test_yaml_round_trip_is_loadable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, Settings::default().to_yaml().unwrap()).unwrap();

        let settings = Settings::from_sources(&path, true, env_from(&[])).unwrap();
        assert_eq!(settings.plans.len(), 3);
    }
}
