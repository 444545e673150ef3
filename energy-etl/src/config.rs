use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};

use energy_client::db::validate_identifier;

pub const CONFIG_PATH_ENV: &str = "ENERGY_ETL_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "energy-etl.toml";

/// Upper bound keeps a single multi-row insert under the 65535 bind limit.
pub const MAX_BATCH_SIZE: usize = 5000;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Dataset identifier in `owner/slug` form.
    pub id: String,
    pub api_base: String,
    pub username: Option<String>,
    pub api_key: Option<String>,
    pub data_dir: PathBuf,
    pub raw_file: String,
    pub transformed_file: String,
    /// Download even when the local copy is current.
    pub force: bool,
    pub timeout_secs: u64,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            id: "mrsimple07/energy-consumption-prediction".to_string(),
            api_base: "https://www.kaggle.com/api/v1".to_string(),
            username: None,
            api_key: None,
            data_dir: PathBuf::from("data"),
            raw_file: "Energy_consumption.csv".to_string(),
            transformed_file: "Energy_consumption_transformed.csv".to_string(),
            force: false,
            timeout_secs: 300,
        }
    }
}

impl DatasetConfig {
    pub fn raw_path(&self) -> PathBuf {
        self.data_dir.join(&self.raw_file)
    }

    pub fn transformed_path(&self) -> PathBuf {
        self.data_dir.join(&self.transformed_file)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    /// Fail on unrecognised On/Off and Yes/No values instead of storing NULL.
    pub strict_categories: bool,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            strict_categories: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WarehouseConfig {
    /// `host[:port]` of the warehouse endpoint.
    pub account: String,
    pub user: String,
    pub password: Option<String>,
    /// Compute warehouse name, reported as the session's application name.
    pub warehouse: String,
    pub database: String,
    pub schema: String,
    pub table: String,
    /// Database used to check for and create `database`.
    pub maintenance_database: String,
    pub batch_size: usize,
    pub connect_timeout_secs: u64,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            account: "localhost:5432".to_string(),
            user: "etl".to_string(),
            password: None,
            warehouse: "COMPUTE_WH".to_string(),
            database: "energy_consumption_db".to_string(),
            schema: "consumption_schema".to_string(),
            table: "energy_consumption".to_string(),
            maintenance_database: "postgres".to_string(),
            batch_size: 1000,
            connect_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Prometheus text exposition is written here when the job finishes.
    pub textfile_path: PathBuf,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub dataset: DatasetConfig,
    pub transform: TransformConfig,
    pub warehouse: WarehouseConfig,
    pub metrics: Option<MetricsConfig>,
}

impl AppConfig {
    /// Load `.env`, then the TOML file, then environment overrides.
    ///
    /// The file named by `ENERGY_ETL_CONFIG` must exist; the default file is
    /// optional and built-in defaults apply without it.
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        dotenvy::dotenv().ok();

        let mut cfg = match env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::from_file(&path)?,
            Err(_) if Path::new(DEFAULT_CONFIG_PATH).exists() => Self::from_file(DEFAULT_CONFIG_PATH)?,
            Err(_) => Self::default(),
        };

        cfg.apply_env_overrides(|key| env::var(key).ok());
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config {}: {e}", path.display()))?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> anyhow::Result<Self> {
        let cfg: AppConfig = toml::from_str(contents)?;
        Ok(cfg)
    }

    /// Secrets and connection details may come from the environment so they
    /// never have to live in the config file.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("KAGGLE_USERNAME") {
            self.dataset.username = Some(v);
        }
        if let Some(v) = lookup("KAGGLE_KEY") {
            self.dataset.api_key = Some(v);
        }
        if let Some(v) = lookup("WAREHOUSE_ACCOUNT") {
            self.warehouse.account = v;
        }
        if let Some(v) = lookup("WAREHOUSE_USER") {
            self.warehouse.user = v;
        }
        if let Some(v) = lookup("WAREHOUSE_PASSWORD") {
            self.warehouse.password = Some(v);
        }
        if let Some(v) = lookup("WAREHOUSE_NAME") {
            self.warehouse.warehouse = v;
        }
        if let Some(v) = lookup("WAREHOUSE_DATABASE") {
            self.warehouse.database = v;
        }
        if let Some(v) = lookup("WAREHOUSE_SCHEMA") {
            self.warehouse.schema = v;
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let w = &self.warehouse;
        for (field, value) in [
            ("warehouse.database", &w.database),
            ("warehouse.schema", &w.schema),
            ("warehouse.table", &w.table),
            ("warehouse.maintenance_database", &w.maintenance_database),
        ] {
            validate_identifier(value).map_err(|e| anyhow::anyhow!("{field}: {e}"))?;
        }

        if w.batch_size == 0 || w.batch_size > MAX_BATCH_SIZE {
            anyhow::bail!("warehouse.batch_size must be between 1 and {MAX_BATCH_SIZE}");
        }

        if w.account.trim().is_empty() {
            anyhow::bail!("warehouse.account must not be empty");
        }

        match self.dataset.id.split_once('/') {
            Some((owner, slug)) if !owner.is_empty() && !slug.is_empty() && !slug.contains('/') => {}
            _ => anyhow::bail!("dataset.id must look like owner/slug, got '{}'", self.dataset.id),
        }

        if self.dataset.raw_file == self.dataset.transformed_file {
            anyhow::bail!("dataset.raw_file and dataset.transformed_file must differ");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_are_valid_and_relative() {
        let cfg = AppConfig::default();
        cfg.validate().unwrap();

        assert_eq!(cfg.dataset.raw_path(), PathBuf::from("data/Energy_consumption.csv"));
        assert_eq!(
            cfg.dataset.transformed_path(),
            PathBuf::from("data/Energy_consumption_transformed.csv")
        );
        assert!(cfg.transform.strict_categories);
        assert!(cfg.metrics.is_none());
    }

    #[test]
    fn partial_toml_keeps_defaults_for_missing_fields() {
        let cfg = AppConfig::from_toml(
            r#"
            [warehouse]
            account = "warehouse.internal:6543"
            schema = "analytics"

            [transform]
            strict_categories = false

            [metrics]
            textfile_path = "/var/lib/node_exporter/energy_etl.prom"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.warehouse.account, "warehouse.internal:6543");
        assert_eq!(cfg.warehouse.schema, "analytics");
        assert_eq!(cfg.warehouse.table, "energy_consumption");
        assert!(!cfg.transform.strict_categories);
        assert_eq!(cfg.dataset.id, "mrsimple07/energy-consumption-prediction");
        assert!(cfg.metrics.is_some());
    }

    #[test]
    fn env_overrides_take_precedence_over_file() {
        let mut cfg = AppConfig::from_toml("[warehouse]\nuser = \"file-user\"\n").unwrap();
        let env: HashMap<&str, &str> = [
            ("KAGGLE_USERNAME", "alice"),
            ("KAGGLE_KEY", "secret-key"),
            ("WAREHOUSE_USER", "env-user"),
            ("WAREHOUSE_PASSWORD", "hunter2"),
        ]
        .into_iter()
        .collect();

        cfg.apply_env_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(cfg.dataset.username.as_deref(), Some("alice"));
        assert_eq!(cfg.dataset.api_key.as_deref(), Some("secret-key"));
        assert_eq!(cfg.warehouse.user, "env-user");
        assert_eq!(cfg.warehouse.password.as_deref(), Some("hunter2"));
        assert_eq!(cfg.warehouse.database, "energy_consumption_db");
    }

    #[test]
    fn validate_rejects_unsafe_identifiers_and_bad_batch_size() {
        let mut cfg = AppConfig::default();
        cfg.warehouse.table = "energy; DROP TABLE x".to_string();
        assert!(cfg.validate().is_err());

        let mut cfg = AppConfig::default();
        cfg.warehouse.batch_size = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = AppConfig::default();
        cfg.warehouse.batch_size = MAX_BATCH_SIZE + 1;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_malformed_dataset_id() {
        for id in ["no-slash", "/slug", "owner/", "a/b/c"] {
            let mut cfg = AppConfig::default();
            cfg.dataset.id = id.to_string();
            assert!(cfg.validate().is_err(), "{id} should be rejected");
        }
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(AppConfig::from_file(&missing).is_err());
    }
}
