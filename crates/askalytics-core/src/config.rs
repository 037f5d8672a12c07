use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use askalytics_backend::ExecutionMode;
use askalytics_schema::QueryContext;

use crate::compiler::CompilerLimits;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub name: String,
    pub env: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "askalytics".to_string(),
            env: "development".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ga4Config {
    #[serde(default)]
    pub property_id: Option<String>,
    /// Defaults to the public Data API endpoint when unset.
    #[serde(default)]
    pub api_base: Option<String>,
    #[serde(default)]
    pub access_token: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WarehouseConfig {
    #[serde(default)]
    pub api_base: String,
    #[serde(default)]
    pub api_key: String,
}

fn default_wide_range_days() -> i64 {
    90
}

fn default_high_dimensionality() -> usize {
    2
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_backoff_ms() -> u64 {
    500
}

fn default_call_timeout_secs() -> u64 {
    30
}

fn default_simulation_seed() -> u64 {
    42
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    #[serde(default = "default_mode")]
    pub mode: ExecutionMode,
    #[serde(default = "default_wide_range_days")]
    pub wide_range_days: i64,
    #[serde(default = "default_high_dimensionality")]
    pub high_dimensionality: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
    #[serde(default = "default_simulation_seed")]
    pub simulation_seed: u64,
}

fn default_mode() -> ExecutionMode {
    ExecutionMode::Auto
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            wide_range_days: default_wide_range_days(),
            high_dimensionality: default_high_dimensionality(),
            max_attempts: default_max_attempts(),
            base_backoff_ms: default_base_backoff_ms(),
            call_timeout_secs: default_call_timeout_secs(),
            simulation_seed: default_simulation_seed(),
        }
    }
}

fn default_range_days() -> i64 {
    30
}

fn default_row_limit() -> u32 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    #[serde(default = "default_range_days")]
    pub range_days: i64,
    #[serde(default = "default_row_limit")]
    pub row_limit: u32,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            range_days: default_range_days(),
            row_limit: default_row_limit(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MainConfig {
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub ga4: Ga4Config,
    #[serde(default)]
    pub warehouse: WarehouseConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub defaults: DefaultsConfig,
    #[serde(default)]
    pub limits: CompilerLimits,
}

impl MainConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;
        let config: MainConfig = serde_yaml::from_str(&raw)
            .with_context(|| format!("failed to parse config: {}", path.display()))?;
        Ok(config)
    }

    /// Per-request context built from configured defaults; `now` falls
    /// back to the current UTC date when the caller supplies none.
    pub fn query_context(&self, now: Option<NaiveDate>) -> QueryContext {
        let mut ctx = QueryContext {
            property_id: self.ga4.property_id.clone(),
            default_range_days: self.defaults.range_days,
            default_row_limit: self.defaults.row_limit,
            ..QueryContext::default()
        };
        if let Some(now) = now {
            ctx.now = now;
        }
        ctx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_config_gets_full_defaults() {
        let config: MainConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.app.name, "askalytics");
        assert_eq!(config.routing.mode, ExecutionMode::Auto);
        assert_eq!(config.routing.max_attempts, 3);
        assert_eq!(config.defaults.range_days, 30);
        assert_eq!(config.limits.max_span_days, 365);
    }

    #[test]
    fn load_reads_yaml_with_partial_sections() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "app:\n  name: askalytics\n  env: production\nga4:\n  property_id: \"987654\"\n  access_token: tok\nrouting:\n  mode: simulated\n  max_attempts: 5\n"
        )
        .unwrap();

        let config = MainConfig::load(file.path()).unwrap();
        assert_eq!(config.app.env, "production");
        assert_eq!(config.ga4.property_id.as_deref(), Some("987654"));
        assert_eq!(config.routing.mode, ExecutionMode::Simulated);
        assert_eq!(config.routing.max_attempts, 5);
        // Untouched sections keep defaults.
        assert_eq!(config.defaults.row_limit, 10);
    }

    #[test]
    fn load_missing_file_names_the_path() {
        let err = MainConfig::load(Path::new("/nonexistent/config.yaml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/config.yaml"));
    }

    #[test]
    fn query_context_carries_defaults_and_now() {
        let config: MainConfig = serde_yaml::from_str(
            "ga4:\n  property_id: \"555\"\ndefaults:\n  range_days: 7\n  row_limit: 25\n",
        )
        .unwrap();
        let now = NaiveDate::from_ymd_opt(2025, 1, 24).unwrap();
        let ctx = config.query_context(Some(now));
        assert_eq!(ctx.now, now);
        assert_eq!(ctx.property_id.as_deref(), Some("555"));
        assert_eq!(ctx.default_range_days, 7);
        assert_eq!(ctx.default_row_limit, 25);
    }
}
