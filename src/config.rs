use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::{fmt::Debug, fs, ops::RangeBounds, path::Path};

/// Engine parameters.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Seed of the random number generator (OS entropy if absent).
    #[serde(default)]
    pub seed: Option<u64>,
    /// Whether a freshly created engine starts in the running state.
    #[serde(default = "default_autostart")]
    pub autostart: bool,
}

/// Market parameters.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct MarketConfig {
    /// Initial number of synthetic customers.
    pub n_customers: usize,
    /// Price increase announced on the first day (fraction of current price).
    #[serde(default)]
    pub price_increase: f64,
}

/// Organization parameters.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct OrgConfig {
    /// Budget at day zero.
    pub initial_budget: f64,
    /// Monthly expenses.
    pub monthly_burn_rate: f64,
    /// Workload capacity of every entity.
    #[serde(default = "default_max_workload")]
    pub max_workload: u32,
}

/// Retention parameters.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Maximum length of each metric series.
    #[serde(default = "default_metric_series_cap")]
    pub metric_series_cap: usize,
    /// Maximum number of daily snapshots kept.
    #[serde(default = "default_snapshot_cap")]
    pub snapshot_cap: usize,
    /// Maximum number of events kept in the scheduler's event history.
    #[serde(default = "default_event_history_cap")]
    pub event_history_cap: usize,
}

/// Output parameters.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Number of simulated days between snapshot saves.
    pub days_per_save: usize,
    /// Number of saves written per trajectory file.
    pub saves_per_file: usize,
}

/// Simulation configuration.
///
/// Loaded from a TOML file and validated before use.
/// See [`Config::from_file`] for loading.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    pub market: MarketConfig,
    pub org: OrgConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    pub output: OutputConfig,
}

fn default_autostart() -> bool {
    true
}

fn default_max_workload() -> u32 {
    10
}

fn default_metric_series_cap() -> usize {
    100
}

fn default_snapshot_cap() -> usize {
    365
}

fn default_event_history_cap() -> usize {
    500
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            seed: None,
            autostart: default_autostart(),
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            metric_series_cap: default_metric_series_cap(),
            snapshot_cap: default_snapshot_cap(),
            event_history_cap: default_event_history_cap(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            market: MarketConfig {
                n_customers: 100,
                price_increase: 0.0,
            },
            org: OrgConfig {
                initial_budget: 1_000_000.0,
                monthly_burn_rate: 150_000.0,
                max_workload: default_max_workload(),
            },
            memory: MemoryConfig::default(),
            output: OutputConfig {
                days_per_save: 1,
                saves_per_file: 30,
            },
        }
    }
}

impl Config {
    /// Load a [`Config`] from a file.
    ///
    /// The file must be TOML-encoded and contain a serialized [`Config`].
    /// Performs validation on all parameters before returning.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, deserialized,
    /// or if the configuration values are invalid.
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let contents =
            fs::read_to_string(file).with_context(|| format!("failed to read {file:?}"))?;

        let config: Config = toml::from_str(&contents).context("failed to deserialize config")?;

        config.validate().context("failed to validate config")?;

        Ok(config)
    }

    /// Same configuration with a fixed seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.engine.seed = Some(seed);
        self
    }

    pub fn validate(&self) -> Result<()> {
        check_num(self.market.n_customers, 1..100_000).context("invalid number of customers")?;
        check_num(self.market.price_increase, 0.0..=1.0).context("invalid price increase")?;

        check_num(self.org.initial_budget, 0.0..1e12).context("invalid initial budget")?;
        check_num(self.org.monthly_burn_rate, f64::MIN_POSITIVE..1e12)
            .context("invalid monthly burn rate")?;
        check_num(self.org.max_workload, 1..1_000).context("invalid maximum workload")?;

        check_num(self.memory.metric_series_cap, 1..1_000_000)
            .context("invalid metric series cap")?;
        check_num(self.memory.snapshot_cap, 1..100_000).context("invalid snapshot cap")?;
        check_num(self.memory.event_history_cap, 1..1_000_000)
            .context("invalid event history cap")?;

        check_num(self.output.days_per_save, 1..10_000).context("invalid number of days per save")?;
        check_num(self.output.saves_per_file, 1..10_000)
            .context("invalid number of saves per file")?;

        Ok(())
    }
}

fn check_num<T, R>(num: T, range: R) -> Result<()>
where
    T: PartialOrd + Debug,
    R: RangeBounds<T> + Debug,
{
    if !range.contains(&num) {
        bail!("number must be in the range {range:?}, but is {num:?}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_toml_with_defaults() {
        let cfg: Config = toml::from_str(
            r#"
[market]
n_customers = 50

[org]
initial_budget = 500000.0
monthly_burn_rate = 90000.0

[output]
days_per_save = 7
saves_per_file = 4
"#,
        )
        .expect("failed to parse config");

        assert_eq!(cfg.market.n_customers, 50);
        assert_eq!(cfg.org.max_workload, 10);
        assert_eq!(cfg.memory.snapshot_cap, 365);
        assert_eq!(cfg.memory.metric_series_cap, 100);
        assert!(cfg.engine.autostart);
        assert!(cfg.engine.seed.is_none());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_values() {
        let mut cfg = Config::default();
        cfg.market.n_customers = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.market.price_increase = 1.5;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.output.saves_per_file = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.org.monthly_burn_rate = 0.0;
        assert!(cfg.validate().is_err());
    }
}
