use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// What to do when the funnel source holds more than one row
/// for the same (user, step) pair.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateStepPolicy {
    /// Keep the earliest event; later duplicates are dropped and counted.
    #[default]
    KeepFirst,
    /// Keep the latest event; earlier duplicates are dropped and counted.
    KeepLast,
    /// Abort the run with a consistency error.
    Fail,
}

/// Everything the pipeline needs to know, passed in explicitly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineConfig {
    pub raw_dir: PathBuf,
    pub warehouse_dir: PathBuf,
    #[serde(default)]
    pub duplicate_funnel_steps: DuplicateStepPolicy,
    /// Out-of-order or gapped funnels abort the run instead of being warned about.
    #[serde(default)]
    pub strict_funnel_order: bool,
}

impl PipelineConfig {
    pub fn new(raw_dir: impl Into<PathBuf>, warehouse_dir: impl Into<PathBuf>) -> Self {
        Self {
            raw_dir: raw_dir.into(),
            warehouse_dir: warehouse_dir.into(),
            duplicate_funnel_steps: DuplicateStepPolicy::default(),
            strict_funnel_order: false,
        }
    }

    /// Conventional project layout: `<base>/data/raw` in, `<base>/data/warehouse` out.
    pub fn from_base_dir(base: &Path) -> Self {
        Self::new(base.join("data").join("raw"), base.join("data").join("warehouse"))
    }

    /// Load from a JSON file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {}: {e}", path.display()))?;
        let config: PipelineConfig = serde_json::from_str(&content)?;
        Ok(config)
    }
}

/// Knobs for the synthetic data generator.
/// Defaults reproduce the shape of the reference dataset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeneratorConfig {
    pub seed: u64,
    pub users: u32,
    pub signup_start: NaiveDate,
    pub signup_end: NaiveDate,
    pub p_start_registration: f64,
    pub p_reach_kyc: f64,
    /// Cumulative thresholds: roll < approved → APPROVED,
    /// roll < approved + failed → FAILED, else PENDING.
    pub p_kyc_approved: f64,
    pub p_kyc_failed: f64,
    pub p_card_activation: f64,
    pub p_topup: f64,
    pub max_transactions_per_user: u32,
    pub amount_log_mean: f64,
    pub amount_log_sigma: f64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            users: 2000,
            signup_start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default(),
            signup_end: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap_or_default(),
            p_start_registration: 0.95,
            p_reach_kyc: 0.85,
            p_kyc_approved: 0.75,
            p_kyc_failed: 0.15,
            p_card_activation: 0.80,
            p_topup: 0.70,
            max_transactions_per_user: 20,
            amount_log_mean: 3.0,
            amount_log_sigma: 0.6,
        }
    }
}

impl GeneratorConfig {
    /// Small population for tests.
    pub fn default_test(seed: u64) -> Self {
        Self {
            seed,
            users: 200,
            ..Self::default()
        }
    }
}
