//! Run configuration
//!
//! One config file describes a run in three sections: `ENV_CONFIG`,
//! `MODEL_CONFIG` and `TRAIN_CONFIG`. The file is parsed and validated once,
//! before any directory, simulator or model is created, and the same file is
//! later copied verbatim into the run's `data/` directory.

use config::{Config, File, FileFormat};
use serde::{Deserialize, Deserializer};
use std::path::Path;

use crate::error::{GreenwaveError, Result};

/// Fully validated configuration for one run
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub env: EnvConfig,
    pub model: ModelConfig,
    pub train: TrainConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EnvConfig {
    /// Seed for training traffic (also seeds model initialisation)
    pub seed: u64,
    /// Controller that produced this run, e.g. "ma2c" or "naive"
    #[serde(default = "default_agent")]
    pub agent: String,
    /// Scenario label written into outputs
    #[serde(default = "default_scenario")]
    pub scenario: String,
    /// Intersections per grid row
    #[serde(default = "default_grid_dim")]
    pub grid_rows: usize,
    /// Intersections per grid column
    #[serde(default = "default_grid_dim")]
    pub grid_cols: usize,
    /// Seconds between two control decisions
    #[serde(default = "default_control_interval")]
    pub control_interval_sec: f64,
    /// Yellow time lost when a signal switches phase
    #[serde(default = "default_yellow_interval")]
    pub yellow_interval_sec: f64,
    /// Simulated seconds per episode
    #[serde(default = "default_episode_length")]
    pub episode_length_sec: f64,
    /// Probability that a vehicle enters a boundary lane in a given second
    #[serde(default = "default_arrival_rate")]
    pub arrival_rate: f64,
    /// Vehicles per second a green lane can discharge
    #[serde(default = "default_saturation_flow")]
    pub saturation_flow: f64,
    /// Spatial discount applied to neighbour states and rewards
    #[serde(default = "default_coop_gamma")]
    pub coop_gamma: f64,
    /// Queue length that maps to 1.0 in observations
    #[serde(default = "default_norm_queue")]
    pub norm_queue: f64,
    /// Seeds for test / evaluation episodes, one episode per seed
    #[serde(default = "default_test_seeds", deserialize_with = "seed_list")]
    pub test_seeds: Vec<u64>,
    /// Simulator port for ordinal 0; ordinal `i` binds `sim_port_base + i`
    #[serde(default = "default_port_base")]
    pub sim_port_base: u16,
}

fn default_agent() -> String {
    "ma2c".to_string()
}

fn default_scenario() -> String {
    "grid".to_string()
}

fn default_grid_dim() -> usize {
    3
}

fn default_control_interval() -> f64 {
    5.0
}

fn default_yellow_interval() -> f64 {
    2.0
}

fn default_episode_length() -> f64 {
    3600.0
}

fn default_arrival_rate() -> f64 {
    0.15
}

fn default_saturation_flow() -> f64 {
    0.5
}

fn default_coop_gamma() -> f64 {
    0.75
}

fn default_norm_queue() -> f64 {
    10.0
}

fn default_test_seeds() -> Vec<u64> {
    vec![10000, 20000, 30000]
}

fn default_port_base() -> u16 {
    8000
}

/// Accepts either a list (`[1, 2]` in TOML) or a comma-separated string (INI).
fn seed_list<'de, D>(deserializer: D) -> std::result::Result<Vec<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum SeedList {
        List(Vec<u64>),
        Text(String),
    }

    match SeedList::deserialize(deserializer)? {
        SeedList::List(seeds) => Ok(seeds),
        SeedList::Text(text) => text
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<u64>().map_err(serde::de::Error::custom))
            .collect(),
    }
}

impl EnvConfig {
    /// Number of control steps in one episode
    pub fn episode_steps(&self) -> usize {
        (self.episode_length_sec / self.control_interval_sec).floor() as usize
    }

    pub fn is_naive(&self) -> bool {
        self.agent.eq_ignore_ascii_case("naive")
    }

    fn validate(&self, errors: &mut Vec<String>) {
        if self.grid_rows == 0 || self.grid_cols == 0 {
            errors.push("ENV_CONFIG.grid_rows and grid_cols must be positive".to_string());
        }
        if !(self.control_interval_sec > 0.0) {
            errors.push("ENV_CONFIG.control_interval_sec must be positive".to_string());
        }
        if !(self.yellow_interval_sec >= 0.0 && self.yellow_interval_sec < self.control_interval_sec)
        {
            errors.push(
                "ENV_CONFIG.yellow_interval_sec must be in [0, control_interval_sec)".to_string(),
            );
        }
        if self.episode_length_sec < self.control_interval_sec {
            errors.push(
                "ENV_CONFIG.episode_length_sec must cover at least one control interval"
                    .to_string(),
            );
        }
        if !(0.0..=1.0).contains(&self.arrival_rate) {
            errors.push("ENV_CONFIG.arrival_rate must be between 0 and 1".to_string());
        }
        if !(self.saturation_flow > 0.0) {
            errors.push("ENV_CONFIG.saturation_flow must be positive".to_string());
        }
        if !(0.0..=1.0).contains(&self.coop_gamma) {
            errors.push("ENV_CONFIG.coop_gamma must be between 0 and 1".to_string());
        }
        if !(self.norm_queue > 0.0) {
            errors.push("ENV_CONFIG.norm_queue must be positive".to_string());
        }
        if self.test_seeds.is_empty() {
            errors.push("ENV_CONFIG.test_seeds must list at least one seed".to_string());
        }
    }
}

/// Learning-rate schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LrDecay {
    Constant,
    Linear,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_lr_init")]
    pub lr_init: f64,
    #[serde(default = "default_lr_decay")]
    pub lr_decay: LrDecay,
    /// Floor for the linear schedule
    #[serde(default)]
    pub lr_min: f64,
    /// Discount factor
    #[serde(default = "default_gamma")]
    pub gamma: f64,
    /// Transitions collected between two updates (n-step horizon)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_entropy_coef")]
    pub entropy_coef: f64,
    #[serde(default = "default_value_coef")]
    pub value_coef: f64,
    #[serde(default = "default_max_grad_norm")]
    pub max_grad_norm: f64,
    /// Rewards are divided by this before learning
    #[serde(default = "default_reward_norm")]
    pub reward_norm: f64,
    /// Absolute clip on normalised rewards; <= 0 disables clipping
    #[serde(default = "default_reward_clip")]
    pub reward_clip: f64,
}

fn default_lr_init() -> f64 {
    5e-4
}

fn default_lr_decay() -> LrDecay {
    LrDecay::Constant
}

fn default_gamma() -> f64 {
    0.99
}

fn default_batch_size() -> usize {
    120
}

fn default_entropy_coef() -> f64 {
    0.01
}

fn default_value_coef() -> f64 {
    0.5
}

fn default_max_grad_norm() -> f64 {
    40.0
}

fn default_reward_norm() -> f64 {
    20.0
}

fn default_reward_clip() -> f64 {
    2.0
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            lr_init: default_lr_init(),
            lr_decay: default_lr_decay(),
            lr_min: 0.0,
            gamma: default_gamma(),
            batch_size: default_batch_size(),
            entropy_coef: default_entropy_coef(),
            value_coef: default_value_coef(),
            max_grad_norm: default_max_grad_norm(),
            reward_norm: default_reward_norm(),
            reward_clip: default_reward_clip(),
        }
    }
}

impl ModelConfig {
    fn validate(&self, errors: &mut Vec<String>) {
        if !(self.lr_init > 0.0) {
            errors.push("MODEL_CONFIG.lr_init must be positive".to_string());
        }
        if self.lr_min < 0.0 || self.lr_min > self.lr_init {
            errors.push("MODEL_CONFIG.lr_min must be in [0, lr_init]".to_string());
        }
        if !(self.gamma > 0.0 && self.gamma <= 1.0) {
            errors.push("MODEL_CONFIG.gamma must be in (0, 1]".to_string());
        }
        if self.batch_size == 0 {
            errors.push("MODEL_CONFIG.batch_size must be positive".to_string());
        }
        if self.entropy_coef < 0.0 {
            errors.push("MODEL_CONFIG.entropy_coef must not be negative".to_string());
        }
        if !(self.value_coef > 0.0) {
            errors.push("MODEL_CONFIG.value_coef must be positive".to_string());
        }
        if !(self.max_grad_norm > 0.0) {
            errors.push("MODEL_CONFIG.max_grad_norm must be positive".to_string());
        }
        if !(self.reward_norm > 0.0) {
            errors.push("MODEL_CONFIG.reward_norm must be positive".to_string());
        }
    }
}

/// Training schedule, in steps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrainConfig {
    pub total_step: u64,
    pub test_interval: u64,
    pub log_interval: u64,
}

/// Schedule as written in the file; budgets like `1e6` are accepted.
#[derive(Debug, Deserialize)]
struct RawTrainConfig {
    total_step: f64,
    test_interval: f64,
    log_interval: f64,
}

impl RawTrainConfig {
    fn into_validated(self, errors: &mut Vec<String>) -> TrainConfig {
        TrainConfig {
            total_step: step_count("TRAIN_CONFIG.total_step", self.total_step, errors),
            test_interval: step_count("TRAIN_CONFIG.test_interval", self.test_interval, errors),
            log_interval: step_count("TRAIN_CONFIG.log_interval", self.log_interval, errors),
        }
    }
}

fn step_count(field: &str, value: f64, errors: &mut Vec<String>) -> u64 {
    if !value.is_finite() || value < 1.0 {
        errors.push(format!("{field} must be a positive step count, got {value}"));
        return 0;
    }
    value.trunc() as u64
}

#[derive(Debug, Deserialize)]
struct RawRunConfig {
    #[serde(rename = "ENV_CONFIG", alias = "env_config")]
    env: EnvConfig,
    #[serde(rename = "MODEL_CONFIG", alias = "model_config", default)]
    model: ModelConfig,
    #[serde(rename = "TRAIN_CONFIG", alias = "train_config")]
    train: RawTrainConfig,
}

impl RunConfig {
    /// Load and validate a run configuration file.
    ///
    /// The format is inferred from the extension (`.ini` or `.toml`).
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(GreenwaveError::ConfigNotFound(path.to_path_buf()));
        }

        let raw: RawRunConfig = Config::builder()
            .add_source(File::from(path).required(true))
            .build()?
            .try_deserialize()?;

        Self::from_raw(raw)
    }

    /// Parse a configuration held in memory.
    pub fn parse_str(contents: &str, format: FileFormat) -> Result<Self> {
        let raw: RawRunConfig = Config::builder()
            .add_source(File::from_str(contents, format))
            .build()?
            .try_deserialize()?;

        Self::from_raw(raw)
    }

    fn from_raw(raw: RawRunConfig) -> Result<Self> {
        let mut errors = Vec::new();
        let train = raw.train.into_validated(&mut errors);
        let config = Self {
            env: raw.env,
            model: raw.model,
            train,
        };
        if let Err(mut field_errors) = config.validate() {
            errors.append(&mut field_errors);
        }

        if errors.is_empty() {
            Ok(config)
        } else {
            Err(GreenwaveError::InvalidConfig(errors))
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = Vec::new();

        self.env.validate(&mut errors);
        self.model.validate(&mut errors);

        if self.train.total_step == 0 {
            errors.push("TRAIN_CONFIG.total_step must be positive".to_string());
        }
        if self.train.test_interval == 0 {
            errors.push("TRAIN_CONFIG.test_interval must be positive".to_string());
        }
        if self.train.log_interval == 0 {
            errors.push("TRAIN_CONFIG.log_interval must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            errors.dedup();
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_INI: &str = r#"
[ENV_CONFIG]
seed = 12
agent = ma2c
grid_rows = 2
grid_cols = 2
episode_length_sec = 100
test_seeds = 10000, 20000

[MODEL_CONFIG]
lr_init = 1e-3
lr_decay = linear
batch_size = 10

[TRAIN_CONFIG]
total_step = 1e3
test_interval = 200
log_interval = 50
"#;

    #[test]
    fn test_parse_ini_sections() {
        let config = RunConfig::parse_str(SAMPLE_INI, FileFormat::Ini).unwrap();

        assert_eq!(config.env.seed, 12);
        assert_eq!(config.env.grid_rows, 2);
        assert_eq!(config.env.test_seeds, vec![10000, 20000]);
        assert_eq!(config.env.episode_steps(), 20);
        assert_eq!(config.model.lr_decay, LrDecay::Linear);
        assert_eq!(config.model.batch_size, 10);
        assert_eq!(
            config.train,
            TrainConfig {
                total_step: 1000,
                test_interval: 200,
                log_interval: 50,
            }
        );
    }

    #[test]
    fn test_parse_toml_with_seed_list() {
        let toml = r#"
[ENV_CONFIG]
seed = 3
agent = "naive"
test_seeds = [1, 2, 3]

[TRAIN_CONFIG]
total_step = 100
test_interval = 20
log_interval = 10
"#;
        let config = RunConfig::parse_str(toml, FileFormat::Toml).unwrap();
        assert!(config.env.is_naive());
        assert_eq!(config.env.test_seeds, vec![1, 2, 3]);
        assert_eq!(config.model, ModelConfig::default());
    }

    #[test]
    fn test_missing_section_is_config_error() {
        let ini = "[ENV_CONFIG]\nseed = 1\n\n[MODEL_CONFIG]\nlr_init = 0.1\n";
        let err = RunConfig::parse_str(ini, FileFormat::Ini).unwrap_err();
        assert!(matches!(err, GreenwaveError::Config(_)), "{err}");
    }

    #[test]
    fn test_invalid_fields_are_all_reported() {
        let ini = r#"
[ENV_CONFIG]
seed = 1
coop_gamma = 1.5

[TRAIN_CONFIG]
total_step = 0
test_interval = 10
log_interval = -1
"#;
        match RunConfig::parse_str(ini, FileFormat::Ini) {
            Err(GreenwaveError::InvalidConfig(errors)) => {
                assert!(errors.iter().any(|e| e.contains("coop_gamma")));
                assert!(errors.iter().any(|e| e.contains("total_step")));
                assert!(errors.iter().any(|e| e.contains("log_interval")));
                assert!(!errors.iter().any(|e| e.contains("test_interval")));
            }
            other => panic!("expected InvalidConfig, got {other:?}"),
        }
    }

    #[test]
    fn test_load_missing_file() {
        let err = RunConfig::load_from("/definitely/not/here.ini").unwrap_err();
        assert!(matches!(err, GreenwaveError::ConfigNotFound(_)));
    }
}
