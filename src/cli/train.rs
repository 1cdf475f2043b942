//! `greenwave train`
//!
//! Preparation (config parse, test-mode resolution, directory layout) is
//! split from the run itself so the caller can install logging into the new
//! `log/` directory in between. A bad config or mode fails in `prepare`,
//! before any directory exists.

use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::RunConfig;
use crate::error::Result;
use crate::persistence::{snapshot_config, DirRole, RunDirectories};
use crate::rl::algorithms::{LinearA2c, PolicyModel};
use crate::rl::core::{PolicyType, StepCounter, TestMode, TestModeFlags};
use crate::rl::environment::{init_env, TrafficEnv};
use crate::rl::training::{
    EvalPolicy, SummaryWriter, TestSummary, Tester, Trainer, TrainingStats,
};

/// Port slot of the single training simulator
pub const TRAIN_PORT_SLOT: u16 = 1;

/// What a finished training run produced
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub stats: TrainingStats,
    pub post_test: Option<TestSummary>,
    pub final_step: u64,
    pub checkpoint: PathBuf,
}

pub struct TrainingSession {
    config: RunConfig,
    config_path: PathBuf,
    mode: TestMode,
    flags: TestModeFlags,
    dirs: RunDirectories,
}

impl TrainingSession {
    pub fn prepare(base_dir: &Path, config_path: &Path, mode: TestMode) -> Result<Self> {
        let config = RunConfig::load_from(config_path)?;
        let flags = mode.flags();
        let dirs = RunDirectories::init(base_dir, &DirRole::TRAINING)?;

        Ok(Self {
            config,
            config_path: config_path.to_path_buf(),
            mode,
            flags,
            dirs,
        })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn dirs(&self) -> &RunDirectories {
        &self.dirs
    }

    pub fn flags(&self) -> TestModeFlags {
        self.flags
    }

    pub fn log_dir(&self) -> Result<&Path> {
        self.dirs.path(DirRole::Log)
    }

    /// Train, optionally test, then save the model tagged with the final step.
    pub fn run(self) -> Result<TrainingOutcome> {
        let data_dir = self.dirs.path(DirRole::Data)?;
        let model_dir = self.dirs.path(DirRole::Model)?;
        let log_dir = self.dirs.path(DirRole::Log)?;

        snapshot_config(&self.config_path, data_dir)?;
        info!(
            "Training {} from {:?} with test mode {}",
            self.config.env.agent, self.config_path, self.mode
        );
        if self.config.env.is_naive() {
            warn!("Config names the naive controller; training a learned model anyway");
        }

        let (mut env, _) = init_env(&self.config.env, TRAIN_PORT_SLOT, false)?;
        let dims = env.dims();
        info!(
            "Training: s dim {}, a dim {}, s dim ls {:?}, a dim ls {:?}",
            dims.n_s, dims.n_a, dims.n_s_ls, dims.n_a_ls
        );

        let mut counter = StepCounter::from_config(&self.config.train)?;
        let mut model = LinearA2c::new(
            env.dims(),
            counter.total_step(),
            &self.config.model,
            Some(self.config.env.seed),
        );
        let mut summary = SummaryWriter::create(log_dir)?;

        let stats = Trainer::new(
            &mut env,
            &mut model,
            &mut counter,
            &mut summary,
            self.flags.in_train_test,
            self.config.model.batch_size,
            data_dir,
        )
        .run()?;

        let post_test = if self.flags.post_test {
            let policy = EvalPolicy::Learned {
                model: &mut model,
                policy_type: PolicyType::Deterministic,
            };
            Some(Tester::new(&mut env, policy, &counter).run_offline(data_dir)?)
        } else {
            None
        };

        let final_step = counter.current_step();
        info!("Training: save final model at step {}", final_step);
        let checkpoint = model.save(model_dir, final_step)?;

        Ok(TrainingOutcome {
            stats,
            post_test,
            final_step,
            checkpoint,
        })
    }
}
