//! Training Loop
//!
//! Drives the step counter through repeated environment/model interaction
//! until the step budget is spent.
//!
//! In-loop tests reuse the training environment, which cannot be reset in
//! the middle of an episode. A test requested by the counter is therefore
//! run at the end of the episode in which it was requested; several
//! requests inside one episode collapse into one test pass.

use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::summary::SummaryWriter;
use super::tester::{mean_std, run_tests, write_reward_csv, EpisodeStats, EvalPolicy, RewardRecord};
use crate::error::Result;
use crate::rl::algorithms::{PolicyModel, Transition};
use crate::rl::core::{PolicyType, StepCounter};
use crate::rl::environment::TrafficEnv;

pub const TRAIN_REWARD_FILE: &str = "train_reward.csv";

/// Summary of a finished training run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingStats {
    /// Episodes started (the last one may be cut short by the budget)
    pub episodes: usize,
    /// Model updates performed
    pub updates: usize,
    /// In-loop test passes run
    pub in_loop_tests: usize,
    /// Counter value when the loop exited
    pub final_step: u64,
    /// Mean of per-episode average rewards
    pub avg_episode_reward: f64,
}

/// Training driver for one run
pub struct Trainer<'a, E: TrafficEnv, M: PolicyModel> {
    env: &'a mut E,
    model: &'a mut M,
    counter: &'a mut StepCounter,
    summary: &'a mut SummaryWriter,
    in_train_test: bool,
    batch_size: usize,
    output_dir: PathBuf,
    records: Vec<RewardRecord>,
}

impl<'a, E: TrafficEnv, M: PolicyModel> Trainer<'a, E, M> {
    pub fn new(
        env: &'a mut E,
        model: &'a mut M,
        counter: &'a mut StepCounter,
        summary: &'a mut SummaryWriter,
        in_train_test: bool,
        batch_size: usize,
        output_dir: &Path,
    ) -> Self {
        Self {
            env,
            model,
            counter,
            summary,
            in_train_test,
            batch_size: batch_size.max(1),
            output_dir: output_dir.to_path_buf(),
            records: Vec::new(),
        }
    }

    /// Run until the counter is done, then write `train_reward.csv`.
    pub fn run(mut self) -> Result<TrainingStats> {
        let mut stats = TrainingStats::default();
        let mut episode_rewards = Vec::new();

        info!(
            "Training started: total_step={}, test_interval={}, log_interval={}, in_train_test={}",
            self.counter.total_step(),
            self.counter.test_interval(),
            self.counter.log_interval(),
            self.in_train_test
        );

        while !self.counter.is_done() {
            let (episode, test_requested) = self.explore(&mut stats)?;
            stats.episodes += 1;
            episode_rewards.push(episode.avg_reward);

            let step = self.counter.current_step();
            self.summary.add_scalar("train_reward", episode.avg_reward, step)?;
            self.records.push(RewardRecord {
                agent: self.env.agent().to_string(),
                step,
                test_id: -1,
                avg_reward: episode.avg_reward,
                std_reward: episode.std_reward,
            });
            debug!(
                "Episode {} done at step {}: {} steps, avg R {:.2}",
                stats.episodes, step, episode.steps, episode.avg_reward
            );

            if test_requested {
                self.test(step)?;
                stats.in_loop_tests += 1;
            }
        }

        stats.final_step = self.counter.current_step();
        stats.avg_episode_reward = mean_std(episode_rewards.into_iter()).0;

        write_reward_csv(&self.output_dir.join(TRAIN_REWARD_FILE), &self.records)?;
        self.summary.flush()?;

        info!(
            "Training finished at step {}: {} episodes, {} updates, {} in-loop tests",
            stats.final_step, stats.episodes, stats.updates, stats.in_loop_tests
        );
        Ok(stats)
    }

    /// Play one training episode, or what is left of the budget.
    ///
    /// Returns the episode's reward statistics and whether an in-loop test
    /// was requested during it.
    fn explore(&mut self, stats: &mut TrainingStats) -> Result<(EpisodeStats, bool)> {
        let mut observations = self.env.reset(None)?;
        let mut rewards = Vec::new();
        let mut test_requested = false;
        let mut since_update = 0usize;

        loop {
            let output = self.model.forward(&observations);
            self.env.update_fingerprint(&output.policies);
            let actions = self
                .model
                .select_actions(&output.policies, PolicyType::Stochastic);

            let result = self.env.step(&actions)?;
            let global_step = self.counter.advance()?;
            rewards.push(result.global_reward);

            self.model.add_transition(Transition {
                observations,
                actions,
                rewards: result.rewards,
                values: output.values,
                done: result.done,
            });
            since_update += 1;

            if self.counter.should_log(global_step) {
                let (avg, _) = mean_std(rewards.iter().map(|&r| r as f64));
                info!(
                    "Training: global step {}/{} ({:.1}%), episode avg R {:.2}",
                    global_step,
                    self.counter.total_step(),
                    self.counter.progress() * 100.0,
                    avg
                );
            }
            if self.in_train_test && self.counter.should_test(global_step) {
                test_requested = true;
            }

            let episode_over = result.done || self.counter.is_done();
            if episode_over || since_update >= self.batch_size {
                let last_values = if result.done {
                    vec![0.0; self.env.dims().n_agents()]
                } else {
                    self.model.forward(&result.observations).values
                };
                let update = self.model.backward(&last_values, global_step)?;
                stats.updates += 1;
                since_update = 0;

                self.summary.add_scalar("policy_loss", update.policy_loss as f64, global_step)?;
                self.summary.add_scalar("value_loss", update.value_loss as f64, global_step)?;
                self.summary.add_scalar("entropy", update.entropy as f64, global_step)?;
                self.summary.add_scalar("lr", update.lr as f64, global_step)?;
            }

            if episode_over {
                self.env.terminate();
                return Ok((EpisodeStats::from_rewards(&rewards), test_requested));
            }
            observations = result.observations;
        }
    }

    /// In-loop test pass over every test seed; consumes no training steps.
    fn test(&mut self, step: u64) -> Result<()> {
        let mut policy = EvalPolicy::Learned {
            model: &mut *self.model,
            policy_type: PolicyType::Deterministic,
        };
        let summary = run_tests(&mut *self.env, &mut policy)?;

        info!(
            "Testing at step {}: avg R {:.2}, std R {:.2}",
            step, summary.mean_reward, summary.std_reward
        );
        self.summary.add_scalar("test_reward", summary.mean_reward, step)?;
        self.records.extend(summary.records(self.env.agent(), step));
        Ok(())
    }
}
