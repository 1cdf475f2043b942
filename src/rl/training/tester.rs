//! Test episodes
//!
//! Runs the fixed-seed test episodes against either a learned model or the
//! rule-based controller. Used for in-loop tests during training, for the
//! post-training offline test, and by the evaluation harness.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::Result;
use crate::rl::algorithms::PolicyModel;
use crate::rl::core::{PolicyType, StepCounter};
use crate::rl::environment::{GreedyController, TrafficEnv};

pub const TEST_REWARD_FILE: &str = "test_reward.csv";

/// Who picks the actions during a test episode
pub enum EvalPolicy<'a> {
    Learned {
        model: &'a mut dyn PolicyModel,
        policy_type: PolicyType,
    },
    Naive(&'a GreedyController),
}

impl EvalPolicy<'_> {
    fn act(&mut self, env: &mut dyn TrafficEnv, observations: &[Vec<f32>]) -> Vec<usize> {
        match self {
            EvalPolicy::Learned { model, policy_type } => {
                let output = model.forward(observations);
                env.update_fingerprint(&output.policies);
                model.select_actions(&output.policies, *policy_type)
            }
            EvalPolicy::Naive(controller) => controller.act(observations),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            EvalPolicy::Learned { policy_type, .. } => format!("learned ({})", policy_type),
            EvalPolicy::Naive(_) => "naive".to_string(),
        }
    }
}

/// One row of a reward CSV
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardRecord {
    pub agent: String,
    pub step: u64,
    /// Test episode index, or -1 for a training episode
    pub test_id: i64,
    pub avg_reward: f64,
    pub std_reward: f64,
}

/// Outcome of one episode
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeStats {
    pub steps: usize,
    pub avg_reward: f64,
    pub std_reward: f64,
}

impl EpisodeStats {
    pub fn from_rewards(rewards: &[f32]) -> Self {
        let (avg_reward, std_reward) = mean_std(rewards.iter().map(|&r| r as f64));
        Self {
            steps: rewards.len(),
            avg_reward,
            std_reward,
        }
    }
}

/// Aggregate over all test episodes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TestSummary {
    pub episodes: Vec<EpisodeStats>,
    pub mean_reward: f64,
    pub std_reward: f64,
}

impl TestSummary {
    fn from_episodes(episodes: Vec<EpisodeStats>) -> Self {
        let (mean_reward, std_reward) = mean_std(episodes.iter().map(|e| e.avg_reward));
        Self {
            episodes,
            mean_reward,
            std_reward,
        }
    }

    pub fn records(&self, agent: &str, step: u64) -> Vec<RewardRecord> {
        self.episodes
            .iter()
            .enumerate()
            .map(|(i, e)| RewardRecord {
                agent: agent.to_string(),
                step,
                test_id: i as i64,
                avg_reward: e.avg_reward,
                std_reward: e.std_reward,
            })
            .collect()
    }
}

/// Run test episode `test_index` to completion
pub fn run_test_episode(
    env: &mut dyn TrafficEnv,
    policy: &mut EvalPolicy<'_>,
    test_index: usize,
) -> Result<EpisodeStats> {
    let mut observations = env.reset(Some(test_index))?;
    let mut rewards = Vec::new();

    loop {
        let actions = policy.act(env, &observations);
        let step = env.step(&actions)?;
        rewards.push(step.global_reward);
        if step.done {
            break;
        }
        observations = step.observations;
    }
    env.terminate();

    let stats = EpisodeStats::from_rewards(&rewards);
    debug!(
        "Test episode {} finished: {} steps, avg R {:.2}",
        test_index, stats.steps, stats.avg_reward
    );
    Ok(stats)
}

/// Run every configured test episode
pub fn run_tests(env: &mut dyn TrafficEnv, policy: &mut EvalPolicy<'_>) -> Result<TestSummary> {
    let mut episodes = Vec::with_capacity(env.test_num());
    for test_index in 0..env.test_num() {
        episodes.push(run_test_episode(env, policy, test_index)?);
    }
    Ok(TestSummary::from_episodes(episodes))
}

/// Run all test episodes with recording on, then write the reward rows to
/// `reward_path` and the environment's traffic data into `output_dir`.
pub fn run_recorded(
    env: &mut dyn TrafficEnv,
    policy: &mut EvalPolicy<'_>,
    step: u64,
    reward_path: &Path,
    output_dir: &Path,
) -> Result<(TestSummary, Vec<PathBuf>)> {
    env.init_recording(true);
    let result = run_tests(env, policy);
    let summary = match result {
        Ok(summary) => summary,
        Err(e) => {
            env.init_recording(false);
            return Err(e);
        }
    };

    write_reward_csv(reward_path, &summary.records(env.agent(), step))?;
    let mut written = vec![reward_path.to_path_buf()];
    written.extend(env.output_data(output_dir)?);
    env.init_recording(false);

    Ok((summary, written))
}

/// Write reward rows as CSV, replacing any previous file
pub fn write_reward_csv(path: &Path, records: &[RewardRecord]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Post-training offline tester
pub struct Tester<'a> {
    env: &'a mut dyn TrafficEnv,
    policy: EvalPolicy<'a>,
    counter: &'a StepCounter,
}

impl<'a> Tester<'a> {
    pub fn new(env: &'a mut dyn TrafficEnv, policy: EvalPolicy<'a>, counter: &'a StepCounter) -> Self {
        Self {
            env,
            policy,
            counter,
        }
    }

    /// Test the final model and write `test_reward.csv` plus traffic data
    /// into `data_dir`.
    pub fn run_offline(&mut self, data_dir: &Path) -> Result<TestSummary> {
        let step = self.counter.current_step();
        info!(
            "Offline testing {} policy at step {} over {} episodes",
            self.policy.describe(),
            step,
            self.env.test_num()
        );

        let (summary, written) = run_recorded(
            &mut *self.env,
            &mut self.policy,
            step,
            &data_dir.join(TEST_REWARD_FILE),
            data_dir,
        )?;

        info!(
            "Offline testing: avg R {:.2}, std R {:.2}",
            summary.mean_reward, summary.std_reward
        );
        debug!("Offline test outputs: {:?}", written);
        Ok(summary)
    }
}

pub(crate) fn mean_std(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let values: Vec<f64> = values.collect();
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}
