//! Per-agent evaluator
//!
//! Runs the test episodes for one agent and writes its outputs into the
//! shared evaluation directory. Every file name is keyed by the agent
//! identifier, so concurrent evaluators never write the same file.

use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::Result;
use crate::rl::environment::TrafficEnv;
use crate::rl::training::{run_recorded, EvalPolicy, TestSummary};

pub fn reward_file_name(agent: &str) -> String {
    format!("{}_reward.csv", agent)
}

pub struct Evaluator<'a> {
    env: &'a mut dyn TrafficEnv,
    policy: EvalPolicy<'a>,
    output_dir: PathBuf,
    /// Step the evaluated parameters were saved at
    model_step: u64,
}

impl<'a> Evaluator<'a> {
    pub fn new(
        env: &'a mut dyn TrafficEnv,
        policy: EvalPolicy<'a>,
        output_dir: &Path,
        model_step: u64,
    ) -> Self {
        Self {
            env,
            policy,
            output_dir: output_dir.to_path_buf(),
            model_step,
        }
    }

    /// Write `<agent>_reward.csv` and the environment's `<agent>_*` traffic
    /// files into the output directory.
    pub fn run(&mut self) -> Result<TestSummary> {
        let agent = self.env.agent().to_string();
        info!(
            "Evaluating {} with {} policy over {} episodes on port {}",
            agent,
            self.policy.describe(),
            self.env.test_num(),
            self.env.port()
        );

        let reward_path = self.output_dir.join(reward_file_name(&agent));
        let (summary, written) = run_recorded(
            &mut *self.env,
            &mut self.policy,
            self.model_step,
            &reward_path,
            &self.output_dir,
        )?;

        info!(
            "Evaluation of {} done: avg R {:.2}, std R {:.2}, wrote {} files",
            agent,
            summary.mean_reward,
            summary.std_reward,
            written.len()
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rl::environment::GreedyController;
    use crate::rl::training::tester::tests::MockEnv;
    use tempfile::tempdir;

    #[test]
    fn test_outputs_keyed_by_agent() {
        let tmp = tempdir().unwrap();
        let mut env = MockEnv::new(3, 2);
        env.set_agent("greedy");
        let controller = GreedyController::new(env.nodes.clone());

        let summary = Evaluator::new(&mut env, EvalPolicy::Naive(&controller), tmp.path(), 0)
            .run()
            .unwrap();

        assert_eq!(summary.episodes.len(), 2);
        assert!(tmp.path().join("greedy_reward.csv").exists());
        assert!(tmp.path().join("greedy_traffic.csv").exists());
    }
}
