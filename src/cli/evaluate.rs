//! `greenwave evaluate`

use std::path::Path;
use tracing::info;

use crate::error::Result;
use crate::persistence::{DirRole, RunDirectories};
use crate::rl::core::PolicyType;
use crate::rl::evaluation::{
    plan_tasks, AgentEvaluationTask, AgentWorker, EvaluationHarness, EvaluationReport,
    SimulatorWorker,
};

pub struct EvaluationSession {
    dirs: RunDirectories,
    tasks: Vec<AgentEvaluationTask>,
    policy_type: PolicyType,
}

impl EvaluationSession {
    /// Plan one task per agent and create `eva_data/` and `eva_log/`.
    ///
    /// An unusable agent list is rejected before any directory is created.
    pub fn prepare(base_dir: &Path, agents: &[String], policy_type: PolicyType) -> Result<Self> {
        let tasks = plan_tasks(base_dir, agents, policy_type)?;
        let dirs = RunDirectories::init(base_dir, &DirRole::EVALUATION)?;
        Ok(Self {
            dirs,
            tasks,
            policy_type,
        })
    }

    pub fn tasks(&self) -> &[AgentEvaluationTask] {
        &self.tasks
    }

    pub fn dirs(&self) -> &RunDirectories {
        &self.dirs
    }

    pub fn log_dir(&self) -> Result<&Path> {
        self.dirs.path(DirRole::EvaLog)
    }

    pub async fn run(self) -> Result<EvaluationReport> {
        self.run_with(SimulatorWorker).await
    }

    pub async fn run_with<W: AgentWorker>(self, worker: W) -> Result<EvaluationReport> {
        let output_dir = self.dirs.path(DirRole::EvaData)?;
        info!(
            "Evaluation: policy type {}, agents {:?}",
            self.policy_type,
            self.tasks.iter().map(|t| t.agent_id.as_str()).collect::<Vec<_>>()
        );

        let harness = EvaluationHarness::new(worker, output_dir);
        let report = harness.run(self.tasks).await?;
        report.log_summary();
        Ok(report)
    }
}
