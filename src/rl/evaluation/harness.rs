//! Concurrent Evaluation Harness
//!
//! One worker per requested agent, all started before any is awaited. Each
//! worker owns its environment and model outright; the only shared inputs are
//! the policy type and the output directory, into which every worker writes
//! files keyed by its own agent id.
//!
//! Simulator ports are partitioned up front: an agent's port is its ordinal
//! position in the requested list. The partition is checked before anything
//! is spawned, so two workers can never bind the same port.
//!
//! A failing worker is logged and reported, never propagated: the harness
//! always waits for every worker and returns a report.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info, info_span, warn};

use super::evaluator::Evaluator;
use crate::config::RunConfig;
use crate::error::{GreenwaveError, Result};
use crate::persistence::{find_config_file, DirRole};
use crate::rl::algorithms::{LinearA2c, PolicyModel};
use crate::rl::core::PolicyType;
use crate::rl::environment::{init_env, TrafficEnv};
use crate::rl::training::{EvalPolicy, TestSummary};

/// One agent's evaluation job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentEvaluationTask {
    pub agent_id: String,
    /// `<base_dir>/<agent_id>`, produced by an earlier training run
    pub source_dir: PathBuf,
    /// Ordinal position in the requested agent list
    pub assigned_port: u16,
    pub policy_type: PolicyType,
}

/// Turn the requested agent list into tasks with ordinal ports.
///
/// The port is the name's position in the requested list, so skipped
/// empty names still use up their ordinal. Duplicate names are rejected
/// because their outputs would overwrite each other.
pub fn plan_tasks(
    base_dir: &Path,
    agents: &[String],
    policy_type: PolicyType,
) -> Result<Vec<AgentEvaluationTask>> {
    let mut seen = HashSet::new();
    let mut tasks = Vec::new();

    for (ordinal, raw) in agents.iter().enumerate() {
        let agent = raw.trim();
        if agent.is_empty() {
            continue;
        }
        if !seen.insert(agent) {
            return Err(GreenwaveError::InvalidArgument(format!(
                "agent {agent} requested more than once"
            )));
        }
        let assigned_port = u16::try_from(ordinal).map_err(|_| {
            GreenwaveError::InvalidArgument(format!("too many agents ({})", agents.len()))
        })?;
        tasks.push(AgentEvaluationTask {
            agent_id: agent.to_string(),
            source_dir: base_dir.join(agent),
            assigned_port,
            policy_type,
        });
    }

    if tasks.is_empty() {
        return Err(GreenwaveError::InvalidArgument(
            "no agents to evaluate".to_string(),
        ));
    }
    Ok(tasks)
}

/// Fail closed if two tasks would bind the same simulator port.
pub fn check_port_partition(tasks: &[AgentEvaluationTask]) -> Result<()> {
    let mut owners: HashMap<u16, &str> = HashMap::new();
    for task in tasks {
        if let Some(owner) = owners.insert(task.assigned_port, &task.agent_id) {
            return Err(GreenwaveError::ResourceBusy {
                port: task.assigned_port,
                agent: owner.to_string(),
            });
        }
    }
    Ok(())
}

/// Work performed for one agent. Runs on a blocking thread.
pub trait AgentWorker: Send + Sync + 'static {
    fn evaluate(&self, task: &AgentEvaluationTask, output_dir: &Path) -> Result<TestSummary>;
}

/// Worker that loads an agent's trained run and replays the test seeds in
/// the built-in simulator.
#[derive(Debug, Clone, Default)]
pub struct SimulatorWorker;

impl AgentWorker for SimulatorWorker {
    fn evaluate(&self, task: &AgentEvaluationTask, output_dir: &Path) -> Result<TestSummary> {
        if !task.source_dir.is_dir() {
            return Err(GreenwaveError::AgentNotFound(task.source_dir.clone()));
        }

        let data_dir = task.source_dir.join(DirRole::Data.dir_name());
        let config_path = find_config_file(&data_dir)
            .ok_or_else(|| GreenwaveError::ConfigNotFound(data_dir.clone()))?;
        let config = RunConfig::load_from(&config_path)?;

        let naive = config.env.is_naive();
        let (mut env, controller) = init_env(&config.env, task.assigned_port, naive)?;
        env.set_agent(&task.agent_id);
        let dims = env.dims();
        info!(
            "Evaluation: s dim {}, a dim {}, s dim ls {:?}, a dim ls {:?}, seed {}, port {}",
            dims.n_s,
            dims.n_a,
            dims.n_s_ls,
            dims.n_a_ls,
            config.env.seed,
            env.port()
        );

        let summary = match controller {
            Some(controller) => {
                let mut evaluator =
                    Evaluator::new(&mut env, EvalPolicy::Naive(&controller), output_dir, 0);
                evaluator.run()?
            }
            None => {
                let mut model = LinearA2c::new(env.dims(), 0, &config.model, None);
                let model_step = model.load(&task.source_dir.join(DirRole::Model.dir_name()))?;
                let policy = EvalPolicy::Learned {
                    model: &mut model,
                    policy_type: task.policy_type,
                };
                let mut evaluator = Evaluator::new(&mut env, policy, output_dir, model_step);
                evaluator.run()?
            }
        };
        Ok(summary)
    }
}

/// Final state of one agent's evaluation
#[derive(Debug, Clone, PartialEq)]
pub enum AgentOutcome {
    Completed { mean_reward: f64, episodes: usize },
    Failed { reason: String },
}

impl AgentOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, AgentOutcome::Completed { .. })
    }
}

impl fmt::Display for AgentOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentOutcome::Completed {
                mean_reward,
                episodes,
            } => write!(f, "completed, avg R {:.2} over {} episodes", mean_reward, episodes),
            AgentOutcome::Failed { reason } => write!(f, "failed: {}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgentReport {
    pub agent_id: String,
    pub port: u16,
    pub outcome: AgentOutcome,
}

/// Per-agent outcomes, ordered by assigned port
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluationReport {
    pub agents: Vec<AgentReport>,
}

impl EvaluationReport {
    pub fn get(&self, agent_id: &str) -> Option<&AgentReport> {
        self.agents.iter().find(|r| r.agent_id == agent_id)
    }

    pub fn completed(&self) -> usize {
        self.agents.iter().filter(|r| r.outcome.is_completed()).count()
    }

    pub fn failed(&self) -> usize {
        self.agents.len() - self.completed()
    }

    pub fn log_summary(&self) {
        info!(
            "Evaluation finished: {} completed, {} failed",
            self.completed(),
            self.failed()
        );
        for report in &self.agents {
            info!("  [port {}] {}: {}", report.port, report.agent_id, report.outcome);
        }
    }
}

/// Runs every task concurrently and waits for all of them
pub struct EvaluationHarness<W: AgentWorker> {
    worker: Arc<W>,
    output_dir: PathBuf,
}

impl<W: AgentWorker> EvaluationHarness<W> {
    pub fn new(worker: W, output_dir: &Path) -> Self {
        Self {
            worker: Arc::new(worker),
            output_dir: output_dir.to_path_buf(),
        }
    }

    /// Start one worker per task, then drain all of them.
    ///
    /// Only a broken port partition is returned as an error, and it is
    /// detected before any worker starts.
    pub async fn run(&self, tasks: Vec<AgentEvaluationTask>) -> Result<EvaluationReport> {
        check_port_partition(&tasks)?;

        let mut workers = JoinSet::new();
        for task in &tasks {
            let task = task.clone();
            let worker = Arc::clone(&self.worker);
            let output_dir = self.output_dir.clone();
            let span = info_span!("evaluate", agent = %task.agent_id, port = task.assigned_port);

            workers.spawn_blocking(move || {
                let _entered = span.enter();
                let result = worker.evaluate(&task, &output_dir);
                (task, result)
            });
        }
        info!("Started {} evaluation workers", tasks.len());

        let mut outcomes: HashMap<String, AgentOutcome> = HashMap::new();
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((task, Ok(summary))) => {
                    outcomes.insert(
                        task.agent_id,
                        AgentOutcome::Completed {
                            mean_reward: summary.mean_reward,
                            episodes: summary.episodes.len(),
                        },
                    );
                }
                Ok((task, Err(e))) => {
                    error!("Evaluation: {} failed: {}", task.agent_id, e);
                    outcomes.insert(
                        task.agent_id,
                        AgentOutcome::Failed {
                            reason: e.to_string(),
                        },
                    );
                }
                Err(e) => {
                    error!("Evaluation worker aborted: {}", e);
                }
            }
        }

        let mut agents: Vec<AgentReport> = tasks
            .into_iter()
            .map(|task| {
                let outcome = outcomes.remove(&task.agent_id).unwrap_or_else(|| {
                    warn!("No result reported for {}", task.agent_id);
                    AgentOutcome::Failed {
                        reason: "worker aborted before reporting".to_string(),
                    }
                });
                AgentReport {
                    agent_id: task.agent_id,
                    port: task.assigned_port,
                    outcome,
                }
            })
            .collect();
        agents.sort_by_key(|r| r.port);

        Ok(EvaluationReport { agents })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::tempdir;

    /// Records which ports it saw; fails for agents named in `failing`.
    #[derive(Default)]
    struct RecordingWorker {
        seen: Mutex<Vec<(String, u16)>>,
        failing: Vec<String>,
        panicking: Vec<String>,
    }

    impl AgentWorker for RecordingWorker {
        fn evaluate(&self, task: &AgentEvaluationTask, output_dir: &Path) -> Result<TestSummary> {
            self.seen
                .lock()
                .unwrap()
                .push((task.agent_id.clone(), task.assigned_port));
            if self.panicking.contains(&task.agent_id) {
                panic!("worker for {} crashed", task.agent_id);
            }
            if self.failing.contains(&task.agent_id) {
                return Err(GreenwaveError::ModelLoad {
                    dir: task.source_dir.join("model"),
                    reason: "missing".to_string(),
                });
            }
            std::fs::write(output_dir.join(format!("{}_reward.csv", task.agent_id)), "ok")?;
            Ok(TestSummary::default())
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_plan_assigns_ordinal_ports() {
        let tasks = plan_tasks(
            Path::new("/runs"),
            &names(&["a", "", " b ", "c"]),
            PolicyType::Deterministic,
        )
        .unwrap();
        let ports: Vec<(&str, u16)> = tasks
            .iter()
            .map(|t| (t.agent_id.as_str(), t.assigned_port))
            .collect();
        // the empty entry keeps its ordinal
        assert_eq!(ports, vec![("a", 0), ("b", 2), ("c", 3)]);
        assert_eq!(tasks[1].source_dir, PathBuf::from("/runs/b"));
        assert!(tasks.iter().all(|t| t.policy_type == PolicyType::Deterministic));
    }

    #[test]
    fn test_plan_rejects_duplicates_and_empty() {
        assert!(matches!(
            plan_tasks(Path::new("/runs"), &names(&["a", "b", "a"]), PolicyType::Default),
            Err(GreenwaveError::InvalidArgument(_))
        ));
        assert!(matches!(
            plan_tasks(Path::new("/runs"), &names(&["", " "]), PolicyType::Default),
            Err(GreenwaveError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_port_collision_fails_closed() {
        let mut tasks =
            plan_tasks(Path::new("/runs"), &names(&["a", "b"]), PolicyType::Default).unwrap();
        tasks[1].assigned_port = 0;
        assert!(matches!(
            check_port_partition(&tasks),
            Err(GreenwaveError::ResourceBusy { port: 0, .. })
        ));
    }

    #[tokio::test]
    async fn test_failure_is_contained() {
        let tmp = tempdir().unwrap();
        let worker = RecordingWorker {
            failing: names(&["b"]),
            ..Default::default()
        };
        let harness = EvaluationHarness::new(worker, tmp.path());
        let tasks =
            plan_tasks(tmp.path(), &names(&["a", "b", "c"]), PolicyType::Default).unwrap();

        let report = harness.run(tasks).await.unwrap();

        let mut seen = harness.worker.seen.lock().unwrap().clone();
        seen.sort();
        assert_eq!(
            seen,
            vec![("a".to_string(), 0), ("b".to_string(), 1), ("c".to_string(), 2)]
        );
        assert_eq!(report.completed(), 2);
        assert!(!report.get("b").unwrap().outcome.is_completed());
        assert!(tmp.path().join("a_reward.csv").exists());
        assert!(!tmp.path().join("b_reward.csv").exists());
        assert!(tmp.path().join("c_reward.csv").exists());
        let ports: Vec<u16> = report.agents.iter().map(|r| r.port).collect();
        assert_eq!(ports, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_panicking_worker_is_reported() {
        let tmp = tempdir().unwrap();
        let worker = RecordingWorker {
            panicking: names(&["b"]),
            ..Default::default()
        };
        let harness = EvaluationHarness::new(worker, tmp.path());
        let tasks = plan_tasks(tmp.path(), &names(&["a", "b"]), PolicyType::Default).unwrap();

        let report = harness.run(tasks).await.unwrap();

        assert!(report.get("a").unwrap().outcome.is_completed());
        assert!(matches!(
            report.get("b").unwrap().outcome,
            AgentOutcome::Failed { .. }
        ));
    }

    #[test]
    fn test_simulator_worker_missing_agent_dir() {
        let tmp = tempdir().unwrap();
        let task = plan_tasks(tmp.path(), &names(&["naive"]), PolicyType::Default)
            .unwrap()
            .remove(0);
        let err = SimulatorWorker.evaluate(&task, tmp.path()).unwrap_err();
        match err {
            GreenwaveError::AgentNotFound(dir) => assert_eq!(dir, tmp.path().join("naive")),
            other => panic!("unexpected error {other:?}"),
        }
    }
}
