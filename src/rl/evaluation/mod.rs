//! Evaluation of trained agents
//!
//! Replays each agent's test seeds concurrently and collects the results in
//! a shared output directory.

pub mod evaluator;
pub mod harness;

pub use evaluator::{reward_file_name, Evaluator};
pub use harness::{
    check_port_partition, plan_tasks, AgentEvaluationTask, AgentOutcome, AgentReport,
    AgentWorker, EvaluationHarness, EvaluationReport, SimulatorWorker,
};
