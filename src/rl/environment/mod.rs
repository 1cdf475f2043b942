//! Traffic Environment for RL Training
//!
//! This module defines the environment interface the training and
//! evaluation drivers talk to, plus an in-process grid simulator and a
//! rule-based baseline controller.

mod controller;
mod grid;

pub use controller::GreedyController;
pub use grid::{SimulatedGrid, TrafficRecord, LANES_PER_NODE, NUM_PHASES};

use std::path::{Path, PathBuf};

use crate::config::EnvConfig;
use crate::error::Result;

/// Observation / action dimensions, global and per sub-agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvDims {
    /// Total state dimension across agents
    pub n_s: usize,
    /// Total action dimension across agents
    pub n_a: usize,
    /// State dimension per agent (own + discounted neighbour queues)
    pub n_s_ls: Vec<usize>,
    /// Action dimension per agent
    pub n_a_ls: Vec<usize>,
    /// Neighbour part of each agent's state
    pub n_w_ls: Vec<usize>,
    /// Neighbour policy fingerprint size per agent
    pub n_f_ls: Vec<usize>,
}

impl EnvDims {
    pub fn n_agents(&self) -> usize {
        self.n_s_ls.len()
    }

    /// Length of the observation vector handed to agent `i`
    pub fn input_dim(&self, i: usize) -> usize {
        self.n_s_ls[i] + self.n_f_ls[i]
    }
}

/// One signalised intersection and its place in the topology
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub name: String,
    /// Indices of adjacent nodes
    pub neighbors: Vec<usize>,
    /// Incoming lanes served by each phase
    pub phases: Vec<Vec<usize>>,
    /// Number of incoming lanes
    pub lanes: usize,
}

/// Result of one control step
#[derive(Debug, Clone)]
pub struct EnvStep {
    /// Next observation per agent
    pub observations: Vec<Vec<f32>>,
    /// Spatially discounted reward per agent
    pub rewards: Vec<f32>,
    /// Episode finished
    pub done: bool,
    /// Undiscounted network-wide reward
    pub global_reward: f32,
}

/// Interface between the orchestration layer and a traffic simulator.
///
/// One instance is bound to one simulator port and is owned by exactly one
/// driver for its lifetime.
pub trait TrafficEnv: Send {
    fn dims(&self) -> &EnvDims;

    fn node_names(&self) -> &[String];

    fn nodes(&self) -> &[Node];

    /// Simulator port this environment is bound to
    fn port(&self) -> u16;

    /// Identifier used to key output files
    fn agent(&self) -> &str;

    fn set_agent(&mut self, agent: &str);

    /// Number of test episodes (one per configured test seed)
    fn test_num(&self) -> usize;

    /// Enable or disable per-step traffic recording
    fn init_recording(&mut self, enabled: bool);

    /// Start a new episode. `Some(i)` starts test episode `i` with its fixed seed.
    fn reset(&mut self, test_index: Option<usize>) -> Result<Vec<Vec<f32>>>;

    /// Feed the agents' latest policies back as neighbour fingerprints
    fn update_fingerprint(&mut self, policies: &[Vec<f32>]);

    fn step(&mut self, actions: &[usize]) -> Result<EnvStep>;

    /// Close the current episode
    fn terminate(&mut self);

    /// Write recorded traffic data into `dir`, keyed by agent
    fn output_data(&self, dir: &Path) -> Result<Vec<PathBuf>>;
}

/// Build an environment bound to `port`, optionally with a naive controller.
pub fn init_env(
    config: &EnvConfig,
    port: u16,
    naive_policy: bool,
) -> Result<(SimulatedGrid, Option<GreedyController>)> {
    let env = SimulatedGrid::new(config, port)?;
    let controller = if naive_policy {
        Some(GreedyController::new(env.nodes().to_vec()))
    } else {
        None
    };
    Ok((env, controller))
}
