//! RL Algorithms
//!
//! The model interface used by the training and evaluation drivers, and a
//! multi-agent advantage actor-critic that implements it.

pub mod a2c;

pub use a2c::LinearA2c;

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::rl::core::PolicyType;

/// Policy and value estimates for every agent at one step
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolicyOutput {
    /// Action distribution per agent
    pub policies: Vec<Vec<f32>>,
    /// State value per agent
    pub values: Vec<f32>,
}

/// One multi-agent transition kept until the next update
#[derive(Debug, Clone)]
pub struct Transition {
    pub observations: Vec<Vec<f32>>,
    pub actions: Vec<usize>,
    pub rewards: Vec<f32>,
    pub values: Vec<f32>,
    pub done: bool,
}

/// Losses reported by an update
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UpdateStats {
    pub policy_loss: f32,
    pub value_loss: f32,
    pub entropy: f32,
    pub lr: f32,
    /// Transitions consumed by the update
    pub batch_len: usize,
}

/// Trainable multi-agent policy
pub trait PolicyModel: Send {
    fn forward(&self, observations: &[Vec<f32>]) -> PolicyOutput;

    fn select_actions(&mut self, policies: &[Vec<f32>], policy_type: PolicyType) -> Vec<usize>;

    fn add_transition(&mut self, transition: Transition);

    /// Update from the buffered transitions, bootstrapping from `last_values`.
    fn backward(&mut self, last_values: &[f32], step: u64) -> Result<UpdateStats>;

    /// Persist parameters tagged with `step`.
    fn save(&self, dir: &Path, step: u64) -> Result<PathBuf>;

    /// Load the latest parameters in `dir`, returning the step they were saved at.
    fn load(&mut self, dir: &Path) -> Result<u64>;
}
