//! Reinforcement Learning Module
//!
//! Everything between the command line and the simulator: the step counter
//! and test scheduling, the environment interface, the model, and the
//! training and evaluation drivers.

pub mod algorithms;
pub mod core;
pub mod environment;
pub mod evaluation;
pub mod training;

pub use algorithms::{LinearA2c, PolicyModel};
pub use core::{resolve, PolicyType, StepCounter, TestMode, TestModeFlags};
pub use environment::{init_env, EnvDims, GreedyController, SimulatedGrid, TrafficEnv};
pub use evaluation::{EvaluationHarness, EvaluationReport, SimulatorWorker};
pub use training::{Checkpointer, SummaryWriter, Tester, Trainer};
