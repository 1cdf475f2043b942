pub mod cli;
pub mod config;
pub mod error;
pub mod persistence;
pub mod rl;

pub use cli::{EvaluationSession, TrainingSession};
pub use config::RunConfig;
pub use error::{GreenwaveError, Result};
pub use persistence::{DirRole, RunDirectories};
