//! Greenwave CLI
//!
//! Commands:
//! - `greenwave train` - Train an agent into `<base-dir>/{log,data,model}`
//! - `greenwave evaluate` - Evaluate trained agents into `<base-dir>/eva_data`

pub mod evaluate;
pub mod runtime;
pub mod train;

pub use evaluate::EvaluationSession;
pub use runtime::{Cli, Commands};
pub use train::{TrainingOutcome, TrainingSession, TRAIN_PORT_SLOT};
