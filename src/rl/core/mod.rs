//! Core RL abstractions
//!
//! Step scheduling, test-mode switches and inference policy selection.

pub mod counter;
pub mod policy_type;
pub mod test_mode;

pub use counter::StepCounter;
pub use policy_type::PolicyType;
pub use test_mode::{resolve, TestMode, TestModeFlags};
