//! Training Infrastructure
//!
//! Training loop, offline testing, checkpointing and scalar summaries.

pub mod checkpointing;
pub mod summary;
pub mod tester;
pub mod trainer;

pub use checkpointing::Checkpointer;
pub use summary::{ScalarRecord, SummaryWriter};
pub use tester::{
    run_recorded, run_test_episode, run_tests, EpisodeStats, EvalPolicy, RewardRecord,
    TestSummary, Tester,
};
pub use trainer::{Trainer, TrainingStats};
