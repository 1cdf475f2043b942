//! Persistence Layer for Run Directories
//!
//! This module provides the on-disk layout of a run:
//! - Role directories (`log/`, `data/`, `model/`, `eva_data/`, `eva_log/`)
//! - Config snapshots copied into `data/`
//! - Config discovery inside a previous run's `data/`

pub mod run_dirs;

pub use run_dirs::{find_config_file, snapshot_config, DirRole, RunDirectories, CONFIG_EXTENSIONS};
