use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the orchestrator
#[derive(Error, Debug)]
pub enum GreenwaveError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {}", .0.join("; "))]
    InvalidConfig(Vec<String>),

    // Command-line validation errors
    #[error("Invalid test mode: {0} (expected no_test, in_train_test, after_train_test or all_test)")]
    InvalidMode(String),

    #[error("Invalid evaluation policy type: {0} (expected default, stochastic or deterministic)")]
    InvalidPolicyType(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // Per-agent evaluation errors
    #[error("Agent directory not found: {}", .0.display())]
    AgentNotFound(PathBuf),

    #[error("No config file found in {}", .0.display())]
    ConfigNotFound(PathBuf),

    #[error("Failed to load model from {}: {reason}", dir.display())]
    ModelLoad { dir: PathBuf, reason: String },

    // Scheduling errors
    #[error("Step budget exhausted: counter already at total step {total_step}")]
    StepBudgetExhausted { total_step: u64 },

    #[error("Simulator port {port} is already assigned (agent {agent})")]
    ResourceBusy { port: u16, agent: String },

    // Environment errors
    #[error("Simulator error: {0}")]
    Simulator(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for GreenwaveError
pub type Result<T> = std::result::Result<T, GreenwaveError>;
