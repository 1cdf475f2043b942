use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::rl::core::{PolicyType, TestMode};

/// Command line for training and evaluating traffic-signal agents.
#[derive(Parser, Debug)]
#[command(name = "greenwave")]
#[command(author = "Greenwave Team")]
#[command(version = "0.1.0")]
#[command(
    about = "Train and evaluate multi-agent RL traffic signal controllers",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Experiment root; training writes log/, data/, model/ here and
    /// evaluation reads <base-dir>/<agent>/ and writes eva_data/, eva_log/
    #[arg(long, global = true, default_value = "./runs")]
    pub base_dir: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train an agent
    Train {
        /// Run configuration file (.ini or .toml)
        #[arg(long, default_value = "./config/config_ma2c_grid.ini")]
        config_dir: PathBuf,

        /// no_test, in_train_test, after_train_test or all_test
        #[arg(long, default_value = "no_test")]
        test_mode: TestMode,
    },

    /// Evaluate trained agents concurrently
    Evaluate {
        /// Comma-separated agent directories under the base dir
        #[arg(long, value_delimiter = ',', default_value = "naive")]
        agents: Vec<String>,

        /// default, stochastic or deterministic
        #[arg(long, default_value = "default")]
        evaluation_policy_type: PolicyType,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_train() {
        let cli = Cli::parse_from([
            "greenwave",
            "--base-dir",
            "/tmp/exp",
            "train",
            "--config-dir",
            "cfg.ini",
            "--test-mode",
            "all_test",
        ]);
        assert_eq!(cli.base_dir, PathBuf::from("/tmp/exp"));
        match cli.command {
            Some(Commands::Train {
                config_dir,
                test_mode,
            }) => {
                assert_eq!(config_dir, PathBuf::from("cfg.ini"));
                assert_eq!(test_mode, TestMode::AllTest);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_evaluate_defaults() {
        let cli = Cli::parse_from(["greenwave", "evaluate", "--agents", "naive,ma2c"]);
        assert_eq!(cli.base_dir, PathBuf::from("./runs"));
        match cli.command {
            Some(Commands::Evaluate {
                agents,
                evaluation_policy_type,
            }) => {
                assert_eq!(agents, vec!["naive".to_string(), "ma2c".to_string()]);
                assert_eq!(evaluation_policy_type, PolicyType::Default);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_rejects_unknown_test_mode() {
        let result = Cli::try_parse_from(["greenwave", "train", "--test-mode", "sometimes"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_no_subcommand() {
        let cli = Cli::parse_from(["greenwave"]);
        assert!(cli.command.is_none());
    }
}
