use greenwave::cli::runtime::{Cli, Commands};
use greenwave::cli::{EvaluationSession, TrainingSession};
use greenwave::error::{GreenwaveError, Result};
use tracing::info;

pub(crate) async fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Some(Commands::Train {
            config_dir,
            test_mode,
        }) => {
            let session = TrainingSession::prepare(&cli.base_dir, config_dir, *test_mode)?;
            let _guard = crate::main_runtime::init_logging(session.log_dir()?);

            // The simulator is stepped from one thread only.
            let outcome = tokio::task::spawn_blocking(move || session.run())
                .await
                .map_err(|e| GreenwaveError::Internal(format!("training task failed: {e}")))??;

            info!(
                "Training complete: {} episodes, final step {}, model saved to {:?}",
                outcome.stats.episodes, outcome.final_step, outcome.checkpoint
            );
            if let Some(test) = &outcome.post_test {
                info!("Post-training test: avg R {:.2}", test.mean_reward);
            }
        }
        Some(Commands::Evaluate {
            agents,
            evaluation_policy_type,
        }) => {
            let session =
                EvaluationSession::prepare(&cli.base_dir, agents, *evaluation_policy_type)?;
            let _guard = crate::main_runtime::init_logging(session.log_dir()?);

            // Per-agent failures are inside the report, not an error.
            session.run().await?;
        }
        None => {
            return Err(GreenwaveError::InvalidArgument(
                "no subcommand given".to_string(),
            ));
        }
    }

    Ok(())
}
