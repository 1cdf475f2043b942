use greenwave::cli::{EvaluationSession, TrainingSession};
use greenwave::error::GreenwaveError;
use greenwave::rl::core::{PolicyType, TestMode};
use greenwave::rl::evaluation::AgentOutcome;
use greenwave::rl::training::RewardRecord;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn config(agent: &str) -> String {
    format!(
        r#"
[ENV_CONFIG]
seed = 11
agent = "{agent}"
grid_rows = 2
grid_cols = 2
episode_length_sec = 40
test_seeds = [5, 6]

[TRAIN_CONFIG]
total_step = 16
test_interval = 8
log_interval = 8
"#
    )
}

/// Train an agent into `<base>/<agent>/` the way `greenwave train` would.
fn train_agent(base: &Path, agent: &str) {
    let config_path = base.join(format!("{agent}.toml"));
    fs::write(&config_path, config(agent)).unwrap();
    TrainingSession::prepare(&base.join(agent), &config_path, TestMode::NoTest)
        .unwrap()
        .run()
        .unwrap();
}

/// Lay out a naive agent: config only, no model.
fn naive_agent(base: &Path, agent: &str) {
    let data = base.join(agent).join("data");
    fs::create_dir_all(&data).unwrap();
    fs::write(data.join("config_naive.toml"), config("naive")).unwrap();
}

fn agents(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn missing_agent_does_not_stop_siblings() {
    let tmp = tempdir().unwrap();
    let base = tmp.path();
    train_agent(base, "ma2c");

    let session = EvaluationSession::prepare(
        base,
        &agents(&["naive", "ma2c"]),
        PolicyType::Deterministic,
    )
    .unwrap();
    let ports: Vec<u16> = session.tasks().iter().map(|t| t.assigned_port).collect();
    assert_eq!(ports, vec![0, 1]);

    let report = session.run().await.unwrap();

    match &report.get("naive").unwrap().outcome {
        AgentOutcome::Failed { reason } => {
            assert!(reason.contains("Agent directory not found"));
            assert!(reason.contains("naive"));
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    let ma2c = report.get("ma2c").unwrap();
    assert!(ma2c.outcome.is_completed());

    let eva_data = base.join("eva_data");
    assert!(base.join("eva_log").is_dir());
    assert!(eva_data.join("ma2c_reward.csv").is_file());
    assert!(eva_data.join("ma2c_traffic.csv").is_file());
    assert!(!eva_data.join("naive_reward.csv").exists());

    let mut reader = csv::Reader::from_path(eva_data.join("ma2c_reward.csv")).unwrap();
    let rows: Vec<RewardRecord> = reader.deserialize().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.agent == "ma2c" && r.step == 16));
}

#[tokio::test]
async fn naive_agent_needs_no_model() {
    let tmp = tempdir().unwrap();
    let base = tmp.path();
    naive_agent(base, "naive");

    let report = EvaluationSession::prepare(base, &agents(&["naive"]), PolicyType::Default)
        .unwrap()
        .run()
        .await
        .unwrap();

    assert!(report.get("naive").unwrap().outcome.is_completed());
    assert!(base.join("eva_data/naive_reward.csv").is_file());
}

#[tokio::test]
async fn per_agent_failures_are_contained() {
    let tmp = tempdir().unwrap();
    let base = tmp.path();
    train_agent(base, "a");
    train_agent(base, "c");
    // "b" exists with a config but was never trained.
    let b_data = base.join("b").join("data");
    fs::create_dir_all(&b_data).unwrap();
    fs::write(b_data.join("config.toml"), config("ma2c")).unwrap();
    // "d" exists but has no config snapshot.
    fs::create_dir_all(base.join("d").join("data")).unwrap();

    let report = EvaluationSession::prepare(
        base,
        &agents(&["a", "b", "c", "d"]),
        PolicyType::Stochastic,
    )
    .unwrap()
    .run()
    .await
    .unwrap();

    assert_eq!(report.completed(), 2);
    assert_eq!(report.failed(), 2);
    let ports: Vec<u16> = report.agents.iter().map(|r| r.port).collect();
    assert_eq!(ports, vec![0, 1, 2, 3]);
    for agent in ["a", "c"] {
        assert!(base.join(format!("eva_data/{agent}_reward.csv")).is_file());
    }
    match &report.get("b").unwrap().outcome {
        AgentOutcome::Failed { reason } => assert!(reason.contains("load model")),
        other => panic!("unexpected outcome {other:?}"),
    }
    match &report.get("d").unwrap().outcome {
        AgentOutcome::Failed { reason } => assert!(reason.contains("No config file")),
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[tokio::test]
async fn identical_configs_see_identical_test_traffic() {
    let tmp = tempdir().unwrap();
    let base = tmp.path();
    naive_agent(base, "greedy_a");
    naive_agent(base, "greedy_b");

    let report = EvaluationSession::prepare(
        base,
        &agents(&["greedy_a", "greedy_b"]),
        PolicyType::Default,
    )
    .unwrap()
    .run()
    .await
    .unwrap();

    let reward = |agent: &str| match &report.get(agent).unwrap().outcome {
        AgentOutcome::Completed { mean_reward, .. } => *mean_reward,
        other => panic!("unexpected outcome {other:?}"),
    };
    assert_eq!(reward("greedy_a"), reward("greedy_b"));
}

#[test]
fn duplicate_agents_are_rejected_before_directories_exist() {
    let tmp = tempdir().unwrap();
    let err = EvaluationSession::prepare(tmp.path(), &agents(&["a", "a"]), PolicyType::Default)
        .err()
        .unwrap();
    assert!(matches!(err, GreenwaveError::InvalidArgument(_)));
    assert!(!tmp.path().join("eva_data").exists());
}
