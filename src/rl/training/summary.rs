//! Scalar summaries
//!
//! Appends one JSON object per line to `log/summaries.jsonl` so training
//! curves can be plotted after the fact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::Result;

pub const SUMMARY_FILE: &str = "summaries.jsonl";

/// One scalar data point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarRecord {
    pub tag: String,
    pub step: u64,
    pub value: f64,
    pub wall_time: DateTime<Utc>,
}

/// Append-only writer for scalar summaries
pub struct SummaryWriter {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl SummaryWriter {
    /// Open (or create) the summary file inside `log_dir`.
    pub fn create(log_dir: &Path) -> Result<Self> {
        let path = log_dir.join(SUMMARY_FILE);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn add_scalar(&mut self, tag: &str, value: f64, step: u64) -> Result<()> {
        let record = ScalarRecord {
            tag: tag.to_string(),
            step,
            value,
            wall_time: Utc::now(),
        };
        serde_json::to_writer(&mut self.writer, &record)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Read every record back from a summary file
pub fn read_summaries(path: &Path) -> Result<Vec<ScalarRecord>> {
    let contents = std::fs::read_to_string(path)?;
    contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| Ok(serde_json::from_str(line)?))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_appends_across_writers() {
        let tmp = tempdir().unwrap();

        let mut writer = SummaryWriter::create(tmp.path()).unwrap();
        writer.add_scalar("train_reward", -12.5, 10).unwrap();
        writer.flush().unwrap();
        drop(writer);

        let mut writer = SummaryWriter::create(tmp.path()).unwrap();
        writer.add_scalar("test_reward", -3.0, 20).unwrap();
        writer.flush().unwrap();

        let records = read_summaries(&tmp.path().join(SUMMARY_FILE)).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].tag, "train_reward");
        assert_eq!(records[0].step, 10);
        assert_eq!(records[1].value, -3.0);
    }
}
