//! Experiment Directory Layout
//!
//! A run owns a base directory with one subdirectory per role. Training uses
//! `log/`, `data/` and `model/`; evaluation uses `eva_data/` and `eva_log/`.
//! Directories are created if missing and never cleared, so re-running
//! against an existing base directory keeps whatever is already there.

use anyhow::Context;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{GreenwaveError, Result};

/// Extensions recognised as run configuration files
pub const CONFIG_EXTENSIONS: &[&str] = &["ini", "toml"];

/// Logical role of a run subdirectory
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DirRole {
    Log,
    Data,
    Model,
    EvaData,
    EvaLog,
}

impl DirRole {
    /// Roles created by a training run
    pub const TRAINING: [DirRole; 3] = [DirRole::Log, DirRole::Data, DirRole::Model];
    /// Roles created by an evaluation run
    pub const EVALUATION: [DirRole; 2] = [DirRole::EvaData, DirRole::EvaLog];

    pub fn dir_name(self) -> &'static str {
        match self {
            DirRole::Log => "log",
            DirRole::Data => "data",
            DirRole::Model => "model",
            DirRole::EvaData => "eva_data",
            DirRole::EvaLog => "eva_log",
        }
    }
}

impl fmt::Display for DirRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Role -> path mapping for one run; fixed once created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunDirectories {
    base: PathBuf,
    paths: BTreeMap<DirRole, PathBuf>,
}

impl RunDirectories {
    /// Create `base_dir/<role>` for each role. Idempotent.
    pub fn init<P: AsRef<Path>>(base_dir: P, roles: &[DirRole]) -> Result<Self> {
        let base = base_dir.as_ref().to_path_buf();
        let mut paths = BTreeMap::new();

        for &role in roles {
            let path = base.join(role.dir_name());
            if !path.is_dir() {
                fs::create_dir_all(&path)
                    .with_context(|| format!("Failed to create {} directory {:?}", role, path))?;
                debug!("Created {} directory: {:?}", role, path);
            }
            paths.insert(role, path);
        }

        Ok(Self { base, paths })
    }

    pub fn get(&self, role: DirRole) -> Option<&Path> {
        self.paths.get(&role).map(PathBuf::as_path)
    }

    /// Path for a role this run was initialised with.
    pub fn path(&self, role: DirRole) -> Result<&Path> {
        self.get(role).ok_or_else(|| {
            GreenwaveError::Internal(format!(
                "run directory {:?} was not initialised with role {}",
                self.base, role
            ))
        })
    }
}

/// Copy the config used for a run into its data directory, byte for byte.
pub fn snapshot_config(source: &Path, data_dir: &Path) -> Result<PathBuf> {
    let file_name = source.file_name().ok_or_else(|| {
        GreenwaveError::InvalidArgument(format!("config path {:?} has no file name", source))
    })?;
    let target = data_dir.join(file_name);

    if target.exists() {
        warn!("Overwriting config snapshot {:?}", target);
    }
    fs::copy(source, &target)
        .with_context(|| format!("Failed to copy config {:?} to {:?}", source, target))?;
    debug!("Config snapshot written to {:?}", target);

    Ok(target)
}

/// First config file (by name) inside `dir`, if any.
pub fn find_config_file(dir: &Path) -> Option<PathBuf> {
    let entries = fs::read_dir(dir).ok()?;

    let mut candidates: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| CONFIG_EXTENSIONS.contains(&ext))
                .unwrap_or(false)
        })
        .collect();

    candidates.sort();
    candidates.into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_init_creates_role_dirs() {
        let tmp = tempdir().unwrap();
        let dirs = RunDirectories::init(tmp.path(), &DirRole::TRAINING).unwrap();

        for role in DirRole::TRAINING {
            let path = dirs.path(role).unwrap();
            assert!(path.is_dir());
            assert_eq!(path, tmp.path().join(role.dir_name()));
        }
        assert!(dirs.get(DirRole::EvaData).is_none());
        assert!(dirs.path(DirRole::EvaLog).is_err());
    }

    #[test]
    fn test_init_is_idempotent_and_keeps_files() {
        let tmp = tempdir().unwrap();
        let first = RunDirectories::init(tmp.path(), &DirRole::TRAINING).unwrap();

        let marker = first.path(DirRole::Model).unwrap().join("checkpoint-10.json");
        fs::write(&marker, b"{}").unwrap();
        let eval_marker = tmp.path().join("eva_data").join("ma2c_reward.csv");
        fs::create_dir_all(eval_marker.parent().unwrap()).unwrap();
        fs::write(&eval_marker, b"x").unwrap();

        let second = RunDirectories::init(tmp.path(), &DirRole::TRAINING).unwrap();
        assert_eq!(first, second);
        assert!(marker.exists());
        assert!(eval_marker.exists());

        RunDirectories::init(tmp.path(), &DirRole::EVALUATION).unwrap();
        assert!(marker.exists());
        assert_eq!(fs::read(&eval_marker).unwrap(), b"x");
    }

    #[test]
    fn test_snapshot_copies_verbatim() {
        let tmp = tempdir().unwrap();
        let source = tmp.path().join("config_ma2c.ini");
        let contents = "[ENV_CONFIG]\nseed = 12 ; keep comments\n";
        fs::write(&source, contents).unwrap();
        let dirs = RunDirectories::init(tmp.path().join("run"), &DirRole::TRAINING).unwrap();

        let target = snapshot_config(&source, dirs.path(DirRole::Data).unwrap()).unwrap();
        assert_eq!(target.file_name().unwrap(), "config_ma2c.ini");
        assert_eq!(fs::read_to_string(target).unwrap(), contents);
    }

    #[test]
    fn test_find_config_file() {
        let tmp = tempdir().unwrap();
        assert!(find_config_file(tmp.path()).is_none());
        assert!(find_config_file(&tmp.path().join("missing")).is_none());

        fs::write(tmp.path().join("train_reward.csv"), b"").unwrap();
        assert!(find_config_file(tmp.path()).is_none());

        fs::write(tmp.path().join("b.ini"), b"").unwrap();
        fs::write(tmp.path().join("a.toml"), b"").unwrap();
        assert_eq!(find_config_file(tmp.path()).unwrap(), tmp.path().join("a.toml"));
    }
}
