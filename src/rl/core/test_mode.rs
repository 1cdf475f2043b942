//! Test-Mode Resolution
//!
//! Maps the `--test-mode` choice onto the two switches the training path
//! reads: test during training, and test once after training.

use std::fmt;
use std::str::FromStr;

use crate::error::{GreenwaveError, Result};

/// When to run test episodes around a training run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TestMode {
    /// Never test
    NoTest,
    /// Test at every test interval while training
    InTrainTest,
    /// Test once, offline, after training
    AfterTrainTest,
    /// Both of the above
    AllTest,
}

/// Switches derived from a [`TestMode`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestModeFlags {
    pub in_train_test: bool,
    pub post_test: bool,
}

impl TestMode {
    pub const ALL: [TestMode; 4] = [
        TestMode::NoTest,
        TestMode::InTrainTest,
        TestMode::AfterTrainTest,
        TestMode::AllTest,
    ];

    pub fn flags(self) -> TestModeFlags {
        let (in_train_test, post_test) = match self {
            TestMode::NoTest => (false, false),
            TestMode::InTrainTest => (true, false),
            TestMode::AfterTrainTest => (false, true),
            TestMode::AllTest => (true, true),
        };
        TestModeFlags {
            in_train_test,
            post_test,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TestMode::NoTest => "no_test",
            TestMode::InTrainTest => "in_train_test",
            TestMode::AfterTrainTest => "after_train_test",
            TestMode::AllTest => "all_test",
        }
    }
}

impl FromStr for TestMode {
    type Err = GreenwaveError;

    fn from_str(s: &str) -> Result<Self> {
        TestMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| GreenwaveError::InvalidMode(s.to_string()))
    }
}

impl fmt::Display for TestMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolve a test-mode name into `(in_train_test, post_test)` switches.
pub fn resolve(mode: &str) -> Result<TestModeFlags> {
    Ok(mode.parse::<TestMode>()?.flags())
}
