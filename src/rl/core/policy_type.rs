//! Inference policy used when acting outside of training.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{GreenwaveError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyType {
    /// Whatever the model considers its own inference mode
    Default,
    /// Sample from the action distribution
    Stochastic,
    /// Take the most likely action
    Deterministic,
}

impl PolicyType {
    pub fn as_str(self) -> &'static str {
        match self {
            PolicyType::Default => "default",
            PolicyType::Stochastic => "stochastic",
            PolicyType::Deterministic => "deterministic",
        }
    }
}

impl FromStr for PolicyType {
    type Err = GreenwaveError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "default" => Ok(PolicyType::Default),
            "stochastic" => Ok(PolicyType::Stochastic),
            "deterministic" => Ok(PolicyType::Deterministic),
            other => Err(GreenwaveError::InvalidPolicyType(other.to_string())),
        }
    }
}

impl fmt::Display for PolicyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_policy_types() {
        assert_eq!("default".parse::<PolicyType>().unwrap(), PolicyType::Default);
        assert_eq!(
            "deterministic".parse::<PolicyType>().unwrap(),
            PolicyType::Deterministic
        );
        assert!(matches!(
            "greedy".parse::<PolicyType>(),
            Err(GreenwaveError::InvalidPolicyType(_))
        ));
    }
}
