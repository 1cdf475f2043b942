//! Global Step Counter
//!
//! Tracks training progress against the step budget and decides when to log
//! and when to run an in-loop test.
//!
//! The counter has exactly one writer: the training driver holds it by
//! `&mut` for the whole run. Readers (the post-training tester, model save)
//! only see it after the driver has released that borrow.

use crate::config::TrainConfig;
use crate::error::{GreenwaveError, Result};

/// Step counter state for one training run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepCounter {
    current_step: u64,
    total_step: u64,
    test_interval: u64,
    log_interval: u64,
}

impl StepCounter {
    /// Create a zeroed counter. All three values must be positive.
    pub fn new(total_step: u64, test_interval: u64, log_interval: u64) -> Result<Self> {
        let mut errors = Vec::new();
        if total_step == 0 {
            errors.push("total_step must be positive".to_string());
        }
        if test_interval == 0 {
            errors.push("test_interval must be positive".to_string());
        }
        if log_interval == 0 {
            errors.push("log_interval must be positive".to_string());
        }
        if !errors.is_empty() {
            return Err(GreenwaveError::InvalidConfig(errors));
        }

        Ok(Self {
            current_step: 0,
            total_step,
            test_interval,
            log_interval,
        })
    }

    pub fn from_config(config: &TrainConfig) -> Result<Self> {
        Self::new(config.total_step, config.test_interval, config.log_interval)
    }

    /// Advance by one step and return the new step.
    ///
    /// Saturates at `total_step`: once the budget is spent every call fails
    /// and the counter is left unchanged.
    pub fn advance(&mut self) -> Result<u64> {
        if self.is_done() {
            return Err(GreenwaveError::StepBudgetExhausted {
                total_step: self.total_step,
            });
        }
        self.current_step += 1;
        Ok(self.current_step)
    }

    pub fn should_log(&self, step: u64) -> bool {
        step % self.log_interval == 0
    }

    pub fn should_test(&self, step: u64) -> bool {
        step % self.test_interval == 0
    }

    pub fn is_done(&self) -> bool {
        self.current_step >= self.total_step
    }

    pub fn current_step(&self) -> u64 {
        self.current_step
    }

    pub fn total_step(&self) -> u64 {
        self.total_step
    }

    pub fn test_interval(&self) -> u64 {
        self.test_interval
    }

    pub fn log_interval(&self) -> u64 {
        self.log_interval
    }

    pub fn remaining(&self) -> u64 {
        self.total_step - self.current_step
    }

    /// Fraction of the budget consumed, in [0, 1]
    pub fn progress(&self) -> f64 {
        self.current_step as f64 / self.total_step as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_zero_values() {
        assert!(StepCounter::new(0, 1, 1).is_err());
        assert!(StepCounter::new(1, 0, 1).is_err());
        assert!(StepCounter::new(1, 1, 0).is_err());
    }

    #[test]
    fn test_advance_saturates_at_total() {
        for total in [1u64, 2, 7, 50] {
            let mut counter = StepCounter::new(total, 3, 2).unwrap();
            let mut last = counter.current_step();

            for _ in 0..(total * 2 + 3) {
                let before = counter.current_step();
                match counter.advance() {
                    Ok(step) => assert_eq!(step, before + 1),
                    Err(GreenwaveError::StepBudgetExhausted { total_step }) => {
                        assert_eq!(total_step, total);
                        assert_eq!(counter.current_step(), before);
                    }
                    Err(e) => panic!("unexpected error: {e}"),
                }
                assert!(counter.current_step() >= last);
                assert!(counter.current_step() <= total);
                last = counter.current_step();
            }

            assert!(counter.is_done());
            assert_eq!(counter.current_step(), total);
            assert_eq!(counter.remaining(), 0);
        }
    }

    #[test]
    fn test_should_log_matches_modulo() {
        let counter = StepCounter::new(1000, 7, 13).unwrap();
        for step in 0..500 {
            assert_eq!(counter.should_log(step), step % 13 == 0);
            assert_eq!(counter.should_test(step), step % 7 == 0);
        }
    }

    #[test]
    fn test_schedule_over_hundred_steps() {
        let mut counter = StepCounter::new(100, 20, 10).unwrap();
        let mut tests = Vec::new();
        let mut logs = Vec::new();

        while !counter.is_done() {
            let step = counter.advance().unwrap();
            if counter.should_test(step) {
                tests.push(step);
            }
            if counter.should_log(step) {
                logs.push(step);
            }
        }

        assert_eq!(tests, vec![20, 40, 60, 80, 100]);
        assert_eq!(logs, (1..=10).map(|i| i * 10).collect::<Vec<_>>());
        assert_eq!(counter.progress(), 1.0);
    }
}
