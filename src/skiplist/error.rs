use std::error::Error;
use std::fmt;

/// Errors that can occur while configuring or driving a skip list
#[derive(Debug, Clone, PartialEq)]
pub enum SkipListError {
    /// The expected element count passed at construction was zero
    InvalidExpectedElements(usize),
    /// The level-growth probability was outside the open interval (0, 1)
    InvalidProbability(f64),
    /// An explicit maximum level exceeded the supported level count
    InvalidMaxLevel(usize),
    /// The async worker task is no longer accepting commands
    WorkerUnavailable,
}

impl fmt::Display for SkipListError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipListError::InvalidExpectedElements(n) => {
                write!(f, "Expected element count must be at least 1, got {}", n)
            }
            SkipListError::InvalidProbability(p) => {
                write!(f, "Level probability must lie strictly between 0 and 1, got {}", p)
            }
            SkipListError::InvalidMaxLevel(level) => {
                write!(f, "Maximum level {} exceeds the supported level count", level)
            }
            SkipListError::WorkerUnavailable => {
                write!(f, "Skip list worker task is unavailable")
            }
        }
    }
}

impl Error for SkipListError {}
