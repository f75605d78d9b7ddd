//! Parse and construction errors for the fundamental types.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid amount {0:?}: expected a signed integer")]
    InvalidAmount(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid hex identifier: {0}")]
    InvalidHex(String),

    #[error("invalid milestones: {0}")]
    InvalidMilestones(String),
}
