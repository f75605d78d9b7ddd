use kestrel_types::{Address, Amount, PublicKey};
use thiserror::Error;

/// Ranking-time failures. All of them point at indexing or configuration
/// bugs and are never retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DposError {
    #[error("delegate {public_key} indexed twice with vote balance {vote_balance}")]
    DuplicateDelegateIndex {
        public_key: PublicKey,
        vote_balance: Amount,
    },

    #[error("round needs {required} delegates, only {available} registered")]
    InsufficientDelegates { required: u32, available: u32 },

    #[error("delegate wallet {0} has no public key")]
    MissingPublicKey(Address),

    #[error("vote weight for delegate {0} overflows")]
    VoteWeightOverflow(PublicKey),

    #[error("milestone at height {height} does not start a round of {active_delegates} delegates")]
    InvalidMilestoneSpan { height: u64, active_delegates: u32 },
}
