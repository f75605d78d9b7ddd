//! Consensus: delegated proof-of-stake rounds.
//!
//! Every `active_delegates` blocks a new round starts. At the boundary each
//! delegate's vote balance is recomputed from the wallets voting for it, the
//! non-resigned delegates are ranked, and the top of the ranking forges the
//! next round in a deterministic shuffled order.
//!
//! ## Module overview
//!
//! - [`round`]: height to round arithmetic across milestones.
//! - [`vote_balances`]: vote balance aggregation.
//! - [`engine`]: ranking, round assignment, round revert and forging order.
//! - [`error`]: consensus error types.

pub mod engine;
pub mod error;
pub mod round;
pub mod vote_balances;

pub use engine::{DposRoundEngine, RankedDelegate, Round, DEFAULT_ROUND_HISTORY};
pub use error::DposError;
pub use round::RoundInfo;
pub use vote_balances::VoteBalances;
