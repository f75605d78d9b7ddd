use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("ledger error: {0}")]
    Ledger(#[from] kestrel_ledger::LedgerError),

    #[error("consensus error: {0}")]
    Consensus(#[from] kestrel_consensus::DposError),

    #[error("store error: {0}")]
    Store(#[from] kestrel_store::StoreError),

    #[error("corrupted chain: {0}")]
    CorruptedChain(String),

    #[error("invalid block: {0}")]
    InvalidBlock(String),

    #[error("cannot handle {event} in state {state}")]
    InvalidTransition { state: String, event: String },

    #[error("config error: {0}")]
    Config(String),

    #[error("chain driver is closed")]
    DriverClosed,
}
