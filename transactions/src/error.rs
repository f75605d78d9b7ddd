use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransactionError {
    #[error("amount must not be negative")]
    NegativeAmount,

    #[error("fee must not be negative")]
    NegativeFee,

    #[error("amount must be positive")]
    ZeroAmount,

    #[error("{0} transaction requires a recipient")]
    MissingRecipient(String),

    #[error("{0} transaction must not carry a recipient")]
    UnexpectedRecipient(String),

    #[error("{0} transaction must not carry an amount")]
    UnexpectedAmount(String),

    #[error("invalid delegate username: {0}")]
    InvalidUsername(String),

    #[error("invalid multisignature asset: {0}")]
    InvalidMultiSignature(String),

    #[error("invalid multi-payment: {0}")]
    InvalidMultiPayment(String),

    #[error("invalid asset: {0}")]
    InvalidAsset(String),
}
