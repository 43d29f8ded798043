use thiserror::Error;

use super::types::AccountId;

/// Domain error taxonomy shared by settings actions and the trading pipelines
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SniperError {
    /// Malformed user-supplied setting; reported to the account, never retried
    #[error("{0}")]
    Validation(String),

    /// RPC/HTTP failure at a pipeline step
    #[error("Service error: {0}")]
    TransientService(String),

    #[error("Account {0} not found")]
    NotFound(AccountId),

    #[error("High risk: {0} has a freeze authority")]
    HighRisk(String),
}

impl SniperError {
    pub fn service(err: impl std::fmt::Display) -> Self {
        SniperError::TransientService(err.to_string())
    }
}
