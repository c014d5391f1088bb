use super::loan::LoanState;
use super::types::LoanId;

/// Business rule violations raised by the loan lifecycle.
///
/// Every variant apart from [`LoanError::Storage`] is a recoverable caller
/// error. `Storage` carries collaborator failures verbatim.
#[derive(thiserror::Error, Debug)]
pub enum LoanError {
    #[error("borrower is not found")]
    BorrowerNotFound,
    #[error("loan is not found")]
    LoanNotFound,
    #[error("investor is not found")]
    InvestorNotFound,
    #[error("investment is not found")]
    InvestmentNotFound,
    #[error("loan state invalid: {0:?}")]
    LoanStateInvalid(String),
    #[error("loan state transition from {from} to {to} is not allowed")]
    LoanStateTransitionNotAllowed { from: LoanState, to: LoanState },
    #[error("loan state transition requirement for {0} is not fulfilled")]
    StateTransitionRequirementNotFulfilled(LoanState),
    #[error("loan state must be published")]
    LoanMustBePublished,
    #[error("investment already exists")]
    InvestmentAlreadyExists,
    #[error("amount must be greater than zero")]
    InvalidAmount,
    #[error("{kind} evidence is not accepted while the loan is {state}")]
    EvidenceNotAccepted { kind: &'static str, state: LoanState },
    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// Failures of the persistence layer itself.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("sled: {0}")]
    Sled(#[from] sled::Error),
    #[error("failed to encode record: {0}")]
    Encode(String),
    #[error("failed to decode record: {0}")]
    Decode(#[from] minicbor::decode::Error),
    #[error("loan {0} was modified concurrently")]
    Conflict(LoanId),
    #[error("failed to generate identifier: {0}")]
    Identifier(String),
}

impl StoreError {
    pub(crate) fn identifier(err: anyhow::Error) -> Self {
        StoreError::Identifier(err.to_string())
    }

    pub(crate) fn encode<E: std::fmt::Display>(err: E) -> Self {
        StoreError::Encode(err.to_string())
    }
}

impl LoanError {
    /// True for the named business errors, false for system failures.
    pub fn is_business(&self) -> bool {
        !matches!(self, LoanError::Storage(_))
    }
}
