//! Persistence contract for loans, investments and their audit trail
mod sled_ledger;

pub use sled_ledger::SledLedger;

use super::audit::TransitionRecord;
use super::error::LoanError;
use super::funding::{FundingOutcome, InvestmentScope};
use super::loan::{Evidence, Investment, Loan, LoanState};
use super::types::{ActorId, InvestmentId, InvestorId, LoanId};

/// Durable storage the lifecycle core depends on.
///
/// Every mutating operation is atomic. Operations that depend on a loan's
/// current state re-read it inside their own commit rather than trusting the
/// caller's copy.
pub trait LoanLedgerStore: Send + Sync {
    fn create_loan(&self, loan: &Loan) -> Result<LoanId, LoanError>;

    /// Fails with [`LoanError::LoanNotFound`] when absent.
    fn get_loan_by_id(&self, id: &LoanId) -> Result<Loan, LoanError>;

    /// Move `loan` to `new_state`, writing only that state's designated
    /// fields and appending an audit record. The transition is re-validated
    /// against the stored loan at commit time.
    fn update_loan_state(
        &self,
        loan: &Loan,
        new_state: LoanState,
        actor: &ActorId,
    ) -> Result<Loan, LoanError>;

    /// Persist `loan.total_invested_amount`. Fails with
    /// [`super::error::StoreError::Conflict`] if the stored loan moved past
    /// `loan.version`.
    fn update_loan_funded_amount(&self, loan: &Loan) -> Result<Loan, LoanError>;

    fn attach_loan_evidence(
        &self,
        loan_id: &LoanId,
        evidence: &Evidence,
        actor: &ActorId,
    ) -> Result<Loan, LoanError>;

    /// Insert an investment row and claim it for its investor under `scope`.
    /// Does not touch the loan.
    fn create_investment(
        &self,
        investment: &Investment,
        scope: InvestmentScope,
    ) -> Result<InvestmentId, LoanError>;

    /// The investor's first recorded investment, on any loan. Fails with
    /// [`LoanError::InvestmentNotFound`] when there is none.
    fn get_investment_by_investor_id(&self, investor_id: &InvestorId)
    -> Result<Investment, LoanError>;

    fn get_investment_by_investor_and_loan_id(
        &self,
        investor_id: &InvestorId,
        loan_id: &LoanId,
    ) -> Result<Investment, LoanError>;

    /// Record the investment, add it to the loan's funded amount and, when
    /// the loan becomes fully funded, move it to `invested`, all in one
    /// serializable commit.
    fn commit_investment(
        &self,
        investment: &Investment,
        scope: InvestmentScope,
        actor: &ActorId,
    ) -> Result<FundingOutcome, LoanError>;

    /// Accepted transitions of a loan, oldest first.
    fn loan_history(&self, loan_id: &LoanId) -> Result<Vec<TransitionRecord>, LoanError>;
}
