//! Service layer API for loan lifecycle operations
use super::audit::TransitionRecord;
use super::config::LedgerConfig;
use super::error::LoanError;
use super::funding::{FundingEngine, InvestmentScope};
use super::identity::{IdentityLookup, SledIdentityDirectory};
use super::loan::{Evidence, Loan, LoanState};
use super::state_machine::check_transition;
use super::store::{LoanLedgerStore, SledLedger};
use super::types::{ActorId, BorrowerId, InvestmentId, InvestorId, LoanId};
use std::sync::Arc;

pub struct LoanLifecycleService<S, I> {
    store: S,
    identity: I,
    scope: InvestmentScope,
}

impl LoanLifecycleService<SledLedger, SledIdentityDirectory> {
    /// Ledger and identity directory sharing one sled database.
    pub fn from_db(db: Arc<sled::Db>, scope: InvestmentScope) -> anyhow::Result<Self> {
        let store = SledLedger::open(&db)?;
        let identity = SledIdentityDirectory::open(&db)?;
        Ok(Self::new(store, identity, scope))
    }

    pub fn open(config: &LedgerConfig) -> anyhow::Result<Self> {
        tracing::info!(
            path = %config.db_path.display(),
            scope = config.investment_scope.as_str(),
            "opening loan ledger"
        );
        let db = sled::open(&config.db_path)?;
        Self::from_db(Arc::new(db), config.investment_scope)
    }
}

impl<S, I> LoanLifecycleService<S, I>
where
    S: LoanLedgerStore,
    I: IdentityLookup,
{
    pub fn new(store: S, identity: I, scope: InvestmentScope) -> Self {
        Self {
            store,
            identity,
            scope,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn identity(&self) -> &I {
        &self.identity
    }

    /// Originate a loan for an existing borrower. The loan starts `proposed`.
    #[tracing::instrument(skip(self))]
    pub fn create_loan(
        &self,
        borrower_id: &BorrowerId,
        principal_amount: u64,
        interest_rate_bps: u32,
        roi_rate_bps: u32,
        actor: &ActorId,
    ) -> Result<(LoanId, LoanState), LoanError> {
        self.identity.get_borrower_by_id(borrower_id)?;

        let loan = Loan::propose(
            borrower_id.clone(),
            principal_amount,
            interest_rate_bps,
            roi_rate_bps,
            actor.clone(),
        )?;
        let loan_id = self.store.create_loan(&loan)?;

        tracing::info!(%loan_id, "loan proposed");
        Ok((loan_id, loan.state))
    }

    /// Move a loan to `requested_state`.
    ///
    /// The decision is made here first so callers get a precise error, then
    /// repeated by the store against the freshest loan at commit time.
    #[tracing::instrument(skip(self))]
    pub fn update_loan_state(
        &self,
        loan_id: &LoanId,
        requested_state: &str,
        actor: &ActorId,
    ) -> Result<(), LoanError> {
        let loan = self.store.get_loan_by_id(loan_id)?;
        let target: LoanState = requested_state.parse()?;

        if let Err(err) = check_transition(&loan, target) {
            tracing::warn!(
                %loan_id,
                from = %loan.state,
                to = %target,
                error = %err,
                "transition rejected"
            );
            return Err(err);
        }

        let updated = self.store.update_loan_state(&loan, target, actor)?;
        tracing::info!(%loan_id, from = %loan.state, to = %updated.state, "loan state updated");
        Ok(())
    }

    /// Record an investor's contribution. Moves the loan to `invested` once
    /// the principal is reached.
    #[tracing::instrument(skip(self))]
    pub fn create_loan_investment(
        &self,
        loan_id: &LoanId,
        investor_id: &InvestorId,
        amount: u64,
        actor: &ActorId,
    ) -> Result<InvestmentId, LoanError> {
        FundingEngine::new(&self.store, &self.identity, self.scope)
            .record_investment(loan_id, investor_id, amount, actor)
            .map(|outcome| outcome.investment_id)
    }

    /// Record evidence a later transition depends on.
    #[tracing::instrument(skip(self))]
    pub fn attach_evidence(
        &self,
        loan_id: &LoanId,
        evidence: &Evidence,
        actor: &ActorId,
    ) -> Result<(), LoanError> {
        self.store.attach_loan_evidence(loan_id, evidence, actor)?;
        tracing::debug!(%loan_id, "evidence attached");
        Ok(())
    }

    pub fn get_loan(&self, loan_id: &LoanId) -> Result<Loan, LoanError> {
        self.store.get_loan_by_id(loan_id)
    }

    pub fn loan_history(&self, loan_id: &LoanId) -> Result<Vec<TransitionRecord>, LoanError> {
        self.store.loan_history(loan_id)
    }
}
