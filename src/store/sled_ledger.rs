//! sled backed ledger
//!
//! Trees:
//! - `loans`: loan id -> CBOR [`Loan`]
//! - `investments`: investment id -> CBOR [`Investment`]
//! - `investment_claims`: investor id `\0` -> first investment id, and
//!   investor id `\0` loan id -> investment id. Both are written for every
//!   investment whatever the scope.
//! - `loan_history`: loan id `\0` version (big endian) -> CBOR [`TransitionRecord`]
//! - `loan_history_heads`: loan id -> digest of the latest record
//!
//! Multi-tree writes go through sled transactions, which are serializable:
//! a conflicting concurrent commit re-runs the closure against fresh data.
use super::LoanLedgerStore;
use crate::audit::TransitionRecord;
use crate::error::{LoanError, StoreError};
use crate::funding::{self, FundingOutcome, InvestmentScope};
use crate::loan::{Evidence, Investment, Loan, LoanState};
use crate::state_machine::apply_transition;
use crate::types::{ActorId, InvestmentId, InvestorId, LoanId, TimeStamp};
use chrono::Utc;
use sled::Tree;
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionError, Transactional,
    TransactionalTree,
};

type TxResult<T> = ConflictableTransactionResult<T, LoanError>;

#[derive(Clone)]
pub struct SledLedger {
    loans: Tree,
    investments: Tree,
    claims: Tree,
    history: Tree,
    heads: Tree,
}

fn encode<T: minicbor::Encode<()>>(value: &T) -> Result<Vec<u8>, StoreError> {
    minicbor::to_vec(value).map_err(StoreError::encode)
}

fn decode<T: for<'b> minicbor::Decode<'b, ()>>(bytes: &[u8]) -> Result<T, StoreError> {
    Ok(minicbor::decode(bytes)?)
}

fn abort<E: Into<LoanError>>(err: E) -> ConflictableTransactionError<LoanError> {
    ConflictableTransactionError::Abort(err.into())
}

fn finish<T>(result: Result<T, TransactionError<LoanError>>) -> Result<T, LoanError> {
    match result {
        Ok(value) => Ok(value),
        Err(TransactionError::Abort(err)) => Err(err),
        Err(TransactionError::Storage(err)) => Err(StoreError::Sled(err).into()),
    }
}

fn claim_key(investor_id: &InvestorId, loan_id: Option<&LoanId>) -> Vec<u8> {
    let mut key = investor_id.as_bytes().to_vec();
    key.push(0);
    if let Some(loan_id) = loan_id {
        key.extend_from_slice(loan_id.as_bytes());
    }
    key
}

fn scoped_claim_key(investment: &Investment, scope: InvestmentScope) -> Vec<u8> {
    match scope {
        InvestmentScope::Investor => claim_key(&investment.investor_id, None),
        InvestmentScope::InvestorAndLoan => {
            claim_key(&investment.investor_id, Some(&investment.loan_id))
        }
    }
}

fn history_prefix(loan_id: &LoanId) -> Vec<u8> {
    let mut key = loan_id.as_bytes().to_vec();
    key.push(0);
    key
}

fn history_key(loan_id: &LoanId, sequence: u64) -> Vec<u8> {
    let mut key = history_prefix(loan_id);
    key.extend_from_slice(&sequence.to_be_bytes());
    key
}

fn load_loan_tx(loans: &TransactionalTree, id: &LoanId) -> TxResult<Loan> {
    match loans.get(id.as_bytes())? {
        Some(bytes) => decode(&bytes).map_err(abort),
        None => Err(abort(LoanError::LoanNotFound)),
    }
}

fn save_loan_tx(loans: &TransactionalTree, loan: &mut Loan) -> TxResult<()> {
    loan.version += 1;
    loans.insert(loan.id.as_bytes(), encode(&*loan).map_err(abort)?)?;
    Ok(())
}

fn insert_investment_tx(
    investments: &TransactionalTree,
    claims: &TransactionalTree,
    investment: &Investment,
    scope: InvestmentScope,
) -> TxResult<()> {
    if claims.get(scoped_claim_key(investment, scope))?.is_some() {
        return Err(abort(LoanError::InvestmentAlreadyExists));
    }
    investments.insert(investment.id.as_bytes(), encode(investment).map_err(abort)?)?;

    let investor_claim = claim_key(&investment.investor_id, None);
    if claims.get(investor_claim.as_slice())?.is_none() {
        claims.insert(investor_claim, investment.id.as_bytes())?;
    }
    claims.insert(
        claim_key(&investment.investor_id, Some(&investment.loan_id)),
        investment.id.as_bytes(),
    )?;
    Ok(())
}

// appends the record for the transition `loan` just committed at its current version
fn append_history_tx(
    history: &TransactionalTree,
    heads: &TransactionalTree,
    loan: &Loan,
    from: LoanState,
    actor: &ActorId,
    at: &TimeStamp<Utc>,
) -> TxResult<()> {
    let previous_digest = heads
        .get(loan.id.as_bytes())?
        .map(|digest| String::from_utf8_lossy(&digest).into_owned());

    let record = TransitionRecord::new(
        loan.id.clone(),
        loan.version,
        from,
        loan.state,
        actor.clone(),
        at.clone(),
        previous_digest,
    );
    let (digest, cbor) = record.build().map_err(|e| abort(StoreError::encode(e)))?;

    history.insert(history_key(&loan.id, loan.version), cbor)?;
    heads.insert(loan.id.as_bytes(), digest.as_bytes())?;
    Ok(())
}

impl SledLedger {
    pub fn open(db: &sled::Db) -> Result<Self, StoreError> {
        Ok(Self {
            loans: db.open_tree("loans")?,
            investments: db.open_tree("investments")?,
            claims: db.open_tree("investment_claims")?,
            history: db.open_tree("loan_history")?,
            heads: db.open_tree("loan_history_heads")?,
        })
    }

    fn claimed_investment(&self, claim: &[u8]) -> Result<Investment, LoanError> {
        let Some(investment_id) = self.claims.get(claim).map_err(StoreError::from)? else {
            return Err(LoanError::InvestmentNotFound);
        };
        match self
            .investments
            .get(&investment_id)
            .map_err(StoreError::from)?
        {
            Some(bytes) => Ok(decode(&bytes)?),
            None => Err(LoanError::InvestmentNotFound),
        }
    }
}

impl LoanLedgerStore for SledLedger {
    fn create_loan(&self, loan: &Loan) -> Result<LoanId, LoanError> {
        let inserted = self
            .loans
            .compare_and_swap(loan.id.as_bytes(), None::<&[u8]>, Some(encode(loan)?))
            .map_err(StoreError::from)?;

        match inserted {
            Ok(()) => Ok(loan.id.clone()),
            Err(_) => Err(StoreError::Conflict(loan.id.clone()).into()),
        }
    }

    fn get_loan_by_id(&self, id: &LoanId) -> Result<Loan, LoanError> {
        match self.loans.get(id.as_bytes()).map_err(StoreError::from)? {
            Some(bytes) => Ok(decode(&bytes)?),
            None => Err(LoanError::LoanNotFound),
        }
    }

    fn update_loan_state(
        &self,
        loan: &Loan,
        new_state: LoanState,
        actor: &ActorId,
    ) -> Result<Loan, LoanError> {
        let now = TimeStamp::new();

        let result = (&self.loans, &self.history, &self.heads).transaction(
            |(loans, history, heads)| {
                let mut fresh = load_loan_tx(loans, &loan.id)?;
                let from =
                    apply_transition(&mut fresh, new_state, actor, &now).map_err(abort)?;
                save_loan_tx(loans, &mut fresh)?;
                append_history_tx(history, heads, &fresh, from, actor, &now)?;
                Ok(fresh)
            },
        );
        finish(result)
    }

    fn update_loan_funded_amount(&self, loan: &Loan) -> Result<Loan, LoanError> {
        let result = self.loans.transaction(|loans| {
            let mut fresh = load_loan_tx(loans, &loan.id)?;
            if fresh.version != loan.version {
                return Err(abort(StoreError::Conflict(loan.id.clone())));
            }
            fresh.total_invested_amount = loan.total_invested_amount;
            save_loan_tx(loans, &mut fresh)?;
            Ok(fresh)
        });
        finish(result)
    }

    fn attach_loan_evidence(
        &self,
        loan_id: &LoanId,
        evidence: &Evidence,
        actor: &ActorId,
    ) -> Result<Loan, LoanError> {
        let now = TimeStamp::new();

        let result = self.loans.transaction(|loans| {
            let mut loan = load_loan_tx(loans, loan_id)?;
            loan.attach_evidence(evidence, actor, now.clone())
                .map_err(abort)?;
            save_loan_tx(loans, &mut loan)?;
            Ok(loan)
        });
        finish(result)
    }

    fn create_investment(
        &self,
        investment: &Investment,
        scope: InvestmentScope,
    ) -> Result<InvestmentId, LoanError> {
        let result = (&self.investments, &self.claims).transaction(|(investments, claims)| {
            insert_investment_tx(investments, claims, investment, scope)
        });
        finish(result)?;

        Ok(investment.id.clone())
    }

    fn get_investment_by_investor_id(
        &self,
        investor_id: &InvestorId,
    ) -> Result<Investment, LoanError> {
        self.claimed_investment(&claim_key(investor_id, None))
    }

    fn get_investment_by_investor_and_loan_id(
        &self,
        investor_id: &InvestorId,
        loan_id: &LoanId,
    ) -> Result<Investment, LoanError> {
        self.claimed_investment(&claim_key(investor_id, Some(loan_id)))
    }

    fn commit_investment(
        &self,
        investment: &Investment,
        scope: InvestmentScope,
        actor: &ActorId,
    ) -> Result<FundingOutcome, LoanError> {
        let now = TimeStamp::new();
        let claim = scoped_claim_key(investment, scope);

        let result = (
            &self.loans,
            &self.investments,
            &self.claims,
            &self.history,
            &self.heads,
        )
            .transaction(|(loans, investments, claims, history, heads)| {
                let mut loan = load_loan_tx(loans, &investment.loan_id)?;
                let already_invested = claims.get(claim.as_slice())?.is_some();

                let moved_from =
                    funding::settle(&mut loan, already_invested, investment, actor, &now)
                        .map_err(abort)?;

                insert_investment_tx(investments, claims, investment, scope)?;
                save_loan_tx(loans, &mut loan)?;
                if let Some(from) = moved_from {
                    append_history_tx(history, heads, &loan, from, actor, &now)?;
                }

                Ok(FundingOutcome {
                    investment_id: investment.id.clone(),
                    total_invested_amount: loan.total_invested_amount,
                    state: loan.state,
                    auto_transitioned: moved_from.is_some(),
                })
            });
        finish(result)
    }

    fn loan_history(&self, loan_id: &LoanId) -> Result<Vec<TransitionRecord>, LoanError> {
        self.history
            .scan_prefix(history_prefix(loan_id))
            .map(|entry| -> Result<TransitionRecord, LoanError> {
                let (_, bytes) = entry.map_err(StoreError::from)?;
                Ok(decode(&bytes)?)
            })
            .collect()
    }
}
