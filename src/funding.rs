//! Investment funding engine
//!
//! Pre-checks run against a plain read of the loan so obviously invalid
//! requests fail fast with a precise error. The binding decision is
//! [`settle`], which the store runs inside the same atomic commit that
//! records the investment, so it always sees the freshest loan.
use super::error::LoanError;
use super::identity::IdentityLookup;
use super::loan::{Investment, Loan, LoanState};
use super::state_machine::apply_transition;
use super::store::LoanLedgerStore;
use super::types::{ActorId, InvestmentId, InvestorId, LoanId, TimeStamp};
use chrono::Utc;
use std::str::FromStr;

/// How far an investor's single investment reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InvestmentScope {
    /// One investment per investor across every loan.
    #[default]
    Investor,
    /// One investment per investor per loan.
    InvestorAndLoan,
}

impl InvestmentScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvestmentScope::Investor => "investor",
            InvestmentScope::InvestorAndLoan => "investor_loan",
        }
    }
}

impl FromStr for InvestmentScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "investor" => Ok(InvestmentScope::Investor),
            "investor_loan" | "investor-loan" => Ok(InvestmentScope::InvestorAndLoan),
            other => Err(format!(
                "Invalid investment scope: '{}'. Expected: investor or investor_loan",
                other
            )),
        }
    }
}

/// Result of a committed investment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundingOutcome {
    pub investment_id: InvestmentId,
    pub total_invested_amount: u64,
    pub state: LoanState,
    pub auto_transitioned: bool,
}

/// Apply one investment to the loan. Returns the state left behind when the
/// loan became fully funded and moved to `invested`.
pub fn settle(
    loan: &mut Loan,
    already_invested: bool,
    investment: &Investment,
    actor: &ActorId,
    now: &TimeStamp<Utc>,
) -> Result<Option<LoanState>, LoanError> {
    if loan.state != LoanState::Published {
        return Err(LoanError::LoanMustBePublished);
    }
    if already_invested {
        return Err(LoanError::InvestmentAlreadyExists);
    }

    loan.total_invested_amount = loan
        .total_invested_amount
        .checked_add(investment.invested_amount)
        .ok_or(LoanError::InvalidAmount)?;

    if loan.is_fully_funded() {
        return apply_transition(loan, LoanState::Invested, actor, now).map(Some);
    }
    Ok(None)
}

pub struct FundingEngine<'a, S: ?Sized, I: ?Sized> {
    store: &'a S,
    identity: &'a I,
    scope: InvestmentScope,
}

impl<'a, S, I> FundingEngine<'a, S, I>
where
    S: LoanLedgerStore + ?Sized,
    I: IdentityLookup + ?Sized,
{
    pub fn new(store: &'a S, identity: &'a I, scope: InvestmentScope) -> Self {
        Self {
            store,
            identity,
            scope,
        }
    }

    fn existing_investment(
        &self,
        investor_id: &InvestorId,
        loan_id: &LoanId,
    ) -> Result<Option<Investment>, LoanError> {
        let found = match self.scope {
            InvestmentScope::Investor => self.store.get_investment_by_investor_id(investor_id),
            InvestmentScope::InvestorAndLoan => self
                .store
                .get_investment_by_investor_and_loan_id(investor_id, loan_id),
        };
        match found {
            Ok(investment) => Ok(Some(investment)),
            Err(LoanError::InvestmentNotFound) => Ok(None),
            Err(err) => Err(err),
        }
    }

    pub fn record_investment(
        &self,
        loan_id: &LoanId,
        investor_id: &InvestorId,
        amount: u64,
        actor: &ActorId,
    ) -> Result<FundingOutcome, LoanError> {
        let loan = self.store.get_loan_by_id(loan_id)?;
        if loan.state != LoanState::Published {
            tracing::warn!(%loan_id, state = %loan.state, "investment into unpublished loan");
            return Err(LoanError::LoanMustBePublished);
        }

        self.identity.get_investor_by_id(investor_id)?;

        if let Some(existing) = self.existing_investment(investor_id, loan_id)? {
            tracing::warn!(
                %investor_id,
                existing = %existing.id,
                scope = self.scope.as_str(),
                "investor already holds an investment"
            );
            return Err(LoanError::InvestmentAlreadyExists);
        }

        let investment = Investment::new(loan.id.clone(), investor_id.clone(), amount)?;
        let outcome = self.store.commit_investment(&investment, self.scope, actor)?;

        tracing::info!(
            %loan_id,
            investment_id = %outcome.investment_id,
            amount,
            total = outcome.total_invested_amount,
            principal = loan.principal_amount,
            "investment recorded"
        );
        if outcome.auto_transitioned {
            tracing::info!(%loan_id, state = %outcome.state, "loan fully funded");
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BorrowerId;

    fn published_loan(principal: u64) -> Loan {
        let mut loan = Loan::propose(
            BorrowerId::from("b"),
            principal,
            0,
            0,
            ActorId::new("ops").unwrap(),
        )
        .unwrap();
        loan.state = LoanState::Published;
        loan
    }

    fn investment(loan: &Loan, amount: u64) -> Investment {
        Investment::new(loan.id.clone(), InvestorId::from("investor-1"), amount).unwrap()
    }

    #[test]
    fn partial_funding_keeps_loan_published() {
        let mut loan = published_loan(1_000);
        let inv = investment(&loan, 400);
        let actor = ActorId::new("ops").unwrap();

        let moved = settle(&mut loan, false, &inv, &actor, &TimeStamp::new()).unwrap();

        assert_eq!(moved, None);
        assert_eq!(loan.state, LoanState::Published);
        assert_eq!(loan.total_invested_amount, 400);
    }

    #[test]
    fn reaching_the_principal_moves_to_invested() {
        let mut loan = published_loan(1_000);
        loan.total_invested_amount = 600;
        let inv = investment(&loan, 400);
        let now = TimeStamp::new();

        let moved = settle(&mut loan, false, &inv, &ActorId::new("ops").unwrap(), &now).unwrap();

        assert_eq!(moved, Some(LoanState::Published));
        assert_eq!(loan.state, LoanState::Invested);
        assert_eq!(loan.invested_at, Some(now));
    }

    #[test]
    fn over_funding_is_accepted() {
        let mut loan = published_loan(1_000);
        loan.total_invested_amount = 900;
        let inv = investment(&loan, 500);

        settle(&mut loan, false, &inv, &ActorId::new("ops").unwrap(), &TimeStamp::new()).unwrap();

        assert_eq!(loan.total_invested_amount, 1_400);
        assert_eq!(loan.state, LoanState::Invested);
    }

    #[test]
    fn duplicate_and_unpublished_are_rejected_without_mutation() {
        let mut loan = published_loan(1_000);
        let inv = investment(&loan, 100);
        let actor = ActorId::new("ops").unwrap();

        assert!(matches!(
            settle(&mut loan, true, &inv, &actor, &TimeStamp::new()),
            Err(LoanError::InvestmentAlreadyExists)
        ));
        loan.state = LoanState::Approved;
        assert!(matches!(
            settle(&mut loan, false, &inv, &actor, &TimeStamp::new()),
            Err(LoanError::LoanMustBePublished)
        ));
        assert_eq!(loan.total_invested_amount, 0);
    }

    #[test]
    fn scope_parses_from_config_strings() {
        assert_eq!("investor".parse::<InvestmentScope>(), Ok(InvestmentScope::Investor));
        assert_eq!(
            "INVESTOR_LOAN".parse::<InvestmentScope>(),
            Ok(InvestmentScope::InvestorAndLoan)
        );
        assert!("loan".parse::<InvestmentScope>().is_err());
    }
}
