//! Property-based tests for investment funding
//!
//! Random sequences of investments are replayed against a published loan and
//! compared with a straightforward model: amounts accumulate until the
//! principal is reached, the loan then moves to `invested` exactly once and
//! refuses any further money.

use loan_ledger::{
    Evidence, LoanError, LoanState,
    funding::InvestmentScope,
    identity::SledIdentityDirectory,
    service::LoanLifecycleService,
    store::SledLedger,
    types::{ActorId, LoanId},
};
use proptest::prelude::*;
use std::sync::Arc;

type Service = LoanLifecycleService<SledLedger, SledIdentityDirectory>;

fn actor() -> ActorId {
    ActorId::new("ops").unwrap()
}

fn published_loan(principal: u64) -> (Service, LoanId) {
    let db = sled::Config::new().temporary(true).open().unwrap();
    let service = LoanLifecycleService::from_db(Arc::new(db), InvestmentScope::default()).unwrap();

    let borrower = service.identity().register_borrower("Siti").unwrap();
    let (loan_id, _) = service
        .create_loan(&borrower.id, principal, 1_000, 800, &actor())
        .unwrap();
    service
        .attach_evidence(
            &loan_id,
            &Evidence::SiteVisit {
                visit_proof_ref: "visit".into(),
            },
            &actor(),
        )
        .unwrap();
    service.update_loan_state(&loan_id, "approved", &actor()).unwrap();
    service.update_loan_state(&loan_id, "published", &actor()).unwrap();

    (service, loan_id)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn funded_amount_matches_accepted_investments(
        principal in 1u64..=1_000_000,
        amounts in prop::collection::vec(1u64..=400_000, 1..=10),
    ) {
        let (service, loan_id) = published_loan(principal);

        let mut expected_total = 0u64;
        for (i, amount) in amounts.iter().enumerate() {
            let investor = service
                .identity()
                .register_investor(&format!("investor {i}"))
                .unwrap();
            let result = service.create_loan_investment(&loan_id, &investor.id, *amount, &actor());

            if expected_total >= principal {
                prop_assert!(matches!(result, Err(LoanError::LoanMustBePublished)));
            } else {
                prop_assert!(result.is_ok());
                expected_total += amount;
            }
        }

        let loan = service.get_loan(&loan_id).unwrap();
        prop_assert_eq!(loan.total_invested_amount, expected_total);

        let funded = expected_total >= principal;
        let expected_state = if funded { LoanState::Invested } else { LoanState::Published };
        prop_assert_eq!(loan.state, expected_state);
        prop_assert_eq!(loan.invested_at.is_some(), funded);

        let auto = service
            .loan_history(&loan_id)
            .unwrap()
            .iter()
            .filter(|r| r.to == LoanState::Invested)
            .count();
        prop_assert_eq!(auto, usize::from(funded));
    }
}
