//! Loan aggregate, investments and the evidence that gates transitions
use super::error::{LoanError, StoreError};
use super::types::{ActorId, BorrowerId, InvestmentId, InvestorId, LoanId, TimeStamp};
use chrono::Utc;
use std::fmt;
use std::str::FromStr;

#[derive(
    minicbor::Encode,
    minicbor::Decode,
    serde::Serialize,
    serde::Deserialize,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
)]
#[serde(rename_all = "lowercase")]
pub enum LoanState {
    #[n(0)]
    Proposed,
    #[n(1)]
    Approved,
    #[n(2)]
    Rejected,
    #[n(3)]
    Canceled,
    #[n(4)]
    Published,
    #[n(5)]
    Invested,
    #[n(6)]
    Disbursed,
}

impl LoanState {
    pub const ALL: [LoanState; 7] = [
        LoanState::Proposed,
        LoanState::Approved,
        LoanState::Rejected,
        LoanState::Canceled,
        LoanState::Published,
        LoanState::Invested,
        LoanState::Disbursed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LoanState::Proposed => "proposed",
            LoanState::Approved => "approved",
            LoanState::Rejected => "rejected",
            LoanState::Canceled => "canceled",
            LoanState::Published => "published",
            LoanState::Invested => "invested",
            LoanState::Disbursed => "disbursed",
        }
    }
}

impl FromStr for LoanState {
    type Err = LoanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LoanState::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| LoanError::LoanStateInvalid(s.to_owned()))
    }
}

impl fmt::Display for LoanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The loan aggregate. Owned by the ledger store; callers only ever hold a
/// per-request copy.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Loan {
    #[n(0)]
    pub id: LoanId,
    #[n(1)]
    pub borrower_id: BorrowerId,
    #[n(2)]
    pub principal_amount: u64, // minor units, also the funding target
    #[n(3)]
    pub interest_rate_bps: u32,
    #[n(4)]
    pub roi_rate_bps: u32,
    #[n(5)]
    pub state: LoanState,
    #[n(6)]
    pub total_invested_amount: u64,
    #[n(7)]
    pub created_by: ActorId,
    #[n(8)]
    pub created_at: TimeStamp<Utc>,
    // site visit evidence, required for approval
    #[n(9)]
    pub visit_proof_ref: Option<String>,
    #[n(10)]
    pub validated_at: Option<TimeStamp<Utc>>,
    #[n(11)]
    pub validated_by: Option<ActorId>,
    // agreement evidence, required for disbursement
    #[n(12)]
    pub agreement_ref: Option<String>,
    #[n(13)]
    pub agreement_signed: bool,
    #[n(14)]
    pub agreement_signed_at: Option<TimeStamp<Utc>>,
    #[n(15)]
    pub approved_at: Option<TimeStamp<Utc>>,
    #[n(16)]
    pub approved_by: Option<ActorId>,
    #[n(17)]
    pub rejected_at: Option<TimeStamp<Utc>>,
    #[n(18)]
    pub rejected_by: Option<ActorId>,
    #[n(19)]
    pub rejected_reason: Option<String>,
    #[n(20)]
    pub canceled_at: Option<TimeStamp<Utc>>,
    #[n(21)]
    pub canceled_by: Option<ActorId>,
    #[n(22)]
    pub canceled_reason: Option<String>,
    #[n(23)]
    pub published_at: Option<TimeStamp<Utc>>,
    #[n(24)]
    pub published_by: Option<ActorId>,
    #[n(25)]
    pub invested_at: Option<TimeStamp<Utc>>,
    #[n(26)]
    pub disbursed_at: Option<TimeStamp<Utc>>,
    #[n(27)]
    pub disbursed_by: Option<ActorId>,
    #[n(28)]
    pub version: u64, // bumped by the store on every committed write
}

impl Loan {
    /// A fresh loan in the `proposed` state, stamped with its creator.
    pub fn propose(
        borrower_id: BorrowerId,
        principal_amount: u64,
        interest_rate_bps: u32,
        roi_rate_bps: u32,
        created_by: ActorId,
    ) -> Result<Self, LoanError> {
        if principal_amount == 0 {
            return Err(LoanError::InvalidAmount);
        }

        Ok(Self {
            id: LoanId::generate().map_err(StoreError::identifier)?,
            borrower_id,
            principal_amount,
            interest_rate_bps,
            roi_rate_bps,
            state: LoanState::Proposed,
            total_invested_amount: 0,
            created_by,
            created_at: TimeStamp::new(),
            visit_proof_ref: None,
            validated_at: None,
            validated_by: None,
            agreement_ref: None,
            agreement_signed: false,
            agreement_signed_at: None,
            approved_at: None,
            approved_by: None,
            rejected_at: None,
            rejected_by: None,
            rejected_reason: None,
            canceled_at: None,
            canceled_by: None,
            canceled_reason: None,
            published_at: None,
            published_by: None,
            invested_at: None,
            disbursed_at: None,
            disbursed_by: None,
            version: 0,
        })
    }

    /// Cumulative investment has reached the funding target. Over-funding
    /// counts as funded.
    pub fn is_fully_funded(&self) -> bool {
        self.total_invested_amount >= self.principal_amount
    }

    /// Record a piece of evidence. Each variant writes only its own fields.
    ///
    /// Attaching the same kind again replaces what was there, but only until
    /// the transition it backs has been taken. See [`Evidence::accepted_in`].
    pub fn attach_evidence(
        &mut self,
        evidence: &Evidence,
        actor: &ActorId,
        now: TimeStamp<Utc>,
    ) -> Result<(), LoanError> {
        if !evidence.accepted_in(self.state) {
            return Err(LoanError::EvidenceNotAccepted {
                kind: evidence.kind(),
                state: self.state,
            });
        }

        match evidence {
            Evidence::SiteVisit { visit_proof_ref } => {
                self.visit_proof_ref = Some(visit_proof_ref.clone());
                self.validated_at = Some(now);
                self.validated_by = Some(actor.clone());
            }
            Evidence::LoanAgreement { agreement_ref } => {
                self.agreement_ref = Some(agreement_ref.clone());
                self.agreement_signed = true;
                self.agreement_signed_at = Some(now);
            }
            Evidence::Disbursement => {
                self.disbursed_at = Some(now);
                self.disbursed_by = Some(actor.clone());
            }
            Evidence::Rejection { reason } => self.rejected_reason = Some(reason.clone()),
            Evidence::Cancellation { reason } => self.canceled_reason = Some(reason.clone()),
        }
        Ok(())
    }
}

/// Evidence submitted ahead of a transition.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Evidence {
    /// Proof of the field officer's visit to the borrower.
    SiteVisit { visit_proof_ref: String },
    /// The signed loan agreement document.
    LoanAgreement { agreement_ref: String },
    /// Hand-over of funds was recorded by the acting officer.
    Disbursement,
    Rejection { reason: String },
    Cancellation { reason: String },
}

impl Evidence {
    pub fn kind(&self) -> &'static str {
        match self {
            Evidence::SiteVisit { .. } => "site_visit",
            Evidence::LoanAgreement { .. } => "loan_agreement",
            Evidence::Disbursement => "disbursement",
            Evidence::Rejection { .. } => "rejection",
            Evidence::Cancellation { .. } => "cancellation",
        }
    }

    /// Whether a loan in `state` has yet to take the transition this
    /// evidence backs.
    pub fn accepted_in(&self, state: LoanState) -> bool {
        match self {
            Evidence::SiteVisit { .. } | Evidence::Rejection { .. } => state == LoanState::Proposed,
            Evidence::LoanAgreement { .. } | Evidence::Disbursement => {
                state != LoanState::Disbursed
            }
            Evidence::Cancellation { .. } => state != LoanState::Canceled,
        }
    }
}

/// One investor's contribution to one loan. Immutable once recorded.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Investment {
    #[n(0)]
    pub id: InvestmentId,
    #[n(1)]
    pub loan_id: LoanId,
    #[n(2)]
    pub investor_id: InvestorId,
    #[n(3)]
    pub invested_amount: u64,
    #[n(4)]
    pub agreement_ref: Option<String>,
    #[n(5)]
    pub agreement_signed: bool,
    #[n(6)]
    pub agreement_signed_at: Option<TimeStamp<Utc>>,
    #[n(7)]
    pub total_profit: u64,
    #[n(8)]
    pub created_at: TimeStamp<Utc>,
}

impl Investment {
    pub fn new(
        loan_id: LoanId,
        investor_id: InvestorId,
        invested_amount: u64,
    ) -> Result<Self, LoanError> {
        if invested_amount == 0 {
            return Err(LoanError::InvalidAmount);
        }

        Ok(Self {
            id: InvestmentId::generate().map_err(StoreError::identifier)?,
            loan_id,
            investor_id,
            invested_amount,
            agreement_ref: None,
            agreement_signed: false,
            agreement_signed_at: None,
            total_profit: 0,
            created_at: TimeStamp::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proposed_loan(principal: u64) -> Loan {
        Loan::propose(
            BorrowerId::from("borrower-1"),
            principal,
            550,
            200,
            ActorId::new("officer").unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn loan_state_parses_lowercase_names_only() {
        for state in LoanState::ALL {
            assert_eq!(state.as_str().parse::<LoanState>().unwrap(), state);
        }
        assert!(matches!(
            "Published".parse::<LoanState>(),
            Err(LoanError::LoanStateInvalid(s)) if s == "Published"
        ));
        assert!("funded".parse::<LoanState>().is_err());
    }

    #[test]
    fn propose_rejects_zero_principal() {
        let err = Loan::propose(
            BorrowerId::from("b"),
            0,
            0,
            0,
            ActorId::new("officer").unwrap(),
        )
        .unwrap_err();

        assert!(matches!(err, LoanError::InvalidAmount));
    }

    #[test]
    fn new_loan_starts_proposed_and_unfunded() {
        let loan = proposed_loan(1_000);

        assert_eq!(loan.state, LoanState::Proposed);
        assert_eq!(loan.total_invested_amount, 0);
        assert_eq!(loan.created_by.as_str(), "officer");
        assert!(!loan.is_fully_funded());
    }

    #[test]
    fn site_visit_evidence_touches_only_validation_fields() {
        let mut loan = proposed_loan(1_000);
        let before = loan.clone();
        let actor = ActorId::new("field-officer").unwrap();

        loan.attach_evidence(
            &Evidence::SiteVisit {
                visit_proof_ref: "s3://visits/1.jpg".into(),
            },
            &actor,
            TimeStamp::new(),
        )
        .unwrap();

        assert_eq!(loan.visit_proof_ref.as_deref(), Some("s3://visits/1.jpg"));
        assert_eq!(loan.validated_by, Some(actor));
        assert!(loan.validated_at.is_some());
        assert_eq!(loan.agreement_ref, before.agreement_ref);
        assert_eq!(loan.disbursed_at, before.disbursed_at);
        assert_eq!(loan.state, before.state);
    }

    #[test]
    fn evidence_is_replaced_until_its_transition_is_taken() {
        let mut loan = proposed_loan(1_000);
        let first = ActorId::new("officer-1").unwrap();
        let second = ActorId::new("officer-2").unwrap();
        let visit = |proof: &str| Evidence::SiteVisit {
            visit_proof_ref: proof.into(),
        };

        loan.attach_evidence(&visit("first.jpg"), &first, TimeStamp::new())
            .unwrap();
        loan.attach_evidence(&visit("second.jpg"), &second, TimeStamp::new())
            .unwrap();
        assert_eq!(loan.visit_proof_ref.as_deref(), Some("second.jpg"));
        assert_eq!(loan.validated_by, Some(second));

        loan.state = LoanState::Approved;
        let before = loan.clone();
        assert!(matches!(
            loan.attach_evidence(&visit("late.jpg"), &first, TimeStamp::new()),
            Err(LoanError::EvidenceNotAccepted {
                kind: "site_visit",
                state: LoanState::Approved
            })
        ));
        assert_eq!(loan, before);
    }

    #[test]
    fn evidence_for_passed_phases_is_refused() {
        let reason = || "late".to_string();
        let cases = [
            (Evidence::Rejection { reason: reason() }, LoanState::Rejected),
            (Evidence::Rejection { reason: reason() }, LoanState::Published),
            (Evidence::Disbursement, LoanState::Disbursed),
            (
                Evidence::LoanAgreement {
                    agreement_ref: "late.pdf".into(),
                },
                LoanState::Disbursed,
            ),
            (Evidence::Cancellation { reason: reason() }, LoanState::Canceled),
        ];

        for (evidence, state) in cases {
            assert!(!evidence.accepted_in(state), "{} in {state}", evidence.kind());
        }

        // still ahead of the loan
        assert!(Evidence::Disbursement.accepted_in(LoanState::Invested));
        assert!(Evidence::Cancellation { reason: reason() }.accepted_in(LoanState::Disbursed));
    }

    #[test]
    fn loan_cbor_roundtrip() {
        let mut loan = proposed_loan(5_000);
        loan.canceled_reason = Some("duplicate".into());

        let encoded = minicbor::to_vec(&loan).unwrap();
        let decoded: Loan = minicbor::decode(&encoded).unwrap();

        assert_eq!(loan, decoded);
    }
}
