//! Loan state machine: edge legality, evidence requirements and the field set
//! each transition is allowed to write. Pure logic, no I/O.
use super::error::LoanError;
use super::loan::{Loan, LoanState};
use super::types::{ActorId, TimeStamp};
use chrono::Utc;

/// Successors reachable from `from`. There are no self-loops.
pub fn allowed_targets(from: LoanState) -> &'static [LoanState] {
    use LoanState::*;

    match from {
        Proposed => &[Rejected, Canceled, Approved],
        Approved => &[Canceled, Published],
        Published => &[Canceled, Invested],
        Invested => &[Canceled, Disbursed],
        Disbursed => &[Canceled],
        Canceled => &[Proposed, Approved, Published, Invested, Disbursed],
        Rejected => &[Proposed],
    }
}

pub fn can_transition(from: LoanState, to: LoanState) -> bool {
    allowed_targets(from).contains(&to)
}

fn is_present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

/// Whether `loan` carries the evidence needed to enter `target`. The edge
/// itself is checked separately by [`can_transition`].
pub fn requirements_satisfied(loan: &Loan, target: LoanState) -> bool {
    match target {
        LoanState::Approved => {
            loan.state == LoanState::Proposed
                && is_present(&loan.visit_proof_ref)
                && loan.validated_at.is_some()
                && loan.validated_by.is_some()
        }
        LoanState::Published => loan.state == LoanState::Approved,
        LoanState::Invested => loan.state == LoanState::Published && loan.is_fully_funded(),
        LoanState::Disbursed => {
            loan.state == LoanState::Invested
                && is_present(&loan.agreement_ref)
                && loan.agreement_signed
                && loan.agreement_signed_at.is_some()
                && loan.disbursed_at.is_some()
                && loan.disbursed_by.is_some()
        }
        LoanState::Canceled => is_present(&loan.canceled_reason),
        LoanState::Rejected => is_present(&loan.rejected_reason),
        LoanState::Proposed => true,
    }
}

/// Edge legality first, then evidence. A same-state request fails on the
/// edge check since the table holds no self-loops.
pub fn check_transition(loan: &Loan, target: LoanState) -> Result<(), LoanError> {
    if !can_transition(loan.state, target) {
        return Err(LoanError::LoanStateTransitionNotAllowed {
            from: loan.state,
            to: target,
        });
    }
    if !requirements_satisfied(loan, target) {
        return Err(LoanError::StateTransitionRequirementNotFulfilled(target));
    }
    Ok(())
}

/// Persisted fields a transition may write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoanField {
    State,
    ApprovedAt,
    ApprovedBy,
    RejectedAt,
    RejectedBy,
    CanceledAt,
    CanceledBy,
    PublishedAt,
    PublishedBy,
    InvestedAt,
}

/// The fixed field set written when entering `target`. Sets for different
/// targets only share [`LoanField::State`].
pub fn updated_fields(target: LoanState) -> &'static [LoanField] {
    use LoanField::*;

    match target {
        LoanState::Approved => &[State, ApprovedAt, ApprovedBy],
        LoanState::Rejected => &[State, RejectedAt, RejectedBy],
        LoanState::Canceled => &[State, CanceledAt, CanceledBy],
        LoanState::Published => &[State, PublishedAt, PublishedBy],
        LoanState::Invested => &[State, InvestedAt],
        LoanState::Proposed | LoanState::Disbursed => &[State],
    }
}

/// Validate and apply a transition in place, returning the state it left.
///
/// This is the single transition path: explicit state updates and the
/// automatic move to `invested` both go through here.
pub fn apply_transition(
    loan: &mut Loan,
    target: LoanState,
    actor: &ActorId,
    now: &TimeStamp<Utc>,
) -> Result<LoanState, LoanError> {
    check_transition(loan, target)?;

    let from = loan.state;
    for field in updated_fields(target) {
        match field {
            LoanField::State => loan.state = target,
            LoanField::ApprovedAt => loan.approved_at = Some(now.clone()),
            LoanField::ApprovedBy => loan.approved_by = Some(actor.clone()),
            LoanField::RejectedAt => loan.rejected_at = Some(now.clone()),
            LoanField::RejectedBy => loan.rejected_by = Some(actor.clone()),
            LoanField::CanceledAt => loan.canceled_at = Some(now.clone()),
            LoanField::CanceledBy => loan.canceled_by = Some(actor.clone()),
            LoanField::PublishedAt => loan.published_at = Some(now.clone()),
            LoanField::PublishedBy => loan.published_by = Some(actor.clone()),
            LoanField::InvestedAt => loan.invested_at = Some(now.clone()),
        }
    }

    Ok(from)
}
