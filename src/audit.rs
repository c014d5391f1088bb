//! Audit trail of accepted loan transitions
use super::loan::LoanState;
use super::state_machine::can_transition;
use super::types::{ActorId, LoanId, TimeStamp};
use chrono::Utc;

/// One accepted transition. Records of a loan form a chain: each carries the
/// sha256 digest of its predecessor's CBOR encoding.
#[derive(Debug, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Clone)]
pub struct TransitionRecord {
    #[n(0)]
    pub loan_id: LoanId,
    #[n(1)]
    pub sequence: u64, // loan version the transition committed at
    #[n(2)]
    pub from: LoanState,
    #[n(3)]
    pub to: LoanState,
    #[n(4)]
    pub actor: ActorId,
    #[n(5)]
    pub at: TimeStamp<Utc>,
    #[n(6)]
    pub previous_digest: Option<String>,
}

impl TransitionRecord {
    pub fn new(
        loan_id: LoanId,
        sequence: u64,
        from: LoanState,
        to: LoanState,
        actor: ActorId,
        at: TimeStamp<Utc>,
        previous_digest: Option<String>,
    ) -> Self {
        Self {
            loan_id,
            sequence,
            from,
            to,
            actor,
            at,
            previous_digest,
        }
    }

    /// CBOR encoding and its sha256 digest.
    pub fn build(&self) -> anyhow::Result<(String, Vec<u8>)> {
        let cbor = minicbor::to_vec(self)?;
        let hash = sha256::digest(&cbor);

        Ok((hash, cbor))
    }
}

/// Check that a loan's history is a contiguous walk over legal edges with an
/// unbroken digest chain.
pub fn verify_history(records: &[TransitionRecord]) -> bool {
    let mut previous: Option<(&TransitionRecord, String)> = None;

    for record in records {
        if !can_transition(record.from, record.to) {
            return false;
        }
        match &previous {
            None => {
                if record.previous_digest.is_some() {
                    return false;
                }
            }
            Some((prev, digest)) => {
                if prev.loan_id != record.loan_id
                    || prev.to != record.from
                    || prev.sequence >= record.sequence
                    || record.previous_digest.as_deref() != Some(digest.as_str())
                {
                    return false;
                }
            }
        }
        let Ok((digest, _)) = record.build() else {
            return false;
        };
        previous = Some((record, digest));
    }

    true
}
