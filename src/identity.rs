//! Borrower and investor identity lookup
use super::error::{LoanError, StoreError};
use super::types::{BorrowerId, InvestorId, TimeStamp};
use chrono::Utc;
use sled::Tree;

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct Borrower {
    #[n(0)]
    pub id: BorrowerId,
    #[n(1)]
    pub name: String,
    #[n(2)]
    pub registered_at: TimeStamp<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct Investor {
    #[n(0)]
    pub id: InvestorId,
    #[n(1)]
    pub name: String,
    #[n(2)]
    pub registered_at: TimeStamp<Utc>,
}

/// Existence checks for the parties a loan refers to.
pub trait IdentityLookup: Send + Sync {
    fn get_borrower_by_id(&self, id: &BorrowerId) -> Result<Borrower, LoanError>;
    fn get_investor_by_id(&self, id: &InvestorId) -> Result<Investor, LoanError>;
}

/// Identity directory kept in the same sled database as the ledger.
#[derive(Clone)]
pub struct SledIdentityDirectory {
    borrowers: Tree,
    investors: Tree,
}

impl SledIdentityDirectory {
    pub fn open(db: &sled::Db) -> Result<Self, StoreError> {
        Ok(Self {
            borrowers: db.open_tree("borrowers")?,
            investors: db.open_tree("investors")?,
        })
    }

    pub fn register_borrower(&self, name: &str) -> Result<Borrower, LoanError> {
        let borrower = Borrower {
            id: BorrowerId::generate().map_err(StoreError::identifier)?,
            name: name.to_owned(),
            registered_at: TimeStamp::new(),
        };
        let cbor = minicbor::to_vec(&borrower).map_err(StoreError::encode)?;
        self.borrowers
            .insert(borrower.id.as_bytes(), cbor)
            .map_err(StoreError::from)?;

        tracing::debug!(borrower_id = %borrower.id, "borrower registered");
        Ok(borrower)
    }

    pub fn register_investor(&self, name: &str) -> Result<Investor, LoanError> {
        let investor = Investor {
            id: InvestorId::generate().map_err(StoreError::identifier)?,
            name: name.to_owned(),
            registered_at: TimeStamp::new(),
        };
        let cbor = minicbor::to_vec(&investor).map_err(StoreError::encode)?;
        self.investors
            .insert(investor.id.as_bytes(), cbor)
            .map_err(StoreError::from)?;

        tracing::debug!(investor_id = %investor.id, "investor registered");
        Ok(investor)
    }
}

impl IdentityLookup for SledIdentityDirectory {
    fn get_borrower_by_id(&self, id: &BorrowerId) -> Result<Borrower, LoanError> {
        match self.borrowers.get(id.as_bytes()).map_err(StoreError::from)? {
            Some(bytes) => Ok(minicbor::decode(&bytes).map_err(StoreError::from)?),
            None => Err(LoanError::BorrowerNotFound),
        }
    }

    fn get_investor_by_id(&self, id: &InvestorId) -> Result<Investor, LoanError> {
        match self.investors.get(id.as_bytes()).map_err(StoreError::from)? {
            Some(bytes) => Ok(minicbor::decode(&bytes).map_err(StoreError::from)?),
            None => Err(LoanError::InvestorNotFound),
        }
    }
}
