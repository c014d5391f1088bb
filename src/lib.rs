//! Loan lifecycle and investment funding ledger.
//!
//! A loan moves through `proposed → approved → published → invested →
//! disbursed`, with `rejected` and `canceled` as side exits. Investors fund
//! published loans; reaching the principal moves the loan to `invested` in
//! the same commit that records the investment.

pub mod audit;
pub mod boundary;
pub mod config;
pub mod error;
pub mod funding;
pub mod identity;
pub mod loan;
pub mod service;
pub mod state_machine;
pub mod store;
pub mod telemetry;
pub mod types;

pub use error::{LoanError, StoreError};
pub use loan::{Evidence, Investment, Loan, LoanState};
pub use service::LoanLifecycleService;
