pub mod catalog_store;
pub mod error;
pub mod loan_ledger;
pub mod membership_store;
pub mod unit_of_work;

pub use catalog_store::*;
pub use error::*;
pub use loan_ledger::*;
pub use membership_store::*;
pub use unit_of_work::*;
