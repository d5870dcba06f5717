pub mod catalog_store;
pub mod error;
pub mod loan_ledger;
pub mod membership_store;
pub mod unit_of_work;

// パブリックに型を再エクスポート
pub use unit_of_work::{PgTransaction, UnitOfWork as PostgresUnitOfWork};
