mod errors;
mod executor;
mod lending_service;
mod queries;
mod registration;

pub use errors::{LendingError, Result};
pub use executor::RetryPolicy;
pub use lending_service::{LendingPolicy, ServiceDependencies, borrow_book, return_book};
pub use queries::{audit_book, get_book, get_loan, get_member};
pub use registration::{
    delete_book, delete_member, register_book, register_member, update_book, update_member,
};
