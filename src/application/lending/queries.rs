use async_trait::async_trait;

use crate::domain::{
    self,
    book::{Book, InventoryAudit},
    loan::Loan,
    member::Member,
    value_objects::{BookId, LoanId, MemberId},
};
use crate::ports::Transaction;

use super::errors::{LendingError, Result};
use super::executor::{StepResult, UnitOfWorkStep, execute};
use super::lending_service::ServiceDependencies;

struct FetchBook(BookId);

#[async_trait]
impl UnitOfWorkStep for FetchBook {
    type Output = Book;

    fn name(&self) -> &'static str {
        "get_book"
    }

    async fn run(&self, tx: &mut dyn Transaction) -> StepResult<Book> {
        Ok(tx
            .get_book(self.0)
            .await?
            .ok_or(LendingError::BookNotFound(self.0))?)
    }
}

struct FetchMember(MemberId);

#[async_trait]
impl UnitOfWorkStep for FetchMember {
    type Output = Member;

    fn name(&self) -> &'static str {
        "get_member"
    }

    async fn run(&self, tx: &mut dyn Transaction) -> StepResult<Member> {
        Ok(tx
            .get_member(self.0)
            .await?
            .ok_or(LendingError::MemberNotFound(self.0))?)
    }
}

struct FetchLoan(LoanId);

#[async_trait]
impl UnitOfWorkStep for FetchLoan {
    type Output = Loan;

    fn name(&self) -> &'static str {
        "get_loan"
    }

    async fn run(&self, tx: &mut dyn Transaction) -> StepResult<Loan> {
        Ok(tx
            .get_loan(self.0)
            .await?
            .ok_or(LendingError::LoanNotFound(self.0))?)
    }
}

struct AuditBook(BookId);

#[async_trait]
impl UnitOfWorkStep for AuditBook {
    type Output = InventoryAudit;

    fn name(&self) -> &'static str {
        "audit_book"
    }

    async fn run(&self, tx: &mut dyn Transaction) -> StepResult<InventoryAudit> {
        let (book, open_loans) = tx
            .inventory_snapshot(self.0)
            .await?
            .ok_or(LendingError::BookNotFound(self.0))?;
        Ok(domain::book::audit(&book, open_loans))
    }
}

/// IDで書籍を取得する
pub async fn get_book(deps: &ServiceDependencies, book_id: BookId) -> Result<Book> {
    execute(deps.unit_of_work.as_ref(), &deps.policy.retry, &FetchBook(book_id)).await
}

/// IDで会員を取得する
pub async fn get_member(deps: &ServiceDependencies, member_id: MemberId) -> Result<Member> {
    execute(
        deps.unit_of_work.as_ref(),
        &deps.policy.retry,
        &FetchMember(member_id),
    )
    .await
}

/// IDで貸出を取得する
pub async fn get_loan(deps: &ServiceDependencies, loan_id: LoanId) -> Result<Loan> {
    execute(deps.unit_of_work.as_ref(), &deps.policy.retry, &FetchLoan(loan_id)).await
}

/// 在庫の整合性を監査する
///
/// 書籍の在庫と貸出中の件数を同じ時点のスナップショットとして読み、
/// `copies_available == copies_total - open_loans` を検証する。
/// 不整合は警告として記録し、結果として返す。
pub async fn audit_book(deps: &ServiceDependencies, book_id: BookId) -> Result<InventoryAudit> {
    let audit = execute(deps.unit_of_work.as_ref(), &deps.policy.retry, &AuditBook(book_id)).await?;

    if !audit.consistent {
        tracing::warn!(
            book_id = %audit.book_id,
            copies_total = audit.copies_total,
            copies_available = audit.copies_available,
            open_loans = audit.open_loans,
            "inventory does not match open loans"
        );
    }
    Ok(audit)
}
