use async_trait::async_trait;

use crate::domain::{
    self,
    book::Book,
    commands::{RegisterBook, RegisterMember, UpdateBook, UpdateMember},
    member::Member,
    value_objects::{BookId, MemberId},
    RegisterBookError, RegisterMemberError, ReviseBookError,
};
use crate::ports::Transaction;

use super::errors::{LendingError, Result};
use super::executor::{StepResult, UnitOfWorkStep, execute};
use super::lending_service::ServiceDependencies;

impl From<RegisterBookError> for LendingError {
    fn from(err: RegisterBookError) -> Self {
        let reason = match err {
            RegisterBookError::EmptyTitle => "title must not be empty".to_string(),
            RegisterBookError::EmptyAuthor => "author must not be empty".to_string(),
            RegisterBookError::TooManyCopies { max } => {
                format!("copies_total must be at most {}", max)
            }
        };
        LendingError::InvalidInput(reason)
    }
}

impl From<ReviseBookError> for LendingError {
    fn from(err: ReviseBookError) -> Self {
        match err {
            ReviseBookError::EmptyTitle => RegisterBookError::EmptyTitle.into(),
            ReviseBookError::EmptyAuthor => RegisterBookError::EmptyAuthor.into(),
            ReviseBookError::TooManyCopies { max } => {
                RegisterBookError::TooManyCopies { max }.into()
            }
            ReviseBookError::TotalBelowOnLoan { on_loan, requested } => {
                LendingError::ReferencedByLoans(format!(
                    "{} copies are on loan, copies_total cannot drop to {}",
                    on_loan, requested
                ))
            }
        }
    }
}

impl From<RegisterMemberError> for LendingError {
    fn from(err: RegisterMemberError) -> Self {
        match err {
            RegisterMemberError::EmptyName => {
                LendingError::InvalidInput("name must not be empty".to_string())
            }
            RegisterMemberError::InvalidEmail(e) => LendingError::InvalidInput(e.to_string()),
        }
    }
}

struct InsertBook<'a> {
    book: &'a Book,
}

#[async_trait]
impl<'a> UnitOfWorkStep for InsertBook<'a> {
    type Output = ();

    fn name(&self) -> &'static str {
        "register_book"
    }

    async fn run(&self, tx: &mut dyn Transaction) -> StepResult<()> {
        tx.insert_book(self.book).await?;
        Ok(())
    }
}

struct InsertMember<'a> {
    member: &'a Member,
}

#[async_trait]
impl<'a> UnitOfWorkStep for InsertMember<'a> {
    type Output = ();

    fn name(&self) -> &'static str {
        "register_member"
    }

    async fn run(&self, tx: &mut dyn Transaction) -> StepResult<()> {
        tx.insert_member(self.member).await?;
        Ok(())
    }
}

struct UpdateBookStep<'a> {
    cmd: &'a UpdateBook,
}

#[async_trait]
impl<'a> UnitOfWorkStep for UpdateBookStep<'a> {
    type Output = Book;

    fn name(&self) -> &'static str {
        "update_book"
    }

    async fn run(&self, tx: &mut dyn Transaction) -> StepResult<Book> {
        let book_id = self.cmd.book_id;
        let book = tx
            .get_book(book_id)
            .await?
            .ok_or(LendingError::BookNotFound(book_id))?;

        // 読み直した在庫で、所蔵数が貸出中の冊数を下回らないことを確認する
        let revised = domain::book::revise_book(&book, self.cmd.clone())
            .map_err(LendingError::from)?;
        let version = tx.update_book(&revised, book.version).await?;

        Ok(Book { version, ..revised })
    }
}

struct DeleteBookStep(BookId);

#[async_trait]
impl UnitOfWorkStep for DeleteBookStep {
    type Output = ();

    fn name(&self) -> &'static str {
        "delete_book"
    }

    async fn run(&self, tx: &mut dyn Transaction) -> StepResult<()> {
        let book = tx
            .get_book(self.0)
            .await?
            .ok_or(LendingError::BookNotFound(self.0))?;

        let open_loans = tx.count_open_loans(self.0).await?;
        if open_loans > 0 {
            return Err(LendingError::ReferencedByLoans(format!(
                "book {} has {} open loans",
                self.0, open_loans
            ))
            .into());
        }
        if tx.book_has_loans(self.0).await? {
            return Err(LendingError::ReferencedByLoans(format!(
                "book {} has loan history",
                self.0
            ))
            .into());
        }

        tx.delete_book(self.0, book.version).await?;
        Ok(())
    }
}

struct UpdateMemberStep<'a> {
    cmd: &'a UpdateMember,
}

#[async_trait]
impl<'a> UnitOfWorkStep for UpdateMemberStep<'a> {
    type Output = Member;

    fn name(&self) -> &'static str {
        "update_member"
    }

    async fn run(&self, tx: &mut dyn Transaction) -> StepResult<Member> {
        let member_id = self.cmd.member_id;
        let member = tx
            .get_member(member_id)
            .await?
            .ok_or(LendingError::MemberNotFound(member_id))?;

        let revised = domain::member::revise_member(&member, self.cmd.clone())
            .map_err(LendingError::from)?;
        if !tx.update_member(&revised).await? {
            return Err(LendingError::MemberNotFound(member_id).into());
        }

        Ok(revised)
    }
}

struct DeleteMemberStep(MemberId);

#[async_trait]
impl UnitOfWorkStep for DeleteMemberStep {
    type Output = ();

    fn name(&self) -> &'static str {
        "delete_member"
    }

    async fn run(&self, tx: &mut dyn Transaction) -> StepResult<()> {
        tx.get_member(self.0)
            .await?
            .ok_or(LendingError::MemberNotFound(self.0))?;

        if tx.member_has_loans(self.0).await? {
            return Err(LendingError::ReferencedByLoans(format!(
                "member {} has loan records",
                self.0
            ))
            .into());
        }

        if !tx.delete_member(self.0).await? {
            return Err(LendingError::MemberNotFound(self.0).into());
        }
        Ok(())
    }
}

/// 書籍を登録する
///
/// 登録直後は全冊が貸出可能（copies_available = copies_total）。
pub async fn register_book(deps: &ServiceDependencies, cmd: RegisterBook) -> Result<Book> {
    let book = domain::book::register_book(cmd)?;

    execute(
        deps.unit_of_work.as_ref(),
        &deps.policy.retry,
        &InsertBook { book: &book },
    )
    .await?;

    tracing::info!(book_id = %book.book_id, copies = book.inventory.total(), "book registered");
    Ok(book)
}

/// 会員を登録する
///
/// メールアドレスが登録済みの場合は`AlreadyExists`。
pub async fn register_member(deps: &ServiceDependencies, cmd: RegisterMember) -> Result<Member> {
    let member = domain::member::register_member(cmd)?;

    execute(
        deps.unit_of_work.as_ref(),
        &deps.policy.retry,
        &InsertMember { member: &member },
    )
    .await?;

    tracing::info!(member_id = %member.member_id, "member registered");
    Ok(member)
}

/// 書誌情報と所蔵数を更新する
///
/// 所蔵数を変えると、貸出中の冊数を保ったまま貸出可能数が同じだけ増減する。
/// 貸出中の冊数を下回る所蔵数は`ReferencedByLoans`で拒否される。
/// 貸出・返却と同じく書籍行のversionで同時更新を検出し、競合時は再試行する。
pub async fn update_book(deps: &ServiceDependencies, cmd: UpdateBook) -> Result<Book> {
    let book = execute(
        deps.unit_of_work.as_ref(),
        &deps.policy.retry,
        &UpdateBookStep { cmd: &cmd },
    )
    .await?;

    tracing::info!(
        book_id = %book.book_id,
        copies_total = book.inventory.total(),
        copies_available = book.inventory.available(),
        "book updated"
    );
    Ok(book)
}

/// 書籍を削除する
///
/// 返却済みを含め、貸出から参照されている書籍は削除できない。
pub async fn delete_book(deps: &ServiceDependencies, book_id: BookId) -> Result<()> {
    execute(
        deps.unit_of_work.as_ref(),
        &deps.policy.retry,
        &DeleteBookStep(book_id),
    )
    .await?;

    tracing::info!(%book_id, "book deleted");
    Ok(())
}

/// 会員情報を更新する
///
/// メールアドレスが他の会員と重複する場合は`AlreadyExists`。
pub async fn update_member(deps: &ServiceDependencies, cmd: UpdateMember) -> Result<Member> {
    let member = execute(
        deps.unit_of_work.as_ref(),
        &deps.policy.retry,
        &UpdateMemberStep { cmd: &cmd },
    )
    .await?;

    tracing::info!(member_id = %member.member_id, "member updated");
    Ok(member)
}

/// 会員を削除する
///
/// 貸出記録のある会員は削除できない。
pub async fn delete_member(deps: &ServiceDependencies, member_id: MemberId) -> Result<()> {
    execute(
        deps.unit_of_work.as_ref(),
        &deps.policy.retry,
        &DeleteMemberStep(member_id),
    )
    .await?;

    tracing::info!(%member_id, "member deleted");
    Ok(())
}
