use async_trait::async_trait;
use chrono::Duration;
use std::sync::Arc;

use crate::domain::{
    self,
    commands::{BorrowBook, ReturnBook},
    loan::{DEFAULT_LOAN_PERIOD_DAYS, Loan, LoanStatus},
    OpenLoanError,
};
use crate::ports::{Transaction, UnitOfWork};

use super::errors::{LendingError, Result};
use super::executor::{RetryPolicy, StepResult, UnitOfWorkStep, execute};

/// 貸出の運用ポリシー
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LendingPolicy {
    /// 返却期限の指定がない場合の貸出期間
    pub loan_period: Duration,
    pub retry: RetryPolicy,
}

impl Default for LendingPolicy {
    fn default() -> Self {
        Self {
            loan_period: Duration::days(DEFAULT_LOAN_PERIOD_DAYS),
            retry: RetryPolicy::default(),
        }
    }
}

/// サービスの依存関係
///
/// 関数型DDDの原則に従い、データ構造として定義。
/// 振る舞い（メソッド）は持たず、各操作の関数に依存関係を渡す。
#[derive(Clone)]
pub struct ServiceDependencies {
    pub unit_of_work: Arc<dyn UnitOfWork>,
    pub policy: LendingPolicy,
}

impl ServiceDependencies {
    pub fn new(unit_of_work: Arc<dyn UnitOfWork>, policy: LendingPolicy) -> Self {
        Self {
            unit_of_work,
            policy,
        }
    }
}

/// 在庫の不変条件違反を記録してエラーに変換する
fn invariant_violation(detail: String) -> LendingError {
    tracing::error!(%detail, "inventory invariant violated");
    LendingError::InvariantViolation(detail)
}

struct BorrowStep<'a> {
    cmd: &'a BorrowBook,
    loan_period: Duration,
}

#[async_trait]
impl<'a> UnitOfWorkStep for BorrowStep<'a> {
    type Output = Loan;

    fn name(&self) -> &'static str {
        "borrow"
    }

    async fn run(&self, tx: &mut dyn Transaction) -> StepResult<Loan> {
        let cmd = self.cmd;

        // 1. 書籍の存在確認（トランザクション内で最新の在庫とversionを読む）
        let book = tx
            .get_book(cmd.book_id)
            .await?
            .ok_or(LendingError::BookNotFound(cmd.book_id))?;

        // 2. 会員の存在確認
        tx.get_member(cmd.member_id)
            .await?
            .ok_or(LendingError::MemberNotFound(cmd.member_id))?;

        // 3. 読み直した値で貸出可能数を再検証
        let lent = domain::book::lend_copy(&book, cmd.borrowed_at)
            .map_err(|_| LendingError::Unavailable(cmd.book_id))?;

        // 4. 貸出記録を作成
        let loan = domain::loan::open_loan(
            cmd.book_id,
            cmd.member_id,
            cmd.borrowed_at,
            cmd.due_date,
            self.loan_period,
        )
        .map_err(|err| match err {
            OpenLoanError::DueDateNotAfterBorrow => LendingError::InvalidDueDate,
            OpenLoanError::DueDateOutOfRange => LendingError::InvalidInput(
                "loan period pushes the due date beyond the supported date range".to_string(),
            ),
        })?;

        // 5. 在庫の引き当てと貸出の追加を同じトランザクションで行う
        tx.update_availability(cmd.book_id, -1, book.version, lent.updated_at)
            .await?;
        tx.insert_loan(&loan).await?;

        Ok(loan)
    }
}

struct ReturnStep<'a> {
    cmd: &'a ReturnBook,
}

#[async_trait]
impl<'a> UnitOfWorkStep for ReturnStep<'a> {
    type Output = Loan;

    fn name(&self) -> &'static str {
        "return"
    }

    async fn run(&self, tx: &mut dyn Transaction) -> StepResult<Loan> {
        let cmd = self.cmd;

        // 1. 貸出の存在確認
        let loan = tx
            .get_loan(cmd.loan_id)
            .await?
            .ok_or(LendingError::LoanNotFound(cmd.loan_id))?;

        // 2. 状態遷移の検証（borrowed -> returned のみ）
        let returned = domain::loan::close_loan(&loan, cmd.returned_at).map_err(|_| {
            LendingError::InvalidState(format!("loan {} already returned", loan.loan_id))
        })?;

        // 3. 書籍を読み直し、戻しても所蔵数を超えないことを確認
        let book = tx.get_book(loan.book_id).await?.ok_or_else(|| {
            invariant_violation(format!(
                "loan {} references missing book {}",
                loan.loan_id, loan.book_id
            ))
        })?;

        let restored = domain::book::restore_copy(&book, cmd.returned_at).map_err(|_| {
            invariant_violation(format!(
                "returning loan {} would push book {} above {} copies",
                loan.loan_id,
                book.book_id,
                book.inventory.total()
            ))
        })?;

        // 4. 返却と在庫戻しを同じトランザクションで行う
        tx.update_status(cmd.loan_id, LoanStatus::Returned, returned.returned_at)
            .await?;
        tx.update_availability(book.book_id, 1, book.version, restored.updated_at)
            .await?;

        Ok(returned)
    }
}

/// 書籍を貸し出す
///
/// ビジネスルール：
/// - 書籍が存在すること
/// - 会員が存在すること
/// - 書籍の貸出可能数が1以上であること
///
/// # 一貫性保証
///
/// 在庫の引き当てと貸出の追加は1つのトランザクションで行われ、
/// 書籍行のversionで同時更新を検出する。競合に負けた場合は
/// 最初から再試行し、最新の在庫で前提条件を再検証する。
///
/// # 戻り値
/// 作成された貸出
pub async fn borrow_book(deps: &ServiceDependencies, cmd: BorrowBook) -> Result<Loan> {
    let step = BorrowStep {
        cmd: &cmd,
        loan_period: deps.policy.loan_period,
    };

    let loan = execute(deps.unit_of_work.as_ref(), &deps.policy.retry, &step).await?;

    tracing::info!(
        loan_id = %loan.loan_id,
        book_id = %loan.book_id,
        member_id = %loan.member_id,
        due_date = %loan.due_date,
        "book borrowed"
    );
    Ok(loan)
}

/// 書籍を返却する
///
/// ビジネスルール：
/// - 貸出が存在すること
/// - 貸出が返却済みでないこと
/// - 延滞していても返却は受け付ける
///
/// # 一貫性保証
///
/// 貸出のステータス更新と在庫戻しは1つのトランザクションで行われる。
/// 在庫が所蔵数を超える場合は`InvariantViolation`で失敗し、何も変更しない。
///
/// # 戻り値
/// 返却済みになった貸出
pub async fn return_book(deps: &ServiceDependencies, cmd: ReturnBook) -> Result<Loan> {
    let step = ReturnStep { cmd: &cmd };

    let loan = execute(deps.unit_of_work.as_ref(), &deps.policy.retry, &step).await?;

    tracing::info!(
        loan_id = %loan.loan_id,
        book_id = %loan.book_id,
        "book returned"
    );
    Ok(loan)
}
