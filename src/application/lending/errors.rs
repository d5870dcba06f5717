use thiserror::Error;

use crate::domain::value_objects::{BookId, LoanId, MemberId};

/// 貸出エンジンのエラー
///
/// ストア層のエラーはトランザクション境界で分類され、必ずこのいずれかに変換される。
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LendingError {
    /// 書籍が存在しない
    #[error("Book {0} not found")]
    BookNotFound(BookId),

    /// 会員が存在しない
    #[error("Member {0} not found")]
    MemberNotFound(MemberId),

    /// 貸出が存在しない
    #[error("Loan {0} not found")]
    LoanNotFound(LoanId),

    /// 貸出可能な冊数がない
    #[error("Book {0} has no copies available")]
    Unavailable(BookId),

    /// 貸出の状態が不正（例: 返却済みの貸出を返却しようとした）
    #[error("Invalid loan state: {0}")]
    InvalidState(String),

    /// 貸出から参照されているため変更・削除できない
    #[error("Referenced by loans: {0}")]
    ReferencedByLoans(String),

    /// 指定された返却期限が貸出日時以前
    #[error("Due date must be after the borrow time")]
    InvalidDueDate,

    /// 入力値が不正
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// 一意制約に違反する登録
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// 同じ行への同時更新に負け、再試行も尽きた
    #[error("Conflicting concurrent update, gave up after {attempts} attempts")]
    Conflict { attempts: u32 },

    /// 在庫の不変条件が破れる（台帳の破損）
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// ストアの一時障害が続き、再試行も尽きた
    #[error("Storage unavailable after {attempts} attempts")]
    StorageUnavailable { attempts: u32 },
}

/// 貸出エンジンの Result型
pub type Result<T> = std::result::Result<T, LendingError>;
