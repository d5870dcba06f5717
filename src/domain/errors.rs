use super::EmailError;

/// 貸出（在庫引き当て）のエラー
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LendCopyError {
    /// 貸出可能な冊数がない
    NoCopiesAvailable,
}

/// 在庫戻しのエラー
///
/// 正常な運用では発生しない。発生した場合は台帳の破損を意味する。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreCopyError {
    /// 戻すと所蔵数を超える
    WouldExceedTotal { total: u32 },
}

/// 貸出記録作成のエラー
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenLoanError {
    /// 指定された返却期限が貸出日時以前
    DueDateNotAfterBorrow,
    /// 貸出期間を加えた返却期限が日時の表現範囲を超える
    DueDateOutOfRange,
}

/// 返却のエラー
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseLoanError {
    /// 既に返却済み
    AlreadyReturned,
}

/// 書籍登録のエラー
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterBookError {
    EmptyTitle,
    EmptyAuthor,
    /// 所蔵数がストアで表現できる上限を超える
    TooManyCopies { max: u32 },
}

/// 書籍情報更新のエラー
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviseBookError {
    EmptyTitle,
    EmptyAuthor,
    TooManyCopies { max: u32 },
    /// 新しい所蔵数が貸出中の冊数を下回る
    TotalBelowOnLoan { on_loan: u32, requested: u32 },
}

impl From<RegisterBookError> for ReviseBookError {
    fn from(err: RegisterBookError) -> Self {
        match err {
            RegisterBookError::EmptyTitle => ReviseBookError::EmptyTitle,
            RegisterBookError::EmptyAuthor => ReviseBookError::EmptyAuthor,
            RegisterBookError::TooManyCopies { max } => ReviseBookError::TooManyCopies { max },
        }
    }
}

/// 会員登録・会員情報更新のエラー
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterMemberError {
    EmptyName,
    InvalidEmail(EmailError),
}

impl From<EmailError> for RegisterMemberError {
    fn from(err: EmailError) -> Self {
        RegisterMemberError::InvalidEmail(err)
    }
}
