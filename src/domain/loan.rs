use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::{BookId, CloseLoanError, LoanId, MemberId, OpenLoanError};

/// 既定の貸出期間（日数）
pub const DEFAULT_LOAN_PERIOD_DAYS: i64 = 14;

/// 貸出ステータス
///
/// 許される遷移は `Borrowed -> Returned` の1つだけ。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    /// 貸出中
    Borrowed,
    /// 返却済み
    Returned,
}

impl LoanStatus {
    /// 文字列表現を取得する
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Borrowed => "borrowed",
            LoanStatus::Returned => "returned",
        }
    }

    pub fn is_returned(&self) -> bool {
        matches!(self, LoanStatus::Returned)
    }
}

impl std::str::FromStr for LoanStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "borrowed" => Ok(LoanStatus::Borrowed),
            "returned" => Ok(LoanStatus::Returned),
            _ => Err(format!("Invalid loan status: {}", s)),
        }
    }
}

/// Loan - 1冊の書籍の1回の貸出
///
/// 作成後は `borrowed -> returned` の遷移（returned_atの設定を伴う）以外に変更されない。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loan {
    // 識別子
    pub loan_id: LoanId,

    // 他の集約への参照（IDのみ）
    pub book_id: BookId,
    pub member_id: MemberId,

    // 貸出管理の責務
    pub borrowed_at: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
    pub status: LoanStatus,
}

/// 純粋関数：貸出記録を作成する
///
/// ビジネスルール：
/// - 返却期限の指定がなければ貸出日時 + 貸出期間
/// - 指定された返却期限は貸出日時より後でなければならない
/// - 算出した返却期限が日時の範囲を超える場合は失敗する
/// - 状態はBorrowed
///
/// 副作用なし。在庫の引き当ては呼び出し側が同じトランザクションで行う。
pub fn open_loan(
    book_id: BookId,
    member_id: MemberId,
    borrowed_at: DateTime<Utc>,
    requested_due_date: Option<DateTime<Utc>>,
    loan_period: Duration,
) -> Result<Loan, OpenLoanError> {
    let due_date = match requested_due_date {
        Some(due_date) if due_date <= borrowed_at => {
            return Err(OpenLoanError::DueDateNotAfterBorrow);
        }
        Some(due_date) => due_date,
        None => borrowed_at
            .checked_add_signed(loan_period)
            .ok_or(OpenLoanError::DueDateOutOfRange)?,
    };

    Ok(Loan {
        loan_id: LoanId::new(),
        book_id,
        member_id,
        borrowed_at,
        due_date,
        returned_at: None,
        status: LoanStatus::Borrowed,
    })
}

/// 純粋関数：貸出を返却済みにする
///
/// ビジネスルール：
/// - 返却済みの貸出は再度返却できない
/// - 延滞していても返却は受け付ける
///
/// 副作用なし。新しいLoanを返す。
pub fn close_loan(loan: &Loan, returned_at: DateTime<Utc>) -> Result<Loan, CloseLoanError> {
    if loan.status.is_returned() {
        return Err(CloseLoanError::AlreadyReturned);
    }

    Ok(Loan {
        returned_at: Some(returned_at),
        status: LoanStatus::Returned,
        ..loan.clone()
    })
}

/// 純粋関数：延滞判定
pub fn is_overdue(loan: &Loan, now: DateTime<Utc>) -> bool {
    !loan.status.is_returned() && now > loan.due_date
}

#[cfg(test)]
mod tests {
    use super::*;

    fn period() -> Duration {
        Duration::days(DEFAULT_LOAN_PERIOD_DAYS)
    }

    #[test]
    fn test_open_loan_uses_loan_period_for_due_date() {
        let book_id = BookId::new();
        let member_id = MemberId::new();
        let borrowed_at = Utc::now();

        let loan = open_loan(book_id, member_id, borrowed_at, None, period()).unwrap();

        assert_eq!(loan.due_date, borrowed_at + Duration::days(14));
        assert_eq!(loan.status, LoanStatus::Borrowed);
        assert_eq!(loan.returned_at, None);
        assert_eq!(loan.book_id, book_id);
        assert_eq!(loan.member_id, member_id);
    }

    #[test]
    fn test_open_loan_honours_requested_due_date() {
        let borrowed_at = Utc::now();
        let requested = borrowed_at + Duration::days(7);

        let loan = open_loan(
            BookId::new(),
            MemberId::new(),
            borrowed_at,
            Some(requested),
            period(),
        )
        .unwrap();

        assert_eq!(loan.due_date, requested);
    }

    #[test]
    fn test_open_loan_rejects_due_date_in_the_past() {
        let borrowed_at = Utc::now();

        let result = open_loan(
            BookId::new(),
            MemberId::new(),
            borrowed_at,
            Some(borrowed_at),
            period(),
        );

        assert_eq!(result.unwrap_err(), OpenLoanError::DueDateNotAfterBorrow);
    }

    #[test]
    fn test_open_loan_rejects_period_beyond_calendar_range() {
        let result = open_loan(
            BookId::new(),
            MemberId::new(),
            Utc::now(),
            None,
            Duration::days(1_000_000_000),
        );

        assert_eq!(result.unwrap_err(), OpenLoanError::DueDateOutOfRange);
    }

    #[test]
    fn test_close_loan_success() {
        let borrowed_at = Utc::now();
        let loan = open_loan(BookId::new(), MemberId::new(), borrowed_at, None, period()).unwrap();
        let returned_at = borrowed_at + Duration::days(3);

        let closed = close_loan(&loan, returned_at).unwrap();

        assert_eq!(closed.status, LoanStatus::Returned);
        assert_eq!(closed.returned_at, Some(returned_at));
        assert_eq!(closed.loan_id, loan.loan_id);
        assert_eq!(closed.due_date, loan.due_date);
    }

    #[test]
    fn test_close_loan_fails_when_already_returned() {
        let borrowed_at = Utc::now();
        let loan = open_loan(BookId::new(), MemberId::new(), borrowed_at, None, period()).unwrap();
        let closed = close_loan(&loan, borrowed_at + Duration::days(1)).unwrap();

        let result = close_loan(&closed, borrowed_at + Duration::days(2));

        assert_eq!(result.unwrap_err(), CloseLoanError::AlreadyReturned);
    }

    #[test]
    fn test_is_overdue() {
        let borrowed_at = Utc::now();
        let loan = open_loan(BookId::new(), MemberId::new(), borrowed_at, None, period()).unwrap();

        assert!(!is_overdue(&loan, borrowed_at + Duration::days(13)));
        assert!(is_overdue(&loan, borrowed_at + Duration::days(15)));

        let closed = close_loan(&loan, borrowed_at + Duration::days(20)).unwrap();
        assert!(!is_overdue(&closed, borrowed_at + Duration::days(30)));
    }

    #[test]
    fn test_loan_status_round_trips_through_str() {
        for status in [LoanStatus::Borrowed, LoanStatus::Returned] {
            assert_eq!(status.as_str().parse::<LoanStatus>().unwrap(), status);
        }
        assert!("overdue".parse::<LoanStatus>().is_err());
    }
}
