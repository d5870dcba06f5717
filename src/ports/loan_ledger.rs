use crate::domain::{
    loan::{Loan, LoanStatus},
    value_objects::{BookId, LoanId, MemberId},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::Result;

/// 貸出台帳のストアポート
#[async_trait]
pub trait LoanLedger: Send {
    /// 貸出を追加する
    async fn insert_loan(&mut self, loan: &Loan) -> Result<()>;

    /// IDで貸出を取得する
    async fn get_loan(&mut self, loan_id: LoanId) -> Result<Option<Loan>>;

    /// 貸出のステータスを更新する
    ///
    /// 貸出中（borrowed）の行だけが更新対象。別のトランザクションが先に
    /// 返却した場合は`StoreError::VersionConflict`。
    async fn update_status(
        &mut self,
        loan_id: LoanId,
        status: LoanStatus,
        returned_at: Option<DateTime<Utc>>,
    ) -> Result<()>;

    /// 書籍の貸出中（borrowed）の件数
    ///
    /// 在庫の整合性監査に使用される。
    async fn count_open_loans(&mut self, book_id: BookId) -> Result<u32>;

    /// 書籍を参照する貸出（返却済みを含む）があるか
    async fn book_has_loans(&mut self, book_id: BookId) -> Result<bool>;

    /// 会員を参照する貸出（返却済みを含む）があるか
    async fn member_has_loans(&mut self, member_id: MemberId) -> Result<bool>;
}
