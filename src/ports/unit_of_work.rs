use async_trait::async_trait;

use crate::domain::{book::Book, value_objects::BookId};

use super::{CatalogStore, LoanLedger, MembershipStore, error::Result};

/// 1つのアトミックな作業単位
///
/// カタログ、会員名簿、貸出台帳への読み書きをまとめ、
/// すべてコミットされるか、すべて破棄されるかのどちらかになる。
#[async_trait]
pub trait Transaction: CatalogStore + MembershipStore + LoanLedger {
    /// 書籍と貸出中の件数を1つの読み取りで取得する
    ///
    /// 両者は同じ時点の状態を表す。書籍が存在しなければ`None`。
    async fn inventory_snapshot(&mut self, book_id: BookId) -> Result<Option<(Book, u32)>>;

    /// 変更を確定する
    async fn commit(self: Box<Self>) -> Result<()>;

    /// 変更を破棄する
    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// トランザクションを開始するポート
///
/// 接続はトランザクションごとに取得され、commit/rollback/dropで解放される。
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn Transaction>>;
}
