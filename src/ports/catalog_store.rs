use crate::domain::{book::Book, value_objects::BookId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::Result;

/// 蔵書カタログのストアポート
///
/// Bookの行を排他的に所有する。トランザクションの一部として動作し、
/// 同じトランザクション内の書き込みは後続の読み取りに反映される。
#[async_trait]
pub trait CatalogStore: Send {
    /// IDで書籍を取得する
    async fn get_book(&mut self, book_id: BookId) -> Result<Option<Book>>;

    /// 貸出可能数を`delta`だけ変更する
    ///
    /// 行のversionが`expected_version`と一致する場合のみ適用し、新しいversionを返す。
    /// 一致しない（または行が存在しない）場合は`StoreError::VersionConflict`。
    /// 範囲外になる変更は`StoreError::Constraint`。
    /// `updated_at`は行の更新日時として保存される。
    async fn update_availability(
        &mut self,
        book_id: BookId,
        delta: i32,
        expected_version: i64,
        updated_at: DateTime<Utc>,
    ) -> Result<i64>;

    /// 書誌情報と在庫数を書き換える
    ///
    /// `update_availability`と同じくversionで同時更新を検出し、新しいversionを返す。
    async fn update_book(&mut self, book: &Book, expected_version: i64) -> Result<i64>;

    /// 書籍を削除する
    ///
    /// versionが一致しない（または行が存在しない）場合は`StoreError::VersionConflict`。
    async fn delete_book(&mut self, book_id: BookId, expected_version: i64) -> Result<()>;

    /// 書籍を追加する
    async fn insert_book(&mut self, book: &Book) -> Result<()>;
}
