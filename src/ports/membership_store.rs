use crate::domain::{member::Member, value_objects::MemberId};
use async_trait::async_trait;

use super::error::Result;

/// 会員名簿のストアポート
///
/// 貸出エンジンからは存在確認のための読み取りだけが行われる。
/// 会員の更新・削除は管理操作から行われる。
#[async_trait]
pub trait MembershipStore: Send {
    /// IDで会員を取得する
    async fn get_member(&mut self, member_id: MemberId) -> Result<Option<Member>>;

    /// 会員を追加する
    ///
    /// メールアドレスが既に登録されている場合は`StoreError::Duplicate`。
    async fn insert_member(&mut self, member: &Member) -> Result<()>;

    /// 会員情報を書き換える。会員が存在しなければ`false`
    ///
    /// メールアドレスが他の会員と重複する場合は`StoreError::Duplicate`。
    async fn update_member(&mut self, member: &Member) -> Result<bool>;

    /// 会員を削除する。会員が存在しなければ`false`
    async fn delete_member(&mut self, member_id: MemberId) -> Result<bool>;
}
