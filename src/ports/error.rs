use thiserror::Error;
use uuid::Uuid;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// ストア層のエラー
///
/// アダプターはバックエンド固有のエラーをこの分類に変換して返す。
/// 貸出エンジンはこの分類だけを見て再試行するか打ち切るかを決める。
#[derive(Debug, Error)]
pub enum StoreError {
    /// 楽観的排他制御の競合（期待したversionの行が存在しない）
    #[error("version conflict on {entity} {id}")]
    VersionConflict { entity: &'static str, id: Uuid },

    /// バックエンドが検出した書き込み競合（直列化失敗、デッドロック）
    #[error("write conflict detected by the store")]
    WriteConflict(#[source] BoxError),

    /// 一時的な障害（接続断、タイムアウト、プール枯渇）
    #[error("transient storage failure")]
    Transient(#[source] BoxError),

    /// 一意制約違反
    #[error("duplicate {0}")]
    Duplicate(String),

    /// その他の整合性制約違反（CHECK、外部キー）
    #[error("constraint violated: {0}")]
    Constraint(String),

    /// 永続化された値がドメインの不変条件を満たさない
    #[error("corrupt row: {0}")]
    Corrupt(String),

    /// 分類できないストアのエラー
    #[error("storage error")]
    Other(#[source] BoxError),
}

/// ストア層の Result型
pub type Result<T> = std::result::Result<T, StoreError>;
