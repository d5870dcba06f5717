use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::ValidateEmail;

/// 貸出ID - 貸出台帳の行ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LoanId(Uuid);

impl LoanId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn value(&self) -> Uuid {
        self.0
    }
}

impl Default for LoanId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for LoanId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// 書籍ID - 蔵書カタログへの参照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BookId(Uuid);

impl BookId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn value(&self) -> Uuid {
        self.0
    }
}

impl Default for BookId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BookId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// 会員ID - 会員名簿への参照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemberId(Uuid);

impl MemberId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn value(&self) -> Uuid {
        self.0
    }
}

impl Default for MemberId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MemberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// 在庫数エラー
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InventoryError {
    /// 貸出可能数が所蔵数を超えている
    AvailableExceedsTotal { total: u32, available: u32 },
    /// 貸出可能な冊数がない
    NoCopiesAvailable,
    /// すべての冊数が書架にある（戻す貸出がない）
    AllCopiesOnShelf { total: u32 },
    /// 所蔵数が貸出中の冊数を下回る
    TotalBelowOnLoan { on_loan: u32, requested: u32 },
}

/// 書籍の在庫数
///
/// 不変条件：0 <= available <= total
/// 型システムでこの制約を強制し、範囲外の値を作成できないようにする。
/// 貸出中の冊数は `total - available` で導出される。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Inventory {
    total: u32,
    available: u32,
}

impl Inventory {
    /// 新規登録（全冊が書架にある）
    pub fn new(total: u32) -> Self {
        Self {
            total,
            available: total,
        }
    }

    /// 永続化された値から復元する
    ///
    /// # エラー
    /// available が total を超える場合は`InventoryError::AvailableExceedsTotal`を返す
    pub fn try_new(total: u32, available: u32) -> Result<Self, InventoryError> {
        if available > total {
            return Err(InventoryError::AvailableExceedsTotal { total, available });
        }
        Ok(Self { total, available })
    }

    /// 1冊貸し出す
    ///
    /// # エラー
    /// 貸出可能数が0の場合は`InventoryError::NoCopiesAvailable`を返す
    pub fn take(self) -> Result<Self, InventoryError> {
        if self.available == 0 {
            return Err(InventoryError::NoCopiesAvailable);
        }
        Ok(Self {
            available: self.available - 1,
            ..self
        })
    }

    /// 1冊書架に戻す
    ///
    /// # エラー
    /// 既に全冊が書架にある場合は`InventoryError::AllCopiesOnShelf`を返す
    pub fn put_back(self) -> Result<Self, InventoryError> {
        if self.available >= self.total {
            return Err(InventoryError::AllCopiesOnShelf { total: self.total });
        }
        Ok(Self {
            available: self.available + 1,
            ..self
        })
    }

    /// 所蔵数を変更する。貸出中の冊数は保たれ、増減分だけ貸出可能数が変わる
    ///
    /// # エラー
    /// 新しい所蔵数が貸出中の冊数を下回る場合は`InventoryError::TotalBelowOnLoan`を返す
    pub fn resize(self, total: u32) -> Result<Self, InventoryError> {
        let on_loan = self.on_loan();
        if total < on_loan {
            return Err(InventoryError::TotalBelowOnLoan {
                on_loan,
                requested: total,
            });
        }
        Ok(Self {
            total,
            available: total - on_loan,
        })
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn available(&self) -> u32 {
        self.available
    }

    /// 貸出中の冊数
    pub fn on_loan(&self) -> u32 {
        self.total - self.available
    }
}

/// メールアドレスエラー
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmailError {
    Empty,
    Malformed(String),
}

impl std::fmt::Display for EmailError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmailError::Empty => write!(f, "email must not be empty"),
            EmailError::Malformed(raw) => write!(f, "malformed email address: {}", raw),
        }
    }
}

/// メールアドレス
///
/// 前後の空白を除去し、小文字に正規化して保持する。
/// 一意性の判定は正規化後の値で行われる。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Email(String);

impl Email {
    pub fn parse(raw: &str) -> Result<Self, EmailError> {
        let normalized = raw.trim().to_lowercase();
        if normalized.is_empty() {
            return Err(EmailError::Empty);
        }

        if !normalized.validate_email() {
            return Err(EmailError::Malformed(raw.to_string()));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Email {
    type Error = EmailError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Email> for String {
    fn from(email: Email) -> Self {
        email.0
    }
}
