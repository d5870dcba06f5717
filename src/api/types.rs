use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{
    book::{Book, InventoryAudit},
    commands::{BorrowBook, RegisterBook, RegisterMember, UpdateBook, UpdateMember},
    loan::{Loan, is_overdue},
    member::Member,
    value_objects::{BookId, MemberId},
};

/// 書籍登録リクエスト（POST /books）
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RegisterBookRequest {
    pub title: String,
    pub author: String,
    #[serde(default)]
    pub isbn: Option<String>,
    #[serde(default)]
    pub published_year: Option<i32>,
    pub copies_total: u32,
}

impl RegisterBookRequest {
    pub fn to_command(&self, registered_at: DateTime<Utc>) -> RegisterBook {
        RegisterBook {
            title: self.title.clone(),
            author: self.author.clone(),
            isbn: self.isbn.clone(),
            published_year: self.published_year,
            copies_total: self.copies_total,
            registered_at,
        }
    }
}

/// 書籍更新リクエスト（PUT /books/:id）
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpdateBookRequest {
    pub title: String,
    pub author: String,
    #[serde(default)]
    pub isbn: Option<String>,
    #[serde(default)]
    pub published_year: Option<i32>,
    pub copies_total: u32,
}

impl UpdateBookRequest {
    pub fn to_command(&self, book_id: BookId, updated_at: DateTime<Utc>) -> UpdateBook {
        UpdateBook {
            book_id,
            title: self.title.clone(),
            author: self.author.clone(),
            isbn: self.isbn.clone(),
            published_year: self.published_year,
            copies_total: self.copies_total,
            updated_at,
        }
    }
}

/// 会員登録リクエスト（POST /members）
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RegisterMemberRequest {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

impl RegisterMemberRequest {
    pub fn to_command(&self, registered_at: DateTime<Utc>) -> RegisterMember {
        RegisterMember {
            name: self.name.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
            address: self.address.clone(),
            registered_at,
        }
    }
}

/// 会員更新リクエスト（PUT /members/:id）
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpdateMemberRequest {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

impl UpdateMemberRequest {
    pub fn to_command(&self, member_id: MemberId) -> UpdateMember {
        UpdateMember {
            member_id,
            name: self.name.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
            address: self.address.clone(),
        }
    }
}

/// 貸出リクエスト（POST /borrow）
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BorrowBookRequest {
    pub book_id: Uuid,
    pub member_id: Uuid,
    /// 省略時は既定の貸出期間
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
}

impl BorrowBookRequest {
    pub fn to_command(&self, borrowed_at: DateTime<Utc>) -> BorrowBook {
        BorrowBook {
            book_id: BookId::from_uuid(self.book_id),
            member_id: MemberId::from_uuid(self.member_id),
            borrowed_at,
            due_date: self.due_date,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BookResponse {
    pub book_id: Uuid,
    pub title: String,
    pub author: String,
    pub isbn: Option<String>,
    pub published_year: Option<i32>,
    pub copies_total: u32,
    pub copies_available: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Book> for BookResponse {
    fn from(book: Book) -> Self {
        Self {
            book_id: book.book_id.value(),
            title: book.title,
            author: book.author,
            isbn: book.isbn,
            published_year: book.published_year,
            copies_total: book.inventory.total(),
            copies_available: book.inventory.available(),
            created_at: book.created_at,
            updated_at: book.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MemberResponse {
    pub member_id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Member> for MemberResponse {
    fn from(member: Member) -> Self {
        Self {
            member_id: member.member_id.value(),
            name: member.name,
            email: member.email.into(),
            phone: member.phone,
            address: member.address,
            created_at: member.created_at,
        }
    }
}

/// 貸出レスポンス（POST /borrow、POST /loans/:id/return、GET /loans/:id）
#[derive(Debug, Serialize, Deserialize)]
pub struct LoanResponse {
    pub loan_id: Uuid,
    pub book_id: Uuid,
    pub member_id: Uuid,
    pub borrowed_at: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
    pub status: String,
    /// レスポンス生成時点で返却期限を過ぎているか
    pub overdue: bool,
}

impl LoanResponse {
    pub fn from_loan(loan: Loan, now: DateTime<Utc>) -> Self {
        Self {
            overdue: is_overdue(&loan, now),
            loan_id: loan.loan_id.value(),
            book_id: loan.book_id.value(),
            member_id: loan.member_id.value(),
            borrowed_at: loan.borrowed_at,
            due_date: loan.due_date,
            returned_at: loan.returned_at,
            status: loan.status.as_str().to_string(),
        }
    }
}

/// 在庫監査レスポンス（GET /books/:id/audit）
#[derive(Debug, Serialize, Deserialize)]
pub struct AuditResponse {
    pub book_id: Uuid,
    pub copies_total: u32,
    pub copies_available: u32,
    pub open_loans: u32,
    pub consistent: bool,
}

impl From<InventoryAudit> for AuditResponse {
    fn from(audit: InventoryAudit) -> Self {
        Self {
            book_id: audit.book_id.value(),
            copies_total: audit.copies_total,
            copies_available: audit.copies_available,
            open_loans: audit.open_loans,
            consistent: audit.consistent,
        }
    }
}

/// エラーレスポンス
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }
}
