use crate::application::lending::{
    ServiceDependencies, audit_book as execute_audit_book, borrow_book as execute_borrow_book,
    delete_book as execute_delete_book, delete_member as execute_delete_member,
    get_book as execute_get_book, get_loan as execute_get_loan,
    get_member as execute_get_member, register_book as execute_register_book,
    register_member as execute_register_member, return_book as execute_return_book,
    update_book as execute_update_book, update_member as execute_update_member,
};
use crate::domain::{
    commands::ReturnBook,
    value_objects::{BookId, LoanId, MemberId},
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use super::{
    error::ApiError,
    types::{
        AuditResponse, BookResponse, BorrowBookRequest, LoanResponse, MemberResponse,
        RegisterBookRequest, RegisterMemberRequest, UpdateBookRequest, UpdateMemberRequest,
    },
};

// ============================================================================
// State
// ============================================================================

/// ハンドラー間で共有されるアプリケーション状態
#[derive(Clone)]
pub struct AppState {
    pub service_deps: ServiceDependencies,
}

// ============================================================================
// Catalog & membership
// ============================================================================

/// POST /books - 書籍を登録
pub async fn register_book(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterBookRequest>,
) -> Result<(StatusCode, Json<BookResponse>), ApiError> {
    let book = execute_register_book(&state.service_deps, req.to_command(Utc::now())).await?;
    Ok((StatusCode::CREATED, Json(BookResponse::from(book))))
}

/// GET /books/:id - 書籍を取得
pub async fn get_book(
    State(state): State<Arc<AppState>>,
    Path(book_id): Path<Uuid>,
) -> Result<Json<BookResponse>, ApiError> {
    let book = execute_get_book(&state.service_deps, BookId::from_uuid(book_id)).await?;
    Ok(Json(BookResponse::from(book)))
}

/// PUT /books/:id - 書誌情報と所蔵数を更新
///
/// 所蔵数を貸出中の冊数より少なくすることはできない（409）。
pub async fn update_book(
    State(state): State<Arc<AppState>>,
    Path(book_id): Path<Uuid>,
    Json(req): Json<UpdateBookRequest>,
) -> Result<Json<BookResponse>, ApiError> {
    let cmd = req.to_command(BookId::from_uuid(book_id), Utc::now());
    let book = execute_update_book(&state.service_deps, cmd).await?;
    Ok(Json(BookResponse::from(book)))
}

/// DELETE /books/:id - 書籍を削除
///
/// 貸出記録のある書籍は削除できない（409）。
pub async fn delete_book(
    State(state): State<Arc<AppState>>,
    Path(book_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    execute_delete_book(&state.service_deps, BookId::from_uuid(book_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /books/:id/audit - 在庫と貸出台帳の整合性を確認
pub async fn audit_book(
    State(state): State<Arc<AppState>>,
    Path(book_id): Path<Uuid>,
) -> Result<Json<AuditResponse>, ApiError> {
    let audit = execute_audit_book(&state.service_deps, BookId::from_uuid(book_id)).await?;
    Ok(Json(AuditResponse::from(audit)))
}

/// POST /members - 会員を登録
///
/// メールアドレスが登録済みの場合は409。
pub async fn register_member(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterMemberRequest>,
) -> Result<(StatusCode, Json<MemberResponse>), ApiError> {
    let member = execute_register_member(&state.service_deps, req.to_command(Utc::now())).await?;
    Ok((StatusCode::CREATED, Json(MemberResponse::from(member))))
}

/// GET /members/:id - 会員を取得
pub async fn get_member(
    State(state): State<Arc<AppState>>,
    Path(member_id): Path<Uuid>,
) -> Result<Json<MemberResponse>, ApiError> {
    let member = execute_get_member(&state.service_deps, MemberId::from_uuid(member_id)).await?;
    Ok(Json(MemberResponse::from(member)))
}

/// PUT /members/:id - 会員情報を更新
pub async fn update_member(
    State(state): State<Arc<AppState>>,
    Path(member_id): Path<Uuid>,
    Json(req): Json<UpdateMemberRequest>,
) -> Result<Json<MemberResponse>, ApiError> {
    let cmd = req.to_command(MemberId::from_uuid(member_id));
    let member = execute_update_member(&state.service_deps, cmd).await?;
    Ok(Json(MemberResponse::from(member)))
}

/// DELETE /members/:id - 会員を削除
pub async fn delete_member(
    State(state): State<Arc<AppState>>,
    Path(member_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    execute_delete_member(&state.service_deps, MemberId::from_uuid(member_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Lending
// ============================================================================

/// POST /borrow - 書籍を貸し出す
///
/// 強制されるビジネスルール:
/// - 書籍と会員が存在すること
/// - 書籍の貸出可能数が1以上であること
/// - 返却期限を指定する場合は現在時刻より後であること
pub async fn borrow_book(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BorrowBookRequest>,
) -> Result<(StatusCode, Json<LoanResponse>), ApiError> {
    let now = Utc::now();
    let loan = execute_borrow_book(&state.service_deps, req.to_command(now)).await?;
    Ok((StatusCode::CREATED, Json(LoanResponse::from_loan(loan, now))))
}

/// POST /loans/:id/return - 書籍を返却
///
/// 強制されるビジネスルール:
/// - 貸出が存在すること
/// - 既に返却済みでないこと
/// - 延滞中の貸出も返却可能
pub async fn return_book(
    State(state): State<Arc<AppState>>,
    Path(loan_id): Path<Uuid>,
) -> Result<Json<LoanResponse>, ApiError> {
    let now = Utc::now();
    let cmd = ReturnBook {
        loan_id: LoanId::from_uuid(loan_id),
        returned_at: now,
    };

    let loan = execute_return_book(&state.service_deps, cmd).await?;
    Ok(Json(LoanResponse::from_loan(loan, now)))
}

/// GET /loans/:id - 貸出を取得
pub async fn get_loan(
    State(state): State<Arc<AppState>>,
    Path(loan_id): Path<Uuid>,
) -> Result<Json<LoanResponse>, ApiError> {
    let loan = execute_get_loan(&state.service_deps, LoanId::from_uuid(loan_id)).await?;
    Ok(Json(LoanResponse::from_loan(loan, Utc::now())))
}
