use crate::application::lending::LendingError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use super::types::ErrorResponse;

/// API層のエラー型
///
/// アプリケーション層のエラーをラップし、HTTPレスポンスへのマッピングを提供する。
#[derive(Debug)]
pub struct ApiError(LendingError);

impl From<LendingError> for ApiError {
    fn from(err: LendingError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    /// HTTPステータスとエラー種別
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match &self.0 {
            // 404 Not Found - リクエストされたリソースが存在しない
            LendingError::BookNotFound(_) => (StatusCode::NOT_FOUND, "BOOK_NOT_FOUND"),
            LendingError::MemberNotFound(_) => (StatusCode::NOT_FOUND, "MEMBER_NOT_FOUND"),
            LendingError::LoanNotFound(_) => (StatusCode::NOT_FOUND, "LOAN_NOT_FOUND"),

            // 400 Bad Request - 入力値の形式が不正
            LendingError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "INVALID_INPUT"),

            // 409 Conflict - 現在の状態と両立しない要求
            LendingError::Unavailable(_) => (StatusCode::CONFLICT, "BOOK_UNAVAILABLE"),
            LendingError::InvalidState(_) => (StatusCode::CONFLICT, "INVALID_LOAN_STATE"),
            LendingError::ReferencedByLoans(_) => (StatusCode::CONFLICT, "REFERENCED_BY_LOANS"),
            LendingError::InvalidDueDate => (StatusCode::CONFLICT, "INVALID_DUE_DATE"),
            LendingError::AlreadyExists(_) => (StatusCode::CONFLICT, "ALREADY_EXISTS"),
            LendingError::Conflict { .. } => (StatusCode::CONFLICT, "CONCURRENT_UPDATE"),

            // 503 Service Unavailable - 再試行で回復しうる障害
            LendingError::StorageUnavailable { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, "STORAGE_UNAVAILABLE")
            }

            // 500 Internal Server Error - 台帳の破損
            LendingError::InvariantViolation(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INVARIANT_VIOLATION")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type) = self.status_and_code();

        // 内部エラーの詳細はログに記録し、クライアントには一般的なメッセージのみを返す
        let message = match &self.0 {
            LendingError::InvariantViolation(detail) => {
                tracing::error!(%detail, "request failed on an invariant violation");
                "Inventory records are inconsistent".to_string()
            }
            LendingError::StorageUnavailable { attempts } => {
                tracing::error!(attempts, "request failed, storage unavailable");
                "Storage is temporarily unavailable, try again later".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(ErrorResponse::new(error_type, message));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::BookId;

    fn status_of(err: LendingError) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            status_of(LendingError::BookNotFound(BookId::new())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(LendingError::Unavailable(BookId::new())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(LendingError::InvalidInput("copies".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(LendingError::ReferencedByLoans("open loans".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(LendingError::Conflict { attempts: 3 }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(LendingError::StorageUnavailable { attempts: 3 }),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(LendingError::InvariantViolation("negative".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
