use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers::{
    AppState, audit_book, borrow_book, delete_book, delete_member, get_book, get_loan,
    get_member, register_book, register_member, return_book, update_book, update_member,
};

/// Creates the API router
///
/// Catalog and membership:
/// - POST /books, GET/PUT/DELETE /books/:id, GET /books/:id/audit
/// - POST /members, GET/PUT/DELETE /members/:id
///
/// Lending:
/// - POST /borrow - Borrow one copy of a book
/// - POST /loans/:id/return - Return a loan
/// - GET /loans/:id - Get loan details
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check endpoint
        .route("/health", get(health_check))
        .route("/books", post(register_book))
        .route(
            "/books/:id",
            get(get_book).put(update_book).delete(delete_book),
        )
        .route("/books/:id/audit", get(audit_book))
        .route("/members", post(register_member))
        .route(
            "/members/:id",
            get(get_member).put(update_member).delete(delete_member),
        )
        .route("/borrow", post(borrow_book))
        .route("/loans/:id", get(get_loan))
        .route("/loans/:id/return", post(return_book))
        // Add tracing middleware
        .layer(TraceLayer::new_for_http())
        // Add application state
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
