//! HTTP surface: public storefront routes plus the guarded `/admin` API.

pub mod admin;
pub mod session;
pub mod storefront;

use axum::{http::StatusCode, middleware, response::{IntoResponse, Response}, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::domain::aggregates::{OrderError, ProductError};
use crate::{auth, AppState, StoreError};

pub fn router(state: AppState) -> Router {
    let admin = admin::routes().route_layer(middleware::from_fn_with_state(state.clone(), auth::require_admin));

    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "vape-storefront"})) }))
        .merge(storefront::routes())
        .merge(session::routes())
        .merge(admin)
        .layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive()).with_state(state)
}

#[derive(Debug, Deserialize)] pub struct ListParams { pub page: Option<u32>, pub per_page: Option<u32> }
#[derive(Debug, Serialize)] pub struct PaginatedResponse<T> { pub data: Vec<T>, pub total: i64, pub page: u32 }

impl ListParams {
    /// `(page, limit, offset)` with page >= 1 and limit capped at 100.
    pub fn window(&self) -> (u32, i64, i64) {
        let page = self.page.unwrap_or(1).max(1);
        let per_page = self.per_page.unwrap_or(20).clamp(1, 100);
        (page, i64::from(per_page), (i64::from(page) - 1) * i64::from(per_page))
    }
}

impl StoreError {
    fn status(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Self::Validation(_) | Self::Coupon(_) | Self::Phone(_) | Self::Ledger(_) | Self::Cart(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation"),
            Self::Product(ProductError::InsufficientStock { .. } | ProductError::NegativeSold(_)) => (StatusCode::CONFLICT, "insufficient_stock"),
            Self::Product(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation"),
            Self::Order(OrderError::CannotCancel | OrderError::AlreadyCancelled) => (StatusCode::CONFLICT, "order_state"),
            Self::Order(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation"),
            Self::InvalidCredentials => (StatusCode::UNAUTHORIZED, "invalid_credentials"),
            Self::LoginLocked { .. } => (StatusCode::TOO_MANY_REQUESTS, "login_locked"),
            Self::Upstream(_) => (StatusCode::BAD_GATEWAY, "upstream"),
            Self::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        }
    }
}

impl IntoResponse for StoreError {
    fn into_response(self) -> Response {
        let (status, error) = self.status();
        let message = match &self {
            Self::Database(e) => {
                tracing::error!(error = %e, "database error");
                "internal server error".to_string()
            }
            Self::Upstream(e) => {
                tracing::warn!(error = %e, "upstream failure");
                self.to_string()
            }
            other => other.to_string(),
        };
        (status, Json(serde_json::json!({ "error": error, "message": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(StoreError::NotFound("order").status().0, StatusCode::NOT_FOUND);
        assert_eq!(StoreError::LoginLocked { remaining_secs: 10 }.status().0, StatusCode::TOO_MANY_REQUESTS);
        let stock = StoreError::Product(ProductError::InsufficientStock { flavor_id: Uuid::nil(), available: 0 });
        assert_eq!(stock.status(), (StatusCode::CONFLICT, "insufficient_stock"));
        assert_eq!(StoreError::Order(OrderError::CannotCancel).status().0, StatusCode::CONFLICT);
        assert_eq!(StoreError::Validation("x".into()).status().0, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_list_window() {
        let p = ListParams { page: Some(3), per_page: Some(500) };
        assert_eq!(p.window(), (3, 100, 200));
        let p = ListParams { page: Some(0), per_page: None };
        assert_eq!(p.window(), (1, 20, 0));
    }

    #[test]
    fn test_list_window_last_page_does_not_overflow() {
        let p = ListParams { page: Some(u32::MAX), per_page: Some(100) };
        assert_eq!(p.window(), (u32::MAX, 100, (i64::from(u32::MAX) - 1) * 100));
    }
}
