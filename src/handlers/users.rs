use crate::error::{ApiError, ErrorResponse};
use crate::models::UsersResponse;
use crate::routes;
use crate::state::AppState;
use axum::{Json, extract::State, http::StatusCode};

/// GET /users handler - List every user record
///
/// Follows the store's pagination to the end, so the response always holds
/// the complete collection in store order.
#[utoipa::path(
    get,
    path = routes::USERS,
    responses(
        (status = 200, description = "All user records", body = UsersResponse),
        (status = 500, description = "Record store error", body = ErrorResponse)
    ),
    tag = "users"
)]
pub async fn list_users_handler(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<UsersResponse>), ApiError> {
    let users = state.records.scan_all().await?;

    tracing::info!("Listed {} users", users.len());
    Ok((StatusCode::OK, Json(UsersResponse { users })))
}

#[cfg(test)]
mod tests {
    use crate::app::testing::{TestApp, failing_router, send};
    use crate::models::UsersResponse;
    use axum::http::StatusCode;
    use serde_json::{Value as JsonValue, json};

    #[tokio::test]
    async fn test_list_users_empty() {
        let app = TestApp::empty();

        let (status, body) = send(&app.router, "GET", "/users", None).await;

        assert_eq!(status, StatusCode::OK);
        let response: JsonValue = serde_json::from_slice(&body).unwrap();
        assert_eq!(response, json!({"users": []}));
    }

    #[tokio::test]
    async fn test_list_users_spans_all_pages() {
        let users: Vec<JsonValue> = (0..7)
            .map(|i| json!({"userId": format!("user-{}", i), "index": i}))
            .collect();
        // page size 3: pages of 3, 3, 1
        let app = TestApp::with_users(&users).await;

        let (status, body) = send(&app.router, "GET", "/users", None).await;

        assert_eq!(status, StatusCode::OK);
        let response: UsersResponse = serde_json::from_slice(&body).unwrap();
        let keys: Vec<&str> = response.users.iter().map(|r| r.key()).collect();
        assert_eq!(
            keys,
            vec!["user-0", "user-1", "user-2", "user-3", "user-4", "user-5", "user-6"]
        );
        assert_eq!(app.store.scan_calls(), 3);
    }

    #[tokio::test]
    async fn test_list_users_store_failure_is_500() {
        let router = failing_router();

        let (status, body) = send(&router, "GET", "/users", None).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let error: JsonValue = serde_json::from_slice(&body).unwrap();
        assert_eq!(error, json!({"error": "Internal Server Error"}));
    }
}
