use crate::error::{ApiError, ErrorResponse};
use crate::models::{ModifyUserRequest, SaveResponse, UpdateResponse, UserQuery};
use crate::routes;
use crate::state::AppState;
use axum::{
    Json,
    body::Bytes,
    extract::{Query, State, rejection::QueryRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::Value as JsonValue;

/// GET /user?userId=... handler - Retrieve a single user record
///
/// An unknown key is not an error: the response is a 200 with an empty body.
#[utoipa::path(
    get,
    path = routes::USER,
    params(UserQuery),
    responses(
        (status = 200, description = "The user record, or an empty body if none exists", body = Object),
        (status = 400, description = "Missing userId", body = ErrorResponse),
        (status = 500, description = "Record store error", body = ErrorResponse)
    ),
    tag = "users"
)]
pub async fn get_user_handler(
    State(state): State<AppState>,
    query: Result<Query<UserQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(query) =
        query.map_err(|rejection| ApiError::MalformedRequest(rejection.body_text()))?;
    let user_id = query
        .user_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::MalformedRequest("missing `userId` query parameter".into()))?;
    // percent-decoding replaces invalid UTF-8 with U+FFFD
    if user_id.contains(char::REPLACEMENT_CHARACTER) {
        return Err(ApiError::MalformedRequest("`userId` is not valid UTF-8".into()));
    }

    match state.records.get_by_key(&user_id).await? {
        Some(record) => {
            tracing::info!("Retrieved user: {}", user_id);
            Ok((StatusCode::OK, Json(record)).into_response())
        }
        None => {
            tracing::info!("No user with id: {}", user_id);
            Ok((
                StatusCode::OK,
                [(header::CONTENT_TYPE, "application/json")],
            )
                .into_response())
        }
    }
}

/// POST /user handler - Create or replace a user record
#[utoipa::path(
    post,
    path = routes::USER,
    request_body = Object,
    responses(
        (status = 200, description = "Record stored", body = SaveResponse),
        (status = 400, description = "Body is not a JSON object with a userId", body = ErrorResponse),
        (status = 500, description = "Record store error", body = ErrorResponse)
    ),
    tag = "users"
)]
pub async fn save_user_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<SaveResponse>), ApiError> {
    let document: JsonValue = serde_json::from_slice(&body)?;

    let ack = state.records.put(document).await?;

    tracing::info!("Saved user: {}", ack.result.key());
    Ok((StatusCode::OK, Json(SaveResponse::from(ack))))
}

/// PATCH /user handler - Set a single field of an existing user record
#[utoipa::path(
    patch,
    path = routes::USER,
    request_body = ModifyUserRequest,
    responses(
        (status = 200, description = "Field updated", body = UpdateResponse),
        (status = 400, description = "Malformed body or unsafe field name", body = ErrorResponse),
        (status = 404, description = "No user with that userId", body = ErrorResponse),
        (status = 500, description = "Record store error", body = ErrorResponse)
    ),
    tag = "users"
)]
pub async fn modify_user_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<UpdateResponse>), ApiError> {
    let request: ModifyUserRequest = serde_json::from_slice(&body)?;
    if request.user_id.is_empty() {
        return Err(ApiError::MalformedRequest("`userId` must not be empty".into()));
    }

    let ack = state
        .records
        .update_field(&request.user_id, &request.update_key, request.update_value)
        .await?;

    tracing::info!(
        "Updated field '{}' of user: {}",
        request.update_key,
        request.user_id
    );
    Ok((StatusCode::OK, Json(UpdateResponse::from(ack))))
}

#[cfg(test)]
mod tests {
    use crate::app::testing::{TestApp, failing_router, send};
    use axum::http::StatusCode;
    use serde_json::{Value as JsonValue, json};

    #[tokio::test]
    async fn test_get_user_found() {
        let app = TestApp::with_users(&[json!({"userId": "u1", "name": "Bob"})]).await;

        let (status, body) = send(&app.router, "GET", "/user?userId=u1", None).await;

        assert_eq!(status, StatusCode::OK);
        let record: JsonValue = serde_json::from_slice(&body).unwrap();
        assert_eq!(record, json!({"userId": "u1", "name": "Bob"}));
    }

    #[tokio::test]
    async fn test_get_user_absent_is_empty_200() {
        let app = TestApp::empty();

        let (status, body) = send(&app.router, "GET", "/user?userId=u1", None).await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.is_empty());
        assert_eq!(app.store.total_calls(), 1);
    }

    #[tokio::test]
    async fn test_get_user_requires_user_id() {
        let app = TestApp::empty();

        for uri in ["/user", "/user?userId=", "/user?id=u1"] {
            let (status, body) = send(&app.router, "GET", uri, None).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "uri {}", uri);
            let error: JsonValue = serde_json::from_slice(&body).unwrap();
            assert!(error["error"].as_str().unwrap().contains("userId"));
        }
        assert_eq!(app.store.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_get_user_bad_query_is_json_400() {
        let app = TestApp::empty();

        for uri in ["/user?userId=a&userId=b", "/user?userId=%FF", "/user?userId=a%C3"] {
            let (status, body) = send(&app.router, "GET", uri, None).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "uri {}", uri);
            let error: JsonValue = serde_json::from_slice(&body).unwrap();
            assert!(error["error"].as_str().unwrap().contains("userId"), "uri {}", uri);
        }
        assert_eq!(app.store.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_get_user_percent_encoded_key() {
        let app = TestApp::with_users(&[json!({"userId": "a b&c", "n": 1})]).await;

        let (status, body) = send(&app.router, "GET", "/user?userId=a%20b%26c", None).await;

        assert_eq!(status, StatusCode::OK);
        let record: JsonValue = serde_json::from_slice(&body).unwrap();
        assert_eq!(record["n"], json!(1));
    }

    #[tokio::test]
    async fn test_save_user_success() {
        let app = TestApp::empty();

        let (status, body) = send(
            &app.router,
            "POST",
            "/user",
            Some(r#"{"userId":"u1","name":"Bob"}"#),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let response: JsonValue = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            response,
            json!({
                "operation": "SAVE",
                "outcome": "SUCCESS",
                "item": {"userId": "u1", "name": "Bob"}
            })
        );

        let (status, body) = send(&app.router, "GET", "/user?userId=u1", None).await;
        assert_eq!(status, StatusCode::OK);
        let record: JsonValue = serde_json::from_slice(&body).unwrap();
        assert_eq!(record, json!({"userId": "u1", "name": "Bob"}));
    }

    #[tokio::test]
    async fn test_save_user_complex_json() {
        let app = TestApp::empty();
        let document = json!({
            "userId": "u2",
            "number": 123,
            "boolean": true,
            "null": null,
            "array": [1, 2, 3],
            "nested": {"key": "value"}
        });

        let body = document.to_string();
        let (status, _) = send(&app.router, "POST", "/user", Some(&body)).await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = send(&app.router, "GET", "/user?userId=u2", None).await;
        let record: JsonValue = serde_json::from_slice(&body).unwrap();
        assert_eq!(record, document);
    }

    #[tokio::test]
    async fn test_save_user_rejects_bad_bodies() {
        let app = TestApp::empty();

        let cases = [
            "{invalid json}",
            "",
            r#"["userId", "u1"]"#,
            r#"{"name": "Bob"}"#,
            r#"{"userId": ""}"#,
            r#"{"userId": 42}"#,
        ];
        for body in cases {
            let (status, response) = send(&app.router, "POST", "/user", Some(body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "body {:?}", body);
            let error: JsonValue = serde_json::from_slice(&response).unwrap();
            assert!(error["error"].is_string());
        }
        assert_eq!(app.store.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_modify_user_success() {
        let app = TestApp::with_users(&[json!({"userId": "u1", "name": "Bob", "age": 40})]).await;

        let (status, body) = send(
            &app.router,
            "PATCH",
            "/user",
            Some(r#"{"userId":"u1","updateKey":"name","updateValue":"Alice"}"#),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let response: JsonValue = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            response,
            json!({
                "operation": "SAVE",
                "outcome": "SUCCESS",
                "updatedField": {"name": "Alice"}
            })
        );

        let (_, body) = send(&app.router, "GET", "/user?userId=u1", None).await;
        let record: JsonValue = serde_json::from_slice(&body).unwrap();
        assert_eq!(record, json!({"userId": "u1", "name": "Alice", "age": 40}));
    }

    #[tokio::test]
    async fn test_modify_user_structured_value() {
        let app = TestApp::with_users(&[json!({"userId": "u1"})]).await;

        let (status, body) = send(
            &app.router,
            "PATCH",
            "/user",
            Some(r#"{"userId":"u1","updateKey":"address","updateValue":{"city":"Oslo"}}"#),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let response: JsonValue = serde_json::from_slice(&body).unwrap();
        assert_eq!(response["updatedField"], json!({"address": {"city": "Oslo"}}));
    }

    #[tokio::test]
    async fn test_modify_user_rejects_unsafe_field_name() {
        let app = TestApp::with_users(&[json!({"userId": "u1", "name": "Bob"})]).await;
        let calls_before = app.store.total_calls();

        for key in ["name = :value, admin", "a.b", "userId", ""] {
            let body = json!({"userId": "u1", "updateKey": key, "updateValue": true}).to_string();
            let (status, response) = send(&app.router, "PATCH", "/user", Some(&body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "updateKey {:?}", key);
            let error: JsonValue = serde_json::from_slice(&response).unwrap();
            assert!(error["error"].as_str().unwrap().contains("Invalid field name"));
        }
        assert_eq!(app.store.total_calls(), calls_before);
    }

    #[tokio::test]
    async fn test_modify_user_rejects_malformed_body() {
        let app = TestApp::empty();

        let cases = [
            "not json",
            r#"{"updateKey":"name","updateValue":"x"}"#,
            r#"{"userId":"u1","updateValue":"x"}"#,
            r#"{"userId":"u1","updateKey":"name"}"#,
            r#"{"budgetId":"u1","updateKey":"name","updateValue":"x"}"#,
            r#"{"userId":"","updateKey":"name","updateValue":"x"}"#,
        ];
        for body in cases {
            let (status, _) = send(&app.router, "PATCH", "/user", Some(body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "body {:?}", body);
        }
        assert_eq!(app.store.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_modify_missing_user_is_404() {
        let app = TestApp::empty();

        let (status, body) = send(
            &app.router,
            "PATCH",
            "/user",
            Some(r#"{"userId":"ghost","updateKey":"name","updateValue":"x"}"#),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        let error: JsonValue = serde_json::from_slice(&body).unwrap();
        assert!(error["error"].as_str().unwrap().contains("ghost"));

        // the failed update must not have created a record
        let (_, body) = send(&app.router, "GET", "/user?userId=ghost", None).await;
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_store_failures_are_500() {
        let router = failing_router();

        let requests = [
            ("GET", "/user?userId=u1", None),
            ("POST", "/user", Some(r#"{"userId":"u1"}"#)),
            (
                "PATCH",
                "/user",
                Some(r#"{"userId":"u1","updateKey":"name","updateValue":"x"}"#),
            ),
        ];
        for (method, uri, body) in requests {
            let (status, response) = send(&router, method, uri, body).await;
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR, "{} {}", method, uri);
            let error: JsonValue = serde_json::from_slice(&response).unwrap();
            assert_eq!(error["error"], "Internal Server Error");
        }
    }
}
