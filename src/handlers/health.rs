use crate::routes;
use axum::{Json, http::StatusCode};

/// Fixed body of a successful health check
pub const HEALTHY: &str = "success";

/// GET /health handler - Liveness check
///
/// Answers without touching the record store; readiness of the store is
/// checked once at startup instead.
#[utoipa::path(
    get,
    path = routes::HEALTH,
    responses(
        (status = 200, description = "Service is up", body = String, example = json!("success"))
    ),
    tag = "health"
)]
pub async fn health_handler() -> (StatusCode, Json<&'static str>) {
    tracing::debug!("Health check");
    (StatusCode::OK, Json(HEALTHY))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, body::Body, http::Request, routing::get};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_health_endpoint() {
        let app: Router = Router::new().route(routes::HEALTH, get(health_handler));

        let response = app
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/json"
        );

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let marker: String = serde_json::from_slice(&body).unwrap();
        assert_eq!(marker, "success");
    }
}
