//! AWS Lambda entry point.
//!
//! `lambda_http` turns each API Gateway proxy event into an HTTP request and
//! the router's response back into `{statusCode, headers, body}`, so the
//! Lambda function and the HTTP server share one route table.

use axum::{
    Router,
    http::{Uri, uri::PathAndQuery},
};
use lambda_http::request::RequestContext;
use lambda_http::{Request, RequestExt};
use tower::ServiceExt;
use tower::util::MapRequest;

type StageStripped = MapRequest<Router, fn(Request) -> Request>;

/// Serve proxy events until the Lambda runtime shuts the function down
pub async fn run(router: Router) -> anyhow::Result<()> {
    tracing::info!("Starting Lambda runtime");
    lambda_http::run(lambda_service(router))
        .await
        .map_err(|err| anyhow::anyhow!("Lambda runtime failed: {}", err))
}

/// The router as the Lambda runtime sees it.
///
/// REST API events get the stage name prefixed to their path; routes are
/// matched on the path the client sent.
fn lambda_service(router: Router) -> StageStripped {
    router.map_request(strip_stage as fn(Request) -> Request)
}

fn strip_stage(mut request: Request) -> Request {
    let stage = match request.request_context_ref() {
        Some(RequestContext::ApiGatewayV1(context)) => context.stage.clone(),
        _ => None,
    };

    if let Some(uri) = stage.and_then(|stage| without_stage(request.uri(), &stage)) {
        *request.uri_mut() = uri;
    }
    request
}

fn without_stage(uri: &Uri, stage: &str) -> Option<Uri> {
    let rest = uri.path().strip_prefix('/')?.strip_prefix(stage)?;
    if !(rest.is_empty() || rest.starts_with('/')) {
        return None;
    }

    let path = if rest.is_empty() { "/" } else { rest };
    let target = match uri.query() {
        Some(query) => format!("{}?{}", path, query),
        None => path.to_string(),
    };

    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(target.parse::<PathAndQuery>().ok()?);
    Uri::from_parts(parts).ok()
}
