use axum::{Router, routing::MethodRouter};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api_doc::ApiDoc;
use crate::handlers;
use crate::routes::{Endpoint, ROUTES};
use crate::state::AppState;

pub const SWAGGER_UI_PATH: &str = "/swagger-ui";
pub const OPENAPI_PATH: &str = "/api-docs/openapi.json";

/// Build the HTTP router from the route table.
///
/// Methods a known path does not list, and paths the table does not list,
/// both fall through to the 404 handler. HEAD is bound to it explicitly,
/// since axum would otherwise answer HEAD with the GET handler.
pub fn build_router(state: AppState, swagger_ui: bool) -> Router {
    let mut paths: Vec<&'static str> = ROUTES.iter().map(|route| route.path).collect();
    paths.sort_unstable();
    paths.dedup();

    let mut router: Router<AppState> = Router::new();
    for path in paths {
        let methods = ROUTES
            .iter()
            .filter(|route| route.path == path)
            .fold(MethodRouter::new(), |methods, route| {
                let method = route.method;
                match route.endpoint {
                    Endpoint::Health => methods.on(method, handlers::health_handler),
                    Endpoint::GetUser => methods.on(method, handlers::get_user_handler),
                    Endpoint::ListUsers => methods.on(method, handlers::list_users_handler),
                    Endpoint::SaveUser => methods.on(method, handlers::save_user_handler),
                    Endpoint::ModifyUser => methods.on(method, handlers::modify_user_handler),
                }
            });
        let methods = methods
            .head(handlers::not_found_handler)
            .fallback(handlers::not_found_handler);
        router = router.route(path, methods);
    }

    if swagger_ui {
        router = router.merge(SwaggerUi::new(SWAGGER_UI_PATH).url(OPENAPI_PATH, ApiDoc::openapi()));
    }

    router
        .fallback(handlers::not_found_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
