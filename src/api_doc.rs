use utoipa::OpenApi;

use crate::error::ErrorResponse;
use crate::handlers;
use crate::models::{ModifyUserRequest, SaveResponse, UpdateResponse, UsersResponse};
use crate::store::{Operation, Outcome};

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "user-router API",
        version = "1.0.0",
        description = "Keyed JSON user records behind a fixed route table"
    ),
    paths(
        handlers::health::health_handler,
        handlers::user::get_user_handler,
        handlers::users::list_users_handler,
        handlers::user::save_user_handler,
        handlers::user::modify_user_handler
    ),
    components(
        schemas(
            SaveResponse,
            UpdateResponse,
            UsersResponse,
            ModifyUserRequest,
            ErrorResponse,
            Operation,
            Outcome
        )
    ),
    tags(
        (name = "health", description = "Liveness"),
        (name = "users", description = "User record operations")
    )
)]
pub struct ApiDoc;
