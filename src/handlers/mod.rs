pub mod health;
pub mod user;
pub mod users;

pub use health::health_handler;
pub use user::{get_user_handler, modify_user_handler, save_user_handler};
pub use users::list_users_handler;

use crate::error::ApiError;

/// Fallback for every (method, path) outside the route table
pub async fn not_found_handler() -> ApiError {
    ApiError::RouteNotFound
}
