use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::record::Record;
use crate::store::{Ack, Operation, Outcome};

/// Query parameters for GET /user
#[derive(Deserialize, utoipa::IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct UserQuery {
    /// Key of the user to fetch
    pub user_id: Option<String>,
}

/// Request body for PATCH /user
#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ModifyUserRequest {
    pub user_id: String,
    pub update_key: String,
    #[schema(value_type = Object)]
    pub update_value: JsonValue,
}

/// Response type for GET /users
#[derive(Serialize, Deserialize, utoipa::ToSchema)]
pub struct UsersResponse {
    #[schema(value_type = Vec<Object>)]
    pub users: Vec<Record>,
}

/// Response type for a successful POST /user
#[derive(Serialize, Deserialize, utoipa::ToSchema)]
pub struct SaveResponse {
    pub operation: Operation,
    pub outcome: Outcome,
    #[schema(value_type = Object)]
    pub item: Record,
}

impl From<Ack<Record>> for SaveResponse {
    fn from(ack: Ack<Record>) -> Self {
        SaveResponse {
            operation: ack.operation,
            outcome: ack.outcome,
            item: ack.result,
        }
    }
}

/// Response type for a successful PATCH /user
#[derive(Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResponse {
    pub operation: Operation,
    pub outcome: Outcome,
    /// The updated field and its new value
    #[schema(value_type = Object)]
    pub updated_field: Map<String, JsonValue>,
}

impl From<Ack<Map<String, JsonValue>>> for UpdateResponse {
    fn from(ack: Ack<Map<String, JsonValue>>) -> Self {
        UpdateResponse {
            operation: ack.operation,
            outcome: ack.outcome,
            updated_field: ack.result,
        }
    }
}
