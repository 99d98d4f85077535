use crate::store::RecordClient;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub records: RecordClient,
}
