//! Record store client and the backends it can sit on.
//!
//! [`RecordStore`] is the minimal interface a backend has to offer: point
//! reads, one page of a scan, upserts and a single-field update. [`RecordClient`]
//! builds the operations the router needs on top of it (full scans,
//! acknowledgements, field-name checks) so every backend behaves the same way.

pub mod dynamodb;
pub mod memory;
pub mod spanner;

#[cfg(test)]
pub mod testing;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::fmt;
use std::sync::Arc;

use crate::config::{Config, StoreBackend};
use crate::record::{FieldName, Record, RecordError};

/// Errors surfaced by record store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backend could not be reached or failed to execute the operation
    #[error("record store unavailable: {0:#}")]
    Unavailable(anyhow::Error),
    /// The document handed to `put` is not a valid record
    #[error("invalid record: {0}")]
    InvalidRecord(#[from] RecordError),
    /// The field name is not a plain identifier, or names the key field
    #[error("invalid field name: '{0}'")]
    InvalidFieldName(String),
    /// A field update targeted a key with no stored record
    #[error("no record with key '{0}'")]
    RecordNotFound(String),
}

impl From<anyhow::Error> for StoreError {
    fn from(err: anyhow::Error) -> Self {
        StoreError::Unavailable(err)
    }
}

/// Opaque marker for where the next scan page starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinuationToken(String);

impl ContinuationToken {
    pub fn new(last_key: impl Into<String>) -> Self {
        ContinuationToken(last_key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContinuationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One batch of a scan
#[derive(Debug, Clone, Default)]
pub struct ScanPage {
    pub records: Vec<Record>,
    pub next: Option<ContinuationToken>,
}

/// Backend interface for a single keyed collection of records
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &'static str;

    /// Read the record stored under `key`; `Ok(None)` when there is none
    async fn get(&self, key: &str) -> Result<Option<Record>, StoreError>;

    /// Read one page of the collection, starting after `start`
    async fn scan_page(&self, start: Option<&ContinuationToken>) -> Result<ScanPage, StoreError>;

    /// Insert the record, or replace the one with the same key
    async fn put(&self, record: &Record) -> Result<(), StoreError>;

    /// Set one field on an existing record and return its new value.
    ///
    /// Fails with [`StoreError::RecordNotFound`] when no record has `key`.
    async fn set_field(
        &self,
        key: &str,
        field: &FieldName,
        value: &JsonValue,
    ) -> Result<JsonValue, StoreError>;

    /// Verify the backend is reachable
    async fn health_check(&self) -> Result<(), StoreError>;
}

/// Kind of mutation reported in an acknowledgement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    Save,
}

/// Outcome marker reported in an acknowledgement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Success,
}

/// Confirmation of a mutation and what it produced
#[derive(Debug, Clone, PartialEq)]
pub struct Ack<T> {
    pub operation: Operation,
    pub outcome: Outcome,
    pub result: T,
}

impl<T> Ack<T> {
    fn saved(result: T) -> Self {
        Ack {
            operation: Operation::Save,
            outcome: Outcome::Success,
            result,
        }
    }
}

/// Record operations used by the HTTP handlers.
///
/// Cheap to clone; all clones share one backend.
#[derive(Clone)]
pub struct RecordClient {
    store: Arc<dyn RecordStore>,
}

impl RecordClient {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Look up a single record by key.
    ///
    /// A missing record is `Ok(None)`, never an error.
    pub async fn get_by_key(&self, key: &str) -> Result<Option<Record>, StoreError> {
        let record = self.store.get(key).await?;
        tracing::debug!(
            "Lookup of key '{}' on {}: {}",
            key,
            self.store.name(),
            if record.is_some() { "found" } else { "absent" }
        );
        Ok(record)
    }

    /// Read the whole collection, following continuation tokens until the
    /// store reports no more pages.
    ///
    /// Pages are requested one after another and concatenated in the order
    /// the store returns them.
    pub async fn scan_all(&self) -> Result<Vec<Record>, StoreError> {
        let mut records = Vec::new();
        let mut token: Option<ContinuationToken> = None;
        let mut pages = 0usize;

        loop {
            let page = self.store.scan_page(token.as_ref()).await?;
            pages += 1;
            records.extend(page.records);

            match page.next {
                Some(next) if token.as_ref() == Some(&next) => {
                    return Err(StoreError::Unavailable(anyhow::anyhow!(
                        "scan on {} returned continuation token '{}' twice",
                        self.store.name(),
                        next
                    )));
                }
                Some(next) => token = Some(next),
                None => break,
            }
        }

        tracing::debug!(
            "Scanned {} records in {} pages from {}",
            records.len(),
            pages,
            self.store.name()
        );
        Ok(records)
    }

    /// Upsert a full record given as a JSON document
    pub async fn put(&self, document: JsonValue) -> Result<Ack<Record>, StoreError> {
        let record = Record::try_from(document)?;
        self.store.put(&record).await?;
        tracing::debug!("Stored record with key '{}'", record.key());
        Ok(Ack::saved(record))
    }

    /// Set a single field on the record stored under `key`.
    ///
    /// The acknowledgement carries `{field_name: new_value}`.
    pub async fn update_field(
        &self,
        key: &str,
        field_name: &str,
        value: JsonValue,
    ) -> Result<Ack<Map<String, JsonValue>>, StoreError> {
        let field = FieldName::parse(field_name)
            .ok_or_else(|| StoreError::InvalidFieldName(field_name.to_string()))?;

        let updated = self.store.set_field(key, &field, &value).await?;
        tracing::debug!("Updated field '{}' of record '{}'", field, key);

        let mut result = Map::new();
        result.insert(field.as_str().to_string(), updated);
        Ok(Ack::saved(result))
    }

    pub async fn health_check(&self) -> Result<(), StoreError> {
        self.store.health_check().await
    }

    pub fn backend_name(&self) -> &'static str {
        self.store.name()
    }
}

/// Build the backend selected by the configuration
pub async fn connect(config: &Config) -> anyhow::Result<Arc<dyn RecordStore>> {
    let store: Arc<dyn RecordStore> = match config.store_backend {
        StoreBackend::Spanner => {
            let settings = config
                .spanner
                .as_ref()
                .context("Spanner backend selected but Spanner settings are missing")?;
            Arc::new(spanner::SpannerStore::from_config(config, settings).await?)
        }
        StoreBackend::DynamoDb => Arc::new(dynamodb::DynamoDbStore::from_config(config).await?),
        StoreBackend::Memory => Arc::new(memory::MemoryStore::new(
            config.scan_page_size.map(|size| size as usize),
        )),
    };
    Ok(store)
}
