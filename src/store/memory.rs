use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{Mutex, MutexGuard};

use super::{ContinuationToken, RecordStore, ScanPage, StoreError};
use crate::record::{FieldName, Record};

/// Page size used when none is configured
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Process-local record store.
///
/// Records are kept ordered by key, so scan pages come back in key order and
/// the continuation token is simply the last key of the previous page.
pub struct MemoryStore {
    records: Mutex<BTreeMap<String, Record>>,
    page_size: usize,
}

impl MemoryStore {
    pub fn new(page_size: Option<usize>) -> Self {
        Self {
            records: Mutex::new(BTreeMap::new()),
            page_size: page_size.unwrap_or(DEFAULT_PAGE_SIZE).max(1),
        }
    }

    fn records(&self) -> Result<MutexGuard<'_, BTreeMap<String, Record>>, StoreError> {
        self.records
            .lock()
            .map_err(|_| StoreError::Unavailable(anyhow::anyhow!("memory store lock poisoned")))
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<Record>, StoreError> {
        Ok(self.records()?.get(key).cloned())
    }

    async fn scan_page(&self, start: Option<&ContinuationToken>) -> Result<ScanPage, StoreError> {
        let records = self.records()?;
        let lower = match start {
            Some(token) => Bound::Excluded(token.as_str()),
            None => Bound::Unbounded,
        };

        let mut remaining = records.range::<str, _>((lower, Bound::Unbounded));
        let page: Vec<Record> = remaining
            .by_ref()
            .take(self.page_size)
            .map(|(_, record)| record.clone())
            .collect();

        let next = match (remaining.next(), page.last()) {
            (Some(_), Some(last)) => Some(ContinuationToken::new(last.key())),
            _ => None,
        };

        Ok(ScanPage {
            records: page,
            next,
        })
    }

    async fn put(&self, record: &Record) -> Result<(), StoreError> {
        self.records()?
            .insert(record.key().to_string(), record.clone());
        Ok(())
    }

    async fn set_field(
        &self,
        key: &str,
        field: &FieldName,
        value: &JsonValue,
    ) -> Result<JsonValue, StoreError> {
        let mut records = self.records()?;
        let record = records
            .get_mut(key)
            .ok_or_else(|| StoreError::RecordNotFound(key.to_string()))?;
        record.set(field, value.clone());
        Ok(value.clone())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        self.records().map(|_| ())
    }
}
