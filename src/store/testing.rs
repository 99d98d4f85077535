//! Store doubles shared by the unit tests.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{ContinuationToken, RecordStore, ScanPage, StoreError};
use crate::record::{FieldName, Record};

/// Wraps a store and counts the calls made through it
pub struct CountingStore<S> {
    inner: S,
    scans: AtomicUsize,
    total: AtomicUsize,
}

impl<S: RecordStore> CountingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            scans: AtomicUsize::new(0),
            total: AtomicUsize::new(0),
        }
    }

    /// Direct access, bypassing the counters
    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn scan_calls(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    fn count(&self) {
        self.total.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl<S: RecordStore> RecordStore for CountingStore<S> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn get(&self, key: &str) -> Result<Option<Record>, StoreError> {
        self.count();
        self.inner.get(key).await
    }

    async fn scan_page(&self, start: Option<&ContinuationToken>) -> Result<ScanPage, StoreError> {
        self.count();
        self.scans.fetch_add(1, Ordering::SeqCst);
        self.inner.scan_page(start).await
    }

    async fn put(&self, record: &Record) -> Result<(), StoreError> {
        self.count();
        self.inner.put(record).await
    }

    async fn set_field(
        &self,
        key: &str,
        field: &FieldName,
        value: &JsonValue,
    ) -> Result<JsonValue, StoreError> {
        self.count();
        self.inner.set_field(key, field, value).await
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        self.count();
        self.inner.health_check().await
    }
}

enum Mode {
    Always,
    ScanAfter(usize),
    RepeatToken,
}

/// A store whose operations fail the way an unreachable backend would
pub struct FailingStore {
    mode: Mode,
    scans: AtomicUsize,
}

impl FailingStore {
    /// Every operation fails
    pub fn always() -> Self {
        Self::with_mode(Mode::Always)
    }

    /// The first `pages` scan pages succeed, the next one fails
    pub fn failing_scan_after(pages: usize) -> Self {
        Self::with_mode(Mode::ScanAfter(pages))
    }

    /// Scan keeps handing back the same continuation token
    pub fn repeating_token() -> Self {
        Self::with_mode(Mode::RepeatToken)
    }

    fn with_mode(mode: Mode) -> Self {
        Self {
            mode,
            scans: AtomicUsize::new(0),
        }
    }

    fn unavailable() -> StoreError {
        StoreError::Unavailable(anyhow::anyhow!("connection refused"))
    }
}

#[async_trait]
impl RecordStore for FailingStore {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn get(&self, _key: &str) -> Result<Option<Record>, StoreError> {
        Err(Self::unavailable())
    }

    async fn scan_page(&self, _start: Option<&ContinuationToken>) -> Result<ScanPage, StoreError> {
        let page = self.scans.fetch_add(1, Ordering::SeqCst);
        match self.mode {
            Mode::ScanAfter(ok_pages) if page < ok_pages => Ok(ScanPage {
                records: Vec::new(),
                next: Some(ContinuationToken::new(format!("page-{}", page))),
            }),
            Mode::RepeatToken => Ok(ScanPage {
                records: Vec::new(),
                next: Some(ContinuationToken::new("stuck")),
            }),
            _ => Err(Self::unavailable()),
        }
    }

    async fn put(&self, _record: &Record) -> Result<(), StoreError> {
        Err(Self::unavailable())
    }

    async fn set_field(
        &self,
        _key: &str,
        _field: &FieldName,
        _value: &JsonValue,
    ) -> Result<JsonValue, StoreError> {
        Err(Self::unavailable())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Err(Self::unavailable())
    }
}
