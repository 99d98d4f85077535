use anyhow::{Context, Result};
use async_trait::async_trait;
use gcloud_gax::grpc::{Code, Status};
use gcloud_gax::retry::TryAs;
use gcloud_googleapis::spanner::admin::database::v1::{
    CreateDatabaseRequest, GetDatabaseDdlRequest, GetDatabaseRequest, UpdateDatabaseDdlRequest,
};
use gcloud_googleapis::spanner::admin::instance::v1::{
    CreateInstanceRequest, GetInstanceRequest, Instance,
};
use gcloud_spanner::admin::client::Client as AdminClient;
use gcloud_spanner::admin::AdminClientConfig;
use gcloud_spanner::client::{Client, ClientConfig};
use gcloud_spanner::mutation::{insert_or_update, update};
use gcloud_spanner::row::Row;
use gcloud_spanner::session::SessionError;
use gcloud_spanner::statement::Statement;
use gcloud_spanner::value::CommitTimestamp;
use serde_json::Value as JsonValue;
use std::sync::Arc;

use super::{ContinuationToken, RecordStore, ScanPage, StoreError};
use crate::config::{Config, SpannerSettings};
use crate::record::{FieldName, Record, RecordError};

/// Page size used when none is configured
pub const DEFAULT_PAGE_SIZE: i64 = 100;

/// Record store backed by a Spanner table of JSON documents.
///
/// Each row holds one record: `id` is the record key and `data` the whole
/// document, key field included.
#[derive(Clone)]
pub struct SpannerStore {
    inner: Arc<Client>,
    table: String,
    page_size: i64,
}

/// Failure inside the read-write transaction used for field updates
#[derive(Debug, thiserror::Error)]
enum TxError {
    #[error("no record with key '{0}'")]
    NotFound(String),
    #[error(transparent)]
    Grpc(#[from] Status),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Row(#[from] gcloud_spanner::row::Error),
    #[error("stored document is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("stored document is not a valid record: {0}")]
    Record(#[from] RecordError),
}

impl TryAs<Status> for TxError {
    fn try_as(&self) -> Option<&Status> {
        match self {
            TxError::Grpc(status) => Some(status),
            _ => None,
        }
    }
}

impl SpannerStore {
    /// Create a new Spanner-backed store from configuration
    ///
    /// The gcloud-spanner library automatically detects the
    /// SPANNER_EMULATOR_HOST environment variable and connects to
    /// the emulator when set, or production Spanner otherwise.
    ///
    /// Missing instance, database or table are created before connecting.
    pub async fn from_config(config: &Config, settings: &SpannerSettings) -> Result<Self> {
        Provisioner::connect(config, settings)
            .await?
            .provision(&config.record_table)
            .await?;

        let database_path = database_path(settings);

        match &config.spanner_emulator_host {
            Some(host) => tracing::info!("Connecting to Spanner emulator at: {}", host),
            None => tracing::info!("Connecting to production Spanner"),
        }

        // ClientConfig::default() automatically uses SPANNER_EMULATOR_HOST if set
        let client = Client::new(&database_path, ClientConfig::default())
            .await
            .context("Failed to create Spanner client")?;

        tracing::info!(
            "Successfully connected to Spanner database: {}",
            database_path
        );

        Ok(Self {
            inner: Arc::new(client),
            table: config.record_table.clone(),
            page_size: config
                .scan_page_size
                .map(i64::from)
                .unwrap_or(DEFAULT_PAGE_SIZE),
        })
    }

    /// Upsert a record under its key
    ///
    /// `updated_at` is set to the commit timestamp.
    async fn upsert(&self, record: &Record) -> Result<()> {
        let key = record.key().to_string();
        let data = serde_json::to_string(record).context("Failed to serialize record")?;

        let mutation = insert_or_update(
            &self.table,
            &["id", "data", "updated_at"],
            &[&key, &data, &CommitTimestamp::new()],
        );

        self.inner
            .apply(vec![mutation])
            .await
            .context("Failed to upsert record to Spanner")?;

        tracing::debug!("Upserted record with key: {}", key);
        Ok(())
    }

    /// Read a record by key
    ///
    /// # Returns
    /// * `Ok(Some(record))` - Record found
    /// * `Ok(None)` - No row with that key
    /// * `Err(_)` - Spanner operation failed or the stored document is unreadable
    async fn read(&self, key: &str) -> Result<Option<Record>> {
        let mut statement = Statement::new(select_by_key_sql(&self.table));
        statement.add_param("id", &key.to_string());

        let mut tx = self
            .inner
            .single()
            .await
            .context("Failed to create read transaction")?;

        let mut result_set = tx
            .query(statement)
            .await
            .context("Failed to query record from Spanner")?;

        match result_set.next().await? {
            Some(row) => Ok(Some(decode_row(&row)?)),
            None => {
                tracing::debug!("No record with key: {}", key);
                Ok(None)
            }
        }
    }

    /// Read up to `page_size` rows with keys strictly after `after`
    async fn read_page(&self, after: Option<&ContinuationToken>) -> Result<ScanPage> {
        let mut statement = Statement::new(scan_page_sql(&self.table, self.page_size));
        let after_key = after.map(|token| token.as_str().to_string()).unwrap_or_default();
        statement.add_param("after", &after_key);

        let mut tx = self
            .inner
            .single()
            .await
            .context("Failed to create read transaction for scan")?;

        let mut result_set = tx
            .query(statement)
            .await
            .context("Failed to execute scan query")?;

        let mut records = Vec::new();
        while let Some(row) = result_set.next().await? {
            records.push(decode_row(&row)?);
        }

        // A full page may have more rows behind it; a short one is the last.
        let next = if records.len() as i64 == self.page_size {
            records.last().map(|record| ContinuationToken::new(record.key()))
        } else {
            None
        };

        tracing::debug!(
            "Scanned {} records after '{}' (more: {})",
            records.len(),
            after_key,
            next.is_some()
        );
        Ok(ScanPage { records, next })
    }

    /// Set one field inside the stored document in a read-write transaction
    async fn write_field(
        &self,
        key: &str,
        field: &FieldName,
        value: &JsonValue,
    ) -> Result<JsonValue, StoreError> {
        let table = self.table.clone();
        let key = key.to_string();
        let field = field.clone();
        let value = value.clone();

        let result = self
            .inner
            .read_write_transaction(|tx| {
                let table = table.clone();
                let key = key.clone();
                let field = field.clone();
                let value = value.clone();
                Box::pin(async move {
                    let mut record = {
                        let mut statement = Statement::new(select_by_key_sql(&table));
                        statement.add_param("id", &key);
                        let mut result_set = tx.query(statement).await?;
                        match result_set.next().await? {
                            Some(row) => {
                                let data: String = row.column_by_name("data")?;
                                Record::try_from(serde_json::from_str::<JsonValue>(&data)?)?
                            }
                            None => return Err(TxError::NotFound(key)),
                        }
                    };

                    record.set(&field, value.clone());
                    let data = serde_json::to_string(&record)?;
                    tx.buffer_write(vec![update(
                        &table,
                        &["id", "data", "updated_at"],
                        &[&key, &data, &CommitTimestamp::new()],
                    )]);
                    Ok(value)
                })
            })
            .await;

        match result {
            Ok((_, value)) => {
                tracing::debug!("Updated field '{}' of record with key: {}", field, key);
                Ok(value)
            }
            Err(TxError::NotFound(key)) => Err(StoreError::RecordNotFound(key)),
            Err(e) => Err(StoreError::Unavailable(
                anyhow::Error::new(e).context("Failed to update record field in Spanner"),
            )),
        }
    }

    /// Perform a health check by executing a simple query
    async fn ping(&self) -> Result<()> {
        let statement = Statement::new("SELECT 1");

        let mut tx = self
            .inner
            .single()
            .await
            .context("Failed to create health check transaction")?;

        let mut result_set = tx
            .query(statement)
            .await
            .context("Failed to execute health check query")?;

        if result_set.next().await?.is_some() {
            tracing::debug!("Health check query succeeded");
            Ok(())
        } else {
            Err(anyhow::anyhow!("Health check query returned no results"))
        }
    }
}

#[async_trait]
impl RecordStore for SpannerStore {
    fn name(&self) -> &'static str {
        "spanner"
    }

    async fn get(&self, key: &str) -> Result<Option<Record>, StoreError> {
        Ok(self.read(key).await?)
    }

    async fn scan_page(&self, start: Option<&ContinuationToken>) -> Result<ScanPage, StoreError> {
        Ok(self.read_page(start).await?)
    }

    async fn put(&self, record: &Record) -> Result<(), StoreError> {
        Ok(self.upsert(record).await?)
    }

    async fn set_field(
        &self,
        key: &str,
        field: &FieldName,
        value: &JsonValue,
    ) -> Result<JsonValue, StoreError> {
        self.write_field(key, field, value).await
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(self.ping().await?)
    }
}

fn database_path(settings: &SpannerSettings) -> String {
    format!(
        "projects/{}/instances/{}/databases/{}",
        settings.project, settings.instance, settings.database
    )
}

fn select_by_key_sql(table: &str) -> String {
    format!("SELECT data FROM `{}` WHERE id = @id", table)
}

// Keyset pagination: every key is non-empty, so "" starts at the beginning.
fn scan_page_sql(table: &str, page_size: i64) -> String {
    format!(
        "SELECT id, data FROM `{}` WHERE id > @after ORDER BY id LIMIT {}",
        table, page_size
    )
}

fn create_table_ddl(table: &str) -> String {
    format!(
        r#"CREATE TABLE `{}` (
    id STRING(MAX) NOT NULL,
    data JSON NOT NULL,
    updated_at TIMESTAMP NOT NULL OPTIONS (allow_commit_timestamp=true),
) PRIMARY KEY (id)"#,
        table
    )
}

fn ddl_defines_table(statement: &str, table: &str) -> bool {
    statement.starts_with(&format!("CREATE TABLE {} (", table))
        || statement.starts_with(&format!("CREATE TABLE `{}` (", table))
}

fn decode_row(row: &Row) -> Result<Record> {
    let data: String = row.column_by_name("data")?;
    let value: JsonValue =
        serde_json::from_str(&data).context("Failed to deserialize stored record")?;
    Record::try_from(value).context("Stored document is not a valid record")
}

/// Creates whatever part of the instance / database / table chain is missing.
///
/// Lets the service start against an empty emulator with no setup step.
struct Provisioner<'a> {
    admin: AdminClient,
    settings: &'a SpannerSettings,
    emulator: bool,
}

impl<'a> Provisioner<'a> {
    async fn connect(config: &Config, settings: &'a SpannerSettings) -> Result<Self> {
        let admin = AdminClient::new(AdminClientConfig::default())
            .await
            .context("Failed to create Spanner admin client")?;
        Ok(Self {
            admin,
            settings,
            emulator: config.spanner_emulator_host.is_some(),
        })
    }

    fn project_path(&self) -> String {
        format!("projects/{}", self.settings.project)
    }

    fn instance_path(&self) -> String {
        format!("{}/instances/{}", self.project_path(), self.settings.instance)
    }

    async fn provision(&self, table: &str) -> Result<()> {
        tracing::info!("Checking Spanner resources for table '{}'", table);
        self.instance().await?;
        self.database().await?;
        self.table(table).await?;
        tracing::info!("Spanner resources ready");
        Ok(())
    }

    async fn instance(&self) -> Result<()> {
        let name = self.instance_path();
        let lookup = self
            .admin
            .instance()
            .get_instance(
                GetInstanceRequest {
                    name: name.clone(),
                    field_mask: None,
                },
                None,
            )
            .await;
        if exists(lookup, "instance", &name)? {
            return Ok(());
        }

        let request = CreateInstanceRequest {
            parent: self.project_path(),
            instance_id: self.settings.instance.clone(),
            instance: Some(Instance {
                name: name.clone(),
                config: instance_config_path(&self.project_path(), self.emulator),
                display_name: format!("{} records", self.settings.instance),
                node_count: 1,
                ..Default::default()
            }),
        };
        self.admin
            .instance()
            .create_instance(request, None)
            .await
            .context("Failed to start instance creation")?
            .wait(None)
            .await
            .context("Failed to create instance")?;

        tracing::info!("Created Spanner instance {}", name);
        Ok(())
    }

    async fn database(&self) -> Result<()> {
        let name = database_path(self.settings);
        let lookup = self
            .admin
            .database()
            .get_database(GetDatabaseRequest { name: name.clone() }, None)
            .await;
        if exists(lookup, "database", &name)? {
            return Ok(());
        }

        let request = CreateDatabaseRequest {
            parent: self.instance_path(),
            create_statement: format!("CREATE DATABASE `{}`", self.settings.database),
            extra_statements: vec![],
            encryption_config: None,
            database_dialect: GOOGLE_STANDARD_SQL,
            proto_descriptors: vec![],
        };
        self.admin
            .database()
            .create_database(request, None)
            .await
            .context("Failed to start database creation")?
            .wait(None)
            .await
            .context("Failed to create database")?;

        tracing::info!("Created Spanner database {}", name);
        Ok(())
    }

    async fn table(&self, table: &str) -> Result<()> {
        let database = database_path(self.settings);
        let ddl = self
            .admin
            .database()
            .get_database_ddl(
                GetDatabaseDdlRequest {
                    database: database.clone(),
                },
                None,
            )
            .await
            .context("Failed to get database DDL")?
            .into_inner();

        if ddl.statements.iter().any(|stmt| ddl_defines_table(stmt, table)) {
            tracing::info!("Table '{}' present", table);
            return Ok(());
        }

        let request = UpdateDatabaseDdlRequest {
            database,
            statements: vec![create_table_ddl(table)],
            operation_id: String::new(),
            proto_descriptors: vec![],
            throughput_mode: false,
        };
        self.admin
            .database()
            .update_database_ddl(request, None)
            .await
            .context("Failed to start table creation")?
            .wait(None)
            .await
            .context("Failed to create table")?;

        tracing::info!("Created table '{}'", table);
        Ok(())
    }
}

const GOOGLE_STANDARD_SQL: i32 = 1;

/// `Ok(true)` if the lookup found the resource, `Ok(false)` on NOT_FOUND
fn exists<T>(lookup: Result<T, Status>, kind: &str, name: &str) -> Result<bool> {
    match lookup {
        Ok(_) => {
            tracing::info!("Spanner {} present: {}", kind, name);
            Ok(true)
        }
        Err(status) if status.code() == Code::NotFound => {
            tracing::info!("Spanner {} missing, creating: {}", kind, name);
            Ok(false)
        }
        Err(status) => Err(anyhow::anyhow!(
            "Failed to look up Spanner {} {}: {}",
            kind,
            name,
            status.message()
        )),
    }
}

fn instance_config_path(project_path: &str, emulator: bool) -> String {
    let config = if emulator {
        "emulator-config"
    } else {
        "regional-us-central1"
    };
    format!("{}/instanceConfigs/{}", project_path, config)
}
