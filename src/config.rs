use anyhow::{Context, Result, bail};
use std::env;
use std::str::FromStr;

use crate::record::is_identifier;

/// Which record store backend to run against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Spanner,
    DynamoDb,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "spanner" => Ok(StoreBackend::Spanner),
            "dynamodb" => Ok(StoreBackend::DynamoDb),
            "memory" => Ok(StoreBackend::Memory),
            other => bail!(
                "STORE_BACKEND must be one of: spanner, dynamodb, memory, got '{}'",
                other
            ),
        }
    }
}

/// How the process handles requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Serve HTTP on the configured address
    Serve,
    /// Run under the AWS Lambda runtime, one API Gateway proxy event per invocation
    Lambda,
}

impl FromStr for RunMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "serve" => Ok(RunMode::Serve),
            "lambda" => Ok(RunMode::Lambda),
            other => bail!("RUN_MODE must be one of: serve, lambda, got '{}'", other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpannerSettings {
    pub project: String,
    pub instance: String,
    pub database: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub store_backend: StoreBackend,
    pub record_table: String,
    pub scan_page_size: Option<u32>,
    pub spanner_emulator_host: Option<String>,
    pub spanner: Option<SpannerSettings>,
    pub aws_region: Option<String>,
    pub dynamodb_endpoint: Option<String>,
    pub service_port: u16,
    pub service_host: String,
    pub swagger_ui: bool,
    pub run_mode: RunMode,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let store_backend = lookup("STORE_BACKEND")
            .unwrap_or_else(|| "spanner".to_string())
            .parse::<StoreBackend>()?;

        let record_table = lookup("RECORD_TABLE").unwrap_or_else(|| "User".to_string());
        if !is_identifier(&record_table) {
            bail!(
                "RECORD_TABLE must be a plain identifier (letters, digits, underscore), got '{}'",
                record_table
            );
        }

        let scan_page_size = match lookup("SCAN_PAGE_SIZE") {
            Some(raw) => {
                let size = raw
                    .parse::<u32>()
                    .context("SCAN_PAGE_SIZE must be a positive integer")?;
                if !(1..=10_000).contains(&size) {
                    bail!("SCAN_PAGE_SIZE must be between 1 and 10000, got {}", size);
                }
                Some(size)
            }
            None => None,
        };

        let spanner_emulator_host = lookup("SPANNER_EMULATOR_HOST");

        let spanner = if store_backend == StoreBackend::Spanner {
            let project = lookup("SPANNER_PROJECT")
                .context("SPANNER_PROJECT environment variable is required")?;

            let instance = lookup("SPANNER_INSTANCE")
                .context("SPANNER_INSTANCE environment variable is required")?;

            let database = lookup("SPANNER_DATABASE")
                .context("SPANNER_DATABASE environment variable is required")?;

            Some(SpannerSettings {
                project,
                instance,
                database,
            })
        } else {
            None
        };

        let aws_region = lookup("AWS_REGION");
        let dynamodb_endpoint = lookup("DYNAMODB_ENDPOINT");

        let service_port = lookup("SERVICE_PORT")
            .unwrap_or_else(|| "3000".to_string())
            .parse::<u16>()
            .context("SERVICE_PORT must be a valid port number (0-65535)")?;

        let service_host = lookup("SERVICE_HOST").unwrap_or_else(|| "0.0.0.0".to_string());

        let swagger_ui = match lookup("SWAGGER_UI") {
            Some(raw) => parse_flag(&raw).context("SWAGGER_UI must be true or false")?,
            None => false,
        };

        let run_mode = lookup("RUN_MODE")
            .unwrap_or_else(|| "serve".to_string())
            .parse::<RunMode>()?;

        Ok(Config {
            store_backend,
            record_table,
            scan_page_size,
            spanner_emulator_host,
            spanner,
            aws_region,
            dynamodb_endpoint,
            service_port,
            service_host,
            swagger_ui,
            run_mode,
        })
    }

    pub fn log_startup(&self) {
        tracing::info!("Configuration loaded:");
        tracing::info!("  Store backend: {:?}", self.store_backend);
        tracing::info!("  Record table: {}", self.record_table);
        tracing::info!(
            "  Scan page size: {}",
            self.scan_page_size
                .map(|size| size.to_string())
                .unwrap_or_else(|| "backend default".to_string())
        );
        match self.store_backend {
            StoreBackend::Spanner => {
                tracing::info!(
                    "  Spanner emulator: {}",
                    self.spanner_emulator_host
                        .as_deref()
                        .unwrap_or("disabled (using production)")
                );
                if let Some(spanner) = &self.spanner {
                    tracing::info!("  Spanner project: {}", spanner.project);
                    tracing::info!("  Spanner instance: {}", spanner.instance);
                    tracing::info!("  Spanner database: {}", spanner.database);
                }
            }
            StoreBackend::DynamoDb => {
                tracing::info!(
                    "  AWS region: {}",
                    self.aws_region.as_deref().unwrap_or("SDK default")
                );
                tracing::info!(
                    "  DynamoDB endpoint: {}",
                    self.dynamodb_endpoint.as_deref().unwrap_or("AWS default")
                );
            }
            StoreBackend::Memory => {}
        }
        tracing::info!("  Run mode: {:?}", self.run_mode);
        if self.run_mode == RunMode::Serve {
            tracing::info!(
                "  Service listening on: {}:{}",
                self.service_host,
                self.service_port
            );
            tracing::info!("  Swagger UI: {}", if self.swagger_ui { "enabled" } else { "disabled" });
        }
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
