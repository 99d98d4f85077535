//! DynamoDB backend.
//!
//! Records map one-to-one onto items; JSON values are converted to attribute
//! values on the way in and back on the way out. Field updates never splice
//! the field name into the expression text: it is bound through the `#field`
//! expression attribute name.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::config::Region;
use aws_sdk_dynamodb::types::{AttributeValue, ReturnValue};
use serde_json::{Map, Number, Value as JsonValue};
use std::collections::HashMap;

use super::{ContinuationToken, RecordStore, ScanPage, StoreError};
use crate::config::Config;
use crate::record::{FieldName, KEY_FIELD, Record};

type Item = HashMap<String, AttributeValue>;

const UPDATE_EXPRESSION: &str = "SET #field = :value";
const KEY_EXISTS_CONDITION: &str = "attribute_exists(#key)";

/// Record store backed by a DynamoDB table keyed by `userId`
#[derive(Clone)]
pub struct DynamoDbStore {
    client: Client,
    table: String,
    page_size: Option<i32>,
}

impl DynamoDbStore {
    /// Build a client from the default AWS credential chain.
    ///
    /// `AWS_REGION` and `DYNAMODB_ENDPOINT` (for DynamoDB Local) override the
    /// SDK defaults when set.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &config.aws_region {
            loader = loader.region(Region::new(region.clone()));
        }
        let sdk_config = loader.load().await;

        let mut builder = aws_sdk_dynamodb::config::Builder::from(&sdk_config);
        if let Some(endpoint) = &config.dynamodb_endpoint {
            tracing::info!("Using DynamoDB endpoint override: {}", endpoint);
            builder = builder.endpoint_url(endpoint);
        }

        let page_size = config
            .scan_page_size
            .map(i32::try_from)
            .transpose()
            .context("SCAN_PAGE_SIZE does not fit a DynamoDB scan limit")?;

        Ok(Self::new(
            Client::from_conf(builder.build()),
            config.record_table.clone(),
            page_size,
        ))
    }

    pub fn new(client: Client, table: String, page_size: Option<i32>) -> Self {
        Self {
            client,
            table,
            page_size,
        }
    }

    fn key_attribute(key: &str) -> Item {
        HashMap::from([(KEY_FIELD.to_string(), AttributeValue::S(key.to_string()))])
    }
}

#[async_trait]
impl RecordStore for DynamoDbStore {
    fn name(&self) -> &'static str {
        "dynamodb"
    }

    async fn get(&self, key: &str) -> Result<Option<Record>, StoreError> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table)
            .set_key(Some(Self::key_attribute(key)))
            .consistent_read(true)
            .send()
            .await
            .context("Failed to get item from DynamoDB")?;

        Ok(output.item.as_ref().map(item_to_record).transpose()?)
    }

    async fn scan_page(&self, start: Option<&ContinuationToken>) -> Result<ScanPage, StoreError> {
        let output = self
            .client
            .scan()
            .table_name(&self.table)
            .set_exclusive_start_key(start.map(|token| Self::key_attribute(token.as_str())))
            .set_limit(self.page_size)
            .send()
            .await
            .context("Failed to scan DynamoDB table")?;

        let records = output
            .items
            .unwrap_or_default()
            .iter()
            .map(item_to_record)
            .collect::<Result<Vec<_>>>()?;

        let next = match output.last_evaluated_key {
            Some(last) => Some(token_from_key(&last)?),
            None => None,
        };

        tracing::debug!(
            "Scanned {} items from {} (more: {})",
            records.len(),
            self.table,
            next.is_some()
        );
        Ok(ScanPage { records, next })
    }

    async fn put(&self, record: &Record) -> Result<(), StoreError> {
        self.client
            .put_item()
            .table_name(&self.table)
            .set_item(Some(record_to_item(record)))
            .send()
            .await
            .context("Failed to put item to DynamoDB")?;

        tracing::debug!("Put item with key: {}", record.key());
        Ok(())
    }

    async fn set_field(
        &self,
        key: &str,
        field: &FieldName,
        value: &JsonValue,
    ) -> Result<JsonValue, StoreError> {
        let result = self
            .client
            .update_item()
            .table_name(&self.table)
            .set_key(Some(Self::key_attribute(key)))
            .update_expression(UPDATE_EXPRESSION)
            .condition_expression(KEY_EXISTS_CONDITION)
            .expression_attribute_names("#field", field.as_str())
            .expression_attribute_names("#key", KEY_FIELD)
            .expression_attribute_values(":value", to_attribute(value))
            .return_values(ReturnValue::UpdatedNew)
            .send()
            .await;

        let output = match result {
            Ok(output) => output,
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_conditional_check_failed_exception()) =>
            {
                return Err(StoreError::RecordNotFound(key.to_string()));
            }
            Err(err) => {
                return Err(anyhow::Error::new(err)
                    .context("Failed to update item in DynamoDB")
                    .into());
            }
        };

        let updated = match output.attributes.as_ref().and_then(|a| a.get(field.as_str())) {
            Some(attribute) => from_attribute(attribute)?,
            None => value.clone(),
        };

        tracing::debug!("Updated field '{}' of item with key: {}", field, key);
        Ok(updated)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        self.client
            .describe_table()
            .table_name(&self.table)
            .send()
            .await
            .context("Failed to describe DynamoDB table")?;
        Ok(())
    }
}

fn token_from_key(last_evaluated_key: &Item) -> Result<ContinuationToken> {
    match last_evaluated_key.get(KEY_FIELD) {
        Some(AttributeValue::S(key)) => Ok(ContinuationToken::new(key.clone())),
        _ => bail!("LastEvaluatedKey has no string `{}` attribute", KEY_FIELD),
    }
}

fn record_to_item(record: &Record) -> Item {
    record
        .fields()
        .iter()
        .map(|(name, value)| (name.clone(), to_attribute(value)))
        .collect()
}

fn item_to_record(item: &Item) -> Result<Record> {
    let fields = item
        .iter()
        .map(|(name, attribute)| Ok((name.clone(), from_attribute(attribute)?)))
        .collect::<Result<Map<String, JsonValue>>>()?;
    Record::try_from(fields).context("Stored item is not a valid record")
}

fn to_attribute(value: &JsonValue) -> AttributeValue {
    match value {
        JsonValue::Null => AttributeValue::Null(true),
        JsonValue::Bool(b) => AttributeValue::Bool(*b),
        JsonValue::Number(n) => AttributeValue::N(n.to_string()),
        JsonValue::String(s) => AttributeValue::S(s.clone()),
        JsonValue::Array(items) => AttributeValue::L(items.iter().map(to_attribute).collect()),
        JsonValue::Object(fields) => AttributeValue::M(
            fields
                .iter()
                .map(|(name, value)| (name.clone(), to_attribute(value)))
                .collect(),
        ),
    }
}

fn from_attribute(attribute: &AttributeValue) -> Result<JsonValue> {
    let value = match attribute {
        AttributeValue::Null(_) => JsonValue::Null,
        AttributeValue::Bool(b) => JsonValue::Bool(*b),
        AttributeValue::N(n) => JsonValue::Number(parse_number(n)?),
        AttributeValue::S(s) => JsonValue::String(s.clone()),
        AttributeValue::L(items) => JsonValue::Array(
            items
                .iter()
                .map(from_attribute)
                .collect::<Result<Vec<_>>>()?,
        ),
        AttributeValue::M(fields) => JsonValue::Object(
            fields
                .iter()
                .map(|(name, value)| Ok((name.clone(), from_attribute(value)?)))
                .collect::<Result<Map<String, JsonValue>>>()?,
        ),
        AttributeValue::Ss(items) => {
            JsonValue::Array(items.iter().cloned().map(JsonValue::String).collect())
        }
        AttributeValue::Ns(items) => JsonValue::Array(
            items
                .iter()
                .map(|n| parse_number(n).map(JsonValue::Number))
                .collect::<Result<Vec<_>>>()?,
        ),
        other => bail!("Unsupported DynamoDB attribute type: {:?}", other),
    };
    Ok(value)
}

fn parse_number(raw: &str) -> Result<Number> {
    serde_json::from_str::<Number>(raw)
        .with_context(|| format!("Invalid DynamoDB number attribute '{}'", raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_maps_to_typed_attributes() {
        let record = Record::try_from(json!({
            "userId": "u1",
            "age": 42,
            "active": true,
            "nickname": null,
            "tags": ["a", "b"],
            "address": {"city": "Oslo", "zip": 150}
        }))
        .unwrap();

        let item = record_to_item(&record);

        assert_eq!(item.get("userId"), Some(&AttributeValue::S("u1".to_string())));
        assert_eq!(item.get("age"), Some(&AttributeValue::N("42".to_string())));
        assert_eq!(item.get("active"), Some(&AttributeValue::Bool(true)));
        assert_eq!(item.get("nickname"), Some(&AttributeValue::Null(true)));
        assert_eq!(
            item.get("tags"),
            Some(&AttributeValue::L(vec![
                AttributeValue::S("a".to_string()),
                AttributeValue::S("b".to_string()),
            ]))
        );
        match item.get("address") {
            Some(AttributeValue::M(address)) => {
                assert_eq!(address.get("zip"), Some(&AttributeValue::N("150".to_string())));
            }
            other => panic!("expected map attribute, got {:?}", other),
        }

        assert_eq!(item_to_record(&item).unwrap(), record);
    }

    #[test]
    fn test_sets_read_back_as_arrays() {
        let item: Item = HashMap::from([
            ("userId".to_string(), AttributeValue::S("u1".to_string())),
            (
                "roles".to_string(),
                AttributeValue::Ss(vec!["admin".to_string(), "dev".to_string()]),
            ),
            (
                "scores".to_string(),
                AttributeValue::Ns(vec!["1".to_string(), "2.5".to_string()]),
            ),
        ]);

        let record = item_to_record(&item).unwrap();
        assert_eq!(record.get("roles"), Some(&json!(["admin", "dev"])));
        assert_eq!(record.get("scores"), Some(&json!([1, 2.5])));
    }

    #[test]
    fn test_item_without_key_is_rejected() {
        let item: Item = HashMap::from([("name".to_string(), AttributeValue::S("Bob".to_string()))]);
        assert!(item_to_record(&item).is_err());
    }

    #[test]
    fn test_invalid_number_is_rejected() {
        assert!(from_attribute(&AttributeValue::N("twelve".to_string())).is_err());
    }

    #[test]
    fn test_token_from_last_evaluated_key() {
        let key = DynamoDbStore::key_attribute("user-7");
        assert_eq!(token_from_key(&key).unwrap(), ContinuationToken::new("user-7"));

        let bogus: Item = HashMap::from([("id".to_string(), AttributeValue::N("7".to_string()))]);
        assert!(token_from_key(&bogus).is_err());
    }

    #[test]
    fn test_update_expression_binds_field_through_placeholder() {
        assert!(!UPDATE_EXPRESSION.contains("name"));
        assert!(UPDATE_EXPRESSION.contains("#field"));
        assert!(UPDATE_EXPRESSION.contains(":value"));
    }
}
