//! Per-service storage adapter
//!
//! Every service gets its own `Storage` over the shared store. Each mutation
//! the store accepts is followed by exactly one change-event publish on
//! `{service}.$storage.{operation}.{id}`. Publishing is fire-and-forget: a
//! failed publish is logged and never undoes or fails the mutation.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use relay_bus::Connection;
use relay_common::{ID_FIELD, RelayError, Result, generate_id, storage_subject};

use crate::filter::{Filter, is_match_all};
use crate::store::{BatchWrite, KvStore, WriteOptions};

/// Operation segment of a change-event subject
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOperation {
    Put,
    Update,
    Del,
}

impl ChangeOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeOperation::Put => "put",
            ChangeOperation::Update => "update",
            ChangeOperation::Del => "del",
        }
    }
}

impl std::fmt::Display for ChangeOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Entry type of a batch operation
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchType {
    #[default]
    Put,
    Del,
}

impl BatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchType::Put => "put",
            BatchType::Del => "del",
        }
    }
}

/// One operation of [`Storage::batch`]
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchOperation {
    #[serde(rename = "type", default)]
    pub op_type: BatchType,
    /// Ignored: every operation is written under a freshly generated key
    #[serde(default)]
    pub key: Option<String>,
    /// Defaults to an empty object when absent
    #[serde(default)]
    pub value: Option<Value>,
}

impl BatchOperation {
    pub fn put(value: Value) -> Self {
        Self {
            op_type: BatchType::Put,
            key: None,
            value: Some(value),
        }
    }

    pub fn del() -> Self {
        Self {
            op_type: BatchType::Del,
            key: None,
            value: None,
        }
    }
}

/// Storage facade bound to one service
#[derive(Clone)]
pub struct Storage {
    store: Arc<dyn KvStore>,
    connection: Arc<dyn Connection>,
    service: String,
}

impl Storage {
    pub fn new(
        store: Arc<dyn KvStore>,
        connection: Arc<dyn Connection>,
        service: impl Into<String>,
    ) -> Self {
        Self {
            store,
            connection,
            service: service.into(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Store a new record under a generated identifier and return the identifier
    pub async fn put(&self, value: Value) -> Result<String> {
        self.put_with(value, &WriteOptions::default()).await
    }

    pub async fn put_with(&self, value: Value, options: &WriteOptions) -> Result<String> {
        let mut record = into_record(value)?;
        let id = generate_id();
        record.insert(ID_FIELD.to_string(), Value::String(id.clone()));
        let record = Value::Object(record);

        self.store.put(&id, &record, options).await?;
        self.notify(ChangeOperation::Put.as_str(), &id, record);
        Ok(id)
    }

    /// Overwrite an existing record identified by its `_id` field
    pub async fn update(&self, value: Value) -> Result<()> {
        self.update_with(value, &WriteOptions::default()).await
    }

    pub async fn update_with(&self, value: Value, options: &WriteOptions) -> Result<()> {
        let id = record_id(&value)
            .ok_or(RelayError::MissingIdentifier)?
            .to_string();

        // Existence probe only; a concurrent writer may still race this overwrite.
        if self.store.get(&id).await?.is_none() {
            return Err(RelayError::NotFound(id));
        }

        self.store.put(&id, &value, options).await?;
        self.notify(ChangeOperation::Update.as_str(), &id, value);
        Ok(())
    }

    /// Apply all operations in one atomic write, returning the generated keys
    /// in operation order
    pub async fn batch(&self, operations: Vec<BatchOperation>) -> Result<Vec<String>> {
        self.batch_with(operations, &WriteOptions::default()).await
    }

    pub async fn batch_with(
        &self,
        operations: Vec<BatchOperation>,
        options: &WriteOptions,
    ) -> Result<Vec<String>> {
        let mut prepared = Vec::with_capacity(operations.len());
        let mut writes = Vec::with_capacity(operations.len());

        for op in operations {
            let id = generate_id();
            let mut value = op.value.unwrap_or_else(|| Value::Object(Map::new()));
            if let Value::Object(record) = &mut value {
                record.insert(ID_FIELD.to_string(), Value::String(id.clone()));
            }
            writes.push(match op.op_type {
                BatchType::Put => BatchWrite::Put {
                    key: id.clone(),
                    value: value.clone(),
                },
                BatchType::Del => BatchWrite::Delete { key: id.clone() },
            });
            prepared.push((op.op_type, id, value));
        }

        self.store.write_batch(writes, options).await?;

        let mut ids = Vec::with_capacity(prepared.len());
        for (op_type, id, value) in prepared {
            if value.is_object() {
                self.notify(op_type.as_str(), &id, value);
            } else {
                debug!(service = %self.service, %id, "skipping change event for non-object batch entry");
            }
            ids.push(id);
        }
        Ok(ids)
    }

    /// Read one record; `None` when the identifier is unknown
    pub async fn find_one(&self, id: &str) -> Result<Option<Value>> {
        if id.is_empty() {
            return Err(RelayError::MissingIdentifier);
        }
        self.store.get(id).await
    }

    /// Scan the whole store, keeping records that match `filter`
    ///
    /// `None` or an empty object returns every record. Results follow the
    /// store's iteration order.
    pub async fn find(&self, filter: Option<&Value>) -> Result<Vec<Value>> {
        let filter = if is_match_all(filter) {
            None
        } else {
            filter.map(Filter::parse).transpose()?
        };

        let mut results = Vec::new();
        self.store
            .scan(&mut |_key: &str, value: &Value| {
                if filter.as_ref().is_none_or(|f| f.matches(value)) {
                    results.push(value.clone());
                }
            })
            .await?;
        Ok(results)
    }

    /// Delete a record; deleting an unknown identifier succeeds
    pub async fn del(&self, id: &str) -> Result<()> {
        self.del_with(id, &WriteOptions::default()).await
    }

    pub async fn del_with(&self, id: &str, options: &WriteOptions) -> Result<()> {
        if id.is_empty() {
            return Err(RelayError::MissingIdentifier);
        }
        self.store.delete(id, options).await?;
        self.notify(ChangeOperation::Del.as_str(), id, Value::String(id.to_string()));
        Ok(())
    }

    fn notify(&self, operation: &str, id: &str, payload: Value) {
        let subject = storage_subject(&self.service, operation, id);
        match self.connection.publish(&subject, payload) {
            Ok(()) => debug!(service = %self.service, %subject, "change event published"),
            Err(e) => warn!(
                service = %self.service,
                %subject,
                error = %e,
                "change event publish failed, mutation kept"
            ),
        }
    }
}

fn into_record(value: Value) -> Result<Map<String, Value>> {
    match value {
        Value::Object(record) => Ok(record),
        other => Err(RelayError::InvalidRecord(format!(
            "expected a JSON object, got {}",
            json_type(&other)
        ))),
    }
}

fn record_id(value: &Value) -> Option<&str> {
    value
        .get(ID_FIELD)
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
