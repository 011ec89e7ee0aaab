// Copyright 2025 Cowboy AI, LLC.

//! In-memory adapter
//!
//! Records live in an ordered map keyed by `"{type}{separator}{id}"` and are
//! stored in shallow form, so references come back as unloaded stubs.
//! Queries are evaluated in process by [`super::filter`].

use std::cmp::Ordering;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use tokio::sync::RwLock;
use tracing::{debug, trace, warn};

use super::adapter::{Adapter, Cas, Record};
use super::filter;
use super::query_support::{Query, QueryOptions, SortDirection};
use crate::errors::{OdmError, OdmResult};
use crate::model::{JsonOptions, Model};

/// Configuration for the in-memory adapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InMemoryConfig {
    /// Separator between type name and identity in record keys
    pub key_separator: String,
    /// Simulated latency applied at every call
    pub latency_ms: Option<u64>,
}

impl Default for InMemoryConfig {
    fn default() -> Self {
        Self {
            key_separator: "|".to_string(),
            latency_ms: None,
        }
    }
}

/// Adapter keeping every record in process memory
#[derive(Debug)]
pub struct InMemoryAdapter {
    config: InMemoryConfig,
    records: RwLock<IndexMap<String, Record>>,
    last_cas: AtomicU64,
}

impl InMemoryAdapter {
    /// Create an empty adapter with the default configuration
    pub fn new() -> Self {
        Self::with_config(InMemoryConfig::default())
    }

    /// Create an empty adapter
    pub fn with_config(config: InMemoryConfig) -> Self {
        Self {
            config,
            records: RwLock::new(IndexMap::new()),
            last_cas: AtomicU64::new(0),
        }
    }

    /// Start building an adapter
    pub fn builder() -> InMemoryAdapterBuilder {
        InMemoryAdapterBuilder::new()
    }

    /// Active configuration
    pub fn config(&self) -> &InMemoryConfig {
        &self.config
    }

    /// Stored record, as written
    pub async fn record(&self, type_name: &str, id: &str) -> Option<Record> {
        self.records.read().await.get(&self.key(type_name, id)).cloned()
    }

    /// Number of stored records across all types
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Whether nothing is stored
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    fn key(&self, type_name: &str, id: &str) -> String {
        format!("{type_name}{}{id}", self.config.key_separator)
    }

    fn issue_cas(&self) -> Cas {
        Cas(self.last_cas.fetch_add(1, AtomicOrdering::SeqCst) + 1)
    }

    async fn latency(&self) {
        if let Some(ms) = self.config.latency_ms {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }

    async fn matching(&self, type_name: &str, query: &Query) -> Vec<Record> {
        let prefix = format!("{type_name}{}", self.config.key_separator);
        self.records
            .read()
            .await
            .iter()
            .filter(|(key, record)| {
                key.starts_with(&prefix) && filter::matches(&record.value, query.as_json())
            })
            .map(|(_, record)| record.clone())
            .collect()
    }

    fn conflict(model: &Model, expected: Cas, actual: Cas) -> OdmError {
        warn!(
            model = model.model_name(),
            id = model.id(),
            %expected,
            %actual,
            "concurrency token mismatch"
        );
        OdmError::Conflict {
            model: model.model_name().to_string(),
            id: model.id().to_string(),
            expected: expected.0,
            actual: actual.0,
        }
    }
}

impl Default for InMemoryAdapter {
    fn default() -> Self {
        Self::new()
    }
}

fn compare_fields(a: Option<&Json>, b: Option<&Json>) -> Ordering {
    match (a, b) {
        (Some(Json::Number(x)), Some(Json::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Json::String(x)), Some(Json::String(y))) => x.cmp(y),
        (Some(Json::Bool(x)), Some(Json::Bool(y))) => x.cmp(y),
        (Some(Json::Null) | None, Some(Json::Null) | None) => Ordering::Equal,
        (Some(Json::Null) | None, _) => Ordering::Greater,
        (_, Some(Json::Null) | None) => Ordering::Less,
        _ => Ordering::Equal,
    }
}

#[async_trait]
impl Adapter for InMemoryAdapter {
    async fn find(
        &self,
        type_name: &str,
        query: &Query,
        options: &QueryOptions,
    ) -> OdmResult<Vec<Record>> {
        self.latency().await;
        let mut records = self.matching(type_name, query).await;

        if let Some((field, direction)) = &options.sort_by {
            records.sort_by(|a, b| {
                let ordering = compare_fields(a.value.get(field), b.value.get(field));
                match direction {
                    SortDirection::Ascending => ordering,
                    SortDirection::Descending => ordering.reverse(),
                }
            });
        }

        let records: Vec<Record> = records
            .into_iter()
            .skip(options.offset.unwrap_or(0))
            .take(options.limit.unwrap_or(usize::MAX))
            .collect();
        trace!(model = type_name, results = records.len(), "in-memory find");
        Ok(records)
    }

    async fn count(&self, type_name: &str, query: &Query) -> OdmResult<usize> {
        self.latency().await;
        Ok(self.matching(type_name, query).await.len())
    }

    async fn get_by_id(&self, type_name: &str, id: &str) -> OdmResult<Record> {
        self.latency().await;
        self.records
            .read()
            .await
            .get(&self.key(type_name, id))
            .cloned()
            .ok_or_else(|| OdmError::NotFound {
                model: type_name.to_string(),
                id: id.to_string(),
            })
    }

    async fn save(&self, model: &Model) -> OdmResult<Cas> {
        self.latency().await;
        let key = self.key(model.model_name(), model.id());
        let mut records = self.records.write().await;

        if let (Some(stored), Some(expected)) = (records.get(&key), model.cas()) {
            if stored.cas != expected {
                return Err(Self::conflict(model, expected, stored.cas));
            }
        }

        let cas = self.issue_cas();
        records.insert(
            key,
            Record {
                cas,
                value: model.to_json_with(&JsonOptions::shallow()),
            },
        );
        debug!(model = model.model_name(), id = model.id(), %cas, "stored record");
        Ok(cas)
    }

    async fn remove(&self, model: &Model) -> OdmResult<Cas> {
        self.latency().await;
        let key = self.key(model.model_name(), model.id());
        let mut records = self.records.write().await;

        let stored = records.get(&key).ok_or_else(|| OdmError::NotFound {
            model: model.model_name().to_string(),
            id: model.id().to_string(),
        })?;
        if let Some(expected) = model.cas() {
            if stored.cas != expected {
                return Err(Self::conflict(model, expected, stored.cas));
            }
        }

        records.shift_remove(&key);
        debug!(model = model.model_name(), id = model.id(), "removed record");
        Ok(self.issue_cas())
    }

    async fn flush(&self) -> OdmResult<()> {
        self.records.write().await.clear();
        debug!("flushed in-memory store");
        Ok(())
    }
}

/// Builder for [`InMemoryAdapter`]
#[derive(Debug, Default)]
pub struct InMemoryAdapterBuilder {
    config: InMemoryConfig,
}

impl InMemoryAdapterBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the key separator
    pub fn key_separator(mut self, separator: impl Into<String>) -> Self {
        self.config.key_separator = separator.into();
        self
    }

    /// Delay every call by `ms` milliseconds
    pub fn latency_ms(mut self, ms: u64) -> Self {
        self.config.latency_ms = Some(ms);
        self
    }

    /// Build the adapter
    pub fn build(self) -> InMemoryAdapter {
        InMemoryAdapter::with_config(self.config)
    }
}
