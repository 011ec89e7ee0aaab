// Copyright 2025 Cowboy AI, LLC.

//! Query filters and options for find and count

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as Json};

use crate::model::Model;

/// A nested filter over stored records.
///
/// Keys are field names, values are either a literal to compare against,
/// a nested filter, or an operator object such as `{ "$like": "%ar%" }`.
/// See [`crate::persistence::filter`] for the operator semantics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Query(Json);

impl Query {
    /// Matches every record
    pub fn all() -> Self {
        Query(json!({}))
    }

    /// Wrap a raw filter
    pub fn new(filter: Json) -> Self {
        Query(filter)
    }

    /// Add a condition at a dotted path, merging with existing conditions
    pub fn with(mut self, path: &str, condition: impl Into<Json>) -> Self {
        let patch = path
            .rsplit('.')
            .fold(condition.into(), |inner, step| {
                let mut level = Map::new();
                level.insert(step.to_string(), inner);
                Json::Object(level)
            });
        merge(&mut self.0, patch);
        self
    }

    /// Match records whose field references `model`
    pub fn with_ref(self, path: &str, model: &Model) -> Self {
        self.with(path, model.to_ref_json())
    }

    /// The raw filter
    pub fn as_json(&self) -> &Json {
        &self.0
    }

    /// Whether the filter has no conditions
    pub fn is_empty(&self) -> bool {
        self.0.as_object().map_or(true, Map::is_empty)
    }
}

fn merge(target: &mut Json, patch: Json) {
    match (target, patch) {
        (Json::Object(existing), Json::Object(incoming)) => {
            for (key, value) in incoming {
                let both_objects =
                    value.is_object() && existing.get(&key).is_some_and(Json::is_object);
                if !both_objects {
                    existing.insert(key, value);
                } else if let Some(slot) = existing.get_mut(&key) {
                    merge(slot, value);
                }
            }
        }
        (target, patch) => *target = patch,
    }
}

impl Default for Query {
    fn default() -> Self {
        Self::all()
    }
}

impl From<Json> for Query {
    fn from(filter: Json) -> Self {
        Query(filter)
    }
}

/// Options for find
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryOptions {
    /// Sort field and direction
    pub sort_by: Option<(String, SortDirection)>,
    /// Maximum number of results
    pub limit: Option<usize>,
    /// Number of results to skip
    pub offset: Option<usize>,
    /// Paths to deep-load on every returned model
    pub load: Vec<String>,
}

impl QueryOptions {
    /// Options that only deep-load the given paths
    pub fn loading<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            load: paths.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub(crate) fn first(&self) -> Self {
        Self {
            limit: Some(1),
            ..self.clone()
        }
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    /// Sort in ascending order
    Ascending,
    /// Sort in descending order
    Descending,
}

/// Builder for query options
#[derive(Debug, Default)]
pub struct QueryBuilder {
    options: QueryOptions,
}

impl QueryBuilder {
    /// Create a new query builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add sorting
    pub fn sort_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.options.sort_by = Some((field.into(), direction));
        self
    }

    /// Set the limit
    pub fn limit(mut self, limit: usize) -> Self {
        self.options.limit = Some(limit);
        self
    }

    /// Set the offset
    pub fn offset(mut self, offset: usize) -> Self {
        self.options.offset = Some(offset);
        self
    }

    /// Deep-load a path on every result
    pub fn load(mut self, path: impl Into<String>) -> Self {
        self.options.load.push(path.into());
        self
    }

    /// Build the query options
    pub fn build(self) -> QueryOptions {
        self.options
    }
}
