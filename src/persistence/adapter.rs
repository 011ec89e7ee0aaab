// Copyright 2025 Cowboy AI, LLC.

//! The storage adapter contract
//!
//! An [`Adapter`] is the only piece that talks to a backend. Every call is a
//! suspension point; the rest of the crate never blocks on I/O.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::query_support::{Query, QueryOptions};
use crate::errors::OdmResult;
use crate::model::Model;

/// Backend-issued concurrency token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cas(pub u64);

impl fmt::Display for Cas {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A stored record together with its current token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Token of the stored revision
    pub cas: Cas,
    /// The record as written by [`Model::to_json_with`] in shallow form
    pub value: serde_json::Value,
}

/// Operations a storage backend provides.
///
/// `save` and `remove` must refuse with [`crate::OdmError::Conflict`] when the
/// model carries a token that is not the stored one. A model without a token
/// is written unconditionally.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Records of `type_name` matching `query`
    async fn find(
        &self,
        type_name: &str,
        query: &Query,
        options: &QueryOptions,
    ) -> OdmResult<Vec<Record>>;

    /// Number of records of `type_name` matching `query`
    async fn count(&self, type_name: &str, query: &Query) -> OdmResult<usize>;

    /// One record by identity; `NotFound` if absent
    async fn get_by_id(&self, type_name: &str, id: &str) -> OdmResult<Record>;

    /// The stored record behind `model`
    async fn load(&self, model: &Model) -> OdmResult<Record> {
        self.get_by_id(model.model_name(), model.id()).await
    }

    /// Write `model` and return the new token
    async fn save(&self, model: &Model) -> OdmResult<Cas>;

    /// Delete `model` and return the token of the removal
    async fn remove(&self, model: &Model) -> OdmResult<Cas>;

    /// Drop all data
    async fn flush(&self) -> OdmResult<()>;
}
