// Copyright 2025 Cowboy AI, LLC.

//! Datastore: the shim between a repository and its adapter

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::adapter::{Adapter, Cas, Record};
use super::path_loader::{self, PathTree};
use super::query_support::{Query, QueryOptions};
use crate::errors::OdmResult;
use crate::model::Model;

/// Wraps one adapter and hands its results back as records and tokens
#[derive(Clone)]
pub struct Datastore {
    adapter: Arc<dyn Adapter>,
}

impl Datastore {
    /// Wrap an adapter
    pub fn new(adapter: impl Adapter + 'static) -> Self {
        Self::from_arc(Arc::new(adapter))
    }

    /// Wrap a shared adapter
    pub fn from_arc(adapter: Arc<dyn Adapter>) -> Self {
        Self { adapter }
    }

    /// The wrapped adapter
    pub fn adapter(&self) -> &Arc<dyn Adapter> {
        &self.adapter
    }

    /// Records matching `query`
    pub async fn find(
        &self,
        type_name: &str,
        query: &Query,
        options: &QueryOptions,
    ) -> OdmResult<Vec<Record>> {
        self.adapter.find(type_name, query, options).await
    }

    /// Number of records matching `query`
    pub async fn count(&self, type_name: &str, query: &Query) -> OdmResult<usize> {
        self.adapter.count(type_name, query).await
    }

    /// One record by identity
    pub async fn get_by_id(&self, type_name: &str, id: &str) -> OdmResult<Record> {
        self.adapter.get_by_id(type_name, id).await
    }

    /// Write `model`
    pub async fn save(&self, model: &Model) -> OdmResult<Cas> {
        self.adapter.save(model).await
    }

    /// Delete `model`
    pub async fn remove(&self, model: &Model) -> OdmResult<Cas> {
        self.adapter.remove(model).await
    }

    /// Drop all data
    pub async fn flush(&self) -> OdmResult<()> {
        self.adapter.flush().await
    }

    /// Fetch the stored record behind `model` and rehydrate it
    pub async fn fetch_into(&self, model: &mut Model) -> OdmResult<()> {
        let record = self.adapter.load(model).await?;
        model.apply_record(record)
    }

    /// Load `model` itself if needed, then every path in `tree`
    pub async fn load(&self, model: &mut Model, tree: &PathTree) -> OdmResult<()> {
        if !model.loaded() {
            self.fetch_into(model).await?;
        }
        if tree.is_empty() {
            return Ok(());
        }
        debug!(
            model = model.model_name(),
            id = model.id(),
            paths = ?tree.paths(),
            "loading paths"
        );
        path_loader::load_fields(model.fields_mut(), tree, self, "").await
    }
}

impl fmt::Debug for Datastore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Datastore").finish_non_exhaustive()
    }
}
