// Copyright 2025 Cowboy AI, LLC.

//! Repository: model registry, identity cache and persistence entry point
//!
//! A [`Repository`] is a cheap handle; clones share the same registry,
//! cache and datastore. Registering a model returns a [`BoundModel`], which
//! carries the repository so that model-level calls never need a global
//! default.
//!
//! ```rust
//! use cim_odm::model::ModelDef;
//! use cim_odm::persistence::{InMemoryAdapter, Query, Repository};
//! use cim_odm::schema::Schema;
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let repository = Repository::new(InMemoryAdapter::new());
//! let users = repository
//!     .add_model(ModelDef::new("User", Schema::new().field("name", "string")).unwrap())
//!     .unwrap();
//!
//! let bob = users.create(&json!({ "name": "Bob" })).await.unwrap();
//! let found = users.get_by_id(bob.id()).await.unwrap();
//! assert_eq!(found.get("name").unwrap().as_str(), Some("Bob"));
//! assert_eq!(users.count(&Query::all()).await.unwrap(), 1);
//! # }
//! ```

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use futures::future::try_join_all;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::adapter::{Adapter, Cas, Record};
use super::datastore::Datastore;
use super::identity_cache::{CacheKey, IdentityCache};
use super::path_loader::PathTree;
use super::query_support::{Query, QueryOptions};
use crate::errors::{OdmError, OdmResult};
use crate::field::discriminator;
use crate::model::{collect_values, Model, ModelDef};
use crate::value::Value;

/// Configuration for a repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Completed records kept by the identity cache
    pub cache_capacity: usize,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 1024,
        }
    }
}

struct RepositoryInner {
    models: RwLock<IndexMap<String, Arc<ModelDef>>>,
    store: Datastore,
    cache: IdentityCache,
    config: RepositoryConfig,
}

/// Registry of model definitions in front of one datastore
#[derive(Clone)]
pub struct Repository {
    inner: Arc<RepositoryInner>,
}

impl Repository {
    /// Repository over `adapter` with the default configuration
    pub fn new(adapter: impl Adapter + 'static) -> Self {
        Self::with_config(adapter, RepositoryConfig::default())
    }

    /// Repository over `adapter`
    pub fn with_config(adapter: impl Adapter + 'static, config: RepositoryConfig) -> Self {
        Self::from_datastore(Datastore::new(adapter), config)
    }

    /// Repository over an existing datastore
    pub fn from_datastore(store: Datastore, config: RepositoryConfig) -> Self {
        Self {
            inner: Arc::new(RepositoryInner {
                models: RwLock::new(IndexMap::new()),
                cache: IdentityCache::new(config.cache_capacity),
                store,
                config,
            }),
        }
    }

    /// Active configuration
    pub fn config(&self) -> &RepositoryConfig {
        &self.inner.config
    }

    /// The datastore behind this repository
    pub fn datastore(&self) -> &Datastore {
        &self.inner.store
    }

    /// The identity cache
    pub fn cache(&self) -> &IdentityCache {
        &self.inner.cache
    }

    /// Register a concrete model under its name
    pub fn add_model(&self, def: Arc<ModelDef>) -> OdmResult<BoundModel> {
        if def.is_interface() {
            return Err(OdmError::InterfaceModel(def.name().to_string()));
        }
        let mut models = self
            .inner
            .models
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if models.contains_key(def.name()) {
            return Err(OdmError::DuplicateModel(def.name().to_string()));
        }
        models.insert(def.name().to_string(), def.clone());
        debug!(model = def.name(), "registered model");
        Ok(BoundModel {
            def,
            repository: self.clone(),
        })
    }

    /// Register several models, stopping at the first failure
    pub fn add_models<I>(&self, defs: I) -> OdmResult<Vec<BoundModel>>
    where
        I: IntoIterator<Item = Arc<ModelDef>>,
    {
        defs.into_iter().map(|def| self.add_model(def)).collect()
    }

    /// Registered definition by name
    pub fn model_def(&self, name: &str) -> OdmResult<Arc<ModelDef>> {
        self.inner
            .models
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| OdmError::UnknownModel(name.to_string()))
    }

    /// Handle for a registered model
    pub fn model(&self, name: &str) -> OdmResult<BoundModel> {
        Ok(BoundModel {
            def: self.model_def(name)?,
            repository: self.clone(),
        })
    }

    /// Registered model names in registration order
    pub fn model_names(&self) -> Vec<String> {
        self.inner
            .models
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Build an instance from a raw record.
    ///
    /// The model is `explicit_type` if given, else the record's `$type` or
    /// `meta.type`.
    pub fn from_json(
        &self,
        data: &serde_json::Value,
        explicit_type: Option<&str>,
    ) -> OdmResult<Model> {
        let type_name = explicit_type
            .or_else(|| discriminator(data))
            .ok_or(OdmError::MissingDiscriminator)?;
        let def = self.model_def(type_name)?;
        Model::from_json(def, data, Some(self))
    }

    fn hydrate(&self, def: &Arc<ModelDef>, record: Record) -> OdmResult<Model> {
        let mut model = Model::from_json(def.clone(), &record.value, Some(self))?;
        model.set_cas(record.cas);
        Ok(model)
    }

    async fn load_each(&self, models: &mut [Model], paths: &[String]) -> OdmResult<()> {
        if paths.is_empty() {
            return Ok(());
        }
        let tree = PathTree::parse(paths)?;
        try_join_all(
            models
                .iter_mut()
                .map(|model| self.inner.store.load(model, &tree)),
        )
        .await?;
        Ok(())
    }

    /// Fetch one instance through the identity cache
    pub async fn get_by_id(
        &self,
        model: &str,
        id: &str,
        options: &QueryOptions,
    ) -> OdmResult<Model> {
        let def = self.model_def(model)?;
        let mut values = IndexMap::new();
        values.insert(def.id_key().to_string(), Value::from(id));
        let mut instance = Model::from_values(def, values, Some(self))?;
        self.load(&mut instance, &[] as &[&str]).await?;
        self.load_each(std::slice::from_mut(&mut instance), &options.load)
            .await?;
        Ok(instance)
    }

    /// Instances matching `query`
    pub async fn find(
        &self,
        model: &str,
        query: &Query,
        options: &QueryOptions,
    ) -> OdmResult<Vec<Model>> {
        let def = self.model_def(model)?;
        debug!(model, filter = %query.as_json(), "find");
        let records = self.inner.store.find(model, query, options).await?;
        let mut models = records
            .into_iter()
            .map(|record| self.hydrate(&def, record))
            .collect::<OdmResult<Vec<_>>>()?;
        self.load_each(&mut models, &options.load).await?;
        Ok(models)
    }

    /// First instance matching `query`
    pub async fn find_one(
        &self,
        model: &str,
        query: &Query,
        options: &QueryOptions,
    ) -> OdmResult<Option<Model>> {
        let models = self.find(model, query, &options.first()).await?;
        Ok(models.into_iter().next())
    }

    /// Number of instances matching `query`
    pub async fn count(&self, model: &str, query: &Query) -> OdmResult<usize> {
        self.model_def(model)?;
        self.inner.store.count(model, query).await
    }

    /// Load `model` from storage.
    ///
    /// Without paths the record comes through the identity cache. With paths
    /// the model and every reference along them are fetched directly.
    pub async fn load<S>(&self, model: &mut Model, paths: &[S]) -> OdmResult<()>
    where
        S: AsRef<str> + Sync,
    {
        model.attach_repository(self);
        if !paths.is_empty() {
            let tree = PathTree::parse(paths)?;
            return self.inner.store.load(model, &tree).await;
        }

        debug!(model = model.model_name(), id = model.id(), "load");
        let key = CacheKey::new(model.model_name(), model.id());
        let store = self.inner.store.clone();
        let (type_name, id) = (key.model.clone(), key.id.clone());
        let record = self
            .inner
            .cache
            .get_or_fetch(key, move || async move { store.get_by_id(&type_name, &id).await })
            .await?;
        model.apply_record(record)
    }

    /// Load several instances concurrently, each with its load hooks
    pub async fn load_all<S>(&self, models: &mut [Model], paths: &[S]) -> OdmResult<()>
    where
        S: AsRef<str> + Sync,
    {
        try_join_all(models.iter_mut().map(|model| model.load_in(self, paths))).await?;
        Ok(())
    }

    /// Write `model` and take the new token
    pub async fn save(&self, model: &mut Model) -> OdmResult<Cas> {
        let key = CacheKey::new(model.model_name(), model.id());
        self.inner.cache.evict(&key);
        debug!(model = model.model_name(), id = model.id(), "save");
        let cas = self.inner.store.save(model).await?;
        self.inner.cache.evict(&key);
        model.set_cas(cas);
        model.attach_repository(self);
        Ok(cas)
    }

    /// Write a new instance; the adapter decides between insert and update
    pub async fn create(&self, model: &mut Model) -> OdmResult<Cas> {
        self.save(model).await
    }

    /// Delete `model` and take the token of the removal
    pub async fn remove(&self, model: &mut Model) -> OdmResult<Cas> {
        let key = CacheKey::new(model.model_name(), model.id());
        self.inner.cache.evict(&key);
        debug!(model = model.model_name(), id = model.id(), "remove");
        let cas = self.inner.store.remove(model).await?;
        self.inner.cache.evict(&key);
        model.set_cas(cas);
        Ok(cas)
    }

    /// Drop all stored data and cached records
    pub async fn flush(&self) -> OdmResult<()> {
        self.inner.cache.clear();
        self.inner.store.flush().await
    }
}

impl fmt::Debug for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("models", &self.model_names())
            .field("config", &self.inner.config)
            .field("cache", &self.inner.cache)
            .finish()
    }
}

/// A registered model together with its repository
#[derive(Debug, Clone)]
pub struct BoundModel {
    def: Arc<ModelDef>,
    repository: Repository,
}

impl BoundModel {
    /// The model definition
    pub fn def(&self) -> &Arc<ModelDef> {
        &self.def
    }

    /// Model name
    pub fn name(&self) -> &str {
        self.def.name()
    }

    /// The repository the model is bound to
    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    /// Instance from a raw record, bound to the repository
    pub fn instance(&self, data: &serde_json::Value) -> OdmResult<Model> {
        Model::from_json(self.def.clone(), data, Some(&self.repository))
    }

    /// Instance from field values, bound to the repository
    pub fn instance_from<I, K, V>(&self, values: I) -> OdmResult<Model>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Model::from_values(self.def.clone(), collect_values(values), Some(&self.repository))
    }

    /// Unloaded stub carrying only the identity
    pub fn reference(&self, id: impl Into<String>) -> OdmResult<Model> {
        let mut values = IndexMap::new();
        values.insert(self.def.id_key().to_string(), Value::String(id.into()));
        Model::from_values(self.def.clone(), values, Some(&self.repository))
    }

    /// Build and save an instance, running the save hooks
    pub async fn create(&self, data: &serde_json::Value) -> OdmResult<Model> {
        let mut model = self.instance(data)?;
        model.save_in(&self.repository).await?;
        Ok(model)
    }

    /// Build and save an instance from field values, running the save hooks
    pub async fn create_from<I, K, V>(&self, values: I) -> OdmResult<Model>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let mut model = self.instance_from(values)?;
        model.save_in(&self.repository).await?;
        Ok(model)
    }

    /// Fetch one instance
    pub async fn get_by_id(&self, id: &str) -> OdmResult<Model> {
        self.get_by_id_with(id, &QueryOptions::default()).await
    }

    /// Fetch one instance, deep-loading `options.load`
    pub async fn get_by_id_with(&self, id: &str, options: &QueryOptions) -> OdmResult<Model> {
        self.repository.get_by_id(self.name(), id, options).await
    }

    /// Instances matching `query`
    pub async fn find(&self, query: &Query) -> OdmResult<Vec<Model>> {
        self.find_with(query, &QueryOptions::default()).await
    }

    /// Instances matching `query` with sorting, paging and deep loading
    pub async fn find_with(&self, query: &Query, options: &QueryOptions) -> OdmResult<Vec<Model>> {
        self.repository.find(self.name(), query, options).await
    }

    /// First instance matching `query`
    pub async fn find_one(&self, query: &Query) -> OdmResult<Option<Model>> {
        self.repository
            .find_one(self.name(), query, &QueryOptions::default())
            .await
    }

    /// Number of instances matching `query`
    pub async fn count(&self, query: &Query) -> OdmResult<usize> {
        self.repository.count(self.name(), query).await
    }

    /// Load several instances concurrently, each with its load hooks
    pub async fn load_all<S>(&self, models: &mut [Model], paths: &[S]) -> OdmResult<()>
    where
        S: AsRef<str> + Sync,
    {
        self.repository.load_all(models, paths).await
    }
}
