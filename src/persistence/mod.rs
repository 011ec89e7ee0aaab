// Copyright 2025 Cowboy AI, LLC.

//! # Persistence Layer
//!
//! Everything between a model instance and a storage backend.
//!
//! ## Components
//!
//! - **Adapter**: the async contract a backend implements
//! - **Datastore**: wraps one adapter and drives deep loading
//! - **Repository**: model registry, identity cache and entry point
//! - **Queries**: filter documents, sorting, paging and load paths
//! - **In-memory adapter**: reference backend with compare-and-swap tokens

pub mod adapter;
pub mod datastore;
pub mod filter;
pub mod identity_cache;
pub mod in_memory;
pub mod path_loader;
pub mod query_support;
pub mod repository;

// Re-export the main types
pub use adapter::{Adapter, Cas, Record};
pub use datastore::Datastore;
pub use identity_cache::{CacheKey, IdentityCache};
pub use in_memory::{InMemoryAdapter, InMemoryAdapterBuilder, InMemoryConfig};
pub use path_loader::PathTree;
pub use query_support::{Query, QueryBuilder, QueryOptions, SortDirection};
pub use repository::{BoundModel, Repository, RepositoryConfig};

#[cfg(test)]
pub(crate) use adapter::MockAdapter;
