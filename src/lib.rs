// Copyright 2025 Cowboy AI, LLC.

//! # CIM ODM
//!
//! Schema-driven object-document mapping over pluggable async storage.
//!
//! This crate provides the building blocks for persisting typed documents:
//! - **Schema**: declarative field types, constraints, defaults and validators
//! - **Field**: one typed, validated value slot with JSON serialization
//! - **Model**: a named schema plus identity, hooks and lifecycle operations
//! - **References**: fields that hold other models by identity and load lazily
//! - **Repository**: model registry with a deduplicating identity cache
//! - **Adapter**: the async backend contract, with an in-memory reference backend
//! - **Path loading**: deep loading of reference graphs by dotted paths
//! - **Describe**: field metadata and JSON Schema export
//!
//! ## Design Principles
//!
//! 1. **Explicit binding**: models reach storage only through a repository
//!    they were registered with or created by
//! 2. **Shallow storage**: references are stored as `{ $ref, $type }` stubs
//! 3. **Optimistic concurrency**: every stored revision carries a token and
//!    stale writes are refused
//! 4. **Typed failures**: not-found, conflict, validation and schema errors
//!    are distinct variants

#![warn(missing_docs)]

pub mod describe;
mod errors;
pub mod field;
pub mod model;
pub mod persistence;
pub mod schema;
mod value;

// Re-export core types
pub use describe::{field_info, json_schema, FieldInfo};
pub use errors::{OdmError, OdmResult};
pub use field::{Field, FieldSet};
pub use model::{
    JsonOptions, Model, ModelDef, ModelDefBuilder, ModelHooks, ModelTarget, NoHooks,
    DEFAULT_ID_KEY,
};
pub use persistence::{
    Adapter, BoundModel, Cas, Datastore, InMemoryAdapter, InMemoryConfig, Query, QueryBuilder,
    QueryOptions, Record, Repository, RepositoryConfig, SortDirection,
};
pub use schema::{DefaultValue, FieldDef, FieldType, RefDef, Schema, SchemaEntry};
pub use value::Value;
