// Copyright 2025 Cowboy AI, LLC.

//! Model definitions and instances
//!
//! A [`ModelDef`] is the type descriptor of a model: its name, its schema
//! with an identity field added, the resolved type of every field and the
//! lifecycle hooks. Definitions are shared as `Arc<ModelDef>` and never
//! change once built. A [`Model`] is one instance of a definition.
//!
//! ```rust
//! use cim_odm::model::ModelDef;
//! use cim_odm::schema::Schema;
//! use serde_json::json;
//!
//! let user = ModelDef::new("User", Schema::new().field("name", "string")).unwrap();
//! let bob = user.instance(&json!({ "name": "Bob" })).unwrap();
//!
//! assert_eq!(bob.to_json()["name"], json!("Bob"));
//! assert_eq!(bob.to_json()["$type"], json!("User"));
//! assert!(!bob.loaded());
//! ```

pub mod hooks;
mod instance;

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::trace;
use uuid::Uuid;

use crate::errors::{OdmError, OdmResult};
use crate::persistence::Repository;
use crate::schema::{
    resolve, DefaultValue, FieldDef, FieldKind, FieldType, PrimitiveKind, Schema, SchemaEntry,
};
use crate::value::Value;

pub use hooks::{ModelHooks, NoHooks};
pub use instance::{JsonOptions, Model};

/// Identity field name used when a model does not choose its own
pub const DEFAULT_ID_KEY: &str = "$id";
/// Discriminator key carrying the model name in records
pub const TYPE_KEY: &str = "$type";
/// Identity key of a reference stub
pub const REF_KEY: &str = "$ref";
/// Concurrency token key in the full form of a loaded reference
pub const CAS_KEY: &str = "$cas";
/// Alternative discriminator container: `{ "meta": { "type": .. } }`
pub const META_KEY: &str = "meta";

/// A model type named in a schema
#[derive(Clone)]
pub enum ModelTarget {
    /// Looked up in the repository's registry when first needed
    Named(String),
    /// A definition held directly
    Def(Arc<ModelDef>),
    /// A thunk producing the definition, for mutually recursive models
    Deferred(Arc<dyn Fn() -> Arc<ModelDef> + Send + Sync>),
}

impl ModelTarget {
    /// Wrap a thunk
    pub fn deferred<F>(thunk: F) -> Self
    where
        F: Fn() -> Arc<ModelDef> + Send + Sync + 'static,
    {
        ModelTarget::Deferred(Arc::new(thunk))
    }

    /// Model name; calls the thunk of a deferred target
    pub fn name(&self) -> String {
        match self {
            ModelTarget::Named(name) => name.clone(),
            ModelTarget::Def(def) => def.name.clone(),
            ModelTarget::Deferred(thunk) => thunk().name.clone(),
        }
    }

    /// Resolve to a definition, using the repository for named targets
    pub fn resolve(&self, repository: Option<&Repository>) -> OdmResult<Arc<ModelDef>> {
        match self {
            ModelTarget::Def(def) => Ok(def.clone()),
            ModelTarget::Deferred(thunk) => Ok(thunk()),
            ModelTarget::Named(name) => match repository {
                Some(repository) => repository.model_def(name),
                None => Err(OdmError::UnknownModel(name.clone())),
            },
        }
    }
}

impl fmt::Debug for ModelTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelTarget::Named(name) => f.debug_tuple("Named").field(name).finish(),
            ModelTarget::Def(def) => f.debug_tuple("Def").field(&def.name).finish(),
            ModelTarget::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

impl From<&str> for ModelTarget {
    fn from(name: &str) -> Self {
        ModelTarget::Named(name.to_string())
    }
}

impl From<String> for ModelTarget {
    fn from(name: String) -> Self {
        ModelTarget::Named(name)
    }
}

impl From<Arc<ModelDef>> for ModelTarget {
    fn from(def: Arc<ModelDef>) -> Self {
        ModelTarget::Def(def)
    }
}

impl From<&Arc<ModelDef>> for ModelTarget {
    fn from(def: &Arc<ModelDef>) -> Self {
        ModelTarget::Def(def.clone())
    }
}

/// Type descriptor of a model
pub struct ModelDef {
    name: String,
    schema: Schema,
    field_types: IndexMap<String, FieldType>,
    id_key: String,
    interface: bool,
    hooks: Arc<dyn ModelHooks>,
}

impl ModelDef {
    /// Start building a definition
    pub fn builder(name: impl Into<String>) -> ModelDefBuilder {
        ModelDefBuilder::new(name)
    }

    /// Build a concrete model with default identity and no hooks
    pub fn new(name: impl Into<String>, schema: Schema) -> OdmResult<Arc<Self>> {
        Self::builder(name).schema(schema).build()
    }

    /// Model name, used as the discriminator
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Schema including the identity field
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Name of the identity field
    pub fn id_key(&self) -> &str {
        &self.id_key
    }

    /// Whether this is an abstract interface rather than a concrete model
    pub fn is_interface(&self) -> bool {
        self.interface
    }

    /// Resolved type of a field
    pub fn field_type(&self, name: &str) -> Option<&FieldType> {
        self.field_types.get(name)
    }

    /// Resolved field types in declaration order
    pub fn field_types(&self) -> impl Iterator<Item = (&str, &FieldType)> {
        self.field_types.iter().map(|(name, ty)| (name.as_str(), ty))
    }

    pub(crate) fn hooks(&self) -> Arc<dyn ModelHooks> {
        self.hooks.clone()
    }

    /// Build a throwaway instance to prove every field can take its default
    pub fn validate(self: &Arc<Self>) -> OdmResult<()> {
        let instance = Model::from_values(self.clone(), IndexMap::new(), None)?;
        instance.validate()
    }

    /// Instance from a raw record, without a repository
    pub fn instance(self: &Arc<Self>, data: &serde_json::Value) -> OdmResult<Model> {
        Model::from_json(self.clone(), data, None)
    }

    /// Instance from field values, without a repository
    pub fn instance_from<I, K, V>(self: &Arc<Self>, values: I) -> OdmResult<Model>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Model::from_values(self.clone(), collect_values(values), None)
    }

    /// Unloaded stub carrying only the identity
    pub fn reference(self: &Arc<Self>, id: impl Into<String>) -> OdmResult<Model> {
        let mut values = IndexMap::new();
        values.insert(self.id_key.clone(), Value::String(id.into()));
        Model::from_values(self.clone(), values, None)
    }
}

pub(crate) fn collect_values<I, K, V>(values: I) -> IndexMap<String, Value>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    values
        .into_iter()
        .map(|(key, value)| (key.into(), value.into()))
        .collect()
}

impl fmt::Debug for ModelDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelDef")
            .field("name", &self.name)
            .field("id_key", &self.id_key)
            .field("interface", &self.interface)
            .field("fields", &self.field_types)
            .finish()
    }
}

/// Builder for [`ModelDef`]
pub struct ModelDefBuilder {
    name: String,
    schema: Schema,
    id_key: String,
    interface: bool,
    hooks: Arc<dyn ModelHooks>,
}

impl ModelDefBuilder {
    /// Create a new builder
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: Schema::new(),
            id_key: DEFAULT_ID_KEY.to_string(),
            interface: false,
            hooks: Arc::new(NoHooks),
        }
    }

    /// Set the schema
    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = schema;
        self
    }

    /// Use a different identity field name
    pub fn id_key(mut self, id_key: impl Into<String>) -> Self {
        self.id_key = id_key.into();
        self
    }

    /// Mark the model as an abstract interface
    pub fn interface(mut self, interface: bool) -> Self {
        self.interface = interface;
        self
    }

    /// Attach lifecycle hooks
    pub fn hooks(mut self, hooks: impl ModelHooks + 'static) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    /// Add the identity field and resolve every field type
    pub fn build(self) -> OdmResult<Arc<ModelDef>> {
        let ModelDefBuilder {
            name,
            mut schema,
            id_key,
            interface,
            hooks,
        } = self;

        augment_identity(&name, &id_key, &mut schema)?;

        let mut field_types = IndexMap::with_capacity(schema.len());
        for (field, entry) in schema.iter() {
            field_types.insert(field.clone(), resolve(entry, field)?);
        }
        trace!(model = %name, fields = field_types.len(), "built model definition");

        Ok(Arc::new(ModelDef {
            name,
            schema,
            field_types,
            id_key,
            interface,
            hooks,
        }))
    }
}

fn identity_default() -> Value {
    Value::String(Uuid::new_v4().to_string())
}

fn identity_entry() -> SchemaEntry {
    FieldDef::new(PrimitiveKind::String.tag())
        .required()
        .readonly()
        .default_with(identity_default)
        .into()
}

fn augment_identity(model: &str, id_key: &str, schema: &mut Schema) -> OdmResult<()> {
    let string_tag = PrimitiveKind::String.tag();
    let Some(entry) = schema.get_mut(id_key) else {
        schema.insert_first(id_key, identity_entry());
        return Ok(());
    };

    if matches!(&*entry, SchemaEntry::Tag(tag) if tag == string_tag) {
        *entry = identity_entry();
        return Ok(());
    }
    if let SchemaEntry::Field(def) = entry {
        if matches!(&def.kind, FieldKind::Tag(tag) if tag == string_tag) {
            def.required = true;
            def.readonly = true;
            if def.default.is_none() {
                def.default = Some(DefaultValue::Generator(Arc::new(identity_default)));
            }
            return Ok(());
        }
    }
    Err(OdmError::InvalidIdentity {
        model: model.to_string(),
        reason: format!("identity field '{id_key}' must be declared as a string"),
    })
}
