// Copyright 2025 Cowboy AI, LLC.

//! Declarative model schemas
//!
//! A [`Schema`] maps field names to [`SchemaEntry`] declarations. Entries are
//! plain data: nothing is resolved until a model definition is built, at
//! which point every entry goes through [`field_type::resolve`].
//!
//! ```rust
//! use cim_odm::schema::{FieldDef, RefDef, Schema, SchemaEntry};
//!
//! let schema = Schema::new()
//!     .field("name", "string")
//!     .field("age", FieldDef::new("integer").required())
//!     .field("address", Schema::new().field("city", "string"))
//!     .field("emails", SchemaEntry::list("string"))
//!     .field("employer", RefDef::new("Org"));
//!
//! assert_eq!(schema.len(), 5);
//! ```

pub mod field_type;

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::model::ModelTarget;
use crate::value::Value;

pub use field_type::{resolve, EmbeddedType, FieldType, PrimitiveKind, RefTarget};

/// Ordered mapping from field name to declaration
#[derive(Debug, Clone, Default)]
pub struct Schema {
    entries: IndexMap<String, SchemaEntry>,
}

impl Schema {
    /// Create an empty schema
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field declaration
    pub fn field(mut self, name: impl Into<String>, entry: impl Into<SchemaEntry>) -> Self {
        self.entries.insert(name.into(), entry.into());
        self
    }

    /// Add or replace a field declaration in place
    pub fn insert(&mut self, name: impl Into<String>, entry: impl Into<SchemaEntry>) {
        self.entries.insert(name.into(), entry.into());
    }

    /// Look up a declaration by name
    pub fn get(&self, name: &str) -> Option<&SchemaEntry> {
        self.entries.get(name)
    }

    /// Whether a field with this name is declared
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Declarations in declaration order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &SchemaEntry)> {
        self.entries.iter()
    }

    /// Declared field names in declaration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of declared fields
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the schema declares no fields
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> Option<&mut SchemaEntry> {
        self.entries.get_mut(name)
    }

    pub(crate) fn insert_first(&mut self, name: impl Into<String>, entry: SchemaEntry) {
        self.entries.shift_insert(0, name.into(), entry);
    }
}

/// One field declaration
#[derive(Debug, Clone)]
pub enum SchemaEntry {
    /// Bare primitive tag: `string`, `number`, `integer`, `boolean`, `Date` or `Mixed`
    Tag(String),
    /// Bare model type, stored inline
    Model(ModelTarget),
    /// Declaration carrying a type plus constraints
    Field(FieldDef),
    /// Reference to another model, stored by identity
    Ref(RefDef),
    /// List declaration; must hold exactly one element entry
    List(Vec<SchemaEntry>),
    /// Embedded object whose keys are themselves declarations
    Embedded(Schema),
}

impl SchemaEntry {
    /// Reference to the given model
    pub fn reference(target: impl Into<ModelTarget>) -> Self {
        SchemaEntry::Ref(RefDef::new(target))
    }

    /// List of the given element declaration
    pub fn list(element: impl Into<SchemaEntry>) -> Self {
        SchemaEntry::List(vec![element.into()])
    }

    /// Constraint flags and hooks carried by this declaration, if any
    pub fn definition(&self) -> Option<&FieldDef> {
        match self {
            SchemaEntry::Field(def) => Some(def),
            _ => None,
        }
    }
}

impl From<&str> for SchemaEntry {
    fn from(tag: &str) -> Self {
        SchemaEntry::Tag(tag.to_string())
    }
}

impl From<String> for SchemaEntry {
    fn from(tag: String) -> Self {
        SchemaEntry::Tag(tag)
    }
}

impl From<Schema> for SchemaEntry {
    fn from(schema: Schema) -> Self {
        SchemaEntry::Embedded(schema)
    }
}

impl From<FieldDef> for SchemaEntry {
    fn from(def: FieldDef) -> Self {
        SchemaEntry::Field(def)
    }
}

impl From<RefDef> for SchemaEntry {
    fn from(def: RefDef) -> Self {
        SchemaEntry::Ref(def)
    }
}

impl From<ModelTarget> for SchemaEntry {
    fn from(target: ModelTarget) -> Self {
        SchemaEntry::Model(target)
    }
}

impl From<Vec<SchemaEntry>> for SchemaEntry {
    fn from(entries: Vec<SchemaEntry>) -> Self {
        SchemaEntry::List(entries)
    }
}

/// What a [`FieldDef`] stores
#[derive(Debug, Clone)]
pub enum FieldKind {
    /// Primitive tag
    Tag(String),
    /// Nested model stored inline
    Model(ModelTarget),
    /// Embedded object; constraint flags on the outer declaration are ignored
    Embedded(Schema),
}

/// Field declaration with constraints
#[derive(Debug, Clone)]
pub struct FieldDef {
    /// Declared type
    pub kind: FieldKind,
    /// Application writes are rejected
    pub readonly: bool,
    /// A zero value replaces null when no default is declared
    pub required: bool,
    /// Value used when the field is null
    pub default: Option<DefaultValue>,
    /// Check run on every non-blank value
    pub validator: Option<Validator>,
}

impl FieldDef {
    /// Declaration of a primitive tag
    pub fn new(tag: impl Into<String>) -> Self {
        Self::with_kind(FieldKind::Tag(tag.into()))
    }

    /// Declaration of a nested model
    pub fn model(target: impl Into<ModelTarget>) -> Self {
        Self::with_kind(FieldKind::Model(target.into()))
    }

    /// Declaration of an embedded object
    pub fn embedded(schema: Schema) -> Self {
        Self::with_kind(FieldKind::Embedded(schema))
    }

    fn with_kind(kind: FieldKind) -> Self {
        Self {
            kind,
            readonly: false,
            required: false,
            default: None,
            validator: None,
        }
    }

    /// Mark the field readonly
    pub fn readonly(mut self) -> Self {
        self.readonly = true;
        self
    }

    /// Mark the field required
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Use a fixed default value
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(DefaultValue::Value(value.into()));
        self
    }

    /// Use a generator called every time a default is needed
    pub fn default_with<F>(mut self, generator: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.default = Some(DefaultValue::Generator(Arc::new(generator)));
        self
    }

    /// Attach a validator
    pub fn validator<F>(mut self, check: F) -> Self
    where
        F: Fn(&Value) -> Result<(), String> + Send + Sync + 'static,
    {
        self.validator = Some(Validator::new(check));
        self
    }
}

/// Reference declaration
#[derive(Debug, Clone)]
pub struct RefDef {
    /// Referenced model, or the `Mixed` tag for polymorphic references
    pub target: ModelTarget,
    /// Name of the union type exposed to query-schema generators
    pub union_name: Option<String>,
    /// Concrete models a polymorphic reference may hold
    pub type_range: Vec<ModelTarget>,
}

impl RefDef {
    /// Reference to one model type
    pub fn new(target: impl Into<ModelTarget>) -> Self {
        Self {
            target: target.into(),
            union_name: None,
            type_range: Vec::new(),
        }
    }

    /// Polymorphic reference resolved from each value's discriminator
    pub fn mixed() -> Self {
        Self::new(ModelTarget::Named(PrimitiveKind::Mixed.tag().to_string()))
    }

    /// Name the union
    pub fn union_name(mut self, name: impl Into<String>) -> Self {
        self.union_name = Some(name.into());
        self
    }

    /// Restrict a polymorphic reference to these models
    pub fn type_range<I, T>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<ModelTarget>,
    {
        self.type_range = targets.into_iter().map(Into::into).collect();
        self
    }
}

/// Default for a null field
#[derive(Clone)]
pub enum DefaultValue {
    /// Fixed value
    Value(Value),
    /// Called every time a default is needed
    Generator(Arc<dyn Fn() -> Value + Send + Sync>),
}

impl DefaultValue {
    /// Produce the default
    pub fn produce(&self) -> Value {
        match self {
            DefaultValue::Value(value) => value.clone(),
            DefaultValue::Generator(generator) => generator(),
        }
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Value(value) => f.debug_tuple("Value").field(value).finish(),
            DefaultValue::Generator(_) => f.write_str("Generator(..)"),
        }
    }
}

/// User check applied to field values
#[derive(Clone)]
pub struct Validator(Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>);

impl Validator {
    /// Wrap a check function
    pub fn new<F>(check: F) -> Self
    where
        F: Fn(&Value) -> Result<(), String> + Send + Sync + 'static,
    {
        Self(Arc::new(check))
    }

    /// Run the check
    pub fn check(&self, value: &Value) -> Result<(), String> {
        (self.0)(value)
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Validator(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_keeps_declaration_order() {
        let schema = Schema::new()
            .field("b", "string")
            .field("a", "number")
            .field("c", SchemaEntry::list("Date"));
        let names: Vec<_> = schema.names().collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_insert_first_moves_entry_to_front() {
        let mut schema = Schema::new().field("name", "string");
        schema.insert_first("$id", SchemaEntry::from("string"));
        assert_eq!(schema.names().next(), Some("$id"));
        assert_eq!(schema.len(), 2);
    }

    #[test]
    fn test_generator_default_runs_each_time() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let counter = Arc::new(AtomicUsize::new(0));
        let seen = counter.clone();
        let def = FieldDef::new("integer")
            .default_with(move || Value::Integer(seen.fetch_add(1, Ordering::SeqCst) as i64));
        let default = def.default.unwrap();

        assert_eq!(default.produce(), Value::Integer(0));
        assert_eq!(default.produce(), Value::Integer(1));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_validator_passes_message_through() {
        let validator = Validator::new(|v| match v.as_str() {
            Some(s) if s.contains('@') => Ok(()),
            _ => Err("not an email".to_string()),
        });
        assert!(validator.check(&Value::from("a@b")).is_ok());
        assert_eq!(
            validator.check(&Value::from("ab")),
            Err("not an email".to_string())
        );
    }

    #[test]
    fn test_mixed_ref_def() {
        let def = RefDef::mixed().union_name("Owner").type_range(["User", "Org"]);
        assert_eq!(def.target.name(), "Mixed");
        assert_eq!(def.union_name.as_deref(), Some("Owner"));
        assert_eq!(def.type_range.len(), 2);
    }
}
