// Copyright 2025 Cowboy AI, LLC.

//! Field type resolution
//!
//! [`resolve`] classifies one [`SchemaEntry`] into a [`FieldType`]. It is
//! pure: model targets given as names or thunks are stored as they are and
//! only looked up when a value needs them, so mutually recursive models can
//! be declared in any order.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use super::{FieldKind, RefDef, Schema, SchemaEntry};
use crate::errors::{OdmError, OdmResult};
use crate::model::ModelTarget;

/// Primitive field kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    /// `string`
    String,
    /// `number`, a float
    Number,
    /// `integer`
    Integer,
    /// `boolean`
    Boolean,
    /// `Date`, a UTC timestamp
    Date,
    /// `Mixed`, untyped data or a discriminated model
    Mixed,
}

impl PrimitiveKind {
    /// Parse a schema tag
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "string" => Some(PrimitiveKind::String),
            "number" => Some(PrimitiveKind::Number),
            "integer" => Some(PrimitiveKind::Integer),
            "boolean" => Some(PrimitiveKind::Boolean),
            "Date" => Some(PrimitiveKind::Date),
            "Mixed" => Some(PrimitiveKind::Mixed),
            _ => None,
        }
    }

    /// The schema tag for this kind
    pub fn tag(&self) -> &'static str {
        match self {
            PrimitiveKind::String => "string",
            PrimitiveKind::Number => "number",
            PrimitiveKind::Integer => "integer",
            PrimitiveKind::Boolean => "boolean",
            PrimitiveKind::Date => "Date",
            PrimitiveKind::Mixed => "Mixed",
        }
    }
}

/// Resolved classification of a schema entry
#[derive(Debug, Clone)]
pub enum FieldType {
    /// Primitive value
    Primitive(PrimitiveKind),
    /// Keyed collection of child fields
    Embedded(Arc<EmbeddedType>),
    /// Model stored inline
    NestedModel(ModelTarget),
    /// Model stored by identity
    Reference(RefTarget),
    /// Sequence of one element type
    List(Box<FieldType>),
}

/// Child declarations of an embedded object, with their resolved types
#[derive(Debug, Clone)]
pub struct EmbeddedType {
    /// Child declarations
    pub schema: Schema,
    /// Resolved child types, in declaration order
    pub fields: IndexMap<String, FieldType>,
}

/// Target of a reference field
#[derive(Debug, Clone)]
pub enum RefTarget {
    /// One model type
    Model(ModelTarget),
    /// Any registered model, chosen by the value's discriminator
    Mixed {
        /// Union name for query-schema generators
        union_name: Option<String>,
        /// Allowed models; empty means any registered model
        type_range: Vec<ModelTarget>,
    },
}

impl FieldType {
    /// Whether values of this type are stored by identity
    pub fn is_reference(&self) -> bool {
        matches!(self, FieldType::Reference(_))
    }

    /// Whether this is a list type
    pub fn is_list(&self) -> bool {
        matches!(self, FieldType::List(_))
    }

    /// Whether this is an embedded object
    pub fn is_embedded(&self) -> bool {
        matches!(self, FieldType::Embedded(_))
    }

    /// Element type of a list
    pub fn element(&self) -> Option<&FieldType> {
        match self {
            FieldType::List(inner) => Some(inner.as_ref()),
            _ => None,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Primitive(kind) => f.write_str(kind.tag()),
            FieldType::Embedded(_) => f.write_str("object"),
            FieldType::NestedModel(target) => write!(f, "{}", target.name()),
            FieldType::Reference(RefTarget::Model(target)) => write!(f, "ref({})", target.name()),
            FieldType::Reference(RefTarget::Mixed { union_name, .. }) => match union_name {
                Some(name) => write!(f, "ref(Mixed:{name})"),
                None => f.write_str("ref(Mixed)"),
            },
            FieldType::List(inner) => write!(f, "[{inner}]"),
        }
    }
}

/// Resolve a schema entry declared under `field`
pub fn resolve(entry: &SchemaEntry, field: &str) -> OdmResult<FieldType> {
    match entry {
        SchemaEntry::Ref(def) => resolve_ref(def, field),
        SchemaEntry::Embedded(schema) => resolve_embedded(schema, field),
        SchemaEntry::Field(def) => match &def.kind {
            FieldKind::Embedded(schema) => resolve_embedded(schema, field),
            FieldKind::Model(target) => Ok(resolve_model(target)),
            FieldKind::Tag(tag) => resolve_tag(tag, field),
        },
        SchemaEntry::Model(target) => Ok(resolve_model(target)),
        SchemaEntry::List(entries) => match entries.as_slice() {
            [element] => Ok(FieldType::List(Box::new(resolve(element, field)?))),
            _ => Err(OdmError::AmbiguousList {
                field: field.to_string(),
                count: entries.len(),
            }),
        },
        SchemaEntry::Tag(tag) => resolve_tag(tag, field),
    }
}

fn resolve_tag(tag: &str, field: &str) -> OdmResult<FieldType> {
    PrimitiveKind::from_tag(tag)
        .map(FieldType::Primitive)
        .ok_or_else(|| OdmError::InvalidType {
            field: field.to_string(),
            type_name: tag.to_string(),
        })
}

fn resolve_model(target: &ModelTarget) -> FieldType {
    match target {
        ModelTarget::Named(name) => match PrimitiveKind::from_tag(name) {
            Some(kind) => FieldType::Primitive(kind),
            None => FieldType::NestedModel(target.clone()),
        },
        _ => FieldType::NestedModel(target.clone()),
    }
}

fn resolve_ref(def: &RefDef, field: &str) -> OdmResult<FieldType> {
    if let ModelTarget::Named(name) = &def.target {
        match PrimitiveKind::from_tag(name) {
            Some(PrimitiveKind::Mixed) => {
                return Ok(FieldType::Reference(RefTarget::Mixed {
                    union_name: def.union_name.clone(),
                    type_range: def.type_range.clone(),
                }))
            }
            Some(_) => {
                return Err(OdmError::InvalidReference {
                    field: field.to_string(),
                    target: name.clone(),
                })
            }
            None => {}
        }
    }
    Ok(FieldType::Reference(RefTarget::Model(def.target.clone())))
}

fn resolve_embedded(schema: &Schema, field: &str) -> OdmResult<FieldType> {
    let mut fields = IndexMap::with_capacity(schema.len());
    for (name, entry) in schema.iter() {
        let path = format!("{field}.{name}");
        fields.insert(name.clone(), resolve(entry, &path)?);
    }
    Ok(FieldType::Embedded(Arc::new(EmbeddedType {
        schema: schema.clone(),
        fields,
    })))
}
