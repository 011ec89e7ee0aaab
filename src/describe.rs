// Copyright 2025 Cowboy AI, LLC.

//! Model metadata export
//!
//! [`field_info`] flattens a definition into per-field descriptors for
//! query-schema generators. [`json_schema`] renders a definition and every
//! model reachable from it as a draft-07 JSON Schema.

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

use schemars::schema::{
    ArrayValidation, InstanceType, Metadata, ObjectValidation, RootSchema, Schema, SchemaObject,
    SingleOrVec, SubschemaValidation,
};
use serde::{Deserialize, Serialize};

use crate::errors::OdmResult;
use crate::model::{ModelDef, ModelTarget, TYPE_KEY};
use crate::persistence::Repository;
use crate::schema::{FieldType, PrimitiveKind, RefTarget, Schema as ModelSchema};

const DRAFT_07: &str = "http://json-schema.org/draft-07/schema#";

/// Descriptor of one declared field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldInfo {
    /// Field name
    pub name: String,
    /// Resolved type, e.g. `string`, `ref(User)` or `[ref(Post)]`
    pub type_name: String,
    /// Application writes are rejected
    pub readonly: bool,
    /// Null is replaced by a zero value
    pub required: bool,
    /// Values are stored by identity
    pub reference: bool,
    /// Values are lists
    pub list: bool,
    /// Union name of a polymorphic reference
    pub union_name: Option<String>,
    /// Allowed models of a polymorphic reference
    pub type_range: Vec<String>,
}

fn flags(schema: &ModelSchema, name: &str) -> (bool, bool) {
    schema
        .get(name)
        .and_then(|entry| entry.definition())
        .map_or((false, false), |def| (def.readonly, def.required))
}

fn innermost(field_type: &FieldType) -> &FieldType {
    match field_type.element() {
        Some(inner) => innermost(inner),
        None => field_type,
    }
}

/// Describe every field of `def` in declaration order
pub fn field_info(def: &ModelDef) -> Vec<FieldInfo> {
    def.field_types()
        .map(|(name, field_type)| {
            let (readonly, required) = flags(def.schema(), name);
            let (union_name, type_range) = match innermost(field_type) {
                FieldType::Reference(RefTarget::Mixed {
                    union_name,
                    type_range,
                }) => (
                    union_name.clone(),
                    type_range.iter().map(ModelTarget::name).collect(),
                ),
                _ => (None, Vec::new()),
            };
            FieldInfo {
                name: name.to_string(),
                type_name: field_type.to_string(),
                readonly,
                required,
                reference: innermost(field_type).is_reference(),
                list: field_type.is_list(),
                union_name,
                type_range,
            }
        })
        .collect()
}

/// Render `def` and the models it reaches as JSON Schema.
///
/// Nested models and references point at `#/definitions/<Model>`.
/// Polymorphic references become `anyOf` over their allowed models, or over
/// every registered model when no range is given. Named targets need the
/// repository to resolve.
pub fn json_schema(def: &Arc<ModelDef>, repository: Option<&Repository>) -> OdmResult<RootSchema> {
    let mut walker = Walker {
        repository,
        pending: VecDeque::new(),
        seen: BTreeSet::from([def.name().to_string()]),
    };
    let root = walker.model_schema(def)?;

    let mut definitions = schemars::Map::new();
    while let Some(next) = walker.pending.pop_front() {
        let schema = walker.model_schema(&next)?;
        definitions.insert(next.name().to_string(), Schema::Object(schema));
    }

    Ok(RootSchema {
        meta_schema: Some(DRAFT_07.to_string()),
        schema: root,
        definitions,
    })
}

struct Walker<'a> {
    repository: Option<&'a Repository>,
    pending: VecDeque<Arc<ModelDef>>,
    seen: BTreeSet<String>,
}

impl Walker<'_> {
    fn model_schema(&mut self, def: &Arc<ModelDef>) -> OdmResult<SchemaObject> {
        let mut object = ObjectValidation::default();
        object.properties.insert(
            TYPE_KEY.to_string(),
            Schema::Object(SchemaObject {
                instance_type: Some(InstanceType::String.into()),
                const_value: Some(serde_json::Value::String(def.name().to_string())),
                ..Default::default()
            }),
        );
        for (name, field_type) in def.field_types() {
            let (readonly, required) = flags(def.schema(), name);
            object
                .properties
                .insert(name.to_string(), self.field_schema(field_type, readonly)?);
            if required {
                object.required.insert(name.to_string());
            }
        }

        Ok(SchemaObject {
            metadata: Some(Box::new(Metadata {
                title: Some(def.name().to_string()),
                ..Default::default()
            })),
            instance_type: Some(InstanceType::Object.into()),
            object: Some(Box::new(object)),
            ..Default::default()
        })
    }

    fn field_schema(&mut self, field_type: &FieldType, readonly: bool) -> OdmResult<Schema> {
        let mut schema = match field_type {
            FieldType::Primitive(kind) => primitive(*kind),
            FieldType::Embedded(embedded) => {
                let mut object = ObjectValidation::default();
                for (name, child) in &embedded.fields {
                    let (readonly, required) = flags(&embedded.schema, name);
                    object
                        .properties
                        .insert(name.clone(), self.field_schema(child, readonly)?);
                    if required {
                        object.required.insert(name.clone());
                    }
                }
                SchemaObject {
                    instance_type: Some(InstanceType::Object.into()),
                    object: Some(Box::new(object)),
                    ..Default::default()
                }
            }
            FieldType::NestedModel(target) | FieldType::Reference(RefTarget::Model(target)) => {
                self.target_ref(target)?
            }
            FieldType::Reference(RefTarget::Mixed {
                union_name,
                type_range,
            }) => {
                let targets = if type_range.is_empty() {
                    self.registered()
                } else {
                    type_range.clone()
                };
                let any_of = targets
                    .iter()
                    .map(|target| self.target_ref(target).map(Schema::Object))
                    .collect::<OdmResult<Vec<_>>>()?;
                SchemaObject {
                    metadata: union_name.as_ref().map(|name| {
                        Box::new(Metadata {
                            title: Some(name.clone()),
                            ..Default::default()
                        })
                    }),
                    subschemas: (!any_of.is_empty()).then(|| {
                        Box::new(SubschemaValidation {
                            any_of: Some(any_of),
                            ..Default::default()
                        })
                    }),
                    ..Default::default()
                }
            }
            FieldType::List(inner) => SchemaObject {
                instance_type: Some(InstanceType::Array.into()),
                array: Some(Box::new(ArrayValidation {
                    items: Some(SingleOrVec::Single(Box::new(
                        self.field_schema(inner, false)?,
                    ))),
                    ..Default::default()
                })),
                ..Default::default()
            },
        };

        if readonly {
            schema.metadata().read_only = true;
        }
        Ok(Schema::Object(schema))
    }

    fn target_ref(&mut self, target: &ModelTarget) -> OdmResult<SchemaObject> {
        let def = target.resolve(self.repository)?;
        if self.seen.insert(def.name().to_string()) {
            self.pending.push_back(def.clone());
        }
        Ok(SchemaObject::new_ref(format!(
            "#/definitions/{}",
            def.name()
        )))
    }

    fn registered(&self) -> Vec<ModelTarget> {
        self.repository
            .map(|repository| {
                repository
                    .model_names()
                    .into_iter()
                    .map(ModelTarget::Named)
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn primitive(kind: PrimitiveKind) -> SchemaObject {
    let instance_type = match kind {
        PrimitiveKind::String => InstanceType::String,
        PrimitiveKind::Number => InstanceType::Number,
        PrimitiveKind::Integer => InstanceType::Integer,
        PrimitiveKind::Boolean => InstanceType::Boolean,
        PrimitiveKind::Date => {
            return SchemaObject {
                instance_type: Some(InstanceType::String.into()),
                format: Some("date-time".to_string()),
                ..Default::default()
            }
        }
        PrimitiveKind::Mixed => return SchemaObject::default(),
    };
    SchemaObject {
        instance_type: Some(instance_type.into()),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::InMemoryAdapter;
    use crate::schema::{FieldDef, RefDef, SchemaEntry};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn board_repository() -> (Repository, Arc<ModelDef>) {
        let repository = Repository::new(InMemoryAdapter::new());
        let user = ModelDef::new("User", ModelSchema::new().field("name", "string")).unwrap();
        let team = ModelDef::new("Team", ModelSchema::new().field("title", "string")).unwrap();
        let post = ModelDef::new(
            "Post",
            ModelSchema::new()
                .field("body", FieldDef::new("string").required())
                .field("created", FieldDef::new("Date").readonly())
                .field("owner", SchemaEntry::reference("User"))
                .field(
                    "audience",
                    SchemaEntry::list(
                        RefDef::mixed()
                            .union_name("Audience")
                            .type_range(["User", "Team"]),
                    ),
                ),
        )
        .unwrap();
        repository.add_model(user).unwrap();
        repository.add_model(team).unwrap();
        repository.add_model(post.clone()).unwrap();
        (repository, post)
    }

    #[test]
    fn test_field_info_lists_flags_and_union_metadata() {
        let (_, post) = board_repository();
        let info = field_info(&post);
        let by_name = |name: &str| info.iter().find(|f| f.name == name).unwrap().clone();

        let body = by_name("body");
        assert!(body.required);
        assert!(!body.readonly);
        assert_eq!(body.type_name, "string");

        assert!(by_name("created").readonly);

        let owner = by_name("owner");
        assert!(owner.reference);
        assert_eq!(owner.type_name, "ref(User)");

        let audience = by_name("audience");
        assert!(audience.list);
        assert!(audience.reference);
        assert_eq!(audience.union_name.as_deref(), Some("Audience"));
        assert_eq!(audience.type_range, vec!["User".to_string(), "Team".to_string()]);
    }

    #[test]
    fn test_json_schema_links_models_through_definitions() {
        let (repository, post) = board_repository();
        let root = json_schema(&post, Some(&repository)).unwrap();
        let rendered = serde_json::to_value(&root).unwrap();

        assert_eq!(rendered["title"], json!("Post"));
        assert_eq!(rendered["properties"]["$type"]["const"], json!("Post"));
        assert_eq!(rendered["properties"]["created"]["format"], json!("date-time"));
        assert_eq!(rendered["properties"]["created"]["readOnly"], json!(true));
        assert_eq!(rendered["required"], json!(["$id", "body"]));
        assert_eq!(
            rendered["properties"]["owner"]["$ref"],
            json!("#/definitions/User")
        );
        assert_eq!(
            rendered["properties"]["audience"]["items"]["anyOf"],
            json!([{"$ref": "#/definitions/User"}, {"$ref": "#/definitions/Team"}])
        );
        assert_eq!(
            rendered["definitions"]["User"]["properties"]["name"]["type"],
            json!("string")
        );
        assert!(rendered["definitions"]["Team"].is_object());
    }

    #[test]
    fn test_named_targets_need_a_repository() {
        let (_, post) = board_repository();
        assert!(json_schema(&post, None).unwrap_err().is_schema_error());
    }
}
