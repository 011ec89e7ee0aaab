// Copyright 2025 Cowboy AI, LLC.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{ModelDef, CAS_KEY, REF_KEY, TYPE_KEY};
use crate::errors::{OdmError, OdmResult};
use crate::field::{Field, FieldSet};
use crate::persistence::{Cas, Record, Repository};
use crate::value::Value;

/// Serialization options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonOptions {
    /// Render every reference as a `{ $ref, $type }` stub, loaded or not
    pub shallow: bool,
}

impl JsonOptions {
    /// Options for the storage form
    pub fn shallow() -> Self {
        Self { shallow: true }
    }
}

/// One instance of a model definition
#[derive(Clone)]
pub struct Model {
    def: Arc<ModelDef>,
    fields: FieldSet,
    cas: Option<Cas>,
}

impl Model {
    /// Build an instance from a raw record.
    ///
    /// The identity is taken from `$ref`, `id` or the identity key, in that
    /// order. A `$cas` entry marks the instance as loaded. Keys that are not
    /// fields are ignored.
    pub fn from_json(
        def: Arc<ModelDef>,
        data: &serde_json::Value,
        repository: Option<&Repository>,
    ) -> OdmResult<Self> {
        let object = data.as_object().ok_or_else(|| {
            OdmError::invalid_value(def.name(), "model data must be a JSON object")
        })?;
        let values = object
            .iter()
            .map(|(key, value)| (key.clone(), Value::from(value.clone())))
            .collect();
        Self::from_values(def, values, repository)
    }

    /// Build an instance from field values
    pub fn from_values(
        def: Arc<ModelDef>,
        mut values: IndexMap<String, Value>,
        repository: Option<&Repository>,
    ) -> OdmResult<Self> {
        let mut identity = Some(take_identity(&def, &mut values));
        let cas = match values.shift_remove(CAS_KEY) {
            Some(Value::Integer(token)) => u64::try_from(token).ok().map(Cas),
            _ => None,
        };

        let mut fields = IndexMap::with_capacity(def.schema().len());
        for ((name, entry), (_, field_type)) in def.schema().iter().zip(def.field_types()) {
            let initial = if name == def.id_key() {
                identity.take().unwrap_or_default()
            } else {
                values.shift_remove(name.as_str()).unwrap_or_default()
            };
            let field = Field::resolved(
                name.clone(),
                entry.clone(),
                field_type.clone(),
                initial,
                repository,
            )?;
            fields.insert(name.clone(), field);
        }

        let fields = FieldSet::new(def.name(), fields, repository.cloned());
        Ok(Self { def, fields, cas })
    }

    /// Definition of this instance
    pub fn def(&self) -> &Arc<ModelDef> {
        &self.def
    }

    /// Model name
    pub fn model_name(&self) -> &str {
        self.def.name()
    }

    /// Identity value
    pub fn id(&self) -> &str {
        self.fields
            .get(self.def.id_key())
            .ok()
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// Read a field
    pub fn get(&self, name: &str) -> OdmResult<&Value> {
        self.fields.get(name)
    }

    /// Write a field through coercion and validation; readonly fields refuse
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> OdmResult<()> {
        self.fields.set(name, value)
    }

    /// Read along a dotted path such as `address.city`
    pub fn get_path(&self, path: &str) -> OdmResult<&Value> {
        self.fields.get_path(path)
    }

    /// Write along a dotted path such as `address.city`
    pub fn set_path(&mut self, path: &str, value: impl Into<Value>) -> OdmResult<()> {
        self.fields.set_path(path, value)
    }

    /// All fields
    pub fn fields(&self) -> &FieldSet {
        &self.fields
    }

    pub(crate) fn fields_mut(&mut self) -> &mut FieldSet {
        &mut self.fields
    }

    /// Whether the instance carries a concurrency token from a load or save
    pub fn loaded(&self) -> bool {
        self.cas.is_some()
    }

    /// Concurrency token from the last load or save
    pub fn cas(&self) -> Option<Cas> {
        self.cas
    }

    pub(crate) fn set_cas(&mut self, cas: Cas) {
        self.cas = Some(cas);
    }

    /// Repository this instance persists through
    pub fn repository(&self) -> Option<&Repository> {
        self.fields.repository()
    }

    /// Bind this instance, and nested instances without one, to a repository
    pub fn attach_repository(&mut self, repository: &Repository) {
        self.fields.attach_repository(repository);
    }

    /// Validate every field
    pub fn validate(&self) -> OdmResult<()> {
        self.fields.validate()
    }

    /// Full serialization
    pub fn to_json(&self) -> serde_json::Value {
        self.to_json_with(&JsonOptions::default())
    }

    /// Serialization with options
    pub fn to_json_with(&self, options: &JsonOptions) -> serde_json::Value {
        let mut object = serde_json::Map::new();
        object.insert(TYPE_KEY.to_string(), json!(self.def.name()));
        if let serde_json::Value::Object(fields) = self.fields.to_json(options) {
            object.extend(fields);
        }
        serde_json::Value::Object(object)
    }

    /// Reference stub: `{ "$ref": id, "$type": name }`
    pub fn to_ref_json(&self) -> serde_json::Value {
        let mut object = serde_json::Map::new();
        object.insert(REF_KEY.to_string(), json!(self.id()));
        object.insert(TYPE_KEY.to_string(), json!(self.def.name()));
        serde_json::Value::Object(object)
    }

    /// Form used when this instance sits in a reference field
    pub(crate) fn to_reference_json(&self, options: &JsonOptions) -> serde_json::Value {
        let Some(cas) = self.cas.filter(|_| !options.shallow) else {
            return self.to_ref_json();
        };
        let mut full = self.to_json_with(options);
        if let Some(object) = full.as_object_mut() {
            object.insert(CAS_KEY.to_string(), json!(cas.0));
        }
        full
    }

    /// Rehydrate every field from a fetched record and take its token.
    ///
    /// Fields the record omits were stored as null and fall back to their
    /// defaults.
    pub(crate) fn apply_record(&mut self, record: Record) -> OdmResult<()> {
        let serde_json::Value::Object(mut object) = record.value else {
            return Err(OdmError::Serialization(format!(
                "record for {} {} is not an object",
                self.model_name(),
                self.id()
            )));
        };
        let names: Vec<String> = self.fields.iter().map(|(name, _)| name.to_string()).collect();
        for name in names {
            if name == self.def.id_key() && !object.contains_key(&name) {
                continue;
            }
            let raw = object.remove(&name).map(Value::from).unwrap_or_default();
            self.fields.assign(&name, raw)?;
        }
        self.cas = Some(record.cas);
        Ok(())
    }

    fn require_repository(&self, operation: &str) -> OdmResult<Repository> {
        self.repository()
            .cloned()
            .ok_or_else(|| OdmError::missing_repository(self.model_name(), operation))
    }

    /// Save through the bound repository, running the save hooks
    pub async fn save(&mut self) -> OdmResult<&mut Self> {
        let repository = self.require_repository("save")?;
        self.save_in(&repository).await
    }

    /// Save through `repository`, running the save hooks
    pub async fn save_in(&mut self, repository: &Repository) -> OdmResult<&mut Self> {
        let hooks = self.def.hooks();
        hooks.pre_save(self).await?;
        repository.save(self).await?;
        hooks.post_save(self).await?;
        Ok(self)
    }

    /// Load through the bound repository, running the load hooks
    pub async fn load(&mut self) -> OdmResult<&mut Self> {
        self.load_paths::<&str>(&[]).await
    }

    /// Load along paths such as `users[*].address`, running the load hooks
    pub async fn load_paths<S>(&mut self, paths: &[S]) -> OdmResult<&mut Self>
    where
        S: AsRef<str> + Sync,
    {
        let repository = self.require_repository("load")?;
        self.load_in(&repository, paths).await
    }

    /// Load through `repository`, running the load hooks
    pub async fn load_in<S>(&mut self, repository: &Repository, paths: &[S]) -> OdmResult<&mut Self>
    where
        S: AsRef<str> + Sync,
    {
        let hooks = self.def.hooks();
        hooks.pre_load(self).await?;
        repository.load(self, paths).await?;
        hooks.post_load(self).await?;
        Ok(self)
    }

    /// Remove through the bound repository, running the remove hooks
    pub async fn remove(&mut self) -> OdmResult<&mut Self> {
        let repository = self.require_repository("remove")?;
        self.remove_in(&repository).await
    }

    /// Remove through `repository`, running the remove hooks
    pub async fn remove_in(&mut self, repository: &Repository) -> OdmResult<&mut Self> {
        let hooks = self.def.hooks();
        hooks.pre_remove(self).await?;
        repository.remove(self).await?;
        hooks.post_remove(self).await?;
        Ok(self)
    }
}

fn take_identity(def: &ModelDef, values: &mut IndexMap<String, Value>) -> Value {
    let mut keys = vec![REF_KEY];
    if def.id_key() != "id" && !def.schema().contains("id") {
        keys.push("id");
    }
    keys.push(def.id_key());

    let mut identity = Value::Null;
    for key in keys {
        if let Some(value) = values.shift_remove(key) {
            if identity.is_null() {
                identity = value;
            }
        }
    }
    identity
}

impl PartialEq for Model {
    fn eq(&self, other: &Self) -> bool {
        self.def.name() == other.def.name()
            && self.cas == other.cas
            && self.to_json() == other.to_json()
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("type", &self.def.name())
            .field("cas", &self.cas)
            .field("fields", &self.fields)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldDef, Schema, SchemaEntry};
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn user_def() -> Arc<ModelDef> {
        let email = ModelDef::new("Email", Schema::new().field("address", "string")).unwrap();
        ModelDef::new(
            "User",
            Schema::new()
                .field("name", "string")
                .field("joined", "Date")
                .field("code", FieldDef::new("string").readonly())
                .field(
                    "address",
                    Schema::new()
                        .field("city", "string")
                        .field("location", Schema::new().field("lat", "number")),
                )
                .field("email", SchemaEntry::reference(email)),
        )
        .unwrap()
    }

    #[test]
    fn test_identity_shorthands() {
        let def = user_def();
        assert_eq!(def.instance(&json!({"$ref": "a"})).unwrap().id(), "a");
        assert_eq!(def.instance(&json!({"id": "b"})).unwrap().id(), "b");
        assert_eq!(def.instance(&json!({"$id": "c"})).unwrap().id(), "c");
        assert_eq!(
            def.instance(&json!({"$ref": "a", "$id": "c"})).unwrap().id(),
            "a"
        );
    }

    #[test]
    fn test_serialization_shape() {
        let def = user_def();
        let joined = Utc.with_ymd_and_hms(2019, 5, 6, 7, 8, 9).unwrap();
        let user = def
            .instance_from([
                ("$id", Value::from("u1")),
                ("name", Value::from("Bob")),
                ("joined", Value::from(joined)),
            ])
            .unwrap();

        assert_eq!(
            user.to_json(),
            json!({
                "$type": "User",
                "$id": "u1",
                "name": "Bob",
                "joined": "2019-05-06T07:08:09.000Z",
                "address": {"location": {}}
            })
        );
    }

    #[test]
    fn test_unloaded_and_loaded_references_serialize_differently() {
        let def = user_def();
        let mut user = def
            .instance(&json!({"email": {"$ref": "e1", "$type": "Email", "address": "x@y.com"}}))
            .unwrap();
        assert_eq!(
            user.to_json()["email"],
            json!({"$ref": "e1", "$type": "Email"})
        );

        let email = user.fields_mut().fields_mut().find(|(name, _)| *name == "email").unwrap().1;
        let (_, value) = email.parts_mut();
        value.as_model_mut().unwrap().set_cas(Cas(9));

        assert_eq!(
            user.to_json()["email"],
            json!({"$type": "Email", "$id": "e1", "address": "x@y.com", "$cas": 9})
        );
        assert_eq!(
            user.to_json_with(&JsonOptions::shallow())["email"],
            json!({"$ref": "e1", "$type": "Email"})
        );
    }

    #[test]
    fn test_full_form_with_token_deserializes_as_loaded() {
        let def = user_def();
        let wire = json!({"email": {"$type": "Email", "$id": "e1", "address": "x@y.com", "$cas": 3}});
        let user = def.instance(&wire).unwrap();
        let email = user.get("email").unwrap().as_model().unwrap();
        assert!(email.loaded());
        assert_eq!(email.cas(), Some(Cas(3)));
    }

    #[test]
    fn test_readonly_fields_refuse_public_writes() {
        let def = user_def();
        let mut user = def.instance(&json!({"code": "X"})).unwrap();
        assert!(matches!(
            user.set("code", "Y"),
            Err(OdmError::ReadonlyField { .. })
        ));
        assert_eq!(user.get("code").unwrap(), &Value::from("X"));

        user.apply_record(Record {
            cas: Cas(1),
            value: json!({"code": "Y"}),
        })
        .unwrap();
        assert_eq!(user.get("code").unwrap(), &Value::from("Y"));
        assert!(user.loaded());
    }

    #[test]
    fn test_path_access() {
        let def = user_def();
        let mut user = def
            .instance(&json!({"address": {"city": "Wellington", "location": {"lat": 1}}}))
            .unwrap();
        assert_eq!(
            user.get_path("address.location.lat").unwrap(),
            &Value::Number(1.0)
        );

        user.set_path("address.location.lat", "2.5").unwrap();
        assert_eq!(
            user.get_path("address.location.lat").unwrap(),
            &Value::Number(2.5)
        );

        assert!(user.get_path("address.nope").is_err());
        assert!(user.get_path("name.first").unwrap_err().is_path_error());
    }

    #[test]
    fn test_unknown_field() {
        let def = user_def();
        let user = def.instance(&json!({})).unwrap();
        assert_eq!(
            user.get("nickname"),
            Err(OdmError::UnknownField {
                model: "User".to_string(),
                field: "nickname".to_string(),
            })
        );
    }

    #[test]
    fn test_defaults_are_idempotent_apart_from_identity() {
        let def = ModelDef::new(
            "Settings",
            Schema::new()
                .field("theme", FieldDef::new("string").default_value("dark"))
                .field("size", FieldDef::new("integer").required()),
        )
        .unwrap();
        let a = def.instance(&json!({})).unwrap();
        let b = def.instance(&json!({})).unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.get("theme").unwrap(), &Value::from("dark"));
        assert_eq!(a.get("theme").unwrap(), b.get("theme").unwrap());
        assert_eq!(a.get("size").unwrap(), b.get("size").unwrap());
    }

    #[test]
    fn test_non_object_data_is_rejected() {
        let def = user_def();
        assert!(def.instance(&json!("nope")).unwrap_err().is_validation_error());
    }

    #[tokio::test]
    async fn test_lifecycle_requires_a_repository() {
        let def = user_def();
        let mut user = def.instance(&json!({})).unwrap();

        let err = user.save().await.unwrap_err();
        assert_eq!(err.to_string(), "User::save() called without a repository");
        assert!(user.load().await.unwrap_err().is_schema_error());
        assert!(matches!(
            user.remove().await,
            Err(OdmError::MissingRepository { operation, .. }) if operation == "remove"
        ));
    }
}
