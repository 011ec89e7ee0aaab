// Copyright 2025 Cowboy AI, LLC.

//! Fields: one typed value slot each
//!
//! A [`Field`] owns coercion, defaults and validation for a single value.
//! Every write goes through [`Field::set_value`], which coerces the raw
//! value to the resolved [`FieldType`], runs the validator and only then
//! commits, so a rejected write leaves the previous value in place.
//!
//! A [`FieldSet`] is an ordered collection of fields. Models keep their
//! top-level fields in one, and embedded objects hold theirs in
//! [`Value::Object`].

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use indexmap::IndexMap;
use serde_json::json;

use crate::errors::{OdmError, OdmResult};
use crate::model::{JsonOptions, Model, ModelDef, ModelTarget, META_KEY, TYPE_KEY};
use crate::persistence::Repository;
use crate::schema::{
    resolve, DefaultValue, EmbeddedType, FieldType, PrimitiveKind, RefTarget, SchemaEntry,
    Validator,
};
use crate::value::{date_to_iso, number_to_json, Value};

/// A single typed value slot
#[derive(Debug, Clone)]
pub struct Field {
    name: String,
    field_type: FieldType,
    definition: SchemaEntry,
    value: Value,
    readonly: bool,
    required: bool,
    default: Option<DefaultValue>,
    validator: Option<Validator>,
}

impl Field {
    /// Resolve `definition` and build a field seeded with `initial`
    pub fn new(
        name: impl Into<String>,
        definition: SchemaEntry,
        initial: impl Into<Value>,
        repository: Option<&Repository>,
    ) -> OdmResult<Self> {
        let name = name.into();
        let field_type = resolve(&definition, &name)?;
        Self::resolved(name, definition, field_type, initial.into(), repository)
    }

    /// Build a field from an already resolved type
    pub(crate) fn resolved(
        name: impl Into<String>,
        definition: SchemaEntry,
        field_type: FieldType,
        initial: Value,
        repository: Option<&Repository>,
    ) -> OdmResult<Self> {
        // Embedded objects carry no constraints of their own; children do.
        let (readonly, required, default, validator) = match &definition {
            SchemaEntry::Field(def) if !field_type.is_embedded() => (
                def.readonly,
                def.required,
                def.default.clone(),
                def.validator.clone(),
            ),
            _ => (false, false, None, None),
        };

        let mut field = Field {
            name: name.into(),
            field_type,
            definition,
            value: Value::Null,
            readonly,
            required,
            default,
            validator,
        };
        field.set_value(initial, repository)?;
        Ok(field)
    }

    /// Field name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolved type
    pub fn field_type(&self) -> &FieldType {
        &self.field_type
    }

    /// The declaration this field was built from
    pub fn definition(&self) -> &SchemaEntry {
        &self.definition
    }

    /// Current value
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Whether application writes are rejected
    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    /// Whether a zero value replaces null
    pub fn is_required(&self) -> bool {
        self.required
    }

    pub(crate) fn parts_mut(&mut self) -> (&FieldType, &mut Value) {
        (&self.field_type, &mut self.value)
    }

    /// Coerce, validate and commit a new value.
    ///
    /// Null takes the default. On error the previous value is kept.
    pub fn set_value(&mut self, raw: Value, repository: Option<&Repository>) -> OdmResult<()> {
        let raw = raw.normalize();
        let candidate = if raw.is_null() {
            self.default_value()
        } else {
            raw
        };
        let coerced = coerce(&self.name, &self.field_type, candidate, repository)?;
        self.check(&coerced)?;
        self.value = coerced;
        Ok(())
    }

    /// Run the validator on the current value and on embedded children
    pub fn validate(&self) -> OdmResult<()> {
        self.check(&self.value)
    }

    fn check(&self, value: &Value) -> OdmResult<()> {
        if let Some(validator) = &self.validator {
            if !value.is_blank() {
                validator
                    .check(value)
                    .map_err(|message| OdmError::Validation {
                        field: self.name.clone(),
                        message,
                    })?;
            }
        }
        if let Value::Object(children) = value {
            children.validate()?;
        }
        Ok(())
    }

    /// The value a null write is replaced with.
    ///
    /// Generators run on every call.
    pub fn default_value(&self) -> Value {
        if let Some(default) = &self.default {
            return default.produce();
        }
        match &self.field_type {
            FieldType::Embedded(_) => Value::Json(json!({})),
            ty if self.required => zero_value(ty),
            _ => Value::Null,
        }
    }

    /// Storage form of the value, `None` when null
    pub fn to_json(&self, options: &JsonOptions) -> Option<serde_json::Value> {
        value_to_json(&self.value, holds_references(&self.field_type), options)
    }
}

fn zero_value(ty: &FieldType) -> Value {
    match ty {
        FieldType::Primitive(PrimitiveKind::String) => Value::String(String::new()),
        FieldType::Primitive(PrimitiveKind::Number) => Value::Number(0.0),
        FieldType::Primitive(PrimitiveKind::Integer) => Value::Integer(0),
        FieldType::Primitive(PrimitiveKind::Boolean) => Value::Bool(false),
        FieldType::Primitive(PrimitiveKind::Mixed) => Value::Json(json!({})),
        FieldType::List(_) => Value::List(Vec::new()),
        _ => Value::Null,
    }
}

fn holds_references(ty: &FieldType) -> bool {
    match ty {
        FieldType::Reference(_) => true,
        FieldType::List(inner) => holds_references(inner),
        _ => false,
    }
}

pub(crate) fn value_to_json(
    value: &Value,
    reference: bool,
    options: &JsonOptions,
) -> Option<serde_json::Value> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(json!(b)),
        Value::Integer(i) => Some(json!(i)),
        Value::Number(n) => Some(number_to_json(*n)),
        Value::String(s) => Some(json!(s)),
        Value::Date(d) => Some(json!(date_to_iso(d))),
        Value::Json(j) => Some(j.clone()),
        Value::Model(model) if reference => Some(model.to_reference_json(options)),
        Value::Model(model) => Some(model.to_json_with(options)),
        Value::List(items) => Some(serde_json::Value::Array(
            items
                .iter()
                .map(|item| {
                    value_to_json(item, reference, options).unwrap_or(serde_json::Value::Null)
                })
                .collect(),
        )),
        Value::Object(children) => Some(children.to_json(options)),
    }
}

/// The `$type` or `meta.type` marker of a raw record
pub(crate) fn discriminator(json: &serde_json::Value) -> Option<&str> {
    json.get(TYPE_KEY)
        .and_then(serde_json::Value::as_str)
        .or_else(|| {
            json.get(META_KEY)
                .and_then(|meta| meta.get("type"))
                .and_then(serde_json::Value::as_str)
        })
}

fn coerce(
    field: &str,
    ty: &FieldType,
    raw: Value,
    repository: Option<&Repository>,
) -> OdmResult<Value> {
    let raw = raw.normalize();
    match ty {
        FieldType::Embedded(embedded) => coerce_embedded(field, embedded, raw, repository),
        _ if raw.is_null() => Ok(Value::Null),
        FieldType::Primitive(kind) => coerce_primitive(field, *kind, raw, repository),
        FieldType::NestedModel(target) => coerce_nested(field, target, raw, repository),
        FieldType::Reference(target) => coerce_reference(field, target, raw, repository),
        FieldType::List(element) => match raw {
            Value::List(items) => items
                .into_iter()
                .map(|item| coerce(field, element, item, repository))
                .collect::<OdmResult<Vec<_>>>()
                .map(Value::List),
            other => Err(OdmError::invalid_value(
                field,
                format!("expected a list, got {}", other.kind_name()),
            )),
        },
    }
}

fn coerce_embedded(
    field: &str,
    embedded: &EmbeddedType,
    raw: Value,
    repository: Option<&Repository>,
) -> OdmResult<Value> {
    let mut source = match raw {
        Value::Object(children) => return Ok(Value::Object(children)),
        Value::Null => serde_json::Map::new(),
        Value::Json(serde_json::Value::Object(map)) => map,
        other => {
            return Err(OdmError::invalid_value(
                field,
                format!("expected an object, got {}", other.kind_name()),
            ))
        }
    };

    let mut children = IndexMap::with_capacity(embedded.fields.len());
    for ((name, entry), child_type) in embedded.schema.iter().zip(embedded.fields.values()) {
        let initial = source.remove(name).map(Value::from).unwrap_or_default();
        let child = Field::resolved(
            name.clone(),
            entry.clone(),
            child_type.clone(),
            initial,
            repository,
        )?;
        children.insert(name.clone(), child);
    }
    Ok(Value::Object(FieldSet::new(
        field,
        children,
        repository.cloned(),
    )))
}

fn coerce_primitive(
    field: &str,
    kind: PrimitiveKind,
    raw: Value,
    repository: Option<&Repository>,
) -> OdmResult<Value> {
    match kind {
        PrimitiveKind::String => to_text(field, raw).map(Value::String),
        PrimitiveKind::Number => to_number(field, raw).map(Value::Number),
        PrimitiveKind::Integer => to_integer(field, raw).map(Value::Integer),
        PrimitiveKind::Boolean => Ok(Value::Bool(truthy(&raw))),
        PrimitiveKind::Date => to_date(field, raw).map(Value::Date),
        PrimitiveKind::Mixed => coerce_mixed(raw, repository),
    }
}

/// Largest magnitude an `f64` can hold while still converting to `i64`
const I64_RANGE: f64 = 9_223_372_036_854_775_808.0;

fn integral(n: f64) -> bool {
    n.is_finite() && n.fract() == 0.0
}

fn format_number(n: f64) -> String {
    if integral(n) && n.abs() < I64_RANGE {
        format!("{}", n as i64)
    } else if integral(n) {
        format!("{n:.0}")
    } else {
        n.to_string()
    }
}

fn float_to_integer(n: f64) -> Option<i64> {
    (integral(n) && (-I64_RANGE..I64_RANGE).contains(&n)).then_some(n as i64)
}

fn to_text(field: &str, raw: Value) -> OdmResult<String> {
    match raw {
        Value::String(s) => Ok(s),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Integer(i) => Ok(i.to_string()),
        Value::Number(n) => Ok(format_number(n)),
        Value::Date(d) => Ok(date_to_iso(&d)),
        other => Err(OdmError::invalid_value(
            field,
            format!("cannot cast {} to string", other.kind_name()),
        )),
    }
}

fn to_number(field: &str, raw: Value) -> OdmResult<f64> {
    match raw {
        Value::Number(n) => Ok(n),
        Value::Integer(i) => Ok(i as f64),
        Value::Bool(b) => Ok(if b { 1.0 } else { 0.0 }),
        Value::Date(d) => Ok(d.timestamp_millis() as f64),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Ok(0.0);
            }
            trimmed
                .parse::<f64>()
                .map_err(|_| OdmError::invalid_value(field, format!("'{s}' is not a number")))
        }
        other => Err(OdmError::invalid_value(
            field,
            format!("cannot cast {} to number", other.kind_name()),
        )),
    }
}

fn to_integer(field: &str, raw: Value) -> OdmResult<i64> {
    let not_integral = |shown: String| OdmError::invalid_value(field, format!("{shown} is not an integer"));
    match raw {
        Value::Integer(i) => Ok(i),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Ok(0);
            }
            if let Ok(i) = trimmed.parse::<i64>() {
                return Ok(i);
            }
            trimmed
                .parse::<f64>()
                .ok()
                .and_then(float_to_integer)
                .ok_or_else(|| not_integral(format!("'{s}'")))
        }
        other => {
            let n = to_number(field, other)?;
            float_to_integer(n).ok_or_else(|| not_integral(format_number(n)))
        }
    }
}

fn truthy(raw: &Value) -> bool {
    match raw {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Integer(i) => *i != 0,
        Value::Number(n) => *n != 0.0 && !n.is_nan(),
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

fn to_date(field: &str, raw: Value) -> OdmResult<DateTime<Utc>> {
    let out_of_range = || OdmError::invalid_value(field, "timestamp out of range");
    match raw {
        Value::Date(d) => Ok(d),
        Value::Integer(millis) => DateTime::from_timestamp_millis(millis).ok_or_else(out_of_range),
        Value::Number(millis) if millis.is_finite() => {
            DateTime::from_timestamp_millis(millis as i64).ok_or_else(out_of_range)
        }
        Value::String(s) => {
            if let Ok(parsed) = DateTime::parse_from_rfc3339(&s) {
                return Ok(parsed.with_timezone(&Utc));
            }
            NaiveDate::parse_from_str(&s, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
                .map(|midnight| midnight.and_utc())
                .ok_or_else(|| OdmError::invalid_value(field, format!("'{s}' is not a date")))
        }
        other => Err(OdmError::invalid_value(
            field,
            format!("cannot cast {} to Date", other.kind_name()),
        )),
    }
}

fn coerce_mixed(raw: Value, repository: Option<&Repository>) -> OdmResult<Value> {
    match raw {
        Value::Json(json) => {
            let type_name = discriminator(&json).map(str::to_string);
            match (type_name, repository) {
                (Some(type_name), Some(repository)) => {
                    let def = repository.model_def(&type_name)?;
                    Ok(Value::from(Model::from_json(def, &json, Some(repository))?))
                }
                _ => Ok(Value::Json(json)),
            }
        }
        other => Ok(other),
    }
}

fn accepts(target: &ModelTarget, model_name: &str, repository: Option<&Repository>) -> bool {
    target.name() == model_name
        || target
            .resolve(repository)
            .map(|def| def.is_interface())
            .unwrap_or(false)
}

fn coerce_nested(
    field: &str,
    target: &ModelTarget,
    raw: Value,
    repository: Option<&Repository>,
) -> OdmResult<Value> {
    match raw {
        Value::Model(model) if accepts(target, model.model_name(), repository) => Ok(Value::Model(model)),
        Value::Model(model) => Err(OdmError::invalid_value(
            field,
            format!("expected {}, got {}", target.name(), model.model_name()),
        )),
        Value::Json(json) => {
            let def = target.resolve(repository)?;
            Ok(Value::from(Model::from_json(def, &json, repository)?))
        }
        other => Err(OdmError::invalid_value(
            field,
            format!("expected {}, got {}", target.name(), other.kind_name()),
        )),
    }
}

fn check_union(field: &str, type_range: &[ModelTarget], type_name: &str) -> OdmResult<()> {
    if type_range.is_empty() || type_range.iter().any(|t| t.name() == type_name) {
        Ok(())
    } else {
        Err(OdmError::invalid_value(
            field,
            format!("'{type_name}' is not a member of the union"),
        ))
    }
}

fn registered(repository: Option<&Repository>, type_name: &str) -> OdmResult<Arc<ModelDef>> {
    match repository {
        Some(repository) => repository.model_def(type_name),
        None => Err(OdmError::UnknownModel(type_name.to_string())),
    }
}

fn coerce_reference(
    field: &str,
    target: &RefTarget,
    raw: Value,
    repository: Option<&Repository>,
) -> OdmResult<Value> {
    match raw {
        Value::Model(model) => match target {
            RefTarget::Mixed { type_range, .. } => {
                check_union(field, type_range, model.model_name())?;
                Ok(Value::Model(model))
            }
            RefTarget::Model(t) if accepts(t, model.model_name(), repository) => Ok(Value::Model(model)),
            RefTarget::Model(t) => Err(OdmError::invalid_value(
                field,
                format!("expected a reference to {}, got {}", t.name(), model.model_name()),
            )),
        },
        Value::Json(json) => {
            let type_name = discriminator(&json).map(str::to_string);
            let def = match (type_name, target) {
                (Some(type_name), RefTarget::Mixed { type_range, .. }) => {
                    check_union(field, type_range, &type_name)?;
                    registered(repository, &type_name)?
                }
                (Some(type_name), RefTarget::Model(t)) => {
                    let def = match repository {
                        Some(repository) => repository.model_def(&type_name)?,
                        None if t.name() == type_name => t.resolve(None)?,
                        None => return Err(OdmError::UnknownModel(type_name)),
                    };
                    if !accepts(t, def.name(), repository) {
                        return Err(OdmError::invalid_value(
                            field,
                            format!("expected a reference to {}, got {}", t.name(), def.name()),
                        ));
                    }
                    def
                }
                (None, RefTarget::Model(t)) => t.resolve(repository)?,
                (None, RefTarget::Mixed { .. }) => return Err(OdmError::MissingDiscriminator),
            };
            Ok(Value::from(Model::from_json(def, &json, repository)?))
        }
        Value::List(_) | Value::Object(_) => Err(OdmError::invalid_value(
            field,
            format!("expected a reference, got {}", raw.kind_name()),
        )),
        _ => Err(OdmError::invalid_value(field, "must not have primitive value")),
    }
}

/// Ordered collection of fields
#[derive(Clone)]
pub struct FieldSet {
    owner: String,
    fields: IndexMap<String, Field>,
    repository: Option<Repository>,
}

impl FieldSet {
    pub(crate) fn new(
        owner: impl Into<String>,
        fields: IndexMap<String, Field>,
        repository: Option<Repository>,
    ) -> Self {
        Self {
            owner: owner.into(),
            fields,
            repository,
        }
    }

    /// Name of the model or embedded field that owns these fields
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Repository used to resolve discriminated values on write
    pub fn repository(&self) -> Option<&Repository> {
        self.repository.as_ref()
    }

    /// Read a field value
    pub fn get(&self, name: &str) -> OdmResult<&Value> {
        self.fields
            .get(name)
            .map(Field::value)
            .ok_or_else(|| self.unknown(name))
    }

    /// Write a field value through coercion and validation
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> OdmResult<()> {
        let repository = self.repository.clone();
        let field = self.fields.get_mut(name).ok_or_else(|| OdmError::UnknownField {
            model: self.owner.clone(),
            field: name.to_string(),
        })?;
        if field.readonly {
            return Err(OdmError::ReadonlyField {
                field: name.to_string(),
            });
        }
        field.set_value(value.into(), repository.as_ref())
    }

    /// Write a field value without the readonly check, used for hydration
    pub(crate) fn assign(&mut self, name: &str, value: Value) -> OdmResult<()> {
        match self.fields.get_mut(name) {
            Some(field) => field.set_value(value, self.repository.as_ref()),
            None => Ok(()),
        }
    }

    /// Read a value along a dotted path.
    ///
    /// Steps descend through embedded objects, nested or referenced models
    /// and list indices, as in `address.city` or `emails.0`.
    pub fn get_path(&self, path: &str) -> OdmResult<&Value> {
        let (head, rest) = split_path(path);
        let value = self.get(head)?;
        match rest {
            None => Ok(value),
            Some(rest) => descend(value, rest, path),
        }
    }

    /// Write a value along a dotted path
    pub fn set_path(&mut self, path: &str, value: impl Into<Value>) -> OdmResult<()> {
        let (head, rest) = split_path(path);
        let Some(rest) = rest else {
            return self.set(head, value);
        };
        let unknown = self.unknown(head);
        let field = self.fields.get_mut(head).ok_or(unknown)?;
        if field.readonly {
            return Err(OdmError::ReadonlyField {
                field: head.to_string(),
            });
        }
        descend_mut(&mut field.value, rest, path, value.into())
    }

    /// Look up a field
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    /// Whether a field with this name exists
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Fields in declaration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Field)> {
        self.fields.iter().map(|(name, field)| (name.as_str(), field))
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether there are no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub(crate) fn fields_mut(&mut self) -> indexmap::map::IterMut<'_, String, Field> {
        self.fields.iter_mut()
    }

    /// Validate every field, stopping at the first failure
    pub fn validate(&self) -> OdmResult<()> {
        self.fields.values().try_for_each(Field::validate)
    }

    /// Storage form, omitting null fields
    pub fn to_json(&self, options: &JsonOptions) -> serde_json::Value {
        let mut object = serde_json::Map::with_capacity(self.fields.len());
        for (name, field) in &self.fields {
            if let Some(value) = field.to_json(options) {
                object.insert(name.clone(), value);
            }
        }
        serde_json::Value::Object(object)
    }

    pub(crate) fn attach_repository(&mut self, repository: &Repository) {
        if self.repository.is_none() {
            self.repository = Some(repository.clone());
        }
        for field in self.fields.values_mut() {
            attach_value(&mut field.value, repository);
        }
    }

    fn unknown(&self, name: &str) -> OdmError {
        OdmError::UnknownField {
            model: self.owner.clone(),
            field: name.to_string(),
        }
    }
}

fn attach_value(value: &mut Value, repository: &Repository) {
    match value {
        Value::Object(children) => children.attach_repository(repository),
        Value::Model(model) => model.attach_repository(repository),
        Value::List(items) => items
            .iter_mut()
            .for_each(|item| attach_value(item, repository)),
        _ => {}
    }
}

fn split_path(path: &str) -> (&str, Option<&str>) {
    match path.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    }
}

fn list_index(items_len: usize, step: &str, full: &str) -> OdmResult<usize> {
    let index: usize = step
        .parse()
        .map_err(|_| OdmError::path(full, format!("'{step}' is not a list index")))?;
    if index >= items_len {
        return Err(OdmError::path(full, format!("index {index} is out of bounds")));
    }
    Ok(index)
}

fn descend<'a>(value: &'a Value, rest: &str, full: &str) -> OdmResult<&'a Value> {
    match value {
        Value::Object(children) => children.get_path(rest),
        Value::Model(model) => model.get_path(rest),
        Value::List(items) => {
            let (step, tail) = split_path(rest);
            let item = &items[list_index(items.len(), step, full)?];
            match tail {
                None => Ok(item),
                Some(tail) => descend(item, tail, full),
            }
        }
        other => Err(OdmError::path(
            full,
            format!("cannot descend into {}", other.kind_name()),
        )),
    }
}

fn descend_mut(target: &mut Value, rest: &str, full: &str, value: Value) -> OdmResult<()> {
    match target {
        Value::Object(children) => children.set_path(rest, value),
        Value::Model(model) => model.set_path(rest, value),
        Value::List(items) => {
            let (step, tail) = split_path(rest);
            let index = list_index(items.len(), step, full)?;
            match tail {
                None => Err(OdmError::path(full, "list elements are replaced through their field")),
                Some(tail) => descend_mut(&mut items[index], tail, full, value),
            }
        }
        other => Err(OdmError::path(
            full,
            format!("cannot descend into {}", other.kind_name()),
        )),
    }
}

impl fmt::Debug for FieldSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (name, field) in &self.fields {
            map.entry(name, field.value());
        }
        map.finish()
    }
}

impl PartialEq for FieldSet {
    fn eq(&self, other: &Self) -> bool {
        self.fields.len() == other.fields.len()
            && self.fields.iter().all(|(name, field)| {
                other
                    .fields
                    .get(name)
                    .is_some_and(|theirs| theirs.value == field.value)
            })
    }
}
