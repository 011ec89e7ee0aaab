// Copyright 2025 Cowboy AI, LLC.

//! Dynamic field values
//!
//! A [`Value`] is what a [`Field`](crate::field::Field) holds once coercion
//! has run. Raw input (JSON records, literals supplied by application code)
//! is converted into a `Value` first and then coerced to the field's
//! declared type.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::field::FieldSet;
use crate::model::Model;

/// A coerced field value
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// Absent value
    #[default]
    Null,
    /// Boolean value
    Bool(bool),
    /// Whole number, produced by `integer` fields
    Integer(i64),
    /// Floating point number, produced by `number` fields
    Number(f64),
    /// Text
    String(String),
    /// Point in time, produced by `Date` fields
    Date(DateTime<Utc>),
    /// Untyped structured data, kept verbatim by `Mixed` fields
    Json(serde_json::Value),
    /// A nested model or a reference to another model
    Model(Box<Model>),
    /// Elements of a list field
    List(Vec<Value>),
    /// Child fields of an embedded object
    Object(FieldSet),
}

impl Value {
    /// True for [`Value::Null`]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// True for null and for the empty string
    pub fn is_blank(&self) -> bool {
        match self {
            Value::Null => true,
            Value::String(s) => s.is_empty(),
            Value::Json(serde_json::Value::Null) => true,
            Value::Json(serde_json::Value::String(s)) => s.is_empty(),
            _ => false,
        }
    }

    /// Borrow a string value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Read a numeric value as `f64`
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Read an integer value
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Number(n) if n.fract() == 0.0 => Some(*n as i64),
            _ => None,
        }
    }

    /// Read a boolean value
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Read a date value
    pub fn as_date(&self) -> Option<&DateTime<Utc>> {
        match self {
            Value::Date(d) => Some(d),
            _ => None,
        }
    }

    /// Borrow untyped structured data
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Value::Json(j) => Some(j),
            _ => None,
        }
    }

    /// Borrow a nested or referenced model
    pub fn as_model(&self) -> Option<&Model> {
        match self {
            Value::Model(m) => Some(m.as_ref()),
            _ => None,
        }
    }

    /// Mutably borrow a nested or referenced model
    pub fn as_model_mut(&mut self) -> Option<&mut Model> {
        match self {
            Value::Model(m) => Some(m.as_mut()),
            _ => None,
        }
    }

    /// Borrow list elements
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    /// Mutably borrow list elements
    pub fn as_list_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Borrow the child fields of an embedded object
    pub fn as_object(&self) -> Option<&FieldSet> {
        match self {
            Value::Object(fields) => Some(fields),
            _ => None,
        }
    }

    /// Mutably borrow the child fields of an embedded object
    pub fn as_object_mut(&mut self) -> Option<&mut FieldSet> {
        match self {
            Value::Object(fields) => Some(fields),
            _ => None,
        }
    }

    /// Short name of the variant, used in error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Date(_) => "date",
            Value::Json(serde_json::Value::Array(_)) => "array",
            Value::Json(_) => "object",
            Value::Model(_) => "model",
            Value::List(_) => "list",
            Value::Object(_) => "embedded object",
        }
    }

    /// Unwrap JSON scalars and arrays into their typed variants.
    ///
    /// JSON objects stay as [`Value::Json`] so that coercion can decide
    /// whether they become models, embedded objects or opaque data.
    pub(crate) fn normalize(self) -> Value {
        match self {
            Value::Json(json) => match json {
                serde_json::Value::Object(_) => Value::Json(json),
                other => Value::from(other),
            },
            other => other,
        }
    }
}

/// Render a date the way records store it: ISO-8601 with milliseconds
pub(crate) fn date_to_iso(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Integral floats render without a fractional part, like JSON numbers do
pub(crate) fn number_to_json(n: f64) -> serde_json::Value {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        serde_json::Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Integer(a), Value::Number(b)) | (Value::Number(b), Value::Integer(a)) => {
                (*a as f64) == *b
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Json(a), Value::Json(b)) => a == b,
            (Value::Model(a), Value::Model(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            _ => false,
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(value as i64)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Integer(value as i64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::Date(value)
    }
}

impl From<Model> for Value {
    fn from(value: Model) -> Self {
        Value::Model(Box::new(value))
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(values: Vec<T>) -> Self {
        Value::List(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            object @ serde_json::Value::Object(_) => Value::Json(object),
        }
    }
}
