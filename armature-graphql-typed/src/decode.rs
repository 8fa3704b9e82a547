//! Response decoding and discriminant guards.
//!
//! [`decode`] walks a raw `data` payload alongside the [`TypeMap`] and tags
//! every object with its type name. When the payload carries its own
//! `__typename`, that value is kept.

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::type_map::{TYPENAME_FIELD, TypeMap, TypeRef};
use crate::{GraphQLError, Result};

/// A decoded response value.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedValue {
    /// JSON `null`.
    Null,
    /// Scalar value, kept as raw JSON.
    Scalar(Value),
    /// Enum value.
    Enum(String),
    /// List of values.
    List(Vec<DecodedValue>),
    /// Object tagged with its type name.
    Object(DecodedObject),
}

impl DecodedValue {
    /// Discriminant of an object value.
    pub fn typename(&self) -> Option<&str> {
        self.as_object().map(DecodedObject::typename)
    }

    /// Borrow as an object.
    pub fn as_object(&self) -> Option<&DecodedObject> {
        match self {
            Self::Object(object) => Some(object),
            _ => None,
        }
    }

    /// Borrow as a list.
    pub fn as_list(&self) -> Option<&[DecodedValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Borrow as a raw scalar.
    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            Self::Scalar(value) => Some(value),
            _ => None,
        }
    }

    /// String content of a string scalar or an enum value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Scalar(Value::String(s)) | Self::Enum(s) => Some(s),
            _ => None,
        }
    }

    /// Check for `null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Field of an object value.
    pub fn get(&self, field: &str) -> Option<&DecodedValue> {
        self.as_object()?.get(field)
    }

    /// Element of a list value.
    pub fn at(&self, index: usize) -> Option<&DecodedValue> {
        self.as_list()?.get(index)
    }

    /// Convert back to JSON, with `__typename` on every object.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Scalar(value) => value.clone(),
            Self::Enum(value) => Value::String(value.clone()),
            Self::List(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Object(object) => object.to_json(),
        }
    }
}

/// An object value and its discriminant.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedObject {
    typename: String,
    fields: IndexMap<String, DecodedValue>,
}

impl DecodedObject {
    /// Concrete type name.
    pub fn typename(&self) -> &str {
        &self.typename
    }

    /// Check the discriminant.
    pub fn is(&self, typename: &str) -> bool {
        self.typename == typename
    }

    /// Look up a field.
    pub fn get(&self, field: &str) -> Option<&DecodedValue> {
        self.fields.get(field)
    }

    /// Fields in response order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &DecodedValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check whether the object has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Convert back to JSON with `__typename` first.
    pub fn to_json(&self) -> Value {
        let mut map = Map::with_capacity(self.fields.len() + 1);
        map.insert(
            TYPENAME_FIELD.to_string(),
            Value::String(self.typename.clone()),
        );
        for (key, value) in &self.fields {
            map.insert(key.clone(), value.to_json());
        }
        Value::Object(map)
    }
}

/// Decoded `data` of one operation, keyed by root field.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedResult {
    root: DecodedObject,
}

impl DecodedResult {
    /// Root type name (`Query` or `Mutation`).
    pub fn root_type(&self) -> &str {
        self.root.typename()
    }

    /// Value of a root field.
    pub fn get(&self, field: &str) -> Option<&DecodedValue> {
        self.root.get(field)
    }

    /// Root fields in response order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &DecodedValue)> {
        self.root.iter()
    }

    /// The root object.
    pub fn as_object(&self) -> &DecodedObject {
        &self.root
    }

    /// Convert to JSON keyed by root field; nested objects carry `__typename`.
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.root
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_json()))
                .collect(),
        )
    }

    /// Deserialize into a caller-defined type.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.to_json())?)
    }
}

/// Decode the `data` payload of an operation compiled against `root_type`.
pub fn decode(type_map: &TypeMap, root_type: &str, raw: &Value) -> Result<DecodedResult> {
    match raw {
        Value::Object(map) => Ok(DecodedResult {
            root: decode_object(type_map, root_type, map)?,
        }),
        other => Err(GraphQLError::Decode(format!(
            "`{}` data must be an object, got {}",
            root_type, other
        ))),
    }
}

fn decode_object(type_map: &TypeMap, type_name: &str, map: &Map<String, Value>) -> Result<DecodedObject> {
    let object = type_map.object(type_name)?;
    let mut typename = object.name.clone();
    let mut fields = IndexMap::with_capacity(map.len());

    for (key, raw) in map {
        if key == TYPENAME_FIELD {
            if let Some(reported) = raw.as_str() {
                typename = reported.to_string();
            }
            continue;
        }
        let field = object
            .field(key)
            .ok_or_else(|| GraphQLError::schema_mismatch(type_name, key))?;
        fields.insert(key.clone(), decode_value(type_map, &field.ty, raw)?);
    }

    Ok(DecodedObject { typename, fields })
}

fn decode_value(type_map: &TypeMap, ty: &TypeRef, raw: &Value) -> Result<DecodedValue> {
    match (ty, raw) {
        (_, Value::Null) => Ok(DecodedValue::Null),
        (_, Value::Array(items)) => items
            .iter()
            .map(|item| decode_value(type_map, ty, item))
            .collect::<Result<Vec<_>>>()
            .map(DecodedValue::List),
        (TypeRef::Scalar(_), value) => Ok(DecodedValue::Scalar(value.clone())),
        (TypeRef::Enum(_), Value::String(value)) => Ok(DecodedValue::Enum(value.clone())),
        (TypeRef::Object(name), Value::Object(map)) => {
            Ok(DecodedValue::Object(decode_object(type_map, name, map)?))
        }
        (ty, value) => Err(GraphQLError::Decode(format!(
            "expected `{}` value, got {}",
            ty.name(),
            value
        ))),
    }
}

/// Check whether a value is an object whose discriminant is in `expected`.
///
/// Never fails: values without a discriminant simply do not match.
pub fn is_type(value: &DecodedValue, expected: &[&str]) -> bool {
    value
        .typename()
        .is_some_and(|name| expected.contains(&name))
}

/// Narrow a value to an object whose discriminant is in `expected`.
pub fn assert_type<'a>(value: &'a DecodedValue, expected: &[&str]) -> Result<&'a DecodedObject> {
    match value.as_object() {
        Some(object) if expected.contains(&object.typename()) => Ok(object),
        other => Err(GraphQLError::TypeGuard {
            expected: expected.iter().map(|s| s.to_string()).collect(),
            found: other.map(|object| object.typename().to_string()),
        }),
    }
}
