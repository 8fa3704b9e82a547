//! Caller-authored selections.
//!
//! A [`SelectionSet`] describes the response shape wanted from one type. Keys
//! keep insertion order, which is also the order fields appear in the
//! compiled document.

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::{GraphQLError, Result};

/// Argument values keyed by argument name.
pub type Arguments = IndexMap<String, Value>;

const ARGS_KEY: &str = "__args";
const SCALAR_KEY: &str = "__scalar";
const NAME_KEY: &str = "__name";

/// What to do with one selected field.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// Include (`true`) or explicitly skip (`false`) a leaf field.
    Scalar(bool),
    /// Sub-selection on an object-typed field.
    Nested(SelectionSet),
    /// Argument values plus what to select from the field's result.
    WithArgs(Arguments, Box<Selection>),
}

impl From<bool> for Selection {
    fn from(include: bool) -> Self {
        Self::Scalar(include)
    }
}

impl From<SelectionSet> for Selection {
    fn from(set: SelectionSet) -> Self {
        Self::Nested(set)
    }
}

/// Selection on a single type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionSet {
    fields: IndexMap<String, Selection>,
    all_scalars: bool,
    operation_name: Option<String>,
}

impl SelectionSet {
    /// Create an empty selection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty root selection for a named operation.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            operation_name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Include a leaf field.
    pub fn field(self, name: impl Into<String>) -> Self {
        self.select(name, Selection::Scalar(true))
    }

    /// Include several leaf fields.
    pub fn fields<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        names.into_iter().fold(self, |set, name| set.field(name))
    }

    /// Skip a field, still checking that it exists.
    pub fn exclude(self, name: impl Into<String>) -> Self {
        self.select(name, Selection::Scalar(false))
    }

    /// Select from an object-typed field.
    pub fn nested(self, name: impl Into<String>, selection: SelectionSet) -> Self {
        self.select(name, Selection::Nested(selection))
    }

    /// Select a field with argument values.
    pub fn with_args<I, K>(self, name: impl Into<String>, args: I, inner: impl Into<Selection>) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let args = args.into_iter().map(|(k, v)| (k.into(), v)).collect();
        self.select(name, Selection::WithArgs(args, Box::new(inner.into())))
    }

    /// Also select every scalar and enum field of the type.
    pub fn all_scalars(mut self) -> Self {
        self.all_scalars = true;
        self
    }

    /// Insert a selection, replacing an earlier one for the same key.
    pub fn select(mut self, name: impl Into<String>, selection: Selection) -> Self {
        self.fields.insert(name.into(), selection);
        self
    }

    /// Selected fields in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Selection)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Whether every scalar field is requested.
    pub fn is_all_scalars(&self) -> bool {
        self.all_scalars
    }

    /// Operation name, meaningful on a root selection.
    pub fn operation_name(&self) -> Option<&str> {
        self.operation_name.as_deref()
    }

    /// Number of explicitly selected keys.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check whether nothing is selected.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && !self.all_scalars
    }

    /// Convert a loosely typed JSON selection.
    ///
    /// Leaves are `true`/`false` (or `1`/`0`), objects are nested selections,
    /// `__args` carries argument values, `__scalar: true` selects every scalar
    /// and `__name` names the operation (root only). A field may also be
    /// written as `[args]` or `[args, selection]`.
    pub fn from_json(value: &Value) -> Result<Self> {
        match value {
            Value::Object(map) => parse_set(map, true),
            other => Err(GraphQLError::InvalidSelection(format!(
                "root selection must be an object, got {}",
                other
            ))),
        }
    }
}

fn parse_set(map: &Map<String, Value>, root: bool) -> Result<SelectionSet> {
    let mut set = SelectionSet::new();
    for (key, value) in map {
        match key.as_str() {
            SCALAR_KEY => set.all_scalars = parse_flag(key, value)?,
            NAME_KEY if root => {
                let name = value.as_str().ok_or_else(|| {
                    GraphQLError::InvalidSelection("`__name` must be a string".to_string())
                })?;
                set.operation_name = Some(name.to_string());
            }
            NAME_KEY => {
                return Err(GraphQLError::InvalidSelection(
                    "`__name` is only allowed on the operation root".to_string(),
                ));
            }
            // consumed by parse_field on the enclosing field
            ARGS_KEY if !root => {}
            ARGS_KEY => {
                return Err(GraphQLError::InvalidSelection(
                    "`__args` is not allowed on the operation root".to_string(),
                ));
            }
            _ => {
                let selection = parse_field(key, value)?;
                set.fields.insert(key.clone(), selection);
            }
        }
    }
    Ok(set)
}

fn parse_field(key: &str, value: &Value) -> Result<Selection> {
    match value {
        Value::Bool(_) | Value::Number(_) => Ok(Selection::Scalar(parse_flag(key, value)?)),
        Value::Object(map) => match map.get(ARGS_KEY) {
            Some(args) => {
                let args = parse_args(key, args)?;
                let inner = if map.keys().all(|k| k == ARGS_KEY) {
                    Selection::Scalar(true)
                } else {
                    Selection::Nested(parse_set(map, false)?)
                };
                Ok(Selection::WithArgs(args, Box::new(inner)))
            }
            None => Ok(Selection::Nested(parse_set(map, false)?)),
        },
        Value::Array(items) => match items.as_slice() {
            [args] => Ok(Selection::WithArgs(
                parse_args(key, args)?,
                Box::new(Selection::Scalar(true)),
            )),
            [args, inner] => Ok(Selection::WithArgs(
                parse_args(key, args)?,
                Box::new(parse_field(key, inner)?),
            )),
            _ => Err(GraphQLError::InvalidSelection(format!(
                "`{}` must be written as [args] or [args, selection]",
                key
            ))),
        },
        other => Err(GraphQLError::InvalidSelection(format!(
            "unsupported selection for `{}`: {}",
            key, other
        ))),
    }
}

fn parse_args(key: &str, value: &Value) -> Result<Arguments> {
    match value {
        Value::Object(map) => Ok(map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
        other => Err(GraphQLError::InvalidSelection(format!(
            "arguments of `{}` must be an object, got {}",
            key, other
        ))),
    }
}

fn parse_flag(key: &str, value: &Value) -> Result<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) => Ok(n.as_f64().is_some_and(|n| n != 0.0)),
        other => Err(GraphQLError::InvalidSelection(format!(
            "`{}` must be a boolean, got {}",
            key, other
        ))),
    }
}
