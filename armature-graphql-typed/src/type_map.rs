//! Compiled schema descriptor.
//!
//! A [`TypeMap`] is loaded once (from the generator artifact or built by
//! hand) and then shared read-only by the compiler and the decoder. Field and
//! argument lookups are hash lookups keyed by name.
//!
//! ## Artifact format
//!
//! ```json
//! {
//!   "scalars": [1, 4],
//!   "types": {
//!     "Query": { "hello": [4, { "name": [4, "String!"] }], "me": [2] },
//!     "Boolean": {},
//!     "User": { "id": [3], "name": [4] },
//!     "ID": {},
//!     "String": {}
//!   }
//! }
//! ```
//!
//! Type references are either indices into the key order of `types` or
//! type names. An optional `enums` list marks which terminal types are enums.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;

use crate::{GraphQLError, Result};

/// Name of the discriminant field every object type answers to.
pub const TYPENAME_FIELD: &str = "__typename";

/// Kind of a named type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    /// Terminal scalar.
    Scalar,
    /// Terminal enum.
    Enum,
    /// Object type with a field table.
    Object,
}

/// Reference from a field or argument to a named type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeRef {
    /// Scalar type.
    Scalar(String),
    /// Enum type.
    Enum(String),
    /// Object type.
    Object(String),
}

impl TypeRef {
    fn new(kind: TypeKind, name: impl Into<String>) -> Self {
        match kind {
            TypeKind::Scalar => Self::Scalar(name.into()),
            TypeKind::Enum => Self::Enum(name.into()),
            TypeKind::Object => Self::Object(name.into()),
        }
    }

    /// Name of the referenced type.
    pub fn name(&self) -> &str {
        match self {
            Self::Scalar(name) | Self::Enum(name) | Self::Object(name) => name,
        }
    }

    /// Kind of the referenced type.
    pub fn kind(&self) -> TypeKind {
        match self {
            Self::Scalar(_) => TypeKind::Scalar,
            Self::Enum(_) => TypeKind::Enum,
            Self::Object(_) => TypeKind::Object,
        }
    }

    /// Scalars and enums are leaves in a document.
    pub fn is_leaf(&self) -> bool {
        !matches!(self, Self::Object(_))
    }
}

/// Declared argument of a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentDef {
    /// Referenced input type.
    pub ty: TypeRef,
    /// Type as written in a variable declaration, e.g. `LoginInput!`.
    pub wire_type: String,
    /// Whether `null` is accepted.
    pub nullable: bool,
    /// Whether the argument must be supplied.
    pub required: bool,
}

impl ArgumentDef {
    fn new(ty: TypeRef, wire_type: String) -> Self {
        let nullable = !wire_type.ends_with('!');
        Self {
            ty,
            wire_type,
            nullable,
            required: !nullable,
        }
    }
}

/// A field of an object type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    /// Field name.
    pub name: String,
    /// Return type.
    pub ty: TypeRef,
    /// Declared arguments, in declaration order.
    pub arguments: IndexMap<String, ArgumentDef>,
}

impl FieldDef {
    /// Look up a declared argument.
    pub fn argument(&self, name: &str) -> Option<&ArgumentDef> {
        self.arguments.get(name)
    }

    /// Arguments that must always be supplied.
    pub fn required_arguments(&self) -> impl Iterator<Item = (&str, &ArgumentDef)> {
        self.arguments
            .iter()
            .filter(|(_, arg)| arg.required)
            .map(|(name, arg)| (name.as_str(), arg))
    }
}

/// A named type and its field table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDef {
    /// Type name.
    pub name: String,
    /// Type kind.
    pub kind: TypeKind,
    /// Fields in declaration order; empty for scalars and enums.
    pub fields: IndexMap<String, FieldDef>,
}

impl TypeDef {
    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.get(name)
    }
}

/// Immutable, compiled schema descriptor.
#[derive(Debug, Clone, Default)]
pub struct TypeMap {
    types: HashMap<String, TypeDef>,
}

impl TypeMap {
    /// Create a builder.
    pub fn builder() -> TypeMapBuilder {
        TypeMapBuilder::default()
    }

    /// Parse the generator artifact from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        let artifact: Artifact = serde_json::from_str(json)
            .map_err(|e| GraphQLError::InvalidTypeMap(e.to_string()))?;
        artifact.resolve()
    }

    /// Load the generator artifact from an already parsed JSON value.
    pub fn from_artifact(value: Value) -> Result<Self> {
        let artifact: Artifact = serde_json::from_value(value)
            .map_err(|e| GraphQLError::InvalidTypeMap(e.to_string()))?;
        artifact.resolve()
    }

    /// Look up a type.
    pub fn get(&self, name: &str) -> Option<&TypeDef> {
        self.types.get(name)
    }

    /// Check whether a type is known.
    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Number of known types.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Check if the map has no types.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Look up an object type, failing with `SchemaMismatch` if it is unknown.
    pub fn object(&self, name: &str) -> Result<&TypeDef> {
        match self.types.get(name) {
            Some(def) if def.kind == TypeKind::Object => Ok(def),
            _ => Err(GraphQLError::schema_mismatch(name, "")),
        }
    }

    /// Look up a field of an object type, failing with `SchemaMismatch`.
    pub fn field(&self, type_name: &str, field: &str) -> Result<&FieldDef> {
        self.object(type_name)?
            .field(field)
            .ok_or_else(|| GraphQLError::schema_mismatch(type_name, field))
    }
}

// ============================================================================
// Unresolved representation
// ============================================================================

/// Type reference as written by the generator.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum TypeToken {
    Index(usize),
    Name(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ArgEntry {
    Typed(TypeToken, String),
    Bare((TypeToken,)),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum FieldEntry {
    WithArgs(TypeToken, IndexMap<String, ArgEntry>),
    Plain((TypeToken,)),
}

#[derive(Debug, Deserialize)]
struct Artifact {
    #[serde(default)]
    scalars: Vec<TypeToken>,
    #[serde(default)]
    enums: Vec<TypeToken>,
    types: IndexMap<String, IndexMap<String, FieldEntry>>,
}

impl Artifact {
    fn name_of(&self, token: &TypeToken) -> Result<String> {
        match token {
            TypeToken::Name(name) => Ok(name.clone()),
            TypeToken::Index(index) => self
                .types
                .get_index(*index)
                .map(|(name, _)| name.clone())
                .ok_or_else(|| {
                    GraphQLError::InvalidTypeMap(format!("type index {} out of range", index))
                }),
        }
    }

    fn resolve(self) -> Result<TypeMap> {
        let mut raw = RawTypeMap::default();
        for token in &self.scalars {
            raw.scalars.insert(self.name_of(token)?);
        }
        for token in &self.enums {
            raw.enums.insert(self.name_of(token)?);
        }
        for (type_name, fields) in &self.types {
            let mut raw_fields = IndexMap::new();
            for (field_name, entry) in fields {
                let raw_field = match entry {
                    FieldEntry::Plain((ty,)) => RawField {
                        ty: self.name_of(ty)?,
                        arguments: IndexMap::new(),
                    },
                    FieldEntry::WithArgs(ty, args) => {
                        let mut arguments = IndexMap::new();
                        for (arg_name, arg) in args {
                            let (ty, wire_type) = match arg {
                                ArgEntry::Typed(ty, wire) => (self.name_of(ty)?, Some(wire.clone())),
                                ArgEntry::Bare((ty,)) => (self.name_of(ty)?, None),
                            };
                            arguments.insert(arg_name.clone(), RawArgument { ty, wire_type });
                        }
                        RawField {
                            ty: self.name_of(ty)?,
                            arguments,
                        }
                    }
                };
                raw_fields.insert(field_name.clone(), raw_field);
            }
            raw.types.insert(type_name.clone(), raw_fields);
        }
        raw.resolve()
    }
}

#[derive(Debug, Clone)]
struct RawArgument {
    ty: String,
    wire_type: Option<String>,
}

#[derive(Debug, Clone)]
struct RawField {
    ty: String,
    arguments: IndexMap<String, RawArgument>,
}

#[derive(Debug, Clone, Default)]
struct RawTypeMap {
    scalars: HashSet<String>,
    enums: HashSet<String>,
    types: IndexMap<String, IndexMap<String, RawField>>,
}

impl RawTypeMap {
    fn kind_of(&self, name: &str) -> Option<TypeKind> {
        if self.enums.contains(name) {
            return Some(TypeKind::Enum);
        }
        if self.scalars.contains(name) {
            return Some(TypeKind::Scalar);
        }
        match self.types.get(name) {
            Some(fields) if fields.is_empty() => Some(TypeKind::Scalar),
            Some(_) => Some(TypeKind::Object),
            None => None,
        }
    }

    fn type_ref(&self, name: &str, owner: &str, field: &str) -> Result<TypeRef> {
        let kind = self.kind_of(name).ok_or_else(|| {
            GraphQLError::InvalidTypeMap(format!(
                "`{}.{}` references unknown type `{}`",
                owner, field, name
            ))
        })?;
        Ok(TypeRef::new(kind, name))
    }

    fn resolve(self) -> Result<TypeMap> {
        let mut types = HashMap::with_capacity(self.types.len());

        // terminals may be declared without an entry in the field tables
        for name in self.scalars.iter().chain(self.enums.iter()) {
            if !self.types.contains_key(name) {
                let kind = self.kind_of(name).unwrap_or(TypeKind::Scalar);
                types.insert(
                    name.clone(),
                    TypeDef {
                        name: name.clone(),
                        kind,
                        fields: IndexMap::new(),
                    },
                );
            }
        }

        for (type_name, raw_fields) in &self.types {
            let kind = self.kind_of(type_name).unwrap_or(TypeKind::Object);
            let mut fields = IndexMap::with_capacity(raw_fields.len() + 1);
            if kind == TypeKind::Object {
                for (field_name, raw_field) in raw_fields {
                    let mut arguments = IndexMap::with_capacity(raw_field.arguments.len());
                    for (arg_name, raw_arg) in &raw_field.arguments {
                        let ty = self.type_ref(&raw_arg.ty, type_name, field_name)?;
                        let wire_type = raw_arg
                            .wire_type
                            .clone()
                            .unwrap_or_else(|| raw_arg.ty.clone());
                        arguments.insert(arg_name.clone(), ArgumentDef::new(ty, wire_type));
                    }
                    fields.insert(
                        field_name.clone(),
                        FieldDef {
                            name: field_name.clone(),
                            ty: self.type_ref(&raw_field.ty, type_name, field_name)?,
                            arguments,
                        },
                    );
                }
                fields
                    .entry(TYPENAME_FIELD.to_string())
                    .or_insert_with(|| FieldDef {
                        name: TYPENAME_FIELD.to_string(),
                        ty: TypeRef::Scalar("String".to_string()),
                        arguments: IndexMap::new(),
                    });
            }
            types.insert(
                type_name.clone(),
                TypeDef {
                    name: type_name.clone(),
                    kind,
                    fields,
                },
            );
        }

        Ok(TypeMap { types })
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for a [`TypeMap`] declared in code.
///
/// Field and argument types are referenced by name and resolved when
/// [`build`](TypeMapBuilder::build) is called.
#[derive(Debug, Default)]
pub struct TypeMapBuilder {
    raw: RawTypeMap,
}

impl TypeMapBuilder {
    /// Declare a scalar type.
    pub fn scalar(mut self, name: impl Into<String>) -> Self {
        self.raw.scalars.insert(name.into());
        self
    }

    /// Declare several scalar types.
    pub fn scalars<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.raw.scalars.extend(names.into_iter().map(Into::into));
        self
    }

    /// Declare an enum type.
    pub fn enumeration(mut self, name: impl Into<String>) -> Self {
        self.raw.enums.insert(name.into());
        self
    }

    /// Declare an object type.
    pub fn object<F>(mut self, name: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(ObjectBuilder) -> ObjectBuilder,
    {
        let object = build(ObjectBuilder::default());
        self.raw.types.insert(name.into(), object.fields);
        self
    }

    /// Resolve all references and build the map.
    pub fn build(self) -> Result<TypeMap> {
        self.raw.resolve()
    }
}

/// Field table builder used by [`TypeMapBuilder::object`].
#[derive(Debug, Default)]
pub struct ObjectBuilder {
    fields: IndexMap<String, RawField>,
}

impl ObjectBuilder {
    /// Add a field without arguments.
    pub fn field(mut self, name: impl Into<String>, ty: impl Into<String>) -> Self {
        self.fields.insert(
            name.into(),
            RawField {
                ty: ty.into(),
                arguments: IndexMap::new(),
            },
        );
        self
    }

    /// Add a field with arguments given as `(name, wire type)` pairs.
    ///
    /// The argument's type reference is the named type inside the wire type,
    /// so `[ID!]!` refers to `ID`.
    pub fn field_with_args<'a, I>(mut self, name: impl Into<String>, ty: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let arguments = args
            .into_iter()
            .map(|(arg, wire)| {
                (
                    arg.to_string(),
                    RawArgument {
                        ty: named_type(wire).to_string(),
                        wire_type: Some(wire.to_string()),
                    },
                )
            })
            .collect();
        self.fields.insert(
            name.into(),
            RawField {
                ty: ty.into(),
                arguments,
            },
        );
        self
    }
}

fn named_type(wire_type: &str) -> &str {
    wire_type.trim_matches(|c| matches!(c, '[' | ']' | '!'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn blog_artifact() -> Value {
        // 0 Boolean, 1 ID, 2 Int, 3 Mutation, 4 Post, 5 Query, 6 Role, 7 String, 8 User
        json!({
            "scalars": [0, 1, 2, 6, 7],
            "enums": [6],
            "types": {
                "Boolean": {},
                "ID": {},
                "Int": {},
                "Mutation": {
                    "createPost": [4, { "title": [7, "String!"], "draft": [0] }],
                    "__typename": [7]
                },
                "Post": { "id": [1], "title": [7], "author": [8], "__typename": [7] },
                "Query": {
                    "me": [8],
                    "hello": [7, { "name": [7, "String!"] }],
                    "__typename": [7]
                },
                "Role": {},
                "String": {},
                "User": { "id": [1], "role": [6], "posts": [4, { "first": [2, "Int"] }], "__typename": [7] }
            }
        })
    }

    #[test]
    fn test_resolves_indexed_references() {
        let map = TypeMap::from_artifact(blog_artifact()).unwrap();

        let me = map.field("Query", "me").unwrap();
        assert_eq!(me.ty, TypeRef::Object("User".to_string()));

        let role = map.field("User", "role").unwrap();
        assert_eq!(role.ty, TypeRef::Enum("Role".to_string()));

        let id = map.field("Post", "id").unwrap();
        assert_eq!(id.ty, TypeRef::Scalar("ID".to_string()));
    }

    #[test]
    fn test_argument_specs() {
        let map = TypeMap::from_artifact(blog_artifact()).unwrap();
        let create = map.field("Mutation", "createPost").unwrap();

        let title = create.argument("title").unwrap();
        assert_eq!(title.wire_type, "String!");
        assert!(!title.nullable);
        assert!(title.required);

        // missing wire type falls back to the type name
        let draft = create.argument("draft").unwrap();
        assert_eq!(draft.wire_type, "Boolean");
        assert!(draft.nullable);
        assert!(!draft.required);

        let required: Vec<_> = create.required_arguments().map(|(n, _)| n).collect();
        assert_eq!(required, vec!["title"]);
    }

    #[test]
    fn test_unknown_lookups_are_schema_mismatches() {
        let map = TypeMap::from_artifact(blog_artifact()).unwrap();

        assert!(matches!(
            map.field("User", "nickname"),
            Err(GraphQLError::SchemaMismatch { ref field, .. }) if field == "nickname"
        ));
        assert!(matches!(
            map.object("Subscription"),
            Err(GraphQLError::SchemaMismatch { .. })
        ));
        // scalars are not objects
        assert!(map.object("String").is_err());
    }

    #[test]
    fn test_bad_index_is_rejected() {
        let result = TypeMap::from_artifact(json!({
            "scalars": [],
            "types": { "Query": { "me": [42] } }
        }));
        assert!(matches!(result, Err(GraphQLError::InvalidTypeMap(_))));
    }

    #[test]
    fn test_from_json_accepts_names() {
        let map = TypeMap::from_json(
            r#"{
                "scalars": ["ID"],
                "types": { "Query": { "node": ["Node"] }, "Node": { "id": ["ID"] } }
            }"#,
        )
        .unwrap();

        assert_eq!(map.field("Query", "node").unwrap().ty.kind(), TypeKind::Object);
        assert!(map.contains("ID"));
    }

    #[test]
    fn test_builder_adds_typename() {
        let map = TypeMap::builder()
            .scalars(["ID", "String", "Int"])
            .enumeration("Role")
            .object("Query", |o| {
                o.field("me", "User")
                    .field_with_args("user", "User", [("id", "ID!")])
            })
            .object("User", |o| o.field("id", "ID").field("role", "Role"))
            .build()
            .unwrap();

        let typename = map.field("User", TYPENAME_FIELD).unwrap();
        assert!(typename.ty.is_leaf());

        let id = map.field("Query", "user").unwrap().argument("id").unwrap();
        assert_eq!(id.ty, TypeRef::Scalar("ID".to_string()));
        assert_eq!(id.wire_type, "ID!");
    }

    #[test]
    fn test_builder_rejects_unknown_reference() {
        let result = TypeMap::builder()
            .object("Query", |o| o.field("me", "User"))
            .build();
        assert!(matches!(result, Err(GraphQLError::InvalidTypeMap(_))));
    }
}
