//! Selection to document compilation.
//!
//! [`compile`] validates a [`SelectionSet`] against a [`TypeMap`] and prints
//! the GraphQL document with its variable bindings. All errors are raised
//! here, before an operation can reach the batch scheduler.

use std::collections::HashSet;
use std::fmt;

use serde_json::{Map, Value};
use tracing::debug;

use crate::request::GraphQLRequest;
use crate::selection::{Arguments, Selection, SelectionSet};
use crate::type_map::{FieldDef, TYPENAME_FIELD, TypeMap};
use crate::{GraphQLError, Result};

/// Kind of a GraphQL operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// Read operation against the `Query` root.
    Query,
    /// Write operation against the `Mutation` root.
    Mutation,
}

impl OperationKind {
    /// Keyword opening the document.
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Mutation => "mutation",
        }
    }

    /// Conventional root type name.
    pub fn root_type(&self) -> &'static str {
        match self {
            Self::Query => "Query",
            Self::Mutation => "Mutation",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// A declared document variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableDefinition {
    /// Variable name, without `$`.
    pub name: String,
    /// Declared type, e.g. `String!`.
    pub wire_type: String,
}

/// A field of the compiled document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledField {
    /// Field name.
    pub name: String,
    /// `(argument, variable)` pairs.
    pub arguments: Vec<(String, String)>,
    /// Sub-selection; empty for leaves.
    pub selection: Vec<CompiledField>,
}

/// A validated, ready-to-send operation.
#[derive(Debug, Clone)]
pub struct CompiledOperation {
    kind: OperationKind,
    root_type: String,
    operation_name: Option<String>,
    document: String,
    variables: Map<String, Value>,
    variable_definitions: Vec<VariableDefinition>,
    fields: Vec<CompiledField>,
}

impl CompiledOperation {
    /// Operation kind.
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Root type the selection was compiled against.
    pub fn root_type(&self) -> &str {
        &self.root_type
    }

    /// Operation name, if the selection was named.
    pub fn operation_name(&self) -> Option<&str> {
        self.operation_name.as_deref()
    }

    /// The printed document.
    pub fn document(&self) -> &str {
        &self.document
    }

    /// Variable bindings.
    pub fn variables(&self) -> &Map<String, Value> {
        &self.variables
    }

    /// Variable declarations in the order they appear in the header.
    pub fn variable_definitions(&self) -> &[VariableDefinition] {
        &self.variable_definitions
    }

    /// Root fields.
    pub fn fields(&self) -> &[CompiledField] {
        &self.fields
    }

    /// Wire request for sending this operation on its own.
    pub fn to_request(&self) -> GraphQLRequest {
        let request = GraphQLRequest::new(self.document.clone()).variables(self.variables.clone());
        match &self.operation_name {
            Some(name) => request.operation_name(name.clone()),
            None => request,
        }
    }
}

/// Compile a selection on `root_type` into an operation.
pub fn compile(
    type_map: &TypeMap,
    kind: OperationKind,
    root_type: &str,
    selection: &SelectionSet,
) -> Result<CompiledOperation> {
    let mut compiler = Compiler {
        type_map,
        variables: Map::new(),
        definitions: Vec::new(),
        used_names: HashSet::new(),
    };

    let mut path = Vec::new();
    let fields = compiler.compile_set(root_type, selection, &mut path)?;
    if fields.is_empty() {
        return Err(GraphQLError::InvalidSelection(format!(
            "{} selects no fields on `{}`",
            kind, root_type
        )));
    }

    let operation_name = selection.operation_name().map(str::to_string);
    let mut document = String::new();
    write_header(
        &mut document,
        kind,
        operation_name.as_deref(),
        compiler.definitions.iter(),
        "",
    );
    document.push(' ');
    write_selection_set(&mut document, &fields, "");

    debug!(
        kind = %kind,
        root = root_type,
        variables = compiler.definitions.len(),
        "Compiled GraphQL operation"
    );

    Ok(CompiledOperation {
        kind,
        root_type: root_type.to_string(),
        operation_name,
        document,
        variables: compiler.variables,
        variable_definitions: compiler.definitions,
        fields,
    })
}

struct Compiler<'a> {
    type_map: &'a TypeMap,
    variables: Map<String, Value>,
    definitions: Vec<VariableDefinition>,
    used_names: HashSet<String>,
}

impl Compiler<'_> {
    fn compile_set(
        &mut self,
        type_name: &str,
        set: &SelectionSet,
        path: &mut Vec<String>,
    ) -> Result<Vec<CompiledField>> {
        let type_map = self.type_map;
        let object = type_map.object(type_name)?;
        let mut out = Vec::with_capacity(set.len());

        if set.is_all_scalars() {
            out.extend(
                object
                    .fields
                    .values()
                    .filter(|f| {
                        f.ty.is_leaf()
                            && f.name != TYPENAME_FIELD
                            && f.required_arguments().next().is_none()
                    })
                    .map(|f| CompiledField {
                        name: f.name.clone(),
                        arguments: Vec::new(),
                        selection: Vec::new(),
                    }),
            );
        }

        for (name, selection) in set.iter() {
            let field = object
                .field(name)
                .ok_or_else(|| GraphQLError::schema_mismatch(type_name, name))?;

            path.push(name.to_string());
            let compiled = self.compile_field(type_name, field, selection, path);
            path.pop();

            let Some(compiled) = compiled? else {
                out.retain(|f| f.name != name);
                continue;
            };
            // an explicit selection overrides the all-scalars entry in place
            match out.iter().position(|f| f.name == compiled.name) {
                Some(index) => out[index] = compiled,
                None => out.push(compiled),
            }
        }

        Ok(out)
    }

    fn compile_field(
        &mut self,
        owner: &str,
        field: &FieldDef,
        selection: &Selection,
        path: &mut Vec<String>,
    ) -> Result<Option<CompiledField>> {
        let (args, inner) = match selection {
            Selection::WithArgs(args, inner) => (Some(args), &**inner),
            other => (None, other),
        };

        match inner {
            Selection::Scalar(false) => {
                // excluded fields bind nothing, but their argument names are still checked
                if let Some(name) = args
                    .into_iter()
                    .flat_map(|args| args.keys())
                    .find(|name| field.argument(name).is_none())
                {
                    return Err(GraphQLError::invalid_argument(
                        owner,
                        &field.name,
                        name,
                        "argument is not declared",
                    ));
                }
                return Ok(None);
            }
            Selection::Scalar(true) if !field.ty.is_leaf() => {
                return Err(GraphQLError::MissingSelection {
                    type_name: owner.to_string(),
                    field: field.name.clone(),
                });
            }
            Selection::Nested(_) if field.ty.is_leaf() => {
                return Err(GraphQLError::InvalidSelection(format!(
                    "`{}.{}` returns `{}` and takes no sub-selection",
                    owner,
                    field.name,
                    field.ty.name()
                )));
            }
            Selection::WithArgs(..) => {
                return Err(GraphQLError::InvalidSelection(format!(
                    "arguments for `{}.{}` are given more than once",
                    owner, field.name
                )));
            }
            _ => {}
        }

        let arguments = self.bind_arguments(owner, field, args, path)?;

        let selection = match inner {
            Selection::Nested(set) => {
                let children = self.compile_set(field.ty.name(), set, path)?;
                if children.is_empty() {
                    return Err(GraphQLError::MissingSelection {
                        type_name: owner.to_string(),
                        field: field.name.clone(),
                    });
                }
                children
            }
            _ => Vec::new(),
        };

        Ok(Some(CompiledField {
            name: field.name.clone(),
            arguments,
            selection,
        }))
    }

    fn bind_arguments(
        &mut self,
        owner: &str,
        field: &FieldDef,
        args: Option<&Arguments>,
        path: &[String],
    ) -> Result<Vec<(String, String)>> {
        for (name, _) in field.required_arguments() {
            if !args.is_some_and(|args| args.contains_key(name)) {
                return Err(GraphQLError::invalid_argument(
                    owner,
                    &field.name,
                    name,
                    "required argument is missing",
                ));
            }
        }

        let Some(args) = args else {
            return Ok(Vec::new());
        };

        let mut bound = Vec::with_capacity(args.len());
        for (name, value) in args {
            let def = field.argument(name).ok_or_else(|| {
                GraphQLError::invalid_argument(owner, &field.name, name, "argument is not declared")
            })?;
            if value.is_null() && !def.nullable {
                return Err(GraphQLError::invalid_argument(
                    owner,
                    &field.name,
                    name,
                    format!("null given for `{}`", def.wire_type),
                ));
            }

            let variable = self.mint_variable(path, name);
            self.definitions.push(VariableDefinition {
                name: variable.clone(),
                wire_type: def.wire_type.clone(),
            });
            self.variables.insert(variable.clone(), value.clone());
            bound.push((name.clone(), variable));
        }
        Ok(bound)
    }

    fn mint_variable(&mut self, path: &[String], argument: &str) -> String {
        let base = format!("{}_{}", path.join("_"), argument);
        let mut name = base.clone();
        let mut suffix = 2;
        while self.used_names.contains(&name) {
            name = format!("{}_{}", base, suffix);
            suffix += 1;
        }
        self.used_names.insert(name.clone());
        name
    }
}

// ============================================================================
// Printing
// ============================================================================

/// Write `keyword [name] [($var: Type, ...)]`.
pub(crate) fn write_header<'a>(
    out: &mut String,
    kind: OperationKind,
    name: Option<&str>,
    definitions: impl Iterator<Item = &'a VariableDefinition>,
    var_prefix: &str,
) {
    out.push_str(kind.keyword());
    if let Some(name) = name {
        out.push(' ');
        out.push_str(name);
    }

    let mut definitions = definitions.peekable();
    if definitions.peek().is_none() {
        return;
    }
    out.push_str(if name.is_some() { "(" } else { " (" });
    for (i, def) in definitions.enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push('$');
        out.push_str(var_prefix);
        out.push_str(&def.name);
        out.push_str(": ");
        out.push_str(&def.wire_type);
    }
    out.push(')');
}

/// Write a single field, optionally aliased.
pub(crate) fn write_field(
    out: &mut String,
    field: &CompiledField,
    alias: Option<&str>,
    var_prefix: &str,
) {
    if let Some(alias) = alias {
        out.push_str(alias);
        out.push_str(": ");
    }
    out.push_str(&field.name);

    if !field.arguments.is_empty() {
        out.push('(');
        for (i, (argument, variable)) in field.arguments.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            out.push_str(argument);
            out.push_str(": $");
            out.push_str(var_prefix);
            out.push_str(variable);
        }
        out.push(')');
    }

    if !field.selection.is_empty() {
        out.push(' ');
        write_selection_set(out, &field.selection, var_prefix);
    }
}

fn write_selection_set(out: &mut String, fields: &[CompiledField], var_prefix: &str) {
    out.push_str("{ ");
    for field in fields {
        write_field(out, field, None, var_prefix);
        out.push(' ');
    }
    out.push('}');
}
