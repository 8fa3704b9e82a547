//! # Armature Typed GraphQL Client
//!
//! A schema-driven GraphQL client. Selections are checked against a compact
//! schema descriptor before anything is sent, and concurrent operations are
//! merged into batched requests.
//!
//! ## Features
//!
//! - **Schema validation**: Unknown fields, missing sub-selections and bad
//!   arguments fail locally, without a network call
//! - **Variable binding**: Argument values are always sent as variables
//! - **Batching**: Operations issued close together share one HTTP request
//! - **Typed results**: Every decoded object carries its `__typename`
//! - **Type guards**: Narrow polymorphic results by discriminant
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use armature_graphql_typed::{GraphQLClient, HeaderProvider, SelectionSet, TypeMap};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let type_map = TypeMap::from_json(include_str!("schema.json"))?;
//!     let client = GraphQLClient::new("http://localhost:3002/graphql", type_map)?
//!         .with_headers(HeaderProvider::bearer(|| std::env::var("API_TOKEN").ok()));
//!
//!     let selection = SelectionSet::new()
//!         .with_args("hello", [("name", json!("world"))], true)
//!         .nested("me", SelectionSet::new().field("id").field("email"));
//!
//!     let result = client.query(&selection).await?;
//!     println!("{:?}", result.get("hello"));
//!     Ok(())
//! }
//! ```
//!
//! ## Type Guards
//!
//! ```rust,ignore
//! use armature_graphql_typed::{assert_type, is_type};
//!
//! let node = result.get("node").unwrap();
//! if is_type(node, &["User"]) {
//!     let user = assert_type(node, &["User"])?;
//!     println!("user {:?}", user.get("email"));
//! }
//! ```

mod batch;
mod client;
mod compiler;
mod config;
mod decode;
mod error;
mod request;
mod response;
mod selection;
mod transport;
mod type_map;

pub use batch::{BatchRequest, BatchScheduler, OperationResponse, alias};
pub use client::GraphQLClient;
pub use compiler::{CompiledField, CompiledOperation, OperationKind, VariableDefinition, compile};
pub use config::{
    ENV_BATCH_INTERVAL_MS, ENV_BATCHING, ENV_MAX_BATCH_SIZE, ENV_TIMEOUT_SECS, ENV_URL,
    GraphQLClientConfig, GraphQLClientConfigBuilder,
};
pub use decode::{DecodedObject, DecodedResult, DecodedValue, assert_type, decode, is_type};
pub use error::{GraphQLError, Result, TransportError};
pub use request::GraphQLRequest;
pub use response::{ErrorLocation, GraphQLResponse, GraphQLResponseError, PathSegment, format_path};
pub use selection::{Arguments, Selection, SelectionSet};
pub use transport::{HeaderProvider, HttpTransport, Transport};
pub use type_map::{
    ArgumentDef, FieldDef, ObjectBuilder, TYPENAME_FIELD, TypeDef, TypeKind, TypeMap,
    TypeMapBuilder, TypeRef,
};

// Re-export common types
pub use serde_json::Value as JsonValue;
