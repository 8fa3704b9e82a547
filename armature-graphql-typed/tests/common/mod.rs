//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use armature_graphql_typed::{
    GraphQLClient, GraphQLClientConfig, GraphQLRequest, GraphQLResponse, Transport,
    TransportError, TypeMap,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};

/// Blog schema in the compact artifact format.
pub fn blog_schema() -> TypeMap {
    // 0 Boolean, 1 ID, 2 Int, 3 Mutation, 4 Node, 5 Post, 6 Query, 7 Role, 8 String, 9 User
    TypeMap::from_artifact(json!({
        "scalars": [0, 1, 2, 7, 8],
        "enums": [7],
        "types": {
            "Boolean": {},
            "ID": {},
            "Int": {},
            "Mutation": {
                "createPost": [5, { "title": [8, "String!"], "draft": [0, "Boolean"] }]
            },
            "Node": { "id": [1] },
            "Post": { "id": [1], "title": [8], "author": [9] },
            "Query": {
                "me": [9],
                "hello": [8, { "name": [8, "String!"] }],
                "node": [4, { "id": [1, "ID!"] }],
                "post": [5, { "id": [1, "ID!"] }]
            },
            "Role": {},
            "String": {},
            "User": {
                "id": [1],
                "email": [8],
                "role": [7],
                "posts": [5, { "first": [2, "Int"] }]
            }
        }
    }))
    .unwrap()
}

type Responder =
    dyn Fn(&GraphQLRequest) -> Result<GraphQLResponse<Value>, TransportError> + Send + Sync;

/// A recorded transport call.
#[derive(Debug, Clone)]
pub struct Call {
    pub request: GraphQLRequest,
    pub headers: Vec<(String, String)>,
}

/// Transport that records every call and answers from a closure.
pub struct RecordingTransport {
    calls: Mutex<Vec<Call>>,
    respond: Box<Responder>,
    latency: Duration,
}

impl RecordingTransport {
    pub fn new<F>(respond: F) -> Arc<Self>
    where
        F: Fn(&GraphQLRequest) -> Result<GraphQLResponse<Value>, TransportError>
            + Send
            + Sync
            + 'static,
    {
        Self::slow(Duration::ZERO, respond)
    }

    /// Answer from a closure after `latency`; the call is recorded on arrival.
    pub fn slow<F>(latency: Duration, respond: F) -> Arc<Self>
    where
        F: Fn(&GraphQLRequest) -> Result<GraphQLResponse<Value>, TransportError>
            + Send
            + Sync
            + 'static,
    {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            respond: Box::new(respond),
            latency,
        })
    }

    /// Always answer with the same body.
    pub fn replying(body: Value) -> Arc<Self> {
        Self::new(move |_| Ok(serde_json::from_value(body.clone()).unwrap()))
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn execute(
        &self,
        request: GraphQLRequest,
        headers: Vec<(String, String)>,
    ) -> Result<GraphQLResponse<Value>, TransportError> {
        let response = (self.respond)(&request);
        self.calls.lock().push(Call { request, headers });
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        response
    }
}

/// Batching client over a recording transport.
pub fn client(transport: Arc<RecordingTransport>, interval: Duration, max: usize) -> GraphQLClient {
    let config = GraphQLClientConfig::builder()
        .batch_interval(interval)
        .max_batch_size(max)
        .build();
    GraphQLClient::with_transport(blog_schema(), config, transport)
}
