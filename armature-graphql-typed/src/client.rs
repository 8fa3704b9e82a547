//! Typed GraphQL client implementation.

use std::future::Future;
use std::sync::Arc;

use futures::future::{self, BoxFuture, FutureExt};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::batch::{BatchScheduler, OperationResponse, settlement};
use crate::compiler::{CompiledOperation, OperationKind, compile};
use crate::decode::{DecodedResult, decode};
use crate::selection::SelectionSet;
use crate::transport::{HeaderProvider, HttpTransport, Transport};
use crate::type_map::TypeMap;
use crate::{GraphQLClientConfig, GraphQLError, Result};

/// Schema-aware GraphQL client.
///
/// Selections are validated against the client's [`TypeMap`] when an
/// operation is issued; invalid ones fail immediately and never reach the
/// network. Valid operations are batched according to the configuration.
///
/// Operation methods enqueue eagerly and return a `'static` future, so they
/// must be called from within a Tokio runtime.
#[derive(Clone)]
pub struct GraphQLClient {
    type_map: Arc<TypeMap>,
    config: Arc<GraphQLClientConfig>,
    transport: Arc<dyn Transport>,
    headers: HeaderProvider,
    scheduler: BatchScheduler,
}

impl GraphQLClient {
    /// Create a client for an endpoint with default configuration.
    pub fn new(endpoint: impl Into<String>, type_map: TypeMap) -> Result<Self> {
        Self::with_config(type_map, GraphQLClientConfig::new(endpoint))
    }

    /// Create a client that posts over HTTP with custom configuration.
    pub fn with_config(type_map: TypeMap, config: GraphQLClientConfig) -> Result<Self> {
        config.validate()?;
        let transport = HttpTransport::new(&config)?;
        Ok(Self::with_transport(type_map, config, Arc::new(transport)))
    }

    /// Create a client on top of a custom transport.
    ///
    /// The endpoint of `config` is not used; batching settings are.
    pub fn with_transport(
        type_map: TypeMap,
        config: GraphQLClientConfig,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let headers = HeaderProvider::none();
        let scheduler = scheduler_for(&config, &transport, &headers);
        Self {
            type_map: Arc::new(type_map),
            config: Arc::new(config),
            transport,
            headers,
            scheduler,
        }
    }

    /// Set the per-request header provider.
    pub fn with_headers(mut self, headers: HeaderProvider) -> Self {
        self.scheduler = scheduler_for(&self.config, &self.transport, &headers);
        self.headers = headers;
        self
    }

    /// Get the configuration.
    pub fn config(&self) -> &GraphQLClientConfig {
        &self.config
    }

    /// Get the schema descriptor.
    pub fn type_map(&self) -> &TypeMap {
        &self.type_map
    }

    /// Validate and compile a selection without sending it.
    pub fn compile(&self, kind: OperationKind, selection: &SelectionSet) -> Result<CompiledOperation> {
        compile(&self.type_map, kind, kind.root_type(), selection)
    }

    /// Run a query.
    pub fn query(&self, selection: &SelectionSet) -> BoxFuture<'static, Result<DecodedResult>> {
        self.dispatch(OperationKind::Query, selection)
    }

    /// Run a mutation.
    pub fn mutation(&self, selection: &SelectionSet) -> BoxFuture<'static, Result<DecodedResult>> {
        self.dispatch(OperationKind::Mutation, selection)
    }

    /// Run a query written as a loosely typed JSON selection.
    pub fn query_json(&self, selection: &Value) -> BoxFuture<'static, Result<DecodedResult>> {
        match SelectionSet::from_json(selection) {
            Ok(selection) => self.query(&selection),
            Err(e) => future::ready(Err(e)).boxed(),
        }
    }

    /// Run a query and deserialize the result.
    pub fn query_as<T>(&self, selection: &SelectionSet) -> BoxFuture<'static, Result<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let pending = self.query(selection);
        async move { pending.await?.deserialize() }.boxed()
    }

    /// Run a mutation and deserialize the result.
    pub fn mutation_as<T>(&self, selection: &SelectionSet) -> BoxFuture<'static, Result<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let pending = self.mutation(selection);
        async move { pending.await?.deserialize() }.boxed()
    }

    /// Run several queries together.
    ///
    /// All queries are enqueued before any is awaited, so with batching on
    /// they share windows. Results are in input order.
    pub async fn query_all(&self, selections: &[SelectionSet]) -> Vec<Result<DecodedResult>> {
        let pending: Vec<_> = selections.iter().map(|s| self.query(s)).collect();
        future::join_all(pending).await
    }

    /// Send an already compiled operation.
    pub fn execute(&self, operation: CompiledOperation) -> BoxFuture<'static, Result<DecodedResult>> {
        let type_map = self.type_map.clone();
        let root_type = operation.root_type().to_string();

        let response = if self.config.batching {
            self.scheduler.enqueue(operation).boxed()
        } else {
            self.send_now(operation).boxed()
        };

        async move { finish(&type_map, &root_type, response.await?) }.boxed()
    }

    /// Send one operation unaliased, starting the call before returning.
    fn send_now(
        &self,
        operation: CompiledOperation,
    ) -> impl Future<Output = Result<OperationResponse>> + Send + use<> {
        let (settle, settled) = oneshot::channel();
        let transport = self.transport.clone();
        let request = operation.to_request();
        let headers = self.headers.headers();

        tokio::spawn(async move {
            let result = match transport.execute(request, headers).await {
                Ok(response) => OperationResponse::from_response(response),
                Err(error) => {
                    warn!(error = %error, "GraphQL request failed");
                    Err(GraphQLError::Transport(error))
                }
            };
            // the caller may have stopped waiting
            let _ = settle.send(result);
        });

        settlement(settled)
    }

    fn dispatch(&self, kind: OperationKind, selection: &SelectionSet) -> BoxFuture<'static, Result<DecodedResult>> {
        match self.compile(kind, selection) {
            Ok(operation) => {
                debug!(kind = %kind, batching = self.config.batching, "Dispatching GraphQL operation");
                self.execute(operation)
            }
            Err(e) => future::ready(Err(e)).boxed(),
        }
    }
}

fn scheduler_for(
    config: &GraphQLClientConfig,
    transport: &Arc<dyn Transport>,
    headers: &HeaderProvider,
) -> BatchScheduler {
    BatchScheduler::new(
        transport.clone(),
        headers.clone(),
        config.max_batch_size,
        config.batch_interval,
    )
}

fn finish(type_map: &TypeMap, root_type: &str, response: OperationResponse) -> Result<DecodedResult> {
    if response.has_errors() {
        return Err(GraphQLError::Operation {
            errors: response.errors,
            data: response.data.map(Value::Object),
        });
    }

    match response.data {
        Some(data) => decode(type_map, root_type, &Value::Object(data)),
        None => Err(GraphQLError::Decode(
            "response carried neither data nor errors".to_string(),
        )),
    }
}
