//! GraphQL request batching.
//!
//! Operations enqueued within one batch interval are merged into a single
//! document. Each operation's root fields are aliased `op{i}__{field}` and
//! its variables renamed `op{i}_{name}`, so the merged response can be split
//! back per operation. Queries and mutations never share a batch.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::compiler::{CompiledOperation, OperationKind, VariableDefinition, write_field, write_header};
use crate::request::GraphQLRequest;
use crate::response::PathSegment;
use crate::transport::{HeaderProvider, Transport};
use crate::{GraphQLError, GraphQLResponse, GraphQLResponseError, Result, TransportError};

const ALIAS_SEPARATOR: &str = "__";

/// Alias prefix of the operation at `index` within a batch.
pub fn alias(index: usize) -> String {
    format!("op{}", index)
}

/// One operation's share of a batched response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperationResponse {
    /// Root fields under their original names; `None` when the server
    /// returned no data.
    pub data: Option<Map<String, Value>>,
    /// Errors attributed to this operation, with paths rewritten to the
    /// original root field names.
    pub errors: Vec<GraphQLResponseError>,
}

impl OperationResponse {
    /// Check if any errors were attributed.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Wrap a response for an operation sent on its own.
    pub fn from_response(response: GraphQLResponse<Value>) -> Result<Self> {
        let data = match response.data {
            None | Some(Value::Null) => None,
            Some(Value::Object(map)) => Some(map),
            Some(other) => {
                return Err(GraphQLError::Decode(format!(
                    "response data must be an object, got {}",
                    other
                )));
            }
        };
        Ok(Self {
            data,
            errors: response.errors.unwrap_or_default(),
        })
    }
}

/// Several operations of the same kind merged into one request.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    kind: OperationKind,
    request: GraphQLRequest,
    size: usize,
}

impl BatchRequest {
    /// Merge operations into one document.
    ///
    /// Every operation must be of `kind`.
    pub fn merge<'a, I>(kind: OperationKind, operations: I) -> Self
    where
        I: IntoIterator<Item = &'a CompiledOperation>,
    {
        let operations: Vec<&CompiledOperation> = operations.into_iter().collect();

        let mut definitions = Vec::new();
        let mut variables = Map::new();
        for (i, operation) in operations.iter().enumerate() {
            let prefix = format!("{}_", alias(i));
            definitions.extend(operation.variable_definitions().iter().map(|def| {
                VariableDefinition {
                    name: format!("{}{}", prefix, def.name),
                    wire_type: def.wire_type.clone(),
                }
            }));
            variables.extend(
                operation
                    .variables()
                    .iter()
                    .map(|(name, value)| (format!("{}{}", prefix, name), value.clone())),
            );
        }

        let mut document = String::new();
        write_header(&mut document, kind, None, definitions.iter(), "");
        document.push_str(" { ");
        for (i, operation) in operations.iter().enumerate() {
            let prefix = alias(i);
            let var_prefix = format!("{}_", prefix);
            for field in operation.fields() {
                let field_alias = format!("{}{}{}", prefix, ALIAS_SEPARATOR, field.name);
                write_field(&mut document, field, Some(&field_alias), &var_prefix);
                document.push(' ');
            }
        }
        document.push('}');

        Self {
            kind,
            request: GraphQLRequest::new(document).variables(variables),
            size: operations.len(),
        }
    }

    /// Operation kind shared by the batch.
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Number of merged operations.
    pub fn len(&self) -> usize {
        self.size
    }

    /// Check if the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// The merged request.
    pub fn request(&self) -> &GraphQLRequest {
        &self.request
    }

    /// Split a merged response into one part per operation, in merge order.
    ///
    /// Errors whose path cannot be attributed to a single operation are
    /// delivered to all of them.
    pub fn split(&self, response: GraphQLResponse<Value>) -> Vec<OperationResponse> {
        let has_data = matches!(response.data, Some(Value::Object(_)));
        let mut parts: Vec<OperationResponse> = (0..self.size)
            .map(|_| OperationResponse {
                data: has_data.then(Map::new),
                errors: Vec::new(),
            })
            .collect();

        if let Some(Value::Object(data)) = response.data {
            for (key, value) in data {
                match self.attribute(&key) {
                    Some((index, field)) => {
                        if let Some(map) = parts[index].data.as_mut() {
                            map.insert(field.to_string(), value);
                        }
                    }
                    None => debug!(key = %key, "Dropping unattributed batch data"),
                }
            }
        }

        for mut error in response.errors.unwrap_or_default() {
            let target = error
                .root_field()
                .and_then(|root| self.attribute(root))
                .map(|(index, field)| (index, field.to_string()));

            match target {
                Some((index, field)) => {
                    debug!(operation = index, field = %field, "Attributed GraphQL error");
                    if let Some(first) = error.path.as_mut().and_then(|path| path.first_mut()) {
                        *first = PathSegment::Field(field);
                    }
                    parts[index].errors.push(error);
                }
                None => {
                    for part in &mut parts {
                        part.errors.push(error.clone());
                    }
                }
            }
        }

        parts
    }

    /// Map an aliased root key back to `(operation index, field name)`.
    fn attribute<'k>(&self, key: &'k str) -> Option<(usize, &'k str)> {
        let (prefix, field) = key.split_once(ALIAS_SEPARATOR)?;
        let index: usize = prefix.strip_prefix("op")?.parse().ok()?;
        (index < self.size && !field.is_empty()).then_some((index, field))
    }
}

/// Wait for an operation to be settled by the task sending it.
pub(crate) fn settlement(
    settled: oneshot::Receiver<Result<OperationResponse>>,
) -> impl Future<Output = Result<OperationResponse>> + Send + 'static {
    async move {
        settled.await.unwrap_or_else(|_| {
            Err(GraphQLError::Transport(TransportError::new(
                "operation was dropped before completing",
            )))
        })
    }
}

/// Why a window was flushed.
#[derive(Debug, Clone, Copy)]
enum FlushTrigger {
    Timer,
    Size,
}

impl FlushTrigger {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Timer => "timer",
            Self::Size => "size",
        }
    }
}

struct PendingOperation {
    operation: CompiledOperation,
    settle: oneshot::Sender<Result<OperationResponse>>,
}

struct BatchWindow {
    id: u64,
    entries: Vec<PendingOperation>,
}

#[derive(Default)]
struct SchedulerState {
    windows: HashMap<OperationKind, BatchWindow>,
    next_window: u64,
}

struct SchedulerInner {
    transport: Arc<dyn Transport>,
    headers: HeaderProvider,
    max_batch_size: usize,
    batch_interval: Duration,
    state: Mutex<SchedulerState>,
}

/// Collects operations into time- and size-bounded windows and sends each
/// window as one request.
///
/// A window opens with its first operation and is flushed when it reaches
/// `max_batch_size` or when `batch_interval` has elapsed, whichever comes
/// first. Operations enqueued after a flush go to a new window. Must be
/// used from within a Tokio runtime.
#[derive(Clone)]
pub struct BatchScheduler {
    inner: Arc<SchedulerInner>,
}

impl BatchScheduler {
    /// Create a scheduler.
    ///
    /// A `max_batch_size` of zero is treated as one.
    pub fn new(
        transport: Arc<dyn Transport>,
        headers: HeaderProvider,
        max_batch_size: usize,
        batch_interval: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                transport,
                headers,
                max_batch_size: max_batch_size.max(1),
                batch_interval,
                state: Mutex::new(SchedulerState::default()),
            }),
        }
    }

    /// Add an operation to the open window for its kind.
    ///
    /// The operation joins a window as soon as this is called; the returned
    /// future only waits for its share of the response.
    pub fn enqueue(
        &self,
        operation: CompiledOperation,
    ) -> impl Future<Output = Result<OperationResponse>> + Send + use<> {
        let (settle, settled) = oneshot::channel();
        let kind = operation.kind();

        let full = {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;
            let window = match state.windows.entry(kind) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => {
                    let id = state.next_window;
                    state.next_window += 1;
                    self.spawn_timer(kind, id);
                    entry.insert(BatchWindow {
                        id,
                        entries: Vec::new(),
                    })
                }
            };
            window.entries.push(PendingOperation { operation, settle });
            debug!(kind = %kind, window = window.id, pending = window.entries.len(), "Enqueued GraphQL operation");

            if window.entries.len() >= self.inner.max_batch_size {
                state.windows.remove(&kind)
            } else {
                None
            }
        };

        if let Some(window) = full {
            let inner = self.inner.clone();
            tokio::spawn(async move {
                inner.flush(kind, window.entries, FlushTrigger::Size).await;
            });
        }

        settlement(settled)
    }

    /// Number of operations waiting in open windows.
    pub fn pending(&self) -> usize {
        self.inner
            .state
            .lock()
            .windows
            .values()
            .map(|window| window.entries.len())
            .sum()
    }

    fn spawn_timer(&self, kind: OperationKind, id: u64) {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            tokio::time::sleep(inner.batch_interval).await;

            let window = {
                let mut state = inner.state.lock();
                let current = state.windows.get(&kind).is_some_and(|window| window.id == id);
                if current {
                    state.windows.remove(&kind)
                } else {
                    None
                }
            };

            if let Some(window) = window {
                inner.flush(kind, window.entries, FlushTrigger::Timer).await;
            }
        });
    }
}

impl SchedulerInner {
    async fn flush(&self, kind: OperationKind, entries: Vec<PendingOperation>, trigger: FlushTrigger) {
        let batch = BatchRequest::merge(kind, entries.iter().map(|entry| &entry.operation));
        info!(
            kind = %kind,
            size = batch.len(),
            trigger = trigger.as_str(),
            "Flushing GraphQL batch"
        );

        // evaluated per flush so rotated credentials apply to the next batch
        let headers = self.headers.headers();

        match self.transport.execute(batch.request().clone(), headers).await {
            Ok(response) => {
                let parts = batch.split(response);
                for (entry, part) in entries.into_iter().zip(parts) {
                    // the caller may have stopped waiting
                    let _ = entry.settle.send(Ok(part));
                }
            }
            Err(error) => {
                warn!(kind = %kind, size = batch.len(), error = %error, "GraphQL batch failed");
                for entry in entries {
                    let _ = entry.settle.send(Err(GraphQLError::Transport(error.clone())));
                }
            }
        }
    }
}
