//! Network transport for compiled operations.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use http::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::request::GraphQLRequest;
use crate::{GraphQLClientConfig, GraphQLError, GraphQLResponse, Result, TransportError};

/// Sends one GraphQL request and returns the parsed response body.
///
/// Implementations report every failure to obtain a response body as a
/// [`TransportError`]; GraphQL errors inside the body are not failures here.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Execute a request with the given extra headers.
    async fn execute(
        &self,
        request: GraphQLRequest,
        headers: Vec<(String, String)>,
    ) -> std::result::Result<GraphQLResponse<Value>, TransportError>;
}

/// HTTP POST transport backed by `reqwest`.
#[derive(Clone)]
pub struct HttpTransport {
    http_client: Client,
    endpoint: String,
    default_headers: Vec<(String, String)>,
}

impl HttpTransport {
    /// Create a transport from the client configuration.
    pub fn new(config: &GraphQLClientConfig) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .gzip(true)
            .build()
            .map_err(|e| GraphQLError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            endpoint: config.endpoint.clone(),
            default_headers: config.default_headers.clone(),
        })
    }

    /// Endpoint requests are posted to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(
        &self,
        request: GraphQLRequest,
        headers: Vec<(String, String)>,
    ) -> std::result::Result<GraphQLResponse<Value>, TransportError> {
        debug!(endpoint = %self.endpoint, query = %request.query, "Posting GraphQL request");

        // per-flush headers replace configured defaults of the same name
        let mut header_map = HeaderMap::new();
        for (name, value) in self.default_headers.iter().chain(headers.iter()) {
            header_map.insert(header_name(name)?, header_value(name, value)?);
        }
        header_map.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let response = self
            .http_client
            .post(&self.endpoint)
            .headers(header_map)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::with_status(
                status.as_u16(),
                format!("HTTP {}: {}", status, body),
            ));
        }

        Ok(response.json::<GraphQLResponse<Value>>().await?)
    }
}

fn header_name(name: &str) -> std::result::Result<HeaderName, TransportError> {
    HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| TransportError::new(format!("invalid header name `{}`: {}", name, e)))
}

fn header_value(name: &str, value: &str) -> std::result::Result<HeaderValue, TransportError> {
    HeaderValue::from_str(value)
        .map_err(|e| TransportError::new(format!("invalid value for header `{}`: {}", name, e)))
}

type HeaderFn = dyn Fn() -> Vec<(String, String)> + Send + Sync;

/// Source of per-flush headers, typically authentication.
///
/// The provider is called every time a request is sent, never cached, so
/// rotated credentials are picked up by the next flush.
#[derive(Clone)]
pub struct HeaderProvider(Arc<HeaderFn>);

impl HeaderProvider {
    /// Create a provider from a closure.
    pub fn new<F>(provider: F) -> Self
    where
        F: Fn() -> Vec<(String, String)> + Send + Sync + 'static,
    {
        Self(Arc::new(provider))
    }

    /// A provider that adds nothing.
    pub fn none() -> Self {
        Self::new(Vec::new)
    }

    /// `authorization: Bearer <token>` from a token source.
    ///
    /// When the source has no token the header is sent with an empty value.
    pub fn bearer<F>(token: F) -> Self
    where
        F: Fn() -> Option<String> + Send + Sync + 'static,
    {
        Self::new(move || {
            let value = token()
                .map(|token| format!("Bearer {}", token))
                .unwrap_or_default();
            vec![(AUTHORIZATION.as_str().to_string(), value)]
        })
    }

    /// Produce the headers for one request.
    pub fn headers(&self) -> Vec<(String, String)> {
        (self.0)()
    }
}

impl Default for HeaderProvider {
    fn default() -> Self {
        Self::none()
    }
}

impl fmt::Debug for HeaderProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeaderProvider").finish_non_exhaustive()
    }
}
