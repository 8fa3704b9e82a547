//! Typed GraphQL client configuration.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::{GraphQLError, Result};

/// Environment variable holding the endpoint URL.
pub const ENV_URL: &str = "GRAPHQL_URL";
/// Environment variable holding the request timeout in seconds.
pub const ENV_TIMEOUT_SECS: &str = "GRAPHQL_TIMEOUT_SECS";
/// Environment variable enabling or disabling batching.
pub const ENV_BATCHING: &str = "GRAPHQL_BATCHING";
/// Environment variable holding the maximum batch size.
pub const ENV_MAX_BATCH_SIZE: &str = "GRAPHQL_MAX_BATCH_SIZE";
/// Environment variable holding the batch interval in milliseconds.
pub const ENV_BATCH_INTERVAL_MS: &str = "GRAPHQL_BATCH_INTERVAL_MS";

/// Typed GraphQL client configuration.
#[derive(Debug, Clone)]
pub struct GraphQLClientConfig {
    /// GraphQL endpoint URL.
    pub endpoint: String,
    /// Request timeout, enforced by the HTTP transport.
    pub timeout: Duration,
    /// Default headers for all requests.
    pub default_headers: Vec<(String, String)>,
    /// Aggregate concurrent operations into batches.
    pub batching: bool,
    /// Maximum number of operations per network call.
    pub max_batch_size: usize,
    /// Maximum time an operation waits for batch-mates.
    pub batch_interval: Duration,
    /// User agent string.
    pub user_agent: String,
}

impl Default for GraphQLClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:4000/graphql".to_string(),
            timeout: Duration::from_secs(30),
            default_headers: Vec::new(),
            batching: true,
            max_batch_size: 10,
            batch_interval: Duration::from_millis(20),
            user_agent: format!("armature-graphql-typed/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl GraphQLClientConfig {
    /// Create a new configuration builder.
    pub fn builder() -> GraphQLClientConfigBuilder {
        GraphQLClientConfigBuilder::default()
    }

    /// Create configuration for a specific endpoint.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    /// Load configuration from `GRAPHQL_*` environment variables.
    ///
    /// Unset variables keep their defaults; set but unparsable ones fail.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(url) = lookup(ENV_URL) {
            config.endpoint = url;
        }
        if let Some(secs) = parse_var::<u64>(&lookup, ENV_TIMEOUT_SECS)? {
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(batching) = parse_var::<bool>(&lookup, ENV_BATCHING)? {
            config.batching = batching;
        }
        if let Some(size) = parse_var::<usize>(&lookup, ENV_MAX_BATCH_SIZE)? {
            config.max_batch_size = size;
        }
        if let Some(millis) = parse_var::<u64>(&lookup, ENV_BATCH_INTERVAL_MS)? {
            config.batch_interval = Duration::from_millis(millis);
        }
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration before a client is built from it.
    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.endpoint)
            .map_err(|e| GraphQLError::InvalidUrl(format!("{}: {}", self.endpoint, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(GraphQLError::InvalidUrl(format!(
                "{}: unsupported scheme `{}`",
                self.endpoint,
                url.scheme()
            )));
        }
        if self.max_batch_size == 0 {
            return Err(GraphQLError::Config(
                "max_batch_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| GraphQLError::Config(format!("{}={:?}: {}", key, raw, e))),
        None => Ok(None),
    }
}

/// Builder for typed GraphQL client configuration.
#[derive(Debug, Default)]
pub struct GraphQLClientConfigBuilder {
    config: GraphQLClientConfig,
}

impl GraphQLClientConfigBuilder {
    /// Set the GraphQL endpoint URL.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.endpoint = endpoint.into();
        self
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Add a default header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config
            .default_headers
            .push((name.into(), value.into()));
        self
    }

    /// Set a static bearer token.
    ///
    /// For tokens that rotate, use [`HeaderProvider::bearer`](crate::HeaderProvider::bearer).
    pub fn bearer_auth(mut self, token: impl Into<String>) -> Self {
        self.config.default_headers.push((
            "Authorization".to_string(),
            format!("Bearer {}", token.into()),
        ));
        self
    }

    /// Enable or disable request batching.
    pub fn batching(mut self, enabled: bool) -> Self {
        self.config.batching = enabled;
        self
    }

    /// Set maximum batch size.
    pub fn max_batch_size(mut self, size: usize) -> Self {
        self.config.max_batch_size = size;
        self
    }

    /// Set the batch interval.
    pub fn batch_interval(mut self, interval: Duration) -> Self {
        self.config.batch_interval = interval;
        self
    }

    /// Set user agent string.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Build the configuration.
    pub fn build(self) -> GraphQLClientConfig {
        self.config
    }
}
