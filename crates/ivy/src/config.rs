//! Router and server configuration.
//!
//! [`RouterConfig`] is passed explicitly to [`Router::with_config`]; nothing
//! in this crate reads process-wide state. [`ServerConfig`] can be built in
//! code or loaded from TOML.
//!
//! ```rust
//! use ivy::{json_error_handler, PrettyJson, RouterConfig, ServerConfig};
//! use std::time::Duration;
//!
//! let router_config = RouterConfig::builder()
//!     .error_handler(json_error_handler)
//!     .json_codec(PrettyJson)
//!     .build();
//!
//! let server_config = ServerConfig::from_toml_str(r#"
//!     http_addr = "127.0.0.1:3000"
//!     shutdown_timeout_secs = 5
//! "#).unwrap();
//! assert_eq!(server_config.shutdown_timeout(), Duration::from_secs(5));
//! # let _ = router_config;
//! ```
//!
//! [`Router::with_config`]: crate::Router::with_config

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::error::{Error, ErrorHandler};
use crate::response::ResponseWriter;
use crate::types::Request;

/// Default HTTP bind address.
pub const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:8080";

/// Default shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Default request body read timeout in seconds.
pub const DEFAULT_BODY_TIMEOUT_SECS: u64 = 30;

/// Encoder and decoder used for JSON request and response bodies.
pub trait JsonCodec: Send + Sync + 'static {
    /// Serializes a value to bytes.
    fn encode(&self, value: &serde_json::Value) -> Result<Vec<u8>, serde_json::Error>;

    /// Parses bytes into a value.
    fn decode(&self, bytes: &[u8]) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// Compact JSON. The default.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompactJson;

impl JsonCodec for CompactJson {
    fn encode(&self, value: &serde_json::Value) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(value)
    }
}

/// Indented JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrettyJson;

impl JsonCodec for PrettyJson {
    fn encode(&self, value: &serde_json::Value) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(value)
    }
}

/// Construction-time settings for a [`Router`](crate::Router).
#[derive(Clone)]
pub struct RouterConfig {
    pub(crate) error_handler: Option<ErrorHandler>,
    pub(crate) json: Arc<dyn JsonCodec>,
}

impl RouterConfig {
    /// Creates a configuration builder.
    #[must_use]
    pub fn builder() -> RouterConfigBuilder {
        RouterConfigBuilder::default()
    }

    /// The configured error handler, if any.
    #[must_use]
    pub fn error_handler(&self) -> Option<&ErrorHandler> {
        self.error_handler.as_ref()
    }

    /// The JSON codec.
    #[must_use]
    pub fn json_codec(&self) -> &Arc<dyn JsonCodec> {
        &self.json
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl fmt::Debug for RouterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterConfig")
            .field("error_handler", &self.error_handler.is_some())
            .finish_non_exhaustive()
    }
}

/// Builder for [`RouterConfig`].
#[derive(Default)]
pub struct RouterConfigBuilder {
    error_handler: Option<ErrorHandler>,
    json: Option<Arc<dyn JsonCodec>>,
}

impl RouterConfigBuilder {
    /// Sets the error handler.
    #[must_use]
    pub fn error_handler<F>(mut self, f: F) -> Self
    where
        F: Fn(Error, &mut dyn ResponseWriter, &Request) + Send + Sync + 'static,
    {
        self.error_handler = Some(Arc::new(f));
        self
    }

    /// Sets the JSON codec.
    #[must_use]
    pub fn json_codec(mut self, codec: impl JsonCodec) -> Self {
        self.json = Some(Arc::new(codec));
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> RouterConfig {
        RouterConfig {
            error_handler: self.error_handler,
            json: self.json.unwrap_or_else(|| Arc::new(CompactJson)),
        }
    }
}

/// Error loading a [`ServerConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The TOML document is malformed or has fields of the wrong type.
    #[error("invalid server configuration: {0}")]
    Toml(#[from] toml::de::Error),

    /// The bind address does not parse.
    #[error("invalid bind address `{addr}`: {source}")]
    Addr {
        /// The address as configured.
        addr: String,
        /// Parse failure.
        source: std::net::AddrParseError,
    },
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    http_addr: String,
    shutdown_timeout: Duration,
    body_timeout: Duration,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ServerConfigFile {
    http_addr: String,
    shutdown_timeout_secs: u64,
    body_timeout_secs: u64,
}

impl Default for ServerConfigFile {
    fn default() -> Self {
        Self {
            http_addr: DEFAULT_HTTP_ADDR.to_string(),
            shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            body_timeout_secs: DEFAULT_BODY_TIMEOUT_SECS,
        }
    }
}

impl ServerConfig {
    /// Creates a configuration builder.
    #[must_use]
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// Parses a TOML document. Missing fields take their defaults.
    pub fn from_toml_str(document: &str) -> Result<Self, ConfigError> {
        let file: ServerConfigFile = toml::from_str(document)?;
        let config = Self {
            http_addr: file.http_addr,
            shutdown_timeout: Duration::from_secs(file.shutdown_timeout_secs),
            body_timeout: Duration::from_secs(file.body_timeout_secs),
        };
        config.socket_addr()?;
        Ok(config)
    }

    /// The bind address as configured.
    #[must_use]
    pub fn http_addr(&self) -> &str {
        &self.http_addr
    }

    /// The bind address, parsed.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.http_addr.parse().map_err(|source| ConfigError::Addr {
            addr: self.http_addr.clone(),
            source,
        })
    }

    /// How long shutdown waits for in-flight connections.
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    /// How long the server waits for a request body.
    #[must_use]
    pub fn body_timeout(&self) -> Duration {
        self.body_timeout
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Builder for [`ServerConfig`].
#[derive(Debug, Clone)]
pub struct ServerConfigBuilder {
    http_addr: String,
    shutdown_timeout: Duration,
    body_timeout: Duration,
}

impl Default for ServerConfigBuilder {
    fn default() -> Self {
        Self {
            http_addr: DEFAULT_HTTP_ADDR.to_string(),
            shutdown_timeout: Duration::from_secs(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
            body_timeout: Duration::from_secs(DEFAULT_BODY_TIMEOUT_SECS),
        }
    }
}

impl ServerConfigBuilder {
    /// Sets the bind address, e.g. `127.0.0.1:3000`.
    #[must_use]
    pub fn http_addr(mut self, addr: impl Into<String>) -> Self {
        self.http_addr = addr.into();
        self
    }

    /// Sets the shutdown timeout.
    #[must_use]
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Sets the body read timeout.
    #[must_use]
    pub fn body_timeout(mut self, timeout: Duration) -> Self {
        self.body_timeout = timeout;
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> ServerConfig {
        ServerConfig {
            http_addr: self.http_addr,
            shutdown_timeout: self.shutdown_timeout,
            body_timeout: self.body_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_router_config_defaults() {
        let config = RouterConfig::default();
        assert!(config.error_handler().is_none());
        assert_eq!(
            config.json_codec().encode(&json!({"a": 1})).unwrap(),
            br#"{"a":1}"#
        );
    }

    #[test]
    fn test_pretty_codec() {
        let config = RouterConfig::builder().json_codec(PrettyJson).build();
        let bytes = config.json_codec().encode(&json!({"a": 1})).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "{\n  \"a\": 1\n}");
    }

    #[test]
    fn test_server_builder() {
        let config = ServerConfig::builder()
            .http_addr("127.0.0.1:0")
            .shutdown_timeout(Duration::from_secs(1))
            .build();
        assert_eq!(config.http_addr(), "127.0.0.1:0");
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(1));
        assert_eq!(
            config.body_timeout(),
            Duration::from_secs(DEFAULT_BODY_TIMEOUT_SECS)
        );
    }

    #[test]
    fn test_toml_defaults() {
        let config = ServerConfig::from_toml_str("").unwrap();
        assert_eq!(config, ServerConfig::default());
    }

    #[test]
    fn test_toml_overrides() {
        let config = ServerConfig::from_toml_str(
            r#"
            http_addr = "127.0.0.1:9000"
            body_timeout_secs = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.socket_addr().unwrap().port(), 9000);
        assert_eq!(config.body_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn test_toml_rejects_unknown_fields() {
        let err = ServerConfig::from_toml_str("listen = \"x\"").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }

    #[test]
    fn test_toml_rejects_bad_addr() {
        let err = ServerConfig::from_toml_str("http_addr = \"nope\"").unwrap_err();
        assert!(matches!(err, ConfigError::Addr { .. }));
    }
}
