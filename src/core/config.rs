//! Configuration management for the gateway.
//!
//! Configuration is read from environment variables once, in the binary, and the
//! resulting [`AppConfig`] is injected into everything else. Library code never
//! reads the process environment directly.

use anyhow::{anyhow, Result};

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Main application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Server configuration (host, port)
    pub server: ServerConfig,

    /// Upstream LLM provider settings
    pub upstream: UpstreamConfig,

    /// Whether to verify SSL certificates for upstream requests
    pub verify_ssl: bool,

    /// Request timeout in seconds for the upstream provider
    pub request_timeout_secs: u64,

    /// Default log filter when `RUST_LOG` is not set
    pub log_level: String,

    /// Optional Nacos service registry
    pub registry: Option<RegistryConfig>,
}

/// Upstream provider credential, endpoint, and default model.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// API key sent as a bearer token
    pub api_key: String,

    /// Base URL, `/chat/completions` is appended
    pub api_base: String,

    /// Model used when a request does not name one
    pub default_model: String,
}

/// Server-specific configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to bind to
    pub port: u16,
}

/// Nacos naming-service registration settings.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// `host:port` of the Nacos server
    pub server_address: String,
    pub namespace: String,
    pub service_name: String,
    pub group_name: String,
    /// IP advertised for this instance
    pub local_ip: String,
    pub heartbeat_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_verify_ssl() -> bool {
    true
}

fn default_request_timeout() -> u64 {
    300
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_group_name() -> String {
    "DEFAULT_GROUP".to_string()
}

fn default_heartbeat_secs() -> u64 {
    10
}

impl AppConfig {
    /// Build configuration from the process environment.
    ///
    /// A `.env` file is expected to have been loaded by the caller.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    ///
    /// Empty values are treated as unset.
    ///
    /// # Examples
    ///
    /// ```
    /// use eyecare_gateway::core::config::AppConfig;
    ///
    /// let config = AppConfig::from_lookup(|key| match key {
    ///     "API_KEY" => Some("sk-test".to_string()),
    ///     _ => None,
    /// })
    /// .unwrap();
    /// assert_eq!(config.upstream.default_model, "gpt-3.5-turbo");
    /// ```
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let api_key = get("API_KEY")
            .ok_or_else(|| anyhow!("API_KEY must be set in .env file or environment variables"))?;

        let upstream = UpstreamConfig {
            api_key,
            api_base: get("BASE_URL")
                .map(|base| base.trim_end_matches('/').to_string())
                .unwrap_or_else(default_api_base),
            default_model: get("MODEL_ID").unwrap_or_else(default_model),
        };

        let mut server = ServerConfig::default();
        if let Some(host) = get("HOST") {
            server.host = host;
        }
        if let Some(port_str) = get("PORT") {
            server.port = port_str
                .parse::<u16>()
                .map_err(|_| anyhow!("PORT must be a valid port number, got {}", port_str))?;
        }

        let verify_ssl = get("VERIFY_SSL")
            .map(|v| str_to_bool(&v))
            .unwrap_or_else(default_verify_ssl);

        let request_timeout_secs = match get("REQUEST_TIMEOUT_SECS") {
            Some(value) => value
                .parse::<u64>()
                .map_err(|_| anyhow!("REQUEST_TIMEOUT_SECS must be an integer, got {}", value))?,
            None => default_request_timeout(),
        };

        let registry = match get("NACOS_SERVER_ADDRESS") {
            Some(server_address) => Some(RegistryConfig {
                server_address,
                namespace: get("NACOS_NAMESPACE").unwrap_or_default(),
                service_name: get("NACOS_SERVICE_NAME")
                    .unwrap_or_else(|| "eyecare-gateway".to_string()),
                group_name: get("NACOS_GROUP_NAME").unwrap_or_else(default_group_name),
                local_ip: get("LOCAL_IP").unwrap_or_else(|| "127.0.0.1".to_string()),
                heartbeat_secs: get("NACOS_HEARTBEAT_SECS")
                    .and_then(|v| v.parse::<u64>().ok())
                    .filter(|secs| *secs > 0)
                    .unwrap_or_else(default_heartbeat_secs),
            }),
            None => None,
        };

        Ok(Self {
            server,
            upstream,
            verify_ssl,
            request_timeout_secs,
            log_level: get("LOG_LEVEL")
                .map(|level| level.to_lowercase())
                .unwrap_or_else(default_log_level),
            registry,
        })
    }
}

/// Convert string to boolean.
///
/// Accepts: "true", "1", "yes", "on" (case-insensitive)
pub fn str_to_bool(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}
