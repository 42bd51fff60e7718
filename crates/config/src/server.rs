//! HTTP server configuration settings.

use std::{net::SocketAddr, path::PathBuf, time::Duration};

use duration_str::deserialize_duration;
use serde::Deserialize;

/// HTTP server configuration settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// The socket address the server should listen on.
    pub listen_address: Option<SocketAddr>,
    /// TLS configuration for secure connections.
    pub tls: Option<TlsServerConfig>,
    /// Development mode: relaxed startup checks and error details in responses.
    pub development: bool,
    /// Maximum accepted request body size in bytes.
    pub body_limit: usize,
    /// CORS configuration.
    pub cors: CorsConfig,
    /// Per-IP rate limiting.
    pub rate_limits: IpRateLimitsConfig,
    /// Client IP extraction for IP-based rate limiting.
    pub client_ip: ClientIpConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: None,
            tls: None,
            development: false,
            body_limit: 10 * 1024 * 1024,
            cors: CorsConfig::default(),
            rate_limits: IpRateLimitsConfig::default(),
            client_ip: ClientIpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TlsServerConfig {
    pub certificate: PathBuf,
    pub key: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    /// Exact origins allowed to call the API with credentials.
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["http://localhost:3000".to_string()],
        }
    }
}

/// A request budget over a fixed interval.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IpRateLimit {
    pub limit: u32,
    #[serde(deserialize_with = "deserialize_duration")]
    pub interval: Duration,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IpRateLimitsConfig {
    pub enabled: bool,
    /// Applies to every `/api` route.
    pub global: IpRateLimit,
    /// Applies to `/api/auth` routes, on top of the global limit.
    pub auth: IpRateLimit,
    /// Applies to `/api/ai` routes, on top of the global limit.
    pub ai: IpRateLimit,
}

impl Default for IpRateLimitsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            global: IpRateLimit {
                limit: 100,
                interval: Duration::from_secs(15 * 60),
            },
            auth: IpRateLimit {
                limit: 5,
                interval: Duration::from_secs(15 * 60),
            },
            ai: IpRateLimit {
                limit: 10,
                interval: Duration::from_secs(60),
            },
        }
    }
}

/// Configuration for extracting client IP from headers.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct ClientIpConfig {
    /// Whether the X-Real-IP header should be used.
    pub x_real_ip: bool,
    /// How many trusted hops to skip when using the X-Forwarded-For header.
    /// If None, X-Forwarded-For is not used.
    pub x_forwarded_for_trusted_hops: Option<usize>,
}
