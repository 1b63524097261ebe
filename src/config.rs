//! Application configuration loaded from environment variables.

use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::error::GatewayError;
use crate::student::backend::Credentials;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // === Server ===
    /// Interface the HTTP server binds to.
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Per-request timeout for inbound requests, in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_s: u64,

    /// Time allowed for in-flight requests to drain on shutdown, in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_s: u64,

    /// Maximum accepted request body size.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    // === Student Backend ===
    /// Base URL of the student backend.
    #[serde(default = "default_backend_url")]
    pub backend_url: String,

    /// Service account used to log in to the backend.
    #[serde(default)]
    pub backend_username: Option<String>,

    /// Password of the service account.
    #[serde(default)]
    pub backend_password: Option<String>,

    /// Timeout for calls to the backend, in milliseconds.
    #[serde(default = "default_http_timeout")]
    pub http_timeout_ms: u64,

    // === Observability ===
    /// Expose Prometheus metrics at `/metrics`.
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,

    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub rust_log: String,

    /// Log output format: `text` or `json`.
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Enable verbose logging.
    #[serde(default)]
    pub verbose: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    20
}

fn default_shutdown_timeout() -> u64 {
    20
}

fn default_max_body_bytes() -> usize {
    1 << 20 // 1 MiB
}

fn default_backend_url() -> String {
    "http://localhost:5007".to_string()
}

fn default_http_timeout() -> u64 {
    10_000
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_s: default_request_timeout(),
            shutdown_timeout_s: default_shutdown_timeout(),
            max_body_bytes: default_max_body_bytes(),
            backend_url: default_backend_url(),
            backend_username: None,
            backend_password: None,
            http_timeout_ms: default_http_timeout(),
            metrics_enabled: default_true(),
            rust_log: default_log_level(),
            log_format: default_log_format(),
            verbose: false,
        }
    }
}

impl Config {
    /// Load configuration from environment, reading .env file first.
    pub fn load() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Check if the configuration is valid.
    pub fn validate(&self) -> Result<(), String> {
        if self.port == 0 {
            return Err("PORT must be non-zero".to_string());
        }

        self.backend_base_url().map_err(|e| e.to_string())?;

        match (&self.backend_username, &self.backend_password) {
            (Some(_), None) | (None, Some(_)) => {
                return Err(
                    "BACKEND_USERNAME and BACKEND_PASSWORD must be set together".to_string(),
                );
            }
            _ => {}
        }

        if self.http_timeout_ms == 0 {
            return Err("HTTP_TIMEOUT_MS must be greater than 0".to_string());
        }

        if self.request_timeout_s == 0 {
            return Err("REQUEST_TIMEOUT_S must be greater than 0".to_string());
        }

        if self.max_body_bytes == 0 {
            return Err("MAX_BODY_BYTES must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Parsed backend base URL. Only absolute http(s) URLs are accepted.
    pub fn backend_base_url(&self) -> Result<Url, GatewayError> {
        let url = Url::parse(&self.backend_url).map_err(|e| {
            GatewayError::InvalidConfig(format!("BACKEND_URL {:?}: {}", self.backend_url, e))
        })?;

        if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
            return Err(GatewayError::InvalidConfig(format!(
                "BACKEND_URL must be an http(s) URL, got {:?}",
                self.backend_url
            )));
        }

        Ok(url)
    }

    /// Service account credentials, when both halves are configured.
    pub fn backend_credentials(&self) -> Option<Credentials> {
        match (&self.backend_username, &self.backend_password) {
            (Some(username), Some(password)) => Some(Credentials {
                username: username.clone(),
                password: password.clone(),
            }),
            _ => None,
        }
    }

    /// Address the HTTP server binds to.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_s)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_s)
    }

    /// Whether JSON log output was requested.
    pub fn json_logs(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }
}
