//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the API service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Application identity.
    pub app: AppSection,

    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Server-level timeouts.
    pub timeouts: TimeoutConfig,

    /// Per-command circuit breaker settings.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Request hardening.
    pub security: SecurityConfig,
}

/// Application identity, reported on spans and logs.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppSection {
    pub name: String,

    /// Deployment environment (test, local, sandbox, production).
    pub environment: String,

    /// Enables verbose development logging.
    pub development: bool,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "resilient-api".to_string(),
            environment: "local".to_string(),
            development: false,
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Timeout configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Hard ceiling for a whole request in seconds, above the breaker timeout.
    pub request_secs: u64,

    /// Time allowed for in-flight requests to drain on shutdown.
    pub shutdown_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 30,
            shutdown_secs: 10,
        }
    }
}

/// Circuit breaker configuration, shared by every command.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Execution timeout for a guarded call in milliseconds.
    pub timeout_ms: u64,

    /// Time an open circuit waits before letting a probe through.
    pub sleep_window_ms: u64,

    /// Calls allowed to run concurrently per command.
    pub max_concurrent_requests: u32,

    /// Error percentage (1-100) in the rolling window that opens the circuit.
    pub error_percent_threshold: u32,

    /// Minimum requests in the rolling window before the percentage applies.
    pub request_volume_threshold: u32,

    /// Length of the rolling statistics window in milliseconds.
    pub rolling_window_ms: u64,

    /// Number of buckets the rolling window is split into.
    pub rolling_buckets: u32,
}

impl CircuitBreakerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn sleep_window(&self) -> Duration {
        Duration::from_millis(self.sleep_window_ms)
    }

    pub fn rolling_window(&self) -> Duration {
        Duration::from_millis(self.rolling_window_ms)
    }

    /// How long a recorded failure trace stays linkable: one open/half-open
    /// cycle plus a one second margin.
    pub fn trace_link_ttl(&self) -> Duration {
        self.sleep_window() + Duration::from_secs(1)
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 1_000,
            sleep_window_ms: 5_000,
            max_concurrent_requests: 100,
            error_percent_threshold: 50,
            request_volume_threshold: 20,
            rolling_window_ms: 10_000,
            rolling_buckets: 10,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,

    /// Install an OpenTelemetry tracer provider.
    pub tracing_enabled: bool,

    /// `service.name` resource attribute.
    pub service_name: String,

    /// Fraction of root traces sampled (0.0 - 1.0).
    pub sampling_ratio: f64,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Json,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
            tracing_enabled: true,
            service_name: "resilient-api".to_string(),
            sampling_ratio: 1.0,
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum body size in bytes.
    pub max_body_size: usize,

    /// Bearer token required on mutating routes. Unset disables the check.
    pub api_key: Option<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 2 * 1024 * 1024, // 2MB
            api_key: None,
        }
    }
}
