//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, percentages in range, ratios)
//! - Check that addresses parse before anything tries to bind them
//! - The request timeout must outlast the breaker timeout, so a slow
//!   command is cut by its breaker and answered with an envelope
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::AppConfig;
use crate::resilience::circuit_breaker::BreakerConfigError;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address {value:?}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{field}: must be greater than zero")]
    Zero { field: &'static str },

    #[error("{field}: {value} is outside {min}..={max}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error(
        "timeouts.request_secs ({request_ms}ms) must exceed circuit_breaker.timeout_ms ({breaker_ms}ms)"
    )]
    TimeoutOrder { request_ms: u64, breaker_ms: u64 },

    #[error("circuit_breaker: {0}")]
    Breaker(#[from] BreakerConfigError),
}

/// Validate the entire configuration.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    let request_ms = config.timeouts.request_secs.saturating_mul(1_000);
    let breaker_ms = config.circuit_breaker.timeout_ms;
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::Zero {
            field: "timeouts.request_secs",
        });
    } else if breaker_ms > 0 && request_ms <= breaker_ms {
        errors.push(ValidationError::TimeoutOrder {
            request_ms,
            breaker_ms,
        });
    }
    if config.security.max_body_size == 0 {
        errors.push(ValidationError::Zero {
            field: "security.max_body_size",
        });
    }

    let ratio = config.observability.sampling_ratio;
    if !(0.0..=1.0).contains(&ratio) {
        errors.push(ValidationError::OutOfRange {
            field: "observability.sampling_ratio",
            value: ratio,
            min: 0.0,
            max: 1.0,
        });
    }

    errors.extend(
        config
            .circuit_breaker
            .problems()
            .into_iter()
            .map(ValidationError::from),
    );

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_owned(),
        });
    }
}
