//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges and listener addresses
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Filesystem checks (mock root, route file) belong to the loader

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ServerConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address {value:?}")]
    Address { field: &'static str, value: String },

    #[error("{field}: must be greater than zero")]
    Zero { field: &'static str },

    #[error("fixtures.extension: must be non-empty and contain no '/' or leading '.'")]
    Extension,

    #[error("default_variables: invalid key {0:?}")]
    VariableKey(String),
}

pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let addresses = [
        ("icap.bind_address", &config.icap.bind_address),
        ("api.bind_address", &config.api.bind_address),
    ];
    for (field, value) in addresses {
        if value.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::Address {
                field,
                value: value.clone(),
            });
        }
    }

    if let Some(value) = &config.observability.metrics_address {
        if value.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::Address {
                field: "observability.metrics_address",
                value: value.clone(),
            });
        }
    }

    if config.icap.max_connections == 0 {
        errors.push(ValidationError::Zero {
            field: "icap.max_connections",
        });
    }
    if config.git.transfer_timeout_secs == 0 {
        errors.push(ValidationError::Zero {
            field: "git.transfer_timeout_secs",
        });
    }

    let ext = &config.fixtures.extension;
    if ext.is_empty() || ext.contains('/') || ext.starts_with('.') {
        errors.push(ValidationError::Extension);
    }

    for variable in &config.default_variables {
        let valid = !variable.key.is_empty()
            && variable
                .key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            errors.push(ValidationError::VariableKey(variable.key.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
