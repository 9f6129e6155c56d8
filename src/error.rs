//! Error types for Stacksmith.
//!
//! This module defines the error types used throughout Stacksmith. Every error
//! raised while composing stacks is fatal: composition either produces a complete
//! resource graph or nothing at all.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Stacksmith operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for Stacksmith.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Instance Type Errors
    // ========================================================================
    /// The class token (family + generation) is not in the instance class table.
    #[error("Unknown instance class '{0}'")]
    UnknownInstanceClass(String),

    /// The size token is not in the instance size table.
    #[error("Unknown instance size '{0}'")]
    UnknownInstanceSize(String),

    // ========================================================================
    // Declaration Errors
    // ========================================================================
    /// A port specification could not be parsed into a closed range.
    #[error("Invalid port range '{spec}': {message}")]
    InvalidPortRange {
        /// The port specification as written
        spec: String,
        /// Error message
        message: String,
    },

    /// A CIDR block is malformed or cannot hold the requested subnets.
    #[error("Invalid CIDR '{cidr}': {message}")]
    InvalidCidr {
        /// The CIDR block as written
        cidr: String,
        /// Error message
        message: String,
    },

    /// A stack or resource name does not satisfy the naming rules.
    #[error("Invalid name '{0}'")]
    InvalidName(String),

    // ========================================================================
    // Composition Errors
    // ========================================================================
    /// A cross-stack import has no matching export.
    #[error("Stack '{stack}' imports '{export}' but no composed stack exports it")]
    UnresolvedReference {
        /// The importing stack
        stack: String,
        /// The export name that could not be found
        export: String,
    },

    /// Two stacks exported the same name.
    #[error("Export '{export}' is declared by both '{first}' and '{second}'")]
    DuplicateExport {
        /// The export name
        export: String,
        /// The stack that registered the export first
        first: String,
        /// The stack that tried to register it again
        second: String,
    },

    /// A stack appears more than once in a composition plan.
    #[error("Stack '{0}' appears more than once in the composition plan")]
    DuplicateStack(String),

    /// The stack dependency graph contains a cycle.
    #[error("Stack dependency cycle: {0}")]
    DependencyCycle(String),

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid configuration value.
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidConfig {
        /// Configuration key
        key: String,
        /// Error message
        message: String,
    },

    /// A required configuration field is missing.
    #[error("Missing required configuration field '{0}'")]
    MissingField(String),

    /// File not found.
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    // ========================================================================
    // IO and Serialization Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error.
    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    /// JSON parsing error.
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Keypair provisioning failed.
    #[error(transparent)]
    KeyPair(#[from] crate::keypair::KeyPairError),
}

impl Error {
    /// Creates a new unresolved reference error.
    pub fn unresolved(stack: impl Into<String>, export: impl Into<String>) -> Self {
        Self::UnresolvedReference {
            stack: stack.into(),
            export: export.into(),
        }
    }

    /// Creates a new invalid port range error.
    pub fn invalid_port(spec: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidPortRange {
            spec: spec.into(),
            message: message.into(),
        }
    }

    /// Creates a new invalid CIDR error.
    pub fn invalid_cidr(cidr: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidCidr {
            cidr: cidr.into(),
            message: message.into(),
        }
    }

    /// Creates a new invalid configuration error.
    pub fn invalid_config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Returns true if this error comes from a declaration that references
    /// something that does not exist (as opposed to malformed input).
    pub fn is_reference_error(&self) -> bool {
        matches!(
            self,
            Error::UnresolvedReference { .. } | Error::DuplicateExport { .. }
        )
    }
}
