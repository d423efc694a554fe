//! Error types for the data-access facade.
//!
//! This module defines all error types using `thiserror`. `FacadeError` is what
//! callers see; `DriverError` is the opaque failure a driver capability reports
//! and is carried as the cause of connection and execution failures.

use std::error::Error as StdError;
use thiserror::Error;

type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Failure reported by a driver implementation.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct DriverError {
    message: String,
    /// Vendor error code, e.g. "42P01" for an undefined table
    code: Option<String>,
    #[source]
    source: Option<BoxError>,
}

impl DriverError {
    /// Create a driver error from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            source: None,
        }
    }

    /// Attach a vendor error code.
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Attach the underlying error that caused this failure.
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }
}

#[derive(Error, Debug)]
pub enum FacadeError {
    #[error("Provider not registered: {name}")]
    UnknownProvider { name: String },

    #[error("Provider already registered: {name}")]
    DuplicateProvider { name: String },

    #[error("Invalid provider '{name}': {reason}")]
    InvalidProvider { name: String, reason: String },

    #[error("Cannot resolve driver for provider '{provider}'")]
    DriverResolution {
        provider: String,
        #[source]
        source: Box<FacadeError>,
    },

    #[error("Connection failed: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<DriverError>,
    },

    #[error("Execution failed for '{command}': {source}")]
    Execution {
        command: String,
        #[source]
        source: Box<FacadeError>,
    },

    #[error("Parameter '{parameter}' cannot be mapped: {message}")]
    ParameterMapping { parameter: String, message: String },

    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("Command has been released and can no longer be executed")]
    CommandReleased,

    #[error("Invalid connection settings: {message}")]
    InvalidSettings { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl FacadeError {
    /// Create an unknown provider error.
    pub fn unknown_provider(name: impl Into<String>) -> Self {
        Self::UnknownProvider { name: name.into() }
    }

    /// Create a duplicate provider error.
    pub fn duplicate_provider(name: impl Into<String>) -> Self {
        Self::DuplicateProvider { name: name.into() }
    }

    /// Create an invalid provider error.
    pub fn invalid_provider(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidProvider {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Wrap a registry failure encountered while a manager resolves its driver.
    pub fn driver_resolution(provider: impl Into<String>, source: FacadeError) -> Self {
        Self::DriverResolution {
            provider: provider.into(),
            source: Box::new(source),
        }
    }

    /// Create a connection error caused by a driver failure.
    pub fn connection(message: impl Into<String>, source: DriverError) -> Self {
        Self::Connection {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Wrap a failure raised while executing a command.
    pub fn execution(command: impl Into<String>, source: FacadeError) -> Self {
        Self::Execution {
            command: command.into(),
            source: Box::new(source),
        }
    }

    /// Create a parameter mapping error.
    pub fn parameter_mapping(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ParameterMapping {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Create an invalid settings error.
    pub fn invalid_settings(message: impl Into<String>) -> Self {
        Self::InvalidSettings {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// The driver failure at the bottom of this error, if there is one.
    pub fn driver_error(&self) -> Option<&DriverError> {
        match self {
            Self::Driver(err) => Some(err),
            Self::Connection { source, .. } => source.as_ref(),
            Self::Execution { source, .. } | Self::DriverResolution { source, .. } => {
                source.driver_error()
            }
            _ => None,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection { .. } => true,
            Self::Execution { source, .. } => source.is_retryable(),
            _ => false,
        }
    }
}

/// Result type alias for facade operations.
pub type FacadeResult<T> = Result<T, FacadeError>;
