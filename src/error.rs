//! Error types and recovery classification
//!
//! Nothing in the core is fatal. Every failure belongs to a [`FailureClass`]
//! whose [`Recovery`] is fixed: reconnect, discard, skip, fall back, or
//! degrade.

use thiserror::Error;

/// How a failure is recovered from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Schedule a reconnect after the fixed delay
    Reconnect,
    /// Drop the offending message, keep the connection
    Discard,
    /// Ignore the offending entity
    Skip,
    /// Use the synthetic graph instead
    Fallback,
    /// Keep running with reduced fidelity
    Degrade,
}

/// Failure taxonomy of the synchronization core
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Connection refused, socket closed, unparsable frame
    Transport,
    /// An edge or message refers to an unknown node
    MissingReference,
    /// Graph source query failed or timed out
    DataSource,
    /// A startup collaborator could not be initialized
    Initialization,
}

impl FailureClass {
    /// Default recovery for the class
    pub fn recovery(self) -> Recovery {
        match self {
            FailureClass::Transport => Recovery::Reconnect,
            FailureClass::MissingReference => Recovery::Skip,
            FailureClass::DataSource => Recovery::Fallback,
            FailureClass::Initialization => Recovery::Degrade,
        }
    }
}

/// Errors decoding an inbound live message
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Not valid JSON, or JSON of the wrong shape
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Valid JSON with a `type` this client does not understand
    #[error("unknown message type: {0}")]
    UnknownType(String),
}

impl ProtocolError {
    pub fn class(&self) -> FailureClass {
        FailureClass::Transport
    }

    /// Protocol errors never touch the connection: the message is discarded
    pub fn recovery(&self) -> Recovery {
        Recovery::Discard
    }
}

/// Errors from the live transport
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("connection closed: {0}")]
    Closed(String),
}

impl TransportError {
    pub fn class(&self) -> FailureClass {
        FailureClass::Transport
    }

    pub fn recovery(&self) -> Recovery {
        self.class().recovery()
    }
}

/// Errors from the graph data source and event sink
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("source returned no {0}")]
    Empty(&'static str),

    #[error("no source configured")]
    Unconfigured,
}

impl SourceError {
    pub fn class(&self) -> FailureClass {
        FailureClass::DataSource
    }

    pub fn recovery(&self) -> Recovery {
        self.class().recovery()
    }
}

/// Result type for source and sink operations
pub type SourceResult<T> = Result<T, SourceError>;

/// Errors loading or validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;
