//! Error types for the hydro_core library.

use crate::decoder::MalformedPayload;
use crate::types::ConnectionState;
use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for hydro_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Device link failure
    #[error(transparent)]
    Link(#[from] LinkError),

    /// Notification payload could not be decoded
    #[error(transparent)]
    Decode(#[from] MalformedPayload),

    /// The other intake source is active
    #[error("{0}")]
    SourceBusy(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Failures of the device link.
///
/// The `Display` text doubles as the status line shown to the user, so keep
/// it short.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LinkError {
    /// Host has no usable Bluetooth LE stack
    #[error("Bluetooth LE not supported on this host. Use a machine with a Bluetooth adapter.")]
    UnsupportedTransport,

    /// The device chooser was dismissed
    #[error("Device selection cancelled")]
    UserCancelled,

    /// Peer does not expose the hydration service
    #[error("Bottle does not expose the hydration service")]
    ServiceNotFound,

    /// Peer exposes the service but not the intake characteristic
    #[error("Bottle does not expose the intake characteristic")]
    CharacteristicNotFound,

    /// An asynchronous step did not complete in time
    #[error("Timed out during {0}")]
    TimedOut(&'static str),

    /// `connect()` was called while the link was not idle
    #[error("Link busy ({0})")]
    Busy(ConnectionState),

    /// An in-flight connect was abandoned by the caller
    #[error("Connection attempt aborted")]
    Aborted,

    /// Any other failure reported by the transport
    #[error("Bluetooth error: {0}")]
    Transport(String),
}
