//! Error types shared across the crate.

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failure categories surfaced to the user. Every device-facing operation
/// maps its failures onto exactly one of these.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No stored credentials and none supplied on the command line.
    #[error("missing credentials: {0}")]
    ConfigMissing(String),

    /// The device is unreachable or the BLE link could not be established.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The device refused the token handshake.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// A user-supplied value is out of range or malformed. Raised before
    /// anything is written to the device.
    #[error("{0}")]
    Validation(String),

    /// The device sent a malformed or unexpected response, or none at all.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
