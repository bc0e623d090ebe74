//! Error types for the TraCI client.

use vegha_core::AdapterError;

/// Errors from the TraCI client and the SUMO launcher.
#[derive(Debug, thiserror::Error)]
pub enum TraciError {
    /// Socket or process I/O failed. The session is unusable.
    #[error("traci i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The server sent bytes that do not decode. The session is unusable.
    #[error("malformed traci message: {0}")]
    Malformed(String),

    /// A fully received reply held a value of the wrong shape. The
    /// session is still in sync and usable.
    #[error("undecodable traci value: {0}")]
    Decode(String),

    /// The server rejected one command. The session is still usable.
    #[error("command 0x{command:02x} failed: {description}")]
    Command {
        /// The rejected command identifier.
        command: u8,
        /// Server-provided description.
        description: String,
    },

    /// The simulator process could not be started or never accepted a
    /// connection.
    #[error("failed to launch simulator: {0}")]
    Launch(String),

    /// A query was issued after the session was closed.
    #[error("traci session is closed")]
    Closed,
}

impl TraciError {
    /// Whether the error leaves the session unusable.
    pub const fn is_fatal(&self) -> bool {
        !matches!(self, Self::Command { .. } | Self::Decode(_))
    }

    /// Reclassify a decode failure inside a complete reply as recoverable.
    pub(crate) fn into_value_error(self) -> Self {
        match self {
            Self::Malformed(message) => Self::Decode(message),
            other => other,
        }
    }

    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }
}

impl From<TraciError> for AdapterError {
    fn from(e: TraciError) -> Self {
        match e {
            TraciError::Launch(message) => Self::unavailable(message),
            other => Self::disconnected(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_and_value_errors_are_recoverable() {
        let rejected = TraciError::Command {
            command: 0xA4,
            description: "Vehicle 'veh0' is not known".to_owned(),
        };
        assert!(!rejected.is_fatal());
        assert!(TraciError::Closed.is_fatal());
        assert!(TraciError::malformed("short read").is_fatal());

        let bad_value = TraciError::malformed("expected type 0x0c, found 0x0b").into_value_error();
        assert!(matches!(bad_value, TraciError::Decode(_)));
        assert!(!bad_value.is_fatal());
        assert!(TraciError::Closed.into_value_error().is_fatal());
    }

    #[test]
    fn launch_failures_map_to_unavailable() {
        let error: AdapterError = TraciError::Launch("sumo not found".to_owned()).into();
        assert!(matches!(error, AdapterError::Unavailable { .. }));

        let error: AdapterError = TraciError::Closed.into();
        assert!(matches!(error, AdapterError::Disconnected { .. }));
    }
}
