use thiserror::Error;

use crate::protocol::ErrorKind;

/// Failures of a privileged request, on either side of the socket.
#[derive(Debug, Error)]
pub enum MechanismError {
    /// The caller is not allowed to perform the requested action.
    #[error("authorization denied: {0}")]
    AuthorizationDenied(String),

    /// The backing device or service is missing on this host.
    #[error("{0} is not available on this system")]
    Unavailable(String),

    /// A helper command exited unsuccessfully.
    #[error("command failed: {0}")]
    CommandFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed or unexpected message on the wire.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl MechanismError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MechanismError::AuthorizationDenied(_) => ErrorKind::AuthorizationDenied,
            MechanismError::Unavailable(_) => ErrorKind::Unavailable,
            MechanismError::CommandFailed(_) => ErrorKind::CommandFailed,
            MechanismError::Io(_) => ErrorKind::Io,
            MechanismError::Protocol(_) => ErrorKind::Protocol,
        }
    }

    /// Rebuilds an error received from the helper.
    pub fn from_remote(kind: ErrorKind, message: String) -> Self {
        match kind {
            ErrorKind::AuthorizationDenied => MechanismError::AuthorizationDenied(message),
            ErrorKind::Unavailable => MechanismError::Unavailable(message),
            ErrorKind::CommandFailed => MechanismError::CommandFailed(message),
            ErrorKind::Io => MechanismError::Io(std::io::Error::other(message)),
            ErrorKind::Protocol => MechanismError::Protocol(message),
        }
    }

    /// Message without the variant prefix, as carried on the wire.
    pub fn message(&self) -> String {
        match self {
            MechanismError::AuthorizationDenied(m)
            | MechanismError::Unavailable(m)
            | MechanismError::CommandFailed(m)
            | MechanismError::Protocol(m) => m.clone(),
            MechanismError::Io(e) => e.to_string(),
        }
    }
}

impl From<serde_json::Error> for MechanismError {
    fn from(err: serde_json::Error) -> Self {
        MechanismError::Protocol(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_errors_keep_their_kind() {
        let err = MechanismError::AuthorizationDenied("uid 1000 for org.blueman.rfkill.setstate".into());
        let rebuilt = MechanismError::from_remote(err.kind(), err.message());

        assert!(matches!(rebuilt, MechanismError::AuthorizationDenied(_)));
        assert_eq!(rebuilt.to_string(), err.to_string());
    }

    #[test]
    fn io_errors_round_trip_as_io() {
        let err = MechanismError::from_remote(ErrorKind::Io, "permission denied".into());
        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(err.message(), "permission denied");
    }
}
