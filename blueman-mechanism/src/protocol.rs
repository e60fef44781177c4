/*!
 * Mechanism Wire Protocol
 * One JSON object per line, one response per request
 */

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::MechanismError;

/// Action identifier checked before touching the rfkill device.
pub const ACTION_RFKILL_SET_STATE: &str = "org.blueman.rfkill.setstate";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    Ping { id: Uuid },
    SetRfkillState { id: Uuid, state: bool },
}

impl Request {
    pub fn ping() -> Self {
        Request::Ping { id: Uuid::new_v4() }
    }

    pub fn set_rfkill_state(state: bool) -> Self {
        Request::SetRfkillState {
            id: Uuid::new_v4(),
            state,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Request::Ping { id } | Request::SetRfkillState { id, .. } => *id,
        }
    }

    /// The authorization action guarding this request, if any.
    pub fn action_id(&self) -> Option<&'static str> {
        match self {
            Request::Ping { .. } => None,
            Request::SetRfkillState { .. } => Some(ACTION_RFKILL_SET_STATE),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    AuthorizationDenied,
    Unavailable,
    CommandFailed,
    Io,
    Protocol,
}

/// Exactly one of the two continuations of a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    Success { id: Uuid, message: String },
    Error { id: Uuid, kind: ErrorKind, message: String },
}

impl Response {
    pub fn success(id: Uuid, message: impl Into<String>) -> Self {
        Response::Success {
            id,
            message: message.into(),
        }
    }

    pub fn error(id: Uuid, err: &MechanismError) -> Self {
        Response::Error {
            id,
            kind: err.kind(),
            message: err.message(),
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Response::Success { id, .. } | Response::Error { id, .. } => *id,
        }
    }

    pub fn into_result(self) -> Result<String, MechanismError> {
        match self {
            Response::Success { message, .. } => Ok(message),
            Response::Error { kind, message, .. } => Err(MechanismError::from_remote(kind, message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_are_tagged_by_type() {
        let request = Request::set_rfkill_state(true);
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["type"], "SetRfkillState");
        assert_eq!(json["state"], true);
        assert_eq!(json["id"], request.id().to_string());
    }

    #[test]
    fn only_rfkill_requires_authorization() {
        assert_eq!(Request::ping().action_id(), None);
        assert_eq!(
            Request::set_rfkill_state(false).action_id(),
            Some(ACTION_RFKILL_SET_STATE)
        );
    }

    #[test]
    fn error_response_becomes_typed_error() {
        let id = Uuid::new_v4();
        let line = format!(
            r#"{{"type":"Error","id":"{id}","kind":"authorization_denied","message":"uid 1000"}}"#
        );
        let response: Response = serde_json::from_str(&line).unwrap();

        assert_eq!(response.id(), id);
        let err = response.into_result().unwrap_err();
        assert!(matches!(err, MechanismError::AuthorizationDenied(ref m) if m == "uid 1000"));
    }
}
