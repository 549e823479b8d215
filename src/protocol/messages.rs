//! Protocol message definitions
//!
//! Every call is one request envelope answered by one response envelope.
//! Requests are discriminated by `op`, responses by `status`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, ErrorKind};
use crate::script::Value;
use crate::system::{WorkerIdentity, WorkerInfo};

// ─────────────────────────────────────────────────────────────────
// Request
// ─────────────────────────────────────────────────────────────────

/// Wrapper for every request with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEnvelope {
    /// Unique request ID, echoed in the response
    pub id: Uuid,

    /// When the client sent the request
    pub sent_at: DateTime<Utc>,

    #[serde(flatten)]
    pub request: Request,
}

impl RequestEnvelope {
    pub fn new(request: Request) -> Self {
        Self {
            id: Uuid::new_v4(),
            sent_at: Utc::now(),
            request,
        }
    }
}

/// Whether an operation needs the worker lock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Exclusive,
    Shared,
}

/// Operations a worker answers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Request {
    Get {
        name: String,
    },
    GetMany {
        names: Vec<String>,
    },
    Set {
        name: String,
        value: Value,
    },
    SetMany {
        bindings: BTreeMap<String, Value>,
    },
    List,
    Clear,
    /// Bind `bindings`, then run `code`
    Execute {
        code: String,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        bindings: BTreeMap<String, Value>,
    },
    /// Bind `bindings`, then run `code` and return its final expression
    Evaluate {
        code: String,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        bindings: BTreeMap<String, Value>,
    },
    VolatileExecute {
        code: String,
        #[serde(default)]
        bindings: BTreeMap<String, Value>,
        #[serde(default)]
        outputs: Vec<String>,
    },
    Install {
        name: String,
        source: String,
    },
    Import {
        name: String,
    },
    IsModuleReference {
        name: String,
    },
    Ping,
    IsBusy,
    /// Wait for the lock to be free; `None` waits indefinitely
    Wait {
        timeout_ms: Option<u64>,
    },
    GetIdentity,
    Info,
}

impl Request {
    /// Wire name of the operation
    pub fn name(&self) -> &'static str {
        match self {
            Request::Get { .. } => "GET",
            Request::GetMany { .. } => "GET_MANY",
            Request::Set { .. } => "SET",
            Request::SetMany { .. } => "SET_MANY",
            Request::List => "LIST",
            Request::Clear => "CLEAR",
            Request::Execute { .. } => "EXECUTE",
            Request::Evaluate { .. } => "EVALUATE",
            Request::VolatileExecute { .. } => "VOLATILE_EXECUTE",
            Request::Install { .. } => "INSTALL",
            Request::Import { .. } => "IMPORT",
            Request::IsModuleReference { .. } => "IS_MODULE_REFERENCE",
            Request::Ping => "PING",
            Request::IsBusy => "IS_BUSY",
            Request::Wait { .. } => "WAIT",
            Request::GetIdentity => "GET_IDENTITY",
            Request::Info => "INFO",
        }
    }

    /// Lock requirement of the operation
    pub fn access(&self) -> Access {
        match self {
            Request::VolatileExecute { .. }
            | Request::Ping
            | Request::IsBusy
            | Request::Wait { .. }
            | Request::GetIdentity
            | Request::Info => Access::Shared,
            _ => Access::Exclusive,
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Response
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// ID of the request being answered
    pub id: Uuid,

    #[serde(flatten)]
    pub response: Response,
}

impl ResponseEnvelope {
    pub fn ok(id: Uuid, payload: Payload) -> Self {
        Self {
            id,
            response: Response::Ok { payload },
        }
    }

    pub fn error(id: Uuid, error: &Error) -> Self {
        Self {
            id,
            response: Response::Error {
                error: RemoteError::from(error),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Response {
    Ok { payload: Payload },
    Error { error: RemoteError },
}

/// Result data of a successful call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Payload {
    Unit,
    Value(Value),
    Names(Vec<String>),
    Bindings(BTreeMap<String, Value>),
    Flag(bool),
    Text(String),
    Identity(WorkerIdentity),
    Info(WorkerInfo),
}

impl Payload {
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Unit => "unit",
            Payload::Value(_) => "value",
            Payload::Names(_) => "names",
            Payload::Bindings(_) => "bindings",
            Payload::Flag(_) => "flag",
            Payload::Text(_) => "text",
            Payload::Identity(_) => "identity",
            Payload::Info(_) => "info",
        }
    }
}

/// Error as transmitted by a worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteError {
    pub kind: ErrorKind,
    pub message: String,
}

impl RemoteError {
    /// Re-raise on the client with the same kind
    pub fn into_error(self, endpoint: &str) -> Error {
        Error::from_remote(self.kind, self.message, endpoint)
    }
}

impl From<&Error> for RemoteError {
    fn from(err: &Error) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_shape() {
        let env = RequestEnvelope::new(Request::Set {
            name: "x".into(),
            value: Value::Int(3),
        });
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["op"], "SET");
        assert_eq!(json["name"], "x");
        assert_eq!(json["value"], 3);
        assert!(json["id"].is_string());

        let back: RequestEnvelope = serde_json::from_value(json).unwrap();
        assert_eq!(back.request, env.request);
    }

    #[test]
    fn test_unit_requests_and_defaults() {
        let list: RequestEnvelope = serde_json::from_str(&format!(
            r#"{{"id":"{}","sent_at":"2024-01-01T00:00:00Z","op":"LIST"}}"#,
            Uuid::new_v4()
        ))
        .unwrap();
        assert_eq!(list.request, Request::List);

        let exec: Request = serde_json::from_str(r#"{"op":"EXECUTE","code":"x = 1"}"#).unwrap();
        assert_eq!(
            exec,
            Request::Execute {
                code: "x = 1".into(),
                bindings: BTreeMap::new()
            }
        );
    }

    #[test]
    fn test_access_classes() {
        assert_eq!(Request::List.access(), Access::Exclusive);
        assert_eq!(Request::Get { name: "a".into() }.access(), Access::Exclusive);
        assert_eq!(Request::Ping.access(), Access::Shared);
        assert_eq!(Request::Wait { timeout_ms: None }.access(), Access::Shared);
        assert_eq!(
            Request::VolatileExecute {
                code: String::new(),
                bindings: BTreeMap::new(),
                outputs: vec![]
            }
            .access(),
            Access::Shared
        );
    }

    #[test]
    fn test_response_shapes() {
        let id = Uuid::new_v4();
        let ok = ResponseEnvelope::ok(id, Payload::Value(Value::Float(2.5)));
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["status"], "OK");
        assert_eq!(json["payload"]["kind"], "value");
        assert_eq!(json["payload"]["data"], 2.5);

        let err = ResponseEnvelope::error(id, &Error::name_not_found("y"));
        let text = serde_json::to_string(&err).unwrap();
        assert!(text.contains("\"status\":\"ERROR\""));
        assert!(text.contains("NAME_NOT_FOUND"));

        let back: ResponseEnvelope = serde_json::from_str(&text).unwrap();
        match back.response {
            Response::Error { error } => {
                let local = error.into_error("nsw://h:1/w");
                assert!(matches!(local, Error::NameNotFound { ref name } if name == "y"));
            }
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[test]
    fn test_unit_payload_roundtrip() {
        let json = serde_json::to_string(&Payload::Unit).unwrap();
        assert_eq!(json, r#"{"kind":"unit"}"#);
        let back: Payload = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Payload::Unit);
    }
}
