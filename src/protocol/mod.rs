//! Debug session wire protocol.
//!
//! One persistent bidirectional connection carries [`Notification`]s from the
//! running application to the debugger and [`Directive`]s back. Every payload
//! is a generic [`Value`] tree, so arbitrary, evolving application types cross
//! the wire without schema migrations; the envelope (message kind +
//! [`ComponentId`] + correlation id) is the only fixed schema.

mod framing;

pub use framing::{frame, read_frame, send_frame, split, FrameSink, FrameStream, FramedConnection};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::runtime::ComponentId;
use crate::value::{nullable, Value};

/// Identity and capture time of one snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
}

impl SnapshotMeta {
    pub fn now() -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
        }
    }
}

/// Application → debugger messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Notification {
    /// A component came online; carries its initial state.
    ComponentAttached {
        component: ComponentId,
        state: Value,
        commands: Value,
    },

    /// One state transition: the message that caused it, both states, and the
    /// commands issued. `message` is absent only for the attach transition and
    /// injected states; a message that encoded to null is still present.
    ComponentSnapshot {
        component: ComponentId,
        meta: SnapshotMeta,
        #[serde(default, with = "nullable", skip_serializing_if = "Option::is_none")]
        message: Option<Value>,
        old_state: Value,
        new_state: Value,
        commands: Value,
    },

    /// A directive with this correlation id has been accepted into the
    /// component's pipeline.
    ActionApplied {
        component: ComponentId,
        call_id: Uuid,
    },

    /// A classified failure, with the in-flight command payload when known.
    /// `call_id` is present when the failure answers a directive, settling it
    /// in place of the acknowledgement that will never come.
    OperationException {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        component: Option<ComponentId>,
        reason: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        call_id: Option<Uuid>,
        #[serde(default, with = "nullable", skip_serializing_if = "Option::is_none")]
        command: Option<Value>,
    },
}

impl Notification {
    pub fn component(&self) -> Option<&ComponentId> {
        match self {
            Notification::ComponentAttached { component, .. }
            | Notification::ComponentSnapshot { component, .. }
            | Notification::ActionApplied { component, .. } => Some(component),
            Notification::OperationException { component, .. } => component.as_ref(),
        }
    }
}

/// Debugger → application messages, acknowledged via
/// [`Notification::ActionApplied`] with the same `call_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Directive {
    /// Inject a synthetic message into the component's input.
    ApplyMessage {
        component: ComponentId,
        call_id: Uuid,
        message: Value,
    },

    /// Replace the component's state, bypassing `update`.
    ApplyState {
        component: ComponentId,
        call_id: Uuid,
        state: Value,
    },
}

impl Directive {
    pub fn component(&self) -> &ComponentId {
        match self {
            Directive::ApplyMessage { component, .. } | Directive::ApplyState { component, .. } => {
                component
            }
        }
    }

    pub fn call_id(&self) -> Uuid {
        match self {
            Directive::ApplyMessage { call_id, .. } | Directive::ApplyState { call_id, .. } => {
                *call_id
            }
        }
    }
}

/// Host and port of a debug server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerAddress {
    pub host: String,
    pub port: u16,
}

impl ServerAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl std::fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Validation outcome for user-supplied settings: invalid input is a value
/// with a human-readable reason, never an error path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validated<T> {
    Valid(T),
    Invalid { input: String, reason: String },
}

impl<T> Validated<T> {
    pub fn is_valid(&self) -> bool {
        matches!(self, Validated::Valid(_))
    }

    pub fn into_valid(self) -> Option<T> {
        match self {
            Validated::Valid(value) => Some(value),
            Validated::Invalid { .. } => None,
        }
    }
}

/// Validate a host name: non-empty, no whitespace, no port suffix.
pub fn validate_host(input: &str) -> Validated<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Validated::Invalid {
            input: input.to_string(),
            reason: "host must not be empty".to_string(),
        };
    }
    if trimmed.chars().any(char::is_whitespace) {
        return Validated::Invalid {
            input: input.to_string(),
            reason: "host must not contain whitespace".to_string(),
        };
    }
    if trimmed.contains(':') {
        return Validated::Invalid {
            input: input.to_string(),
            reason: "host must not include a port".to_string(),
        };
    }
    Validated::Valid(trimmed.to_string())
}

/// Validate a port given as raw user input.
pub fn validate_port(input: &str) -> Validated<u16> {
    match input.trim().parse::<u16>() {
        Ok(0) => Validated::Invalid {
            input: input.to_string(),
            reason: "port must be between 1 and 65535".to_string(),
        },
        Ok(port) => Validated::Valid(port),
        Err(_) => Validated::Invalid {
            input: input.to_string(),
            reason: format!("{:?} is not a valid port number", input.trim()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Property, TypeName};

    fn snapshot(message: Option<Value>) -> Notification {
        Notification::ComponentSnapshot {
            component: ComponentId::new("todo-list"),
            meta: SnapshotMeta::now(),
            message,
            old_state: Value::reference(
                "State",
                vec![Property::new("count", Value::int(0))],
            ),
            new_state: Value::reference(
                "State",
                vec![Property::new("count", Value::int(1))],
            ),
            commands: Value::collection(vec![]),
        }
    }

    #[test]
    fn test_envelope_round_trip() {
        let original = snapshot(Some(Value::reference("Msg::Increment", vec![])));
        let json = serde_json::to_string(&original).unwrap();
        let decoded: Notification = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_absent_message_field_is_omitted() {
        let json = serde_json::to_value(&snapshot(None)).unwrap();
        assert!(json.get("message").is_none());

        let decoded: Notification = serde_json::from_value(json).unwrap();
        let Notification::ComponentSnapshot { message, .. } = decoded else {
            panic!("wrong envelope kind");
        };
        assert_eq!(message, None);
    }

    #[test]
    fn test_null_message_stays_distinguishable_from_absent() {
        let original = snapshot(Some(Value::null(TypeName::unit())));
        let json = serde_json::to_value(&original).unwrap();
        // Present but null.
        assert!(json.get("message").is_some());
        assert!(json["message"].is_null());

        let decoded: Notification = serde_json::from_value(json).unwrap();
        let Notification::ComponentSnapshot { message, .. } = decoded else {
            panic!("wrong envelope kind");
        };
        assert!(matches!(message, Some(Value::Null(_))));
    }

    #[test]
    fn test_exception_call_id_round_trips_and_is_optional() {
        let call_id = Uuid::new_v4();
        let original = Notification::OperationException {
            component: Some(ComponentId::new("todo-list")),
            reason: "unknown type Mystery".to_string(),
            call_id: Some(call_id),
            command: None,
        };
        let json = serde_json::to_value(&original).unwrap();
        assert_eq!(json["call_id"], serde_json::json!(call_id));
        let decoded: Notification = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, original);

        // Envelopes from senders that never set a call id still parse.
        let bare: Notification = serde_json::from_value(serde_json::json!({
            "type": "OperationException",
            "reason": "connection reset",
        }))
        .unwrap();
        let Notification::OperationException { call_id, .. } = bare else {
            panic!("wrong envelope kind");
        };
        assert_eq!(call_id, None);
    }

    #[test]
    fn test_directive_accessors() {
        let call_id = Uuid::new_v4();
        let directive = Directive::ApplyMessage {
            component: ComponentId::new("todo-list"),
            call_id,
            message: Value::int(1),
        };
        assert_eq!(directive.component().as_str(), "todo-list");
        assert_eq!(directive.call_id(), call_id);
    }

    #[test]
    fn test_host_validation() {
        assert_eq!(
            validate_host("localhost"),
            Validated::Valid("localhost".to_string())
        );
        assert_eq!(
            validate_host(" 127.0.0.1 "),
            Validated::Valid("127.0.0.1".to_string())
        );
        assert!(!validate_host("").is_valid());
        assert!(!validate_host("host with spaces").is_valid());
        assert!(!validate_host("localhost:8080").is_valid());
    }

    #[test]
    fn test_port_validation() {
        assert_eq!(validate_port("8080"), Validated::Valid(8080));
        assert!(!validate_port("0").is_valid());
        assert!(!validate_port("not-a-port").is_valid());
        assert!(!validate_port("70000").is_valid());

        match validate_port("70000") {
            Validated::Invalid { reason, .. } => assert!(!reason.is_empty()),
            Validated::Valid(_) => panic!("70000 should not validate"),
        }
    }
}
