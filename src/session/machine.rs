//! Debug server lifecycle state machine.
//!
//! A pure transition function over `Arc`-shared states: accepted messages
//! produce a new state plus side-effect commands for the manager to execute;
//! anything else returns the same `Arc` untouched along with a single
//! diagnostic command. Nothing in here performs I/O or panics.

use std::sync::Arc;

use uuid::Uuid;

use crate::config::DebugSettings;
use crate::protocol::{validate_host, validate_port, ServerAddress, Validated};

/// Opaque token identifying one running listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerHandle {
    pub id: Uuid,
    pub address: ServerAddress,
}

impl ListenerHandle {
    pub fn new(address: ServerAddress) -> Self {
        Self {
            id: Uuid::new_v4(),
            address,
        }
    }
}

/// Lifecycle of the debug server.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerState {
    Stopped(DebugSettings),
    Starting(DebugSettings),
    Started(DebugSettings, ListenerHandle),
    Stopping(DebugSettings),
}

impl ServerState {
    pub fn settings(&self) -> &DebugSettings {
        match self {
            ServerState::Stopped(s)
            | ServerState::Starting(s)
            | ServerState::Started(s, _)
            | ServerState::Stopping(s) => s,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ServerState::Stopped(_) => "Stopped",
            ServerState::Starting(_) => "Starting",
            ServerState::Started(..) => "Started",
            ServerState::Stopping(_) => "Stopping",
        }
    }
}

/// Messages driving the lifecycle machine.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// User asked to start the server with the current settings.
    StartServer,
    /// User asked to stop the running server.
    StopServer,
    /// User edited the host/port settings (only meaningful while stopped).
    UpdateSettings { host: String, port: String },
    /// The listener came up (internal completion of `DoStartServer`).
    ServerStarted(ListenerHandle),
    /// The listener shut down (internal completion of `DoStopServer`).
    ServerStopped,
}

/// Side effects the manager executes on behalf of the machine.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerCommand {
    DoStartServer(ServerAddress),
    DoStopServer(ListenerHandle),
    /// Diagnostic: `message` arrived in a state that has no transition for it.
    DoWarnUnacceptableMessage { message: String, state: String },
}

/// Apply one message to the machine.
///
/// Rejected or unacceptable messages return a clone of the input `Arc`: the
/// identical state instance, observable via [`Arc::ptr_eq`].
pub fn update_for_server_message(
    message: ServerMessage,
    state: Arc<ServerState>,
) -> (Arc<ServerState>, Vec<ServerCommand>) {
    match (&message, state.as_ref()) {
        (ServerMessage::StartServer, ServerState::Stopped(settings)) => {
            let host = validate_host(&settings.host);
            let port = validate_port(&settings.port);
            match (host, port) {
                (Validated::Valid(host), Validated::Valid(port)) => {
                    let address = ServerAddress::new(host, port);
                    (
                        Arc::new(ServerState::Starting(settings.clone())),
                        vec![ServerCommand::DoStartServer(address)],
                    )
                }
                // Invalid settings: no transition, no command.
                _ => (state, Vec::new()),
            }
        }

        (ServerMessage::ServerStarted(handle), ServerState::Starting(settings)) => (
            Arc::new(ServerState::Started(settings.clone(), handle.clone())),
            Vec::new(),
        ),

        (ServerMessage::StopServer, ServerState::Started(settings, handle)) => (
            Arc::new(ServerState::Stopping(settings.clone())),
            vec![ServerCommand::DoStopServer(handle.clone())],
        ),

        // Stopping completed, or starting failed before the listener came up.
        (ServerMessage::ServerStopped, ServerState::Stopping(settings))
        | (ServerMessage::ServerStopped, ServerState::Starting(settings)) => {
            (Arc::new(ServerState::Stopped(settings.clone())), Vec::new())
        }

        (ServerMessage::UpdateSettings { host, port }, ServerState::Stopped(settings)) => {
            let mut settings = settings.clone();
            settings.host = host.clone();
            settings.port = port.clone();
            (Arc::new(ServerState::Stopped(settings)), Vec::new())
        }

        _ => {
            let warning = ServerCommand::DoWarnUnacceptableMessage {
                message: format!("{message:?}"),
                state: state.name().to_string(),
            };
            (state, vec![warning])
        }
    }
}
