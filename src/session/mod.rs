//! Debug session management.
//!
//! [`DebugSessionManager`] drives the server lifecycle through the pure
//! [`machine`] transition function and executes the side-effect commands it
//! emits. The networking lives in [`server`] (debugger side) and [`client`]
//! (application side); recorded histories live in [`state`].

pub mod client;
pub mod machine;
pub mod server;
pub mod state;

pub use client::{connect, ClientEvent, DebugAttachment};
pub use machine::{
    update_for_server_message, ListenerHandle, ServerCommand, ServerMessage, ServerState,
};
pub use server::{DebugServer, ServerRuntime, SessionEvent};
pub use state::{ComponentDebugState, ExportedComponent, FilteredSnapshot, OriginalSnapshot};

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::broadcast;

use crate::config::DebugSettings;
use crate::error::SessionError;
use crate::protocol::ServerAddress;

/// Owns the lifecycle state and the running listener, if any.
///
/// Every lifecycle change goes through [`handle`]: the machine decides, the
/// manager executes. Unacceptable messages are logged and surfaced as
/// [`SessionEvent::Exception`], never panics.
///
/// [`handle`]: DebugSessionManager::handle
pub struct DebugSessionManager {
    state: Arc<ServerState>,
    server: Arc<DebugServer>,
    runtime: Option<ServerRuntime>,
}

impl DebugSessionManager {
    pub fn new(settings: DebugSettings) -> Self {
        Self {
            state: Arc::new(ServerState::Stopped(settings)),
            server: Arc::new(DebugServer::new()),
            runtime: None,
        }
    }

    pub fn state(&self) -> &Arc<ServerState> {
        &self.state
    }

    pub fn server(&self) -> &Arc<DebugServer> {
        &self.server
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.server.subscribe()
    }

    /// The bound listener address while the server is running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.runtime.as_ref().map(ServerRuntime::local_addr)
    }

    /// Start the server with the current settings.
    pub async fn start(&mut self) -> Result<(), SessionError> {
        if let ServerState::Started(_, handle) = self.state.as_ref() {
            return Err(SessionError::AlreadyRunning(handle.address.to_string()));
        }
        self.handle(ServerMessage::StartServer).await;
        match self.state.as_ref() {
            ServerState::Started(..) => Ok(()),
            state => {
                let settings = state.settings();
                Err(SessionError::Server(format!(
                    "failed to start on {}:{}",
                    settings.host, settings.port
                )))
            }
        }
    }

    /// Stop the running server. A second stop is an error, not a panic.
    pub async fn stop(&mut self) -> Result<(), SessionError> {
        if !matches!(self.state.as_ref(), ServerState::Started(..)) {
            return Err(SessionError::NotRunning);
        }
        self.handle(ServerMessage::StopServer).await;
        Ok(())
    }

    /// Update the host/port settings; only effective while stopped.
    pub async fn update_settings(&mut self, host: impl Into<String>, port: impl Into<String>) {
        self.handle(ServerMessage::UpdateSettings {
            host: host.into(),
            port: port.into(),
        })
        .await;
    }

    /// Feed one message through the lifecycle machine and execute whatever
    /// commands fall out, including their follow-up messages.
    pub async fn handle(&mut self, message: ServerMessage) {
        let mut queue = VecDeque::from([message]);
        while let Some(message) = queue.pop_front() {
            let (next, commands) = update_for_server_message(message, Arc::clone(&self.state));
            self.state = next;
            for command in commands {
                if let Some(follow_up) = self.execute(command).await {
                    queue.push_back(follow_up);
                }
            }
        }
    }

    async fn execute(&mut self, command: ServerCommand) -> Option<ServerMessage> {
        match command {
            ServerCommand::DoStartServer(address) => {
                match server::start(&address, Arc::clone(&self.server)).await {
                    Ok(runtime) => {
                        let bound =
                            ServerAddress::new(address.host.clone(), runtime.local_addr().port());
                        tracing::info!(address = %bound, "debug server listening");
                        self.server.publish(SessionEvent::ServerStarted {
                            address: bound.clone(),
                        });
                        self.runtime = Some(runtime);
                        Some(ServerMessage::ServerStarted(ListenerHandle::new(bound)))
                    }
                    Err(error) => {
                        tracing::error!(%address, error = %error, "failed to start debug server");
                        self.server.publish(SessionEvent::Exception {
                            component: None,
                            reason: error.to_string(),
                        });
                        Some(ServerMessage::ServerStopped)
                    }
                }
            }

            ServerCommand::DoStopServer(handle) => {
                if let Some(runtime) = self.runtime.take() {
                    runtime.shutdown().await;
                }
                tracing::info!(address = %handle.address, "debug server stopped");
                self.server.publish(SessionEvent::ServerStopped);
                Some(ServerMessage::ServerStopped)
            }

            ServerCommand::DoWarnUnacceptableMessage { message, state } => {
                tracing::warn!(%message, %state, "message not acceptable in current state");
                self.server.publish(SessionEvent::Exception {
                    component: None,
                    reason: format!("cannot handle {message} while {state}"),
                });
                None
            }
        }
    }
}

impl std::fmt::Debug for DebugSessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebugSessionManager")
            .field("state", &self.state.name())
            .finish()
    }
}
