//! Debugger-side server: accepts application connections, records snapshot
//! histories, and routes directives back to their owning connections.
//!
//! One reader task per connection appends snapshots strictly in receipt
//! order. The component map is the single source of truth for everything the
//! debugger UI displays; imported histories live in the same map but have no
//! live connection behind them.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, watch, RwLock};
use tokio::task::{JoinHandle, JoinSet};
use uuid::Uuid;

use crate::error::{ProtocolError, SessionError};
use crate::filter::Filter;
use crate::protocol::{self, Directive, Notification, ServerAddress};
use crate::runtime::ComponentId;
use crate::value::Value;

use super::state::{ComponentDebugState, ExportedComponent, OriginalSnapshot};

const DIRECTIVE_BUFFER: usize = 32;
const EVENT_BUFFER: usize = 256;

/// Observable events for the debugger host (UI, CLI, tests).
#[derive(Debug, Clone)]
pub enum SessionEvent {
    ServerStarted { address: ServerAddress },
    ServerStopped,
    ComponentAttached { component: ComponentId },
    SnapshotAppended { component: ComponentId, snapshot: Uuid },
    ComponentDetached { component: ComponentId },
    ActionApplied { component: ComponentId, call_id: Uuid },
    Exception { component: Option<ComponentId>, reason: String },
}

struct Attachment {
    debug: ComponentDebugState,
    /// Outbound directive queue of the owning connection; `None` for imported
    /// histories and components whose connection has gone away.
    directives: Option<mpsc::Sender<Directive>>,
    connection: Option<Uuid>,
}

/// Shared state of one debug server instance.
pub struct DebugServer {
    components: RwLock<HashMap<ComponentId, Attachment>>,
    /// Directives sent but not yet acknowledged, keyed by call id.
    pending: Mutex<HashMap<Uuid, ComponentId>>,
    events: broadcast::Sender<SessionEvent>,
}

impl Default for DebugServer {
    fn default() -> Self {
        Self::new()
    }
}

impl DebugServer {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            components: RwLock::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub(crate) fn publish(&self, event: SessionEvent) {
        // Dropped errors just mean nobody is observing right now.
        let _ = self.events.send(event);
    }

    /// Ids of every component in the map, attached or imported.
    pub async fn component_ids(&self) -> Vec<ComponentId> {
        self.components.read().await.keys().cloned().collect()
    }

    /// Point-in-time copy of one component's debug state.
    pub async fn component(&self, id: &ComponentId) -> Option<ComponentDebugState> {
        self.components.read().await.get(id).map(|a| a.debug.clone())
    }

    /// Directive call ids still awaiting an `ActionApplied` acknowledgement.
    pub fn pending_directives(&self) -> Vec<Uuid> {
        self.pending.lock().keys().copied().collect()
    }

    /// Inject a synthetic message into an attached component. Returns the
    /// call id that the eventual acknowledgement will carry.
    pub async fn apply_message(
        &self,
        component: &ComponentId,
        message: Value,
    ) -> Result<Uuid, SessionError> {
        let call_id = Uuid::new_v4();
        let directive = Directive::ApplyMessage {
            component: component.clone(),
            call_id,
            message,
        };
        self.send_directive(component, directive).await?;
        Ok(call_id)
    }

    /// Replace an attached component's state, bypassing its update function.
    pub async fn apply_state(
        &self,
        component: &ComponentId,
        state: Value,
    ) -> Result<Uuid, SessionError> {
        let call_id = Uuid::new_v4();
        let directive = Directive::ApplyState {
            component: component.clone(),
            call_id,
            state,
        };
        self.send_directive(component, directive).await?;
        Ok(call_id)
    }

    async fn send_directive(
        &self,
        component: &ComponentId,
        directive: Directive,
    ) -> Result<(), SessionError> {
        let components = self.components.read().await;
        let attachment = components
            .get(component)
            .ok_or_else(|| SessionError::UnknownComponent(component.to_string()))?;
        let sender = attachment.directives.as_ref().ok_or_else(|| {
            SessionError::Server(format!("component {component} has no live connection"))
        })?;
        let call_id = directive.call_id();
        sender
            .send(directive)
            .await
            .map_err(|_| SessionError::Server(format!("connection to {component} closed")))?;
        self.pending.lock().insert(call_id, component.clone());
        Ok(())
    }

    /// Install a new snapshot filter for a component. An invalid filter is
    /// rejected and leaves the previous filter in place.
    pub async fn update_filter(
        &self,
        component: &ComponentId,
        filter: Filter,
    ) -> Result<(), SessionError> {
        let mut components = self.components.write().await;
        let attachment = components
            .get_mut(component)
            .ok_or_else(|| SessionError::UnknownComponent(component.to_string()))?;
        attachment.debug.update_filter(filter)?;
        Ok(())
    }

    /// Remove specific snapshots from a component's history.
    pub async fn remove_snapshots(
        &self,
        component: &ComponentId,
        ids: &HashSet<Uuid>,
    ) -> Result<(), SessionError> {
        let mut components = self.components.write().await;
        let attachment = components
            .get_mut(component)
            .ok_or_else(|| SessionError::UnknownComponent(component.to_string()))?;
        attachment.debug.remove_snapshots(ids);
        Ok(())
    }

    /// Drop a component's whole history, keeping its current state.
    pub async fn clear_snapshots(&self, component: &ComponentId) -> Result<(), SessionError> {
        let mut components = self.components.write().await;
        let attachment = components
            .get_mut(component)
            .ok_or_else(|| SessionError::UnknownComponent(component.to_string()))?;
        attachment.debug.clear_snapshots();
        Ok(())
    }

    /// Forget a component entirely. The application side, if still connected,
    /// keeps running and may re-attach later.
    pub async fn remove_component(&self, component: &ComponentId) -> Result<(), SessionError> {
        let removed = self.components.write().await.remove(component);
        match removed {
            Some(_) => {
                self.pending.lock().retain(|_, owner| owner != component);
                self.publish(SessionEvent::ComponentDetached {
                    component: component.clone(),
                });
                Ok(())
            }
            None => Err(SessionError::UnknownComponent(component.to_string())),
        }
    }

    /// Serialize one component's history into a self-contained document.
    pub async fn export_component(
        &self,
        component: &ComponentId,
    ) -> Result<ExportedComponent, SessionError> {
        self.components
            .read()
            .await
            .get(component)
            .map(|a| a.debug.export())
            .ok_or_else(|| SessionError::UnknownComponent(component.to_string()))
    }

    /// Load a previously exported history. The imported component has no live
    /// connection; directives against it fail until a real attach replaces it.
    pub async fn import_component(&self, doc: ExportedComponent) {
        let debug = ComponentDebugState::import(doc);
        let id = debug.id.clone();
        self.components.write().await.insert(
            id.clone(),
            Attachment {
                debug,
                directives: None,
                connection: None,
            },
        );
        self.publish(SessionEvent::ComponentAttached { component: id });
    }

    async fn handle_notification(
        &self,
        connection: Uuid,
        directives: &mpsc::Sender<Directive>,
        notification: Notification,
    ) {
        match notification {
            Notification::ComponentAttached {
                component, state, ..
            } => {
                let mut components = self.components.write().await;
                match components.get_mut(&component) {
                    // Re-attach keeps the recorded history so a restarting
                    // application keeps its timeline.
                    Some(attachment) => {
                        attachment.debug.state = state;
                        attachment.directives = Some(directives.clone());
                        attachment.connection = Some(connection);
                    }
                    None => {
                        components.insert(
                            component.clone(),
                            Attachment {
                                debug: ComponentDebugState::new(component.clone(), state),
                                directives: Some(directives.clone()),
                                connection: Some(connection),
                            },
                        );
                    }
                }
                drop(components);
                tracing::info!(%component, "component attached");
                self.publish(SessionEvent::ComponentAttached { component });
            }

            Notification::ComponentSnapshot {
                component,
                meta,
                message,
                new_state,
                commands,
                ..
            } => {
                let snapshot_id = meta.id;
                let snapshot = OriginalSnapshot {
                    meta,
                    message,
                    state: new_state,
                    commands,
                };
                let mut components = self.components.write().await;
                match components.get_mut(&component) {
                    Some(attachment) => {
                        attachment.debug.append(snapshot);
                        drop(components);
                        self.publish(SessionEvent::SnapshotAppended {
                            component,
                            snapshot: snapshot_id,
                        });
                    }
                    None => {
                        drop(components);
                        tracing::warn!(%component, "snapshot for unattached component");
                        self.publish(SessionEvent::Exception {
                            component: Some(component),
                            reason: "snapshot for unattached component".to_string(),
                        });
                    }
                }
            }

            Notification::ActionApplied { component, call_id } => {
                if self.pending.lock().remove(&call_id).is_none() {
                    tracing::warn!(%component, %call_id, "acknowledgement for unknown directive");
                }
                self.publish(SessionEvent::ActionApplied { component, call_id });
            }

            Notification::OperationException {
                component,
                reason,
                call_id,
                ..
            } => {
                // A failed directive never gets an ActionApplied; settle its
                // pending entry here.
                if let Some(call_id) = call_id {
                    self.pending.lock().remove(&call_id);
                }
                tracing::warn!(component = ?component, %reason, "application reported exception");
                self.publish(SessionEvent::Exception { component, reason });
            }
        }
    }

    /// Detach every component owned by a closed connection.
    async fn detach_connection(&self, connection: Uuid) {
        let mut detached = Vec::new();
        {
            let mut components = self.components.write().await;
            components.retain(|id, attachment| {
                if attachment.connection == Some(connection) {
                    detached.push(id.clone());
                    false
                } else {
                    true
                }
            });
        }
        // Directives to a gone connection can never be acknowledged.
        self.pending
            .lock()
            .retain(|_, component| !detached.contains(component));
        for component in detached {
            tracing::info!(%component, "component detached");
            self.publish(SessionEvent::ComponentDetached { component });
        }
    }

    /// Drop every attachment and pending directive. Runs on server shutdown.
    async fn reset(&self) {
        self.components.write().await.clear();
        self.pending.lock().clear();
    }
}

impl std::fmt::Debug for DebugServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebugServer")
            .field("pending", &self.pending.lock().len())
            .finish()
    }
}

/// A running listener. Dropping it without calling [`shutdown`] leaks the
/// accept task until the process exits.
///
/// [`shutdown`]: ServerRuntime::shutdown
pub struct ServerRuntime {
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    accept_task: JoinHandle<()>,
}

impl ServerRuntime {
    /// The actually bound address; differs from the requested one when the
    /// requested port was 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting, close every live connection, and clear the component
    /// map. Returns once the accept task has fully wound down.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.accept_task.await;
    }
}

/// Bind a listener and start accepting application connections.
pub async fn start(
    address: &ServerAddress,
    server: Arc<DebugServer>,
) -> Result<ServerRuntime, SessionError> {
    let listener = TcpListener::bind((address.host.as_str(), address.port))
        .await
        .map_err(|e| SessionError::Server(format!("failed to bind {address}: {e}")))?;
    let local_addr = listener
        .local_addr()
        .map_err(|e| SessionError::Server(e.to_string()))?;

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let accept_task = tokio::spawn(async move {
        let mut connections = JoinSet::new();
        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        tracing::info!(%peer, "application connected");
                        connections.spawn(handle_connection(stream, Arc::clone(&server)));
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                    }
                },
                _ = shutdown_rx.changed() => break,
            }
        }
        connections.shutdown().await;
        server.reset().await;
    });

    Ok(ServerRuntime {
        local_addr,
        shutdown: shutdown_tx,
        accept_task,
    })
}

async fn handle_connection(stream: TcpStream, server: Arc<DebugServer>) {
    let connection = Uuid::new_v4();
    let (mut sink, mut frames) = protocol::split(protocol::frame(stream));

    let (directive_tx, mut directive_rx) = mpsc::channel::<Directive>(DIRECTIVE_BUFFER);
    let writer = tokio::spawn(async move {
        while let Some(directive) = directive_rx.recv().await {
            if let Err(e) = protocol::send_frame(&mut sink, &directive).await {
                tracing::warn!(error = %e, "failed to send directive");
                break;
            }
        }
    });

    loop {
        match protocol::read_frame::<_, Notification>(&mut frames).await {
            Ok(notification) => {
                server
                    .handle_notification(connection, &directive_tx, notification)
                    .await;
            }
            Err(ProtocolError::MalformedEnvelope { reason, raw }) => {
                tracing::warn!(%reason, %raw, "skipping malformed notification");
                server.publish(SessionEvent::Exception {
                    component: None,
                    reason,
                });
            }
            Err(ProtocolError::ConnectionClosed) => break,
            Err(e) => {
                tracing::warn!(error = %e, "connection failed");
                break;
            }
        }
    }

    server.detach_connection(connection).await;
    writer.abort();
}
