//! Application-side debug attachment.
//!
//! Connects a running component to a debug server over one persistent
//! connection. Two independent flows share the socket: outbound snapshots of
//! every transition, and inbound directives that are decoded, fed into the
//! component, and acknowledged strictly one at a time.

use std::sync::Arc;

use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::codec::Codec;
use crate::error::{ProtocolError, SessionError};
use crate::protocol::{
    self, Directive, FrameStream, Notification, ServerAddress, SnapshotMeta,
};
use crate::runtime::{ComponentHandle, ComponentId, Transition};
use crate::value::Value;

const OUTBOUND_BUFFER: usize = 64;
const EVENT_BUFFER: usize = 64;

/// Observable events on the application side of an attachment.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    Connected { address: ServerAddress },
    SnapshotSent { snapshot: Uuid },
    /// A transition whose payload failed to encode; the snapshot is skipped,
    /// later ones still flow.
    SnapshotDropped { reason: String },
    DirectiveApplied { call_id: Uuid },
    Exception { reason: String },
    Disconnected,
}

/// Handle to a live attachment. Dropping it (or calling [`detach`]) severs
/// the connection; the component itself keeps running.
///
/// [`detach`]: DebugAttachment::detach
pub struct DebugAttachment {
    events: mpsc::Receiver<ClientEvent>,
    tasks: Vec<JoinHandle<()>>,
}

impl DebugAttachment {
    /// Next client event, or `None` once the attachment has been detached.
    pub async fn next_event(&mut self) -> Option<ClientEvent> {
        self.events.recv().await
    }

    /// Sever the connection. Idempotent.
    pub fn detach(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for DebugAttachment {
    fn drop(&mut self) {
        self.detach();
    }
}

/// Attach a component to a debug server.
///
/// Sends the attach notification with the component's current state, then
/// streams every transition as a snapshot while applying inbound directives.
/// The component's message and state types must be registered in the codec's
/// type registry for directives to decode.
pub async fn connect<M, S, C>(
    address: &ServerAddress,
    handle: ComponentHandle<M, S, C>,
    codec: Arc<Codec>,
) -> Result<DebugAttachment, SessionError>
where
    M: Serialize + Send + Sync + 'static,
    S: Serialize + PartialEq + Send + Sync + 'static,
    C: Serialize + Clone + Send + Sync + 'static,
{
    let stream = TcpStream::connect((address.host.as_str(), address.port))
        .await
        .map_err(ProtocolError::Io)?;
    let (mut sink, frames) = protocol::split(protocol::frame(stream));

    // Subscribe before capturing the attach state so no transition between
    // the two is lost.
    let transitions = handle.observe();
    let component = handle.id().clone();
    let attached = Notification::ComponentAttached {
        component: component.clone(),
        state: codec.encode(handle.current().as_ref())?,
        commands: Value::collection(vec![]),
    };

    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Notification>(OUTBOUND_BUFFER);
    let (event_tx, events) = mpsc::channel::<ClientEvent>(EVENT_BUFFER);

    // Single writer preserves the order of snapshots and acknowledgements.
    let writer = tokio::spawn(async move {
        while let Some(notification) = outbound_rx.recv().await {
            if let Err(e) = protocol::send_frame(&mut sink, &notification).await {
                tracing::warn!(error = %e, "failed to send notification");
                break;
            }
        }
    });

    outbound_tx
        .send(attached)
        .await
        .map_err(|_| SessionError::Server("connection writer stopped".to_string()))?;
    let _ = event_tx
        .send(ClientEvent::Connected {
            address: address.clone(),
        })
        .await;

    let snapshots = tokio::spawn(stream_snapshots(
        transitions,
        component.clone(),
        Arc::clone(&codec),
        outbound_tx.clone(),
        event_tx.clone(),
    ));
    let directives = tokio::spawn(apply_directives(
        frames,
        handle,
        codec,
        outbound_tx,
        event_tx,
    ));

    Ok(DebugAttachment {
        events,
        tasks: vec![writer, snapshots, directives],
    })
}

async fn stream_snapshots<M, S, C>(
    mut transitions: broadcast::Receiver<Transition<M, S, C>>,
    component: ComponentId,
    codec: Arc<Codec>,
    outbound: mpsc::Sender<Notification>,
    events: mpsc::Sender<ClientEvent>,
) where
    M: Serialize + Send + Sync + 'static,
    S: Serialize + Send + Sync + 'static,
    C: Serialize + Clone + Send + Sync + 'static,
{
    loop {
        match transitions.recv().await {
            Ok(transition) => {
                let meta = SnapshotMeta::now();
                let snapshot_id = meta.id;
                match encode_snapshot(&codec, &component, meta, &transition) {
                    Ok(notification) => {
                        if outbound.send(notification).await.is_err() {
                            break;
                        }
                        let _ = events
                            .send(ClientEvent::SnapshotSent {
                                snapshot: snapshot_id,
                            })
                            .await;
                    }
                    Err(e) => {
                        tracing::warn!(%component, error = %e, "snapshot dropped");
                        let _ = events
                            .send(ClientEvent::SnapshotDropped {
                                reason: e.to_string(),
                            })
                            .await;
                    }
                }
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                tracing::warn!(%component, missed, "snapshot stream lagged");
                let _ = events
                    .send(ClientEvent::SnapshotDropped {
                        reason: format!("lagged behind by {missed} transitions"),
                    })
                    .await;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn encode_snapshot<M, S, C>(
    codec: &Codec,
    component: &ComponentId,
    meta: SnapshotMeta,
    transition: &Transition<M, S, C>,
) -> Result<Notification, crate::error::CodecError>
where
    M: Serialize,
    S: Serialize,
    C: Serialize,
{
    let message = transition
        .message
        .as_ref()
        .map(|m| codec.encode(m.as_ref()))
        .transpose()?;
    let commands = transition
        .commands
        .iter()
        .map(|c| codec.encode(c))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Notification::ComponentSnapshot {
        component: component.clone(),
        meta,
        message,
        old_state: codec.encode(transition.old.as_ref())?,
        new_state: codec.encode(transition.new.as_ref())?,
        commands: Value::collection(commands),
    })
}

async fn apply_directives<M, S, C>(
    mut frames: FrameStream,
    handle: ComponentHandle<M, S, C>,
    codec: Arc<Codec>,
    outbound: mpsc::Sender<Notification>,
    events: mpsc::Sender<ClientEvent>,
) where
    M: Send + Sync + 'static,
    S: PartialEq + Send + Sync + 'static,
    C: Send + Sync + 'static,
{
    let component = handle.id().clone();
    loop {
        match protocol::read_frame::<_, Directive>(&mut frames).await {
            Ok(directive) => {
                if directive.component() != &component {
                    tracing::warn!(
                        %component,
                        addressed = %directive.component(),
                        "skipping directive for a different component"
                    );
                    continue;
                }
                let call_id = directive.call_id();
                let outcome = match directive {
                    Directive::ApplyMessage { message, .. } => {
                        match decode_as::<M>(&codec, &message) {
                            Ok(decoded) => handle.send(decoded).await.map_err(|e| e.to_string()),
                            Err(reason) => Err(reason),
                        }
                    }
                    Directive::ApplyState { state, .. } => match decode_as::<S>(&codec, &state) {
                        Ok(decoded) => {
                            handle.inject_state(decoded).await.map_err(|e| e.to_string())
                        }
                        Err(reason) => Err(reason),
                    },
                };

                // The acknowledgement (or exception) goes out before the next
                // directive is read, so directives apply strictly in order.
                match outcome {
                    Ok(()) => {
                        let ack = Notification::ActionApplied {
                            component: component.clone(),
                            call_id,
                        };
                        if outbound.send(ack).await.is_err() {
                            break;
                        }
                        let _ = events.send(ClientEvent::DirectiveApplied { call_id }).await;
                    }
                    Err(reason) => {
                        tracing::warn!(%component, %reason, "directive failed");
                        let exception = Notification::OperationException {
                            component: Some(component.clone()),
                            reason: reason.clone(),
                            call_id: Some(call_id),
                            command: None,
                        };
                        if outbound.send(exception).await.is_err() {
                            break;
                        }
                        let _ = events.send(ClientEvent::Exception { reason }).await;
                    }
                }
            }
            Err(ProtocolError::MalformedEnvelope { reason, raw }) => {
                tracing::warn!(%component, %reason, %raw, "skipping malformed directive");
                let _ = events.send(ClientEvent::Exception { reason }).await;
            }
            Err(ProtocolError::ConnectionClosed) => {
                let _ = events.send(ClientEvent::Disconnected).await;
                break;
            }
            Err(e) => {
                let _ = events
                    .send(ClientEvent::Exception {
                        reason: e.to_string(),
                    })
                    .await;
                break;
            }
        }
    }
}

/// Decode a directive payload into the component's concrete type via the
/// registry.
fn decode_as<T: 'static>(codec: &Codec, value: &Value) -> Result<T, String> {
    let decoded = codec.decode_dyn(value).map_err(|e| e.to_string())?;
    decoded.downcast::<T>().map(|boxed| *boxed).map_err(|_| {
        format!(
            "decoder registered for {} does not produce this component's type",
            value.type_name()
        )
    })
}
