//! Message-driven component runtime.
//!
//! A component is an `update(message, state) -> (state, commands)` loop: every
//! message is applied on a single event-loop task (updates are never
//! concurrent), commands resolve asynchronously on their own tasks, and each
//! command's resulting messages funnel back through the same inbound queue in
//! order. Subscribers share one broadcast state sequence; late subscribers see
//! the latest state first and only subsequent transitions after that.

use std::fmt;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, watch};

use crate::error::{ResolveError, RuntimeError};

/// Stable, human-assigned identifier routing one component instance to the
/// debugger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentId(String);

impl ComponentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ComponentId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Asynchronous command resolution.
///
/// `resolve` may block on I/O; failures are never fatal to the runtime:
/// `recover` maps them back into an application message (an "operation
/// exception" message in the owning application's vocabulary).
#[async_trait]
pub trait Resolver<M, C>: Send + Sync + 'static {
    async fn resolve(&self, command: C) -> Result<Vec<M>, ResolveError>;

    fn recover(&self, command: C, error: ResolveError) -> M;
}

/// One recorded state transition, as observed by debug subscribers.
///
/// `message` is `None` exactly for injected states and the initial attach
/// point; a message that the application models as null is still `Some`.
pub struct Transition<M, S, C> {
    pub message: Option<Arc<M>>,
    pub old: Arc<S>,
    pub new: Arc<S>,
    pub commands: Arc<[C]>,
}

impl<M, S, C> Clone for Transition<M, S, C> {
    fn clone(&self) -> Self {
        Self {
            message: self.message.clone(),
            old: Arc::clone(&self.old),
            new: Arc::clone(&self.new),
            commands: Arc::clone(&self.commands),
        }
    }
}

impl<M: fmt::Debug, S: fmt::Debug, C: fmt::Debug> fmt::Debug for Transition<M, S, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("message", &self.message)
            .field("old", &self.old)
            .field("new", &self.new)
            .field("commands", &self.commands)
            .finish()
    }
}

enum Input<M, S> {
    Message(M),
    InjectState(S),
    Stop,
}

const INPUT_BUFFER: usize = 256;
const TRANSITION_BUFFER: usize = 256;

/// Handle to a running component. Cheap to clone; all clones drive the same
/// event loop.
///
/// The event loop owns the only strong transition sender, so handles keep a
/// `Weak` reference: once the loop dies (stop or an `update` panic), every
/// subscriber stream observes `Closed` and ends even while handles are alive.
pub struct ComponentHandle<M, S, C> {
    id: ComponentId,
    input_tx: mpsc::Sender<Input<M, S>>,
    transitions: Weak<broadcast::Sender<Transition<M, S, C>>>,
    latest: watch::Receiver<Arc<S>>,
}

impl<M, S, C> Clone for ComponentHandle<M, S, C> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            input_tx: self.input_tx.clone(),
            transitions: Weak::clone(&self.transitions),
            latest: self.latest.clone(),
        }
    }
}

/// Spawn a component event loop.
///
/// `update` is a pure transition function; a panic inside it is a programming
/// error that kills the event loop and ends every subscriber stream. Command
/// resolution runs concurrently and never blocks acceptance of the next
/// message.
pub fn spawn<M, S, C, U, R>(
    id: ComponentId,
    initial: S,
    update: U,
    resolver: R,
) -> ComponentHandle<M, S, C>
where
    M: Send + Sync + 'static,
    S: PartialEq + Send + Sync + 'static,
    C: Clone + Send + Sync + 'static,
    U: Fn(&M, &S) -> (S, Vec<C>) + Send + 'static,
    R: Resolver<M, C>,
{
    let (input_tx, mut input_rx) = mpsc::channel::<Input<M, S>>(INPUT_BUFFER);
    let (transition_tx, _) = broadcast::channel::<Transition<M, S, C>>(TRANSITION_BUFFER);
    let (latest_tx, latest_rx) = watch::channel(Arc::new(initial));

    // The loop task holds the only strong sender; loop death drops it and
    // closes every subscriber.
    let loop_transitions = Arc::new(transition_tx);
    let transitions = Arc::downgrade(&loop_transitions);

    let resolver = Arc::new(resolver);
    let loop_inputs = input_tx.clone();
    let loop_id = id.clone();

    tokio::spawn(async move {
        let mut current: Arc<S> = latest_tx.borrow().clone();

        while let Some(input) = input_rx.recv().await {
            match input {
                Input::Message(message) => {
                    let (new_state, commands) = update(&message, &current);
                    let new_state = Arc::new(new_state);
                    let commands: Arc<[C]> = commands.into();

                    let transition = Transition {
                        message: Some(Arc::new(message)),
                        old: Arc::clone(&current),
                        new: Arc::clone(&new_state),
                        commands: Arc::clone(&commands),
                    };
                    // Dropped errors just mean nobody is observing right now.
                    let _ = loop_transitions.send(transition);

                    if *new_state != *current {
                        current = new_state;
                        latest_tx.send_replace(Arc::clone(&current));
                    }

                    for command in commands.iter().cloned() {
                        let resolver = Arc::clone(&resolver);
                        let inputs = loop_inputs.clone();
                        let component = loop_id.clone();
                        tokio::spawn(async move {
                            match resolver.resolve(command.clone()).await {
                                Ok(messages) => {
                                    for message in messages {
                                        if inputs.send(Input::Message(message)).await.is_err() {
                                            tracing::debug!(
                                                %component,
                                                "component stopped before resolved messages applied"
                                            );
                                            break;
                                        }
                                    }
                                }
                                Err(error) => {
                                    tracing::warn!(
                                        %component,
                                        error = %error,
                                        "command resolution failed, recovering"
                                    );
                                    let recovery = resolver.recover(command, error);
                                    let _ = inputs.send(Input::Message(recovery)).await;
                                }
                            }
                        });
                    }
                }
                Input::InjectState(state) => {
                    let new_state = Arc::new(state);
                    let transition = Transition {
                        message: None,
                        old: Arc::clone(&current),
                        new: Arc::clone(&new_state),
                        commands: Arc::from(Vec::new()),
                    };
                    let _ = loop_transitions.send(transition);

                    if *new_state != *current {
                        current = new_state;
                        latest_tx.send_replace(Arc::clone(&current));
                    }
                }
                Input::Stop => break,
            }
        }
        tracing::debug!(component = %loop_id, "component event loop stopped");
    });

    ComponentHandle {
        id,
        input_tx,
        transitions,
        latest: latest_rx,
    }
}

// A pre-closed receiver, for subscriptions taken after the loop has died.
fn closed_receiver<T: Clone>() -> broadcast::Receiver<T> {
    let (tx, rx) = broadcast::channel(1);
    drop(tx);
    rx
}

impl<M, S, C> ComponentHandle<M, S, C> {
    pub fn id(&self) -> &ComponentId {
        &self.id
    }

    /// Feed an external message into the event loop.
    pub async fn send(&self, message: M) -> Result<(), RuntimeError> {
        self.input_tx
            .send(Input::Message(message))
            .await
            .map_err(|_| RuntimeError::NotRunning)
    }

    /// Replace the current state directly, bypassing `update`. This is the
    /// debugger's ApplyState path.
    pub async fn inject_state(&self, state: S) -> Result<(), RuntimeError> {
        self.input_tx
            .send(Input::InjectState(state))
            .await
            .map_err(|_| RuntimeError::NotRunning)
    }

    /// The latest committed state.
    pub fn current(&self) -> Arc<S> {
        self.latest.borrow().clone()
    }

    /// Subscribe to the raw transition stream (message, old, new, commands).
    /// The receiver ends once the component has stopped.
    pub fn observe(&self) -> broadcast::Receiver<Transition<M, S, C>> {
        match self.transitions.upgrade() {
            Some(transitions) => transitions.subscribe(),
            None => closed_receiver(),
        }
    }

    /// Subscribe to the state sequence: the latest state immediately, then
    /// each subsequent distinct state. No history is replayed.
    pub fn attach(&self) -> StateStream<M, S, C> {
        // Subscribe before snapshotting the current state so a transition
        // committed between the two is not missed; a duplicate of the
        // snapshot coalesces away.
        let receiver = self.observe();
        StateStream {
            first: Some(self.current()),
            receiver,
            last: None,
        }
    }

    /// Stop the event loop. Idempotent: stopping an already stopped component
    /// is a no-op.
    pub async fn stop(&self) {
        let _ = self.input_tx.send(Input::Stop).await;
    }

    pub fn is_running(&self) -> bool {
        !self.input_tx.is_closed()
    }
}

/// Shared, ordered view of a component's state sequence with consecutive
/// duplicates coalesced.
pub struct StateStream<M, S, C> {
    first: Option<Arc<S>>,
    receiver: broadcast::Receiver<Transition<M, S, C>>,
    last: Option<Arc<S>>,
}

impl<M, S, C> StateStream<M, S, C>
where
    S: PartialEq,
{
    /// Next state, or `None` once the component has stopped.
    pub async fn next(&mut self) -> Option<Arc<S>> {
        if let Some(first) = self.first.take() {
            self.last = Some(Arc::clone(&first));
            return Some(first);
        }
        loop {
            match self.receiver.recv().await {
                Ok(transition) => {
                    let duplicate = self
                        .last
                        .as_ref()
                        .is_some_and(|last| **last == *transition.new);
                    if !duplicate {
                        self.last = Some(Arc::clone(&transition.new));
                        return Some(transition.new);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "state subscriber lagged, skipping ahead");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
