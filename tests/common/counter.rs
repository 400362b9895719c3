//! Counter application fixture.

use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use hindsight::{Codec, ComponentHandle, ComponentId, ResolveError, Resolver, TypeRegistry};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Msg {
    Increment,
    Add(i64),
    Load,
    LoadFailed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterState {
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Cmd {
    FetchTen,
    Fail(String),
}

pub fn update(msg: &Msg, state: &CounterState) -> (CounterState, Vec<Cmd>) {
    match msg {
        Msg::Increment => (
            CounterState {
                count: state.count + 1,
            },
            vec![],
        ),
        Msg::Add(n) => (
            CounterState {
                count: state.count + n,
            },
            vec![],
        ),
        Msg::Load => (state.clone(), vec![Cmd::FetchTen]),
        Msg::LoadFailed(_) => (CounterState { count: -1 }, vec![]),
    }
}

pub struct CounterResolver;

#[async_trait]
impl Resolver<Msg, Cmd> for CounterResolver {
    async fn resolve(&self, command: Cmd) -> Result<Vec<Msg>, ResolveError> {
        match command {
            Cmd::FetchTen => Ok(vec![Msg::Add(10)]),
            Cmd::Fail(reason) => Err(ResolveError::new(reason)),
        }
    }

    fn recover(&self, _command: Cmd, error: ResolveError) -> Msg {
        Msg::LoadFailed(error.reason)
    }
}

/// A codec with the counter vocabulary registered.
pub fn codec() -> Codec {
    let mut registry = TypeRegistry::new();
    registry.register::<Msg>("Msg");
    registry.register::<CounterState>("CounterState");
    registry.register::<Cmd>("Cmd");
    Codec::new(registry)
}

/// One codec instance shared across tests; the metadata cache warms up once.
pub fn shared_codec() -> Arc<Codec> {
    static CODEC: Lazy<Arc<Codec>> = Lazy::new(|| Arc::new(codec()));
    Arc::clone(&CODEC)
}

pub fn spawn_counter(id: &str) -> ComponentHandle<Msg, CounterState, Cmd> {
    hindsight::spawn(
        ComponentId::new(id),
        CounterState { count: 0 },
        update,
        CounterResolver,
    )
}
