pub mod codec;
pub mod config;
pub mod error;
pub mod filter;
pub mod protocol;
pub mod runtime;
pub mod session;
pub mod value;

pub use codec::{Codec, TypeRegistry};
pub use config::DebugSettings;
pub use error::{CodecError, ProtocolError, ResolveError, RuntimeError, SessionError};
pub use filter::{Filter, MatchKind};
pub use protocol::{Directive, Notification, ServerAddress, SnapshotMeta};
pub use runtime::{spawn, ComponentHandle, ComponentId, Resolver, Transition};
pub use session::{
    connect, ClientEvent, ComponentDebugState, DebugAttachment, DebugServer, DebugSessionManager,
    SessionEvent,
};
pub use value::{Property, TypeName, Value};
