//! Host-side state of the portico bridge.
//!
//! A [`Gateway`] owns the object registry (id ↔ live value bindings), the
//! return classifier that decides how a host value travels back to the peer,
//! the import views used to resolve bare class names, and the seams to the
//! two external collaborators: the reflection facility ([`Reflector`]) and
//! the peer callback client ([`PeerClient`]).
//!
//! The server crate layers the wire dispatcher on top of this; embedding
//! applications can also drive a `Gateway` directly through
//! [`Gateway::invoke`] and friends.

mod gateway;
mod peer;
mod reflect;
mod registry;
mod value;
mod view;

pub use gateway::{Gateway, GatewayException};
pub use peer::{NetworkError, PeerClient};
pub use reflect::{
    CallTarget, FieldHandle, Member, MemberKind, MethodHandle, ReflectError, Reflector,
};
pub use registry::ObjectRegistry;
pub use value::{HostObject, HostValue, Key, SharedIter, SharedList, SharedMap, SharedSet};
pub use view::{NameResolution, View};

/// The `tracing` target used by this crate.
pub const TRACE_TARGET: &str = "portico.gateway";

// The mock reflector is only needed by tests and downstream test suites.
// It is compiled for this crate's own unit tests unconditionally, and behind
// the `mock` feature for everyone else.
#[cfg(any(test, feature = "mock"))]
pub mod mock;
