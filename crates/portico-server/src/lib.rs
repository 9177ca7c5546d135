//! Wire-level server for the portico bridge.
//!
//! One worker thread per accepted socket runs the receive loop of a
//! [`ClientServerConnection`]: it reads a command name, routes it through the
//! [`Dispatcher`], and lets the matched handler parse the rest of the request
//! and write exactly one response line. The same connection doubles as the
//! outbound path for host-initiated callbacks; while a reply is awaited, any
//! inbound command lines that arrive first are dispatched to completion, which
//! is what makes nested peer ↔ host calls work over a single socket.
//!
//! For deployments where callbacks target a separate peer server instead, the
//! [`CallbackClient`] keeps a small pool of sockets and retries once when a
//! pooled socket has gone stale.
//!
//! Accepting sockets is the embedder's business; this crate starts at an
//! already-connected [`std::net::TcpStream`].

mod callback;
mod commands;
mod connection;
mod io;
mod listener;

pub use callback::{CallbackClient, CallbackClientConfig, DEFAULT_PEER_PORT};
pub use commands::{Command, DispatchOutcome, Dispatcher};
pub use connection::{
    send_peer_command, thread_connection, ClientServerConnection, ConnectionConfig,
};
pub use io::CommandIo;
pub use listener::{Listeners, ServerListener};

/// The `tracing` target used by this crate.
pub const TRACE_TARGET: &str = "portico.server";
