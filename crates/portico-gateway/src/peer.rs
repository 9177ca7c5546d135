use std::net::IpAddr;
use std::sync::Arc;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("received an empty response")]
    EmptyResponse,

    #[error("connection is closed")]
    Closed,
}

/// Client used to send commands to the peer process (callbacks into
/// peer-side code, proxy garbage collection, and so on).
///
/// Implementations live with the transport; the gateway only holds the
/// capability so host code reached through reflection can call back out.
pub trait PeerClient: Send + Sync {
    /// Sends a command and waits for the reply payload (the response line
    /// with its leading marker stripped).
    fn send_command(&self, command: &str) -> Result<String, NetworkError> {
        self.send_command_with(command, true)
    }

    /// Like [`PeerClient::send_command`]; `blocking = false` bounds the
    /// reply wait with the configured read timeout.
    fn send_command_with(&self, command: &str, blocking: bool) -> Result<String, NetworkError>;

    /// Closes every connection held by the client.
    fn shutdown(&self);

    /// A client against a different peer endpoint, sharing authentication
    /// and configuration with this one.
    fn copy_with(&self, address: IpAddr, port: u16) -> Arc<dyn PeerClient>;

    fn address(&self) -> IpAddr;

    fn port(&self) -> u16;
}
