use std::cell::RefCell;
use std::fmt;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use portico_gateway::{NetworkError, PeerClient};
use portico_protocol::{is_return_message, ReturnObject};

use crate::commands::{DispatchOutcome, Dispatcher};
use crate::io::CommandIo;
use crate::listener::Listeners;
use crate::TRACE_TARGET;

/// Bounded wait used by non-blocking sends before giving up on a reply.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Clone)]
pub struct ConnectionConfig {
    /// Shared secret the peer must send as its first line. `None` disables
    /// authentication.
    ///
    /// NOTE: secret material; it must never be logged.
    pub auth_token: Option<String>,
    /// Reply wait for non-blocking sends.
    pub read_timeout: Duration,
    /// Answer unknown command names with a protocol-error envelope instead
    /// of staying silent. Off by default: silent logging is the historical
    /// behavior and peers may not expect a reply line.
    pub reply_on_unknown_command: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            auth_token: None,
            read_timeout: DEFAULT_READ_TIMEOUT,
            reply_on_unknown_command: false,
        }
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("auth_required", &self.auth_token.is_some())
            .field("read_timeout", &self.read_timeout)
            .field("reply_on_unknown_command", &self.reply_on_unknown_command)
            .finish()
    }
}

struct ChannelIo {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
}

/// Buffered line transport over one socket.
///
/// Every method locks for exactly one read or write, so a caller may hold a
/// reference across a nested operation on the same thread without
/// deadlocking; only one logical operation is ever in flight per socket.
pub(crate) struct LineChannel {
    socket: TcpStream,
    io: Mutex<ChannelIo>,
}

impl LineChannel {
    pub(crate) fn new(socket: TcpStream) -> std::io::Result<Self> {
        let reader = BufReader::new(socket.try_clone()?);
        let writer = BufWriter::new(socket.try_clone()?);
        Ok(Self {
            socket,
            io: Mutex::new(ChannelIo { reader, writer }),
        })
    }

    pub(crate) fn read_line(&self) -> Result<Option<String>, NetworkError> {
        let mut line = String::new();
        let read = self.io.lock().reader.read_line(&mut line)?;
        if read == 0 {
            return Ok(None);
        }
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(Some(line))
    }

    /// Bounded read used by non-blocking sends. The socket is restored to
    /// blocking mode before control returns, error paths included.
    pub(crate) fn read_line_timeout(
        &self,
        timeout: Duration,
    ) -> Result<Option<String>, NetworkError> {
        self.socket.set_read_timeout(Some(timeout))?;
        let result = self.read_line();
        let restored = self.socket.set_read_timeout(None);
        let line = result?;
        restored?;
        Ok(line)
    }

    pub(crate) fn write_line(&self, line: &str) -> Result<(), NetworkError> {
        let mut io = self.io.lock();
        io.writer.write_all(line.as_bytes())?;
        io.writer.write_all(b"\n")?;
        io.writer.flush()?;
        Ok(())
    }

    /// Writes pre-framed request text (already carrying its newlines).
    pub(crate) fn write_text(&self, text: &str) -> Result<(), NetworkError> {
        let mut io = self.io.lock();
        io.writer.write_all(text.as_bytes())?;
        io.writer.flush()?;
        Ok(())
    }

    pub(crate) fn read_exact(&self, buf: &mut [u8]) -> Result<(), NetworkError> {
        self.io.lock().reader.read_exact(buf)?;
        Ok(())
    }

    pub(crate) fn write_all_bytes(&self, bytes: &[u8]) -> Result<(), NetworkError> {
        let mut io = self.io.lock();
        io.writer.write_all(bytes)?;
        io.writer.flush()?;
        Ok(())
    }

    pub(crate) fn close(&self) {
        let _ = self.socket.shutdown(Shutdown::Both);
    }
}

thread_local! {
    static THREAD_CONNECTION: RefCell<Option<Arc<ClientServerConnection>>> = RefCell::new(None);
}

/// The duplex connection bound to the current thread, if its receive loop
/// is running here.
pub fn thread_connection() -> Option<Arc<ClientServerConnection>> {
    THREAD_CONNECTION.with(|slot| slot.borrow().clone())
}

fn bind_to_thread(connection: &Arc<ClientServerConnection>) {
    THREAD_CONNECTION.with(|slot| *slot.borrow_mut() = Some(connection.clone()));
}

fn clear_thread_binding() {
    THREAD_CONNECTION.with(|slot| *slot.borrow_mut() = None);
}

/// Routes an outgoing peer command to the duplex connection bound to this
/// thread, so nested calls land on the peer-side call stack that is already
/// waiting on us. Threads with no bound connection fall back to the pooled
/// client.
pub fn send_peer_command(
    fallback: Option<&Arc<dyn PeerClient>>,
    command: &str,
) -> Result<String, NetworkError> {
    if let Some(connection) = thread_connection() {
        return connection.send_command(command, true);
    }
    match fallback {
        Some(client) => client.send_command(command),
        None => Err(NetworkError::Closed),
    }
}

/// One socket serving both directions: inbound peer requests and outbound
/// host-initiated callbacks, with reentrant nesting.
///
/// The receive loop reads a command name and dispatches it. An outbound
/// [`ClientServerConnection::send_command`] writes a request and then keeps
/// dispatching any inbound command lines that arrive on the same socket
/// until the actual reply (a line starting with the return marker) shows
/// up; the peer's replies and nested requests arrive in strict line order.
pub struct ClientServerConnection {
    channel: LineChannel,
    dispatcher: Arc<Dispatcher>,
    config: ConnectionConfig,
    listeners: Listeners,
    used: AtomicBool,
    initiated_from_client: bool,
    shut_down: AtomicBool,
}

impl ClientServerConnection {
    pub fn new(
        socket: TcpStream,
        dispatcher: Arc<Dispatcher>,
        config: ConnectionConfig,
        listeners: Listeners,
    ) -> std::io::Result<Self> {
        let _ = socket.set_nodelay(true);
        Ok(Self {
            channel: LineChannel::new(socket)?,
            dispatcher,
            config,
            listeners,
            used: AtomicBool::new(false),
            initiated_from_client: false,
            shut_down: AtomicBool::new(false),
        })
    }

    /// Marks a connection that was opened by the peer for callbacks, as
    /// opposed to one accepted by the host server. Pool bookkeeping only.
    pub fn set_initiated_from_client(&mut self, initiated_from_client: bool) {
        self.initiated_from_client = initiated_from_client;
    }

    pub fn is_initiated_from_client(&self) -> bool {
        self.initiated_from_client
    }

    pub fn set_used(&self, used: bool) {
        self.used.store(used, Ordering::SeqCst);
    }

    pub fn was_used(&self) -> bool {
        self.used.load(Ordering::SeqCst)
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Starts the receive loop on its own worker thread.
    pub fn spawn(self: Arc<Self>) -> thread::JoinHandle<()> {
        thread::spawn(move || self.serve())
    }

    /// Runs the receive loop on the current thread, binding the connection
    /// to it for the duration so nested callbacks reuse this socket.
    pub fn serve(self: Arc<Self>) {
        bind_to_thread(&self);
        self.listeners.connection_started();
        if let Err(error) = self.wait_for_commands() {
            tracing::warn!(target: TRACE_TARGET, event = "receive_loop_failed", error = %error);
        }
        clear_thread_binding();
        self.shutdown();
    }

    fn wait_for_commands(&self) -> Result<(), NetworkError> {
        if !self.authenticate()? {
            return Ok(());
        }
        tracing::info!(target: TRACE_TARGET, event = "connection_ready");
        loop {
            let Some(line) = self.channel.read_line()? else {
                break;
            };
            tracing::debug!(target: TRACE_TARGET, event = "command_received", command = %line);
            match self.dispatcher.dispatch(&line, self) {
                Ok(DispatchOutcome::Handled) => {}
                Ok(DispatchOutcome::Shutdown) => break,
                Ok(DispatchOutcome::Unknown) => self.on_unknown_command(&line)?,
                Err(error) => {
                    // The peer may still be waiting on a reply for the
                    // command that broke; answer best-effort before closing.
                    let _ = self
                        .channel
                        .write_line(&ReturnObject::protocol_error().encode());
                    return Err(error);
                }
            }
        }
        Ok(())
    }

    fn authenticate(&self) -> Result<bool, NetworkError> {
        let Some(expected) = &self.config.auth_token else {
            return Ok(true);
        };
        match self.channel.read_line()? {
            Some(provided) if &provided == expected => {
                tracing::debug!(target: TRACE_TARGET, event = "auth_ok");
                Ok(true)
            }
            _ => {
                // Close without a response. The token itself is never
                // logged.
                tracing::warn!(target: TRACE_TARGET, event = "auth_failed");
                Ok(false)
            }
        }
    }

    fn on_unknown_command(&self, command: &str) -> Result<(), NetworkError> {
        tracing::warn!(target: TRACE_TARGET, event = "unknown_command", command = %command);
        if self.config.reply_on_unknown_command {
            self.channel
                .write_line(&ReturnObject::protocol_error().encode())?;
        }
        Ok(())
    }

    /// Sends a pre-framed command to the peer and waits for its reply,
    /// dispatching any nested inbound commands that arrive first. Returns
    /// the reply line with its leading return marker stripped.
    pub fn send_command(&self, command: &str, blocking: bool) -> Result<String, NetworkError> {
        tracing::debug!(
            target: TRACE_TARGET,
            event = "send_command",
            bytes = command.len(),
            blocking
        );
        self.channel.write_text(command)?;
        loop {
            let line = if blocking {
                self.channel.read_line()?
            } else {
                self.channel.read_line_timeout(self.config.read_timeout)?
            };
            let Some(line) = line else {
                return Err(NetworkError::EmptyResponse);
            };
            if line.trim().is_empty() {
                return Err(NetworkError::EmptyResponse);
            }
            if is_return_message(&line) {
                return Ok(line[1..].to_string());
            }
            match self.dispatcher.dispatch(&line, self)? {
                DispatchOutcome::Handled => {}
                DispatchOutcome::Shutdown => return Err(NetworkError::Closed),
                DispatchOutcome::Unknown => self.on_unknown_command(&line)?,
            }
        }
    }

    /// Closes the socket; a blocked receive loop wakes with an error it
    /// treats as normal termination. Fires `connection_stopped` once.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.channel.close();
        tracing::info!(target: TRACE_TARGET, event = "connection_stopped");
        self.listeners.connection_stopped();
    }
}

impl CommandIo for ClientServerConnection {
    fn read_line(&self) -> Result<Option<String>, NetworkError> {
        self.channel.read_line()
    }

    fn write_line(&self, line: &str) -> Result<(), NetworkError> {
        self.channel.write_line(line)
    }

    fn read_bytes(&self, buf: &mut [u8]) -> Result<(), NetworkError> {
        self.channel.read_exact(buf)
    }

    fn write_bytes(&self, bytes: &[u8]) -> Result<(), NetworkError> {
        self.channel.write_all_bytes(bytes)
    }
}
