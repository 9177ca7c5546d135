use std::collections::VecDeque;
use std::fmt;
use std::io::{Error, ErrorKind};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use portico_gateway::{NetworkError, PeerClient};
use portico_protocol::is_return_message;

use crate::commands::{DispatchOutcome, Dispatcher};
use crate::connection::{LineChannel, DEFAULT_READ_TIMEOUT};
use crate::io::CommandIo;
use crate::TRACE_TARGET;

/// Port peers conventionally listen on for host-initiated callbacks.
pub const DEFAULT_PEER_PORT: u16 = 25334;

#[derive(Clone)]
pub struct CallbackClientConfig {
    pub address: IpAddr,
    pub port: u16,
    /// Shared secret sent as the first line after connecting. `None`
    /// disables authentication.
    ///
    /// NOTE: secret material; it must never be logged.
    pub auth_token: Option<String>,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl Default for CallbackClientConfig {
    fn default() -> Self {
        Self {
            address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PEER_PORT,
            auth_token: None,
            connect_timeout: Duration::from_secs(5),
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

impl fmt::Debug for CallbackClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackClientConfig")
            .field("address", &self.address)
            .field("port", &self.port)
            .field("auth_present", &self.auth_token.is_some())
            .field("connect_timeout", &self.connect_timeout)
            .field("read_timeout", &self.read_timeout)
            .finish()
    }
}

/// One pooled socket toward the peer's callback server.
struct CallbackConnection {
    channel: LineChannel,
    /// Set after the first successful round trip; a pooled connection that
    /// fails on its next use may simply have gone stale on the peer side.
    used: bool,
}

impl CallbackConnection {
    fn connect(config: &CallbackClientConfig) -> Result<Self, NetworkError> {
        let address = SocketAddr::new(config.address, config.port);
        let socket = TcpStream::connect_timeout(&address, config.connect_timeout)?;
        let _ = socket.set_nodelay(true);
        let channel = LineChannel::new(socket)?;
        if let Some(token) = &config.auth_token {
            channel.write_line(token)?;
        }
        tracing::debug!(target: TRACE_TARGET, event = "callback_connected", %address);
        Ok(Self {
            channel,
            used: false,
        })
    }

    fn send_command(
        &self,
        command: &str,
        blocking: bool,
        dispatcher: Option<&Dispatcher>,
        read_timeout: Duration,
    ) -> Result<String, NetworkError> {
        self.channel.write_text(command)?;
        loop {
            let line = if blocking {
                self.channel.read_line()?
            } else {
                self.channel.read_line_timeout(read_timeout)?
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
            // The peer slipped a nested request in front of its reply.
            let Some(dispatcher) = dispatcher else {
                return Err(NetworkError::Io(Error::new(
                    ErrorKind::InvalidData,
                    format!("unexpected inbound command: {line}"),
                )));
            };
            match dispatcher.dispatch(&line, self)? {
                DispatchOutcome::Handled => {}
                DispatchOutcome::Shutdown => return Err(NetworkError::Closed),
                DispatchOutcome::Unknown => {
                    tracing::warn!(target: TRACE_TARGET, event = "unknown_command", command = %line);
                }
            }
        }
    }

    fn close(&self) {
        self.channel.close();
    }
}

impl CommandIo for CallbackConnection {
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

/// Pooled client toward the peer's callback server, for deployments that
/// do not route callbacks over the duplex connection.
///
/// Connections are reused most-recent-first. A round trip that fails on a
/// previously used (idle-pooled) connection is retried exactly once on a
/// fresh socket; failures on fresh sockets propagate.
pub struct CallbackClient {
    config: CallbackClientConfig,
    dispatcher: Option<Arc<Dispatcher>>,
    pool: Mutex<VecDeque<CallbackConnection>>,
    shut_down: AtomicBool,
}

impl CallbackClient {
    pub fn new(config: CallbackClientConfig) -> Self {
        Self {
            config,
            dispatcher: None,
            pool: Mutex::new(VecDeque::new()),
            shut_down: AtomicBool::new(false),
        }
    }

    /// A client that also serves nested inbound commands arriving while a
    /// reply is awaited.
    pub fn with_dispatcher(config: CallbackClientConfig, dispatcher: Arc<Dispatcher>) -> Self {
        let mut client = Self::new(config);
        client.dispatcher = Some(dispatcher);
        client
    }

    pub fn config(&self) -> &CallbackClientConfig {
        &self.config
    }

    fn borrow_connection(&self) -> Result<CallbackConnection, NetworkError> {
        if let Some(connection) = self.pool.lock().pop_back() {
            return Ok(connection);
        }
        CallbackConnection::connect(&self.config)
    }

    fn return_connection(&self, mut connection: CallbackConnection) {
        connection.used = true;
        if self.shut_down.load(Ordering::SeqCst) {
            connection.close();
            return;
        }
        self.pool.lock().push_back(connection);
    }

    fn round_trip(&self, command: &str, blocking: bool) -> Result<String, NetworkError> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(NetworkError::Closed);
        }

        let connection = self.borrow_connection()?;
        let pooled = connection.used;
        match connection.send_command(
            command,
            blocking,
            self.dispatcher.as_deref(),
            self.config.read_timeout,
        ) {
            Ok(reply) => {
                self.return_connection(connection);
                Ok(reply)
            }
            Err(error) if pooled => {
                // A pooled socket may have been closed by the peer while
                // idle; retry once on a fresh one.
                tracing::debug!(
                    target: TRACE_TARGET,
                    event = "retry_on_fresh_connection",
                    error = %error
                );
                connection.close();
                let fresh = CallbackConnection::connect(&self.config)?;
                match fresh.send_command(
                    command,
                    blocking,
                    self.dispatcher.as_deref(),
                    self.config.read_timeout,
                ) {
                    Ok(reply) => {
                        self.return_connection(fresh);
                        Ok(reply)
                    }
                    Err(error) => {
                        fresh.close();
                        Err(error)
                    }
                }
            }
            Err(error) => {
                connection.close();
                Err(error)
            }
        }
    }

    fn close_pool(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
        let mut pool = self.pool.lock();
        for connection in pool.drain(..) {
            connection.close();
        }
        tracing::info!(target: TRACE_TARGET, event = "callback_client_stopped");
    }
}

impl PeerClient for CallbackClient {
    fn send_command_with(&self, command: &str, blocking: bool) -> Result<String, NetworkError> {
        self.round_trip(command, blocking)
    }

    fn shutdown(&self) {
        self.close_pool();
    }

    fn copy_with(&self, address: IpAddr, port: u16) -> Arc<dyn PeerClient> {
        let config = CallbackClientConfig {
            address,
            port,
            ..self.config.clone()
        };
        Arc::new(match &self.dispatcher {
            Some(dispatcher) => Self::with_dispatcher(config, dispatcher.clone()),
            None => Self::new(config),
        })
    }

    fn address(&self) -> IpAddr {
        self.config.address
    }

    fn port(&self) -> u16 {
        self.config.port
    }
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::sync::atomic::AtomicUsize;

    use pretty_assertions::assert_eq;

    use super::*;

    /// A scripted peer callback server: for each accepted connection, runs
    /// `serve` once and closes the socket.
    fn peer_server(
        serve: impl Fn(usize, BufReader<TcpStream>, TcpStream) + Send + 'static,
    ) -> (CallbackClientConfig, std::thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = std::thread::spawn(move || {
            let connections = AtomicUsize::new(0);
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                let index = connections.fetch_add(1, Ordering::SeqCst);
                let reader = BufReader::new(stream.try_clone().unwrap());
                serve(index, reader, stream);
            }
        });
        let config = CallbackClientConfig {
            port,
            connect_timeout: Duration::from_secs(1),
            read_timeout: Duration::from_secs(1),
            ..CallbackClientConfig::default()
        };
        (config, handle)
    }

    fn read_request(reader: &mut BufReader<TcpStream>) -> Vec<String> {
        let mut lines = Vec::new();
        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).unwrap() == 0 {
                break;
            }
            let line = line.trim_end().to_string();
            let done = line == "e";
            lines.push(line);
            if done {
                break;
            }
        }
        lines
    }

    #[test]
    fn round_trip_returns_the_reply_payload() {
        let (config, _server) = peer_server(|_, mut reader, mut stream| {
            let request = read_request(&mut reader);
            assert_eq!(request.last().map(String::as_str), Some("e"));
            stream.write_all(b"ysok\n").unwrap();
        });
        let client = CallbackClient::new(config);
        assert_eq!(
            client.send_command("c\ncall\nrun\np0\ne\n").unwrap(),
            "sok"
        );
        client.shutdown();
    }

    #[test]
    fn empty_reply_raises_a_network_error() {
        let (config, _server) = peer_server(|_, mut reader, stream| {
            let _ = read_request(&mut reader);
            drop(stream);
        });
        let client = CallbackClient::new(config);
        assert!(matches!(
            client.send_command("c\ncall\nrun\np0\ne\n"),
            Err(NetworkError::EmptyResponse)
        ));
        client.shutdown();
    }

    #[test]
    fn stale_pooled_sockets_are_retried_once() {
        // The scripted peer answers one command per connection and then
        // closes, so the pooled socket is always stale on its second use.
        let (config, _server) = peer_server(|index, mut reader, mut stream| {
            let _ = read_request(&mut reader);
            stream.write_all(format!("ysreply{index}\n").as_bytes()).unwrap();
        });
        let client = CallbackClient::new(config);
        assert_eq!(client.send_command("c\nfirst\ne\n").unwrap(), "sreply0");
        // Second round trip borrows the stale pooled connection, fails, and
        // succeeds on a fresh socket.
        assert_eq!(client.send_command("c\nsecond\ne\n").unwrap(), "sreply1");
        client.shutdown();
    }

    #[test]
    fn copy_with_targets_the_new_endpoint() {
        let (config, _server) = peer_server(|_, mut reader, mut stream| {
            let _ = read_request(&mut reader);
            stream.write_all(b"ysother\n").unwrap();
        });
        let original = CallbackClient::new(CallbackClientConfig {
            port: 1,
            ..config.clone()
        });
        let copied = original.copy_with(config.address, config.port);
        assert_eq!(copied.port(), config.port);
        assert_eq!(copied.send_command("c\nx\ne\n").unwrap(), "sother");
        copied.shutdown();
    }

    #[test]
    fn non_blocking_sends_give_up_after_the_read_timeout() {
        let (config, _server) = peer_server(|_, mut reader, stream| {
            let _ = read_request(&mut reader);
            // Never reply; hold the socket open past the client's timeout.
            std::thread::sleep(Duration::from_secs(2));
            drop(stream);
        });
        let client = CallbackClient::new(CallbackClientConfig {
            read_timeout: Duration::from_millis(50),
            ..config
        });
        assert!(matches!(
            client.send_command_with("c\nslow\ne\n", false),
            Err(NetworkError::Io(_))
        ));
        client.shutdown();
    }

    #[test]
    fn auth_token_is_sent_first() {
        let (config, _server) = peer_server(|_, mut reader, mut stream| {
            let mut token = String::new();
            reader.read_line(&mut token).unwrap();
            assert_eq!(token.trim_end(), "sesame");
            let _ = read_request(&mut reader);
            stream.write_all(b"yv\n").unwrap();
        });
        let client = CallbackClient::new(CallbackClientConfig {
            auth_token: Some("sesame".to_string()),
            ..config
        });
        assert_eq!(client.send_command("g\nrelease\no1\ne\n").unwrap(), "v");
        client.shutdown();
    }
}
