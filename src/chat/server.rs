/// Chat server core and the operator console.
///
/// [`ServerSession`] is what the transport talks to: it registers each
/// connection, accepts exactly one `#loginID` handshake per connection,
/// and relays chat to every logged-in connection. [`ServerConsole`] is
/// what the operator talks to: it starts and stops the listener and can
/// shut everyone out.
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info, warn};

use super::codec::CodecError;
use super::command::{Line, ServerCommand};
use super::console::{Console, ConsoleHandler};
use super::message::{self, ParseError, Payload};
use super::registry::{ConnectionId, HandshakeError, Registry, SharedRegistry};
use super::transport::{ConnectionObserver, Outbound, TransportController};

/// Protocol side of the server. Cheap to clone; clones share one registry.
#[derive(Debug, Clone, Default)]
pub struct ServerSession {
    registry: SharedRegistry,
}

impl ServerSession {
    pub fn new() -> Self {
        Self {
            registry: Registry::shared(),
        }
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    /// Send `line` to every logged-in connection.
    pub async fn broadcast(&self, line: &str) -> usize {
        // Write lock: concurrent broadcasts must not interleave per recipient.
        self.registry.write().await.broadcast(line)
    }

    /// Ask every connection to close.
    pub async fn close_all(&self) -> usize {
        self.registry.write().await.close_all()
    }

    /// Drop a connection from the registry and tell the others it left.
    async fn depart(&self, conn: ConnectionId) {
        let mut registry = self.registry.write().await;
        let Some(gone) = registry.remove(conn) else {
            return;
        };

        match gone.login_id {
            Some(login_id) => {
                let lasted = Utc::now() - gone.connected_at;
                info!(
                    %conn,
                    %login_id,
                    lasted_secs = lasted.num_seconds(),
                    online = registry.connection_count(),
                    "has disconnected"
                );
                registry.broadcast(&message::disconnected(&login_id));
            }
            None => info!(%conn, addr = %gone.addr, "disconnected before logging in"),
        }
    }
}

/// Answer one connection with `reply`, then close it.
fn reject(registry: &Registry, conn: ConnectionId, reply: &str) {
    if !registry.send_to(conn, reply) {
        debug!(%conn, "rejected connection already gone");
    }
    registry.close(conn);
}

impl ConnectionObserver for ServerSession {
    async fn on_connected(
        &self,
        conn: ConnectionId,
        addr: SocketAddr,
        outbound: mpsc::UnboundedSender<Outbound>,
    ) {
        self.registry.write().await.register(conn, addr, outbound);
        info!(%conn, %addr, "a client is connecting");
    }

    async fn on_message(&self, conn: ConnectionId, line: String) {
        let mut registry = self.registry.write().await;
        info!(
            %conn,
            login_id = %registry.login_id(conn).unwrap_or("-"),
            payload = %line,
            "message received"
        );

        match Payload::parse(&line) {
            Ok(Payload::Handshake { login_id }) => match registry.authorize(conn, &login_id) {
                Ok(()) => {
                    info!(%conn, %login_id, online = registry.connection_count(), "logged on");
                    registry.broadcast(&message::logged_on(&login_id));
                }
                Err(HandshakeError::UnknownConnection(_)) => {
                    warn!(%conn, "handshake on unregistered connection");
                }
                Err(e) => {
                    warn!(%conn, "handshake rejected: {e}");
                    reject(&registry, conn, message::ALREADY_CONNECTED);
                }
            },

            Ok(Payload::Chat(text)) => match registry.login_id(conn).map(str::to_owned) {
                Some(login_id) => {
                    registry.broadcast(&message::relayed(&login_id, &text));
                }
                None => {
                    warn!(%conn, "chat before handshake");
                    reject(&registry, conn, message::NOT_LOGGED_IN);
                }
            },

            Err(ParseError::MissingLoginId) => {
                warn!(%conn, "handshake without login ID");
                reject(&registry, conn, message::MISSING_LOGIN_ID);
            }
        }
    }

    async fn on_disconnected(&self, conn: ConnectionId) {
        self.depart(conn).await;
    }

    async fn on_transport_error(&self, conn: ConnectionId, error: CodecError) {
        warn!(%conn, "connection error: {error}");
        self.depart(conn).await;
    }

    fn on_listen_started(&self, addr: SocketAddr) {
        info!(%addr, "server listening for connections");
    }

    fn on_listen_stopped(&self) {
        info!("server has stopped listening for connections");
    }

    fn on_server_closed(&self) {
        info!("server closed");
    }
}

// ── Operator console ─────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("server is already listening for connections")]
    AlreadyListening,
    #[error("cannot change port while listening")]
    PortLocked,
    #[error("could not listen for clients: {0}")]
    Listen(#[source] io::Error),
}

struct Control<T> {
    transport: T,
    port: u16,
}

/// The server console: operator commands over a [`TransportController`].
pub struct ServerConsole<T> {
    session: ServerSession,
    control: Mutex<Control<T>>,
    console: Arc<dyn Console>,
    exit: watch::Sender<Option<u8>>,
}

impl<T: TransportController> ServerConsole<T> {
    pub fn new(session: ServerSession, transport: T, port: u16, console: Arc<dyn Console>) -> Self {
        Self {
            session,
            control: Mutex::new(Control { transport, port }),
            console,
            exit: watch::channel(None).0,
        }
    }

    pub fn session(&self) -> &ServerSession {
        &self.session
    }

    pub async fn port(&self) -> u16 {
        self.control.lock().await.port
    }

    pub async fn is_listening(&self) -> bool {
        self.control.lock().await.transport.is_listening()
    }

    /// Start accepting connections on the configured port.
    pub async fn start(&self) -> Result<SocketAddr, ServerError> {
        let mut control = self.control.lock().await;
        if control.transport.is_listening() {
            return Err(ServerError::AlreadyListening);
        }
        let port = control.port;
        control
            .transport
            .listen(port, self.session.clone())
            .await
            .map_err(ServerError::Listen)
    }

    /// Change the port used by the next `start`.
    pub async fn set_port(&self, port: u16) -> Result<(), ServerError> {
        let mut control = self.control.lock().await;
        if control.transport.is_listening() {
            return Err(ServerError::PortLocked);
        }
        control.port = port;
        Ok(())
    }

    /// Stop accepting connections and warn everyone. Existing
    /// connections stay open.
    pub async fn stop(&self) {
        self.control.lock().await.transport.stop_listening().await;
        for line in message::STOP_WARNING {
            self.session.broadcast(line).await;
        }
    }

    /// Stop accepting connections and force everyone off.
    pub async fn close(&self) {
        self.control.lock().await.transport.stop_listening().await;
        {
            let registry = self.session.registry.write().await;
            registry.broadcast(message::ABNORMAL_TERMINATION);
            let closed = registry.close_all();
            info!(closed, "closed all connections");
        }
        self.session.on_server_closed();
    }

    pub async fn execute(&self, command: ServerCommand) {
        match command {
            ServerCommand::Quit => {
                self.console.display("Closing program.");
                self.shutdown(0).await;
            }
            ServerCommand::Stop => self.stop().await,
            ServerCommand::Close => self.close().await,
            ServerCommand::GetPort => {
                let port = self.port().await;
                self.console.display(&port.to_string());
            }
            ServerCommand::Start => match self.start().await {
                Ok(_) => {}
                Err(ServerError::AlreadyListening) => self
                    .console
                    .display("Error: server is already listening for connections."),
                Err(e) => {
                    warn!("{e}");
                    self.console.display("ERROR - Could not listen for clients!");
                }
            },
            ServerCommand::SetPort(port) => match self.set_port(port).await {
                Ok(()) => self.console.display(&format!("Port set to: {port}")),
                Err(e) => self.console.display(&format!("Error: {e}.")),
            },
        }
    }
}

impl<T: TransportController> ConsoleHandler for ServerConsole<T> {
    async fn handle_line(&self, line: &str) {
        match ServerCommand::parse_line(line) {
            Ok(Line::Blank) => {}
            Ok(Line::Message(text)) => {
                let line = message::server_message(&text);
                self.console.display(&line);
                self.session.broadcast(&line).await;
            }
            Ok(Line::Command(command)) => self.execute(command).await,
            Err(e) => self.console.display(&e.to_string()),
        }
    }

    async fn on_input_closed(&self) {
        info!("console input closed, serving until terminated");
    }

    async fn shutdown(&self, code: u8) {
        self.control.lock().await.transport.stop_listening().await;
        self.session.close_all().await;
        self.session.on_server_closed();
        self.exit.send_replace(Some(code));
    }

    fn exit_signal(&self) -> watch::Receiver<Option<u8>> {
        self.exit.subscribe()
    }

    fn console(&self) -> &dyn Console {
        self.console.as_ref()
    }
}
