/// Chat client session: one server link driven from the console.
///
/// The session owns at most one link at a time. Each link gets a fresh
/// number, and events from a link that has since been replaced or torn
/// down are dropped.
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::SinkExt;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::codec::CodecError;
use super::command::{ClientCommand, Line};
use super::config::ClientConfig;
use super::console::{Console, ConsoleHandler};
use super::message::Payload;
use super::transport::{self, LineWriter, LinkObserver};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Already connected to server.")]
    AlreadyConnected,
    #[error("Not connected to server.")]
    NotConnected,
    #[error("Can't setup connection to {host}:{port}: {source}")]
    Connect {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },
    #[error("could not send to server: {0}")]
    Send(#[from] CodecError),
}

struct Link {
    id: u64,
    writer: LineWriter,
    reader: JoinHandle<()>,
}

struct State {
    host: String,
    port: u16,
    login_id: String,
    link: Option<Link>,
}

struct Inner {
    state: Mutex<State>,
    /// Number of the live link, 0 when disconnected.
    current: AtomicU64,
    next_link: AtomicU64,
    console: Arc<dyn Console>,
    exit: watch::Sender<Option<u8>>,
}

/// Client side of a chat session. Clones share the same link.
#[derive(Clone)]
pub struct ClientSession {
    inner: Arc<Inner>,
}

impl ClientSession {
    pub fn new(config: ClientConfig, console: Arc<dyn Console>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    host: config.host,
                    port: config.port,
                    login_id: config.login_id,
                    link: None,
                }),
                current: AtomicU64::new(0),
                next_link: AtomicU64::new(1),
                console,
                exit: watch::channel(None).0,
            }),
        }
    }

    pub async fn host(&self) -> String {
        self.inner.state.lock().await.host.clone()
    }

    pub async fn port(&self) -> u16 {
        self.inner.state.lock().await.port
    }

    pub async fn login_id(&self) -> String {
        self.inner.state.lock().await.login_id.clone()
    }

    pub async fn is_connected(&self) -> bool {
        self.inner.state.lock().await.link.is_some()
    }

    /// Connect with the current login ID and send the handshake.
    pub async fn open(&self) -> Result<(), ClientError> {
        let mut state = self.inner.state.lock().await;
        self.open_locked(&mut state).await
    }

    /// Switch to `login_id` and connect.
    pub async fn login(&self, login_id: String) -> Result<(), ClientError> {
        let mut state = self.inner.state.lock().await;
        if state.link.is_some() {
            return Err(ClientError::AlreadyConnected);
        }
        state.login_id = login_id;
        self.open_locked(&mut state).await
    }

    async fn open_locked(&self, state: &mut State) -> Result<(), ClientError> {
        if state.link.is_some() {
            return Err(ClientError::AlreadyConnected);
        }

        let (reader, mut writer) = transport::connect(&state.host, state.port)
            .await
            .map_err(|source| ClientError::Connect {
                host: state.host.clone(),
                port: state.port,
                source,
            })?;
        writer
            .send(Payload::handshake(state.login_id.as_str()).to_wire())
            .await?;

        let id = self.inner.next_link.fetch_add(1, Ordering::Relaxed);
        self.inner.current.store(id, Ordering::Release);
        let reader = transport::spawn_reader(reader, id, self.clone());
        state.link = Some(Link { id, writer, reader });

        info!(link = id, host = %state.host, port = state.port, login_id = %state.login_id, "connected");
        Ok(())
    }

    /// Drop the link but keep the session.
    pub async fn logoff(&self) -> Result<(), ClientError> {
        let link = {
            let mut state = self.inner.state.lock().await;
            self.take_link(&mut state).ok_or(ClientError::NotConnected)?
        };
        disconnect(link).await;
        Ok(())
    }

    /// Send one chat line as typed.
    pub async fn send(&self, text: &str) -> Result<(), ClientError> {
        let mut state = self.inner.state.lock().await;
        let link = state.link.as_mut().ok_or(ClientError::NotConnected)?;
        link.writer.send(text.to_owned()).await?;
        Ok(())
    }

    pub async fn set_host(&self, host: String) -> Result<(), ClientError> {
        let mut state = self.inner.state.lock().await;
        if state.link.is_some() {
            return Err(ClientError::AlreadyConnected);
        }
        state.host = host;
        Ok(())
    }

    pub async fn set_port(&self, port: u16) -> Result<(), ClientError> {
        let mut state = self.inner.state.lock().await;
        if state.link.is_some() {
            return Err(ClientError::AlreadyConnected);
        }
        state.port = port;
        Ok(())
    }

    pub async fn quit(&self) {
        self.inner.console.display("Closing program.");
        self.shutdown(0).await;
    }

    pub async fn execute(&self, command: ClientCommand) {
        let outcome = match command {
            ClientCommand::Quit => {
                self.quit().await;
                Ok(())
            }
            ClientCommand::Logoff => self
                .logoff()
                .await
                .map(|()| self.inner.console.display("Connection closed.")),
            ClientCommand::GetHost => {
                let host = self.host().await;
                self.inner.console.display(&host);
                Ok(())
            }
            ClientCommand::GetPort => {
                let port = self.port().await;
                self.inner.console.display(&port.to_string());
                Ok(())
            }
            ClientCommand::Login(login_id) => self.login(login_id).await,
            ClientCommand::SetHost(host) => self.set_host(host).await,
            ClientCommand::SetPort(port) => self.set_port(port).await,
        };

        if let Err(e) = outcome {
            self.inner.console.display(&format!("Error: {e}"));
        }
    }

    fn is_current(&self, link: u64) -> bool {
        link != 0 && self.inner.current.load(Ordering::Acquire) == link
    }

    fn take_link(&self, state: &mut State) -> Option<Link> {
        let link = state.link.take()?;
        self.inner.current.store(0, Ordering::Release);
        Some(link)
    }
}

/// Stop the reader and flush-close the writer.
async fn disconnect(link: Link) {
    link.reader.abort();
    let mut writer = link.writer;
    if let Err(e) = writer.close().await {
        debug!(link = link.id, "close failed: {e}");
    }
    info!(link = link.id, "disconnected");
}

impl LinkObserver for ClientSession {
    async fn on_message(&self, link: u64, line: String) {
        if self.is_current(link) {
            self.inner.console.display(&line);
        }
    }

    async fn on_closed(&self, link: u64) {
        let taken = {
            let mut state = self.inner.state.lock().await;
            if !self.is_current(link) {
                return;
            }
            self.take_link(&mut state)
        };
        // Runs on the reader task itself, so no abort here.
        drop(taken);
        info!(link, "server closed the connection");
        self.inner.console.display("Connection closed.");
    }

    async fn on_error(&self, link: u64, error: CodecError) {
        let taken = {
            let mut state = self.inner.state.lock().await;
            if !self.is_current(link) {
                return;
            }
            self.take_link(&mut state)
        };
        drop(taken);
        warn!(link, "connection to server failed: {error}");
        self.inner
            .console
            .display("Connection to server was terminated.");
        self.inner.exit.send_replace(Some(0));
    }
}

impl ConsoleHandler for ClientSession {
    async fn handle_line(&self, line: &str) {
        match ClientCommand::parse_line(line) {
            Ok(Line::Blank) => {}
            Ok(Line::Message(text)) => {
                if let Err(e) = self.send(&text).await {
                    warn!("{e}");
                    self.inner
                        .console
                        .display("Could not send message to server. Terminating client.");
                    self.shutdown(0).await;
                }
            }
            Ok(Line::Command(command)) => self.execute(command).await,
            Err(e) => self.inner.console.display(&e.to_string()),
        }
    }

    async fn on_input_closed(&self) {
        self.quit().await;
    }

    async fn shutdown(&self, code: u8) {
        let taken = {
            let mut state = self.inner.state.lock().await;
            self.take_link(&mut state)
        };
        if let Some(link) = taken {
            disconnect(link).await;
        }
        self.inner.exit.send_replace(Some(code));
    }

    fn exit_signal(&self) -> watch::Receiver<Option<u8>> {
        self.inner.exit.subscribe()
    }

    fn console(&self) -> &dyn Console {
        self.inner.console.as_ref()
    }
}
