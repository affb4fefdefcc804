/// TCP transport for both ends of a chat connection.
///
/// The chat core never touches sockets directly. On the server side it
/// implements [`ConnectionObserver`] and drives a [`TransportController`];
/// on the client side it implements [`LinkObserver`] and writes through a
/// [`LineWriter`].
use std::future::Future;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::SinkExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_util::codec::{Framed, FramedRead, FramedWrite};
use tracing::{debug, info, warn};

use super::codec::{CodecError, LineCodec};
use super::registry::ConnectionId;

/// Something queued for delivery on one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Write one line.
    Line(String),
    /// Close the connection once everything queued before it is written.
    Close,
}

/// Callbacks the server side receives from the transport.
///
/// For every accepted connection, `on_connected` fires first, then any
/// number of `on_message`, then exactly one of `on_disconnected` or
/// `on_transport_error`.
pub trait ConnectionObserver: Clone + Send + Sync + 'static {
    fn on_connected(
        &self,
        conn: ConnectionId,
        addr: SocketAddr,
        outbound: mpsc::UnboundedSender<Outbound>,
    ) -> impl Future<Output = ()> + Send;

    fn on_message(&self, conn: ConnectionId, line: String) -> impl Future<Output = ()> + Send;

    fn on_disconnected(&self, conn: ConnectionId) -> impl Future<Output = ()> + Send;

    fn on_transport_error(
        &self,
        conn: ConnectionId,
        error: CodecError,
    ) -> impl Future<Output = ()> + Send;

    fn on_listen_started(&self, _addr: SocketAddr) {}

    fn on_listen_stopped(&self) {}

    fn on_server_closed(&self) {}
}

/// Server-wide transport state the console can drive.
pub trait TransportController: Send + Sync + 'static {
    /// Start accepting connections on `port`, reporting them to `observer`.
    /// Returns the bound address.
    fn listen<O: ConnectionObserver>(
        &mut self,
        port: u16,
        observer: O,
    ) -> impl Future<Output = io::Result<SocketAddr>> + Send;

    /// Stop accepting new connections. Existing connections are untouched.
    /// Resolves once the accept loop has exited.
    fn stop_listening(&mut self) -> impl Future<Output = ()> + Send;

    fn is_listening(&self) -> bool;
}

// ── Server side ──────────────────────────────────────────────────

struct ListenerHandle {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// [`TransportController`] over a tokio `TcpListener`.
pub struct TcpTransport {
    bind_ip: IpAddr,
    listener: Option<ListenerHandle>,
    next_id: Arc<AtomicU64>,
}

impl TcpTransport {
    pub fn new(bind_ip: IpAddr) -> Self {
        Self {
            bind_ip,
            listener: None,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }
}

impl TransportController for TcpTransport {
    async fn listen<O: ConnectionObserver>(
        &mut self,
        port: u16,
        observer: O,
    ) -> io::Result<SocketAddr> {
        // Bind first, so we fail fast on port conflicts.
        let listener = TcpListener::bind((self.bind_ip, port)).await?;
        let addr = listener.local_addr()?;
        observer.on_listen_started(addr);

        let (stop, stop_rx) = oneshot::channel();
        let task = tokio::spawn(accept_loop(
            listener,
            observer,
            Arc::clone(&self.next_id),
            stop_rx,
        ));
        self.listener = Some(ListenerHandle { stop, task });
        Ok(addr)
    }

    async fn stop_listening(&mut self) {
        if let Some(handle) = self.listener.take() {
            let _ = handle.stop.send(());
            if let Err(e) = handle.task.await {
                warn!("accept loop ended abnormally: {e}");
            }
        }
    }

    fn is_listening(&self) -> bool {
        self.listener
            .as_ref()
            .is_some_and(|handle| !handle.task.is_finished())
    }
}

/// Accept loop for a single listener.
async fn accept_loop<O: ConnectionObserver>(
    listener: TcpListener,
    observer: O,
    next_id: Arc<AtomicU64>,
    mut stop: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = &mut stop => break,
            accepted = listener.accept() => match accepted {
                Ok((socket, addr)) => {
                    let conn = ConnectionId(next_id.fetch_add(1, Ordering::Relaxed));
                    info!(%addr, %conn, "new connection");
                    tokio::spawn(serve_connection(socket, addr, conn, observer.clone()));
                }
                Err(e) => {
                    warn!("accept error, no longer listening: {e}");
                    break;
                }
            },
        }
    }
    observer.on_listen_stopped();
}

/// Pump one accepted connection until it closes.
///
/// Inbound lines go to the observer in arrival order. Outbound items
/// queued through the sender handed out in `on_connected` are written
/// in queue order.
pub async fn serve_connection<O: ConnectionObserver>(
    socket: TcpStream,
    addr: SocketAddr,
    conn: ConnectionId,
    observer: O,
) {
    let mut framed = Framed::new(socket, LineCodec);
    let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();
    observer.on_connected(conn, addr, tx).await;

    let failure = loop {
        tokio::select! {
            frame = framed.next() => match frame {
                Some(Ok(line)) => observer.on_message(conn, line).await,
                Some(Err(e)) => break Some(e),
                None => break None, // Connection closed.
            },

            Some(out) = rx.recv() => match out {
                Outbound::Line(line) => {
                    if let Err(e) = framed.send(line).await {
                        break Some(e);
                    }
                }
                Outbound::Close => {
                    debug!(%conn, "closing on request");
                    break None;
                }
            },
        }
    };

    match failure {
        Some(e) => observer.on_transport_error(conn, e).await,
        None => observer.on_disconnected(conn).await,
    }
}

// ── Client side ──────────────────────────────────────────────────

pub type LineReader = FramedRead<OwnedReadHalf, LineCodec>;
pub type LineWriter = FramedWrite<OwnedWriteHalf, LineCodec>;

/// Callbacks the client side receives for one server link.
///
/// `link` identifies which connection the event belongs to, so events
/// from a link that was already replaced can be ignored.
pub trait LinkObserver: Clone + Send + Sync + 'static {
    fn on_message(&self, link: u64, line: String) -> impl Future<Output = ()> + Send;

    fn on_closed(&self, link: u64) -> impl Future<Output = ()> + Send;

    fn on_error(&self, link: u64, error: CodecError) -> impl Future<Output = ()> + Send;
}

/// Open a connection to the server.
pub async fn connect(host: &str, port: u16) -> io::Result<(LineReader, LineWriter)> {
    let stream = TcpStream::connect((host, port)).await?;
    let (read_half, write_half) = stream.into_split();
    Ok((
        FramedRead::new(read_half, LineCodec),
        FramedWrite::new(write_half, LineCodec),
    ))
}

/// Spawn the task that delivers server lines to `observer`.
pub fn spawn_reader<O: LinkObserver>(mut reader: LineReader, link: u64, observer: O) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match reader.next().await {
                Some(Ok(line)) => observer.on_message(link, line).await,
                Some(Err(e)) => {
                    observer.on_error(link, e).await;
                    break;
                }
                None => {
                    observer.on_closed(link).await;
                    break;
                }
            }
        }
    })
}
