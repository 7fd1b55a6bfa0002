//! WebSocket-framed port for cross-process bridges.
//!
//! When the untrusted and trusted endpoints live in different processes,
//! the port is carried over a localhost WebSocket: the parent binds and
//! accepts, the child connects. Frames are [`PortMessage`] values as JSON
//! text.
//!
//! # Connection Flow
//!
//! 1. Parent binds a [`PortServer`] to `localhost:0` (random port)
//! 2. Child process is started with the server's `ws_url`
//! 3. Child calls [`connect`], parent's [`PortServer::accept`] resolves
//! 4. Both sides hold an ordinary [`Port`]

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::protocol::PortMessage;

use super::Port;
use super::port::ListenerTable;

// ============================================================================
// Constants
// ============================================================================

/// Timeout for waiting for the child context to connect.
const ACCEPT_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// PortServer
// ============================================================================

/// The parent's half of a WebSocket-framed port, bound but not yet
/// connected.
pub struct PortServer {
    /// TCP listener for the incoming child connection.
    listener: TcpListener,
    /// Port the server is bound to.
    port: u16,
}

impl PortServer {
    /// Binds to the specified address; port 0 picks a random free port.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if binding fails.
    pub async fn bind(ip: IpAddr, port: u16) -> Result<Self> {
        let addr = SocketAddr::new(ip, port);
        let listener = TcpListener::bind(addr).await?;
        let actual_port = listener.local_addr()?.port();

        debug!(port = actual_port, "port server bound");

        Ok(Self {
            listener,
            port: actual_port,
        })
    }

    /// Returns the bound port.
    #[inline]
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Returns the WebSocket URL a child should connect to.
    #[inline]
    #[must_use]
    pub fn ws_url(&self) -> String {
        format!("ws://127.0.0.1:{}", self.port)
    }

    /// Accepts one child connection and upgrades it to a [`Port`].
    ///
    /// # Errors
    ///
    /// - [`Error::ResponseTimeout`]-free: timeouts here surface as
    ///   [`Error::Io`] (no child connected in time)
    /// - [`Error::WebSocket`] if the upgrade fails
    pub async fn accept(self) -> Result<Port> {
        let accept_result = timeout(ACCEPT_TIMEOUT, self.listener.accept()).await;

        let (stream, addr) = accept_result.map_err(|_| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "no child connection",
            ))
        })??;

        debug!(?addr, "TCP connection accepted");

        let ws_stream = tokio_tungstenite::accept_async(stream).await?;

        info!(port = self.port, "bridge socket established");

        Ok(spawn_socket_port(ws_stream))
    }
}

// ============================================================================
// Connect (child side)
// ============================================================================

/// Connects to a parent's [`PortServer`] and returns the child's [`Port`].
///
/// # Errors
///
/// Returns [`Error::WebSocket`] if the connection or handshake fails.
pub async fn connect(url: &str) -> Result<Port> {
    let (ws_stream, _) = tokio_tungstenite::connect_async(url).await?;
    debug!(url, "connected to bridge socket");
    Ok(spawn_socket_port(ws_stream))
}

/// Wraps an established WebSocket stream into a [`Port`] with its own
/// socket event loop.
fn spawn_socket_port<S>(ws_stream: WebSocketStream<S>) -> Port
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (port, outgoing_rx) = Port::new_detached();
    let table = port.listener_table();
    tokio::spawn(run_socket_loop(ws_stream, outgoing_rx, table));
    port
}

/// Socket event loop: outbound frames to the wire, inbound frames to the
/// listener table. Ends on close, error, or when the last port handle
/// drops; pending listeners fail on exit.
async fn run_socket_loop<S>(
    ws_stream: WebSocketStream<S>,
    mut outgoing: mpsc::UnboundedReceiver<PortMessage>,
    table: Arc<Mutex<ListenerTable>>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut ws_write, mut ws_read) = ws_stream.split();

    loop {
        tokio::select! {
            inbound = ws_read.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<PortMessage>(&text) {
                            Ok(message) => Port::deliver(&table, message),
                            Err(e) => warn!(error = %e, "unparseable frame"),
                        }
                    }

                    Some(Ok(Message::Close(_))) => {
                        debug!("socket closed by peer");
                        break;
                    }

                    Some(Err(e)) => {
                        error!(error = %e, "socket error");
                        break;
                    }

                    None => {
                        debug!("socket stream ended");
                        break;
                    }

                    // Ignore Binary, Ping, Pong
                    _ => {}
                }
            }

            outbound = outgoing.recv() => {
                match outbound {
                    Some(message) => {
                        let json = match serde_json::to_string(&message) {
                            Ok(j) => j,
                            Err(e) => {
                                warn!(error = %e, name = %message.name, "frame serialization failed");
                                continue;
                            }
                        };
                        if let Err(e) = ws_write.send(Message::Text(json.into())).await {
                            error!(error = %e, "socket send failed");
                            break;
                        }
                    }

                    None => {
                        debug!("port handles dropped, closing socket");
                        let _ = ws_write.close().await;
                        break;
                    }
                }
            }
        }
    }

    Port::close(&table);
    debug!("socket loop terminated");
}

/// Marker so the connect type is nameable in signatures if needed.
pub type ClientStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ============================================================================
// Tests
// ============================================================================
