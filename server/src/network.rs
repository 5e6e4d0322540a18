//! Server network layer: WebSocket accept loop and per-connection tasks

use crate::channel::{self, OutboxReceiver};
use crate::client_manager::ConnectionId;
use crate::lobby::Lobby;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::hexgrid::DEFAULT_MAX_RADIUS;
use shared::IntegrityError;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{accept_async, WebSocketStream};

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;
type WsStream = SplitStream<WebSocketStream<TcpStream>>;

/// Runtime settings for [`Server`]
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Largest board radius accepted from a client descriptor
    pub max_radius: u32,
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            max_radius: DEFAULT_MAX_RADIUS,
        }
    }
}

/// Reasons a connection task ends abnormally
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    #[error(transparent)]
    Integrity(#[from] IntegrityError),
}

/// Accepts WebSocket connections and wires each one to the lobby
pub struct Server {
    listener: TcpListener,
    lobby: Arc<Lobby>,
}

impl Server {
    pub async fn new(config: &ServerConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(config.addr()).await?;
        info!("Server listening on {}", listener.local_addr()?);

        Ok(Server {
            listener,
            lobby: Arc::new(Lobby::new(config.max_radius)),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn lobby(&self) -> Arc<Lobby> {
        Arc::clone(&self.lobby)
    }

    /// Accept loop; each connection runs in its own task
    ///
    /// Failed accepts are logged and skipped; the loop runs until the future
    /// is dropped.
    pub async fn run(self) -> std::io::Result<()> {
        info!("Server started successfully");

        loop {
            let (stream, addr) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    continue;
                }
            };

            let lobby = Arc::clone(&self.lobby);
            tokio::spawn(async move {
                if let Err(e) = handle_connection(lobby, stream, addr).await {
                    error!("Connection from {} failed: {}", addr, e);
                }
            });
        }
    }
}

async fn handle_connection(
    lobby: Arc<Lobby>,
    stream: TcpStream,
    addr: SocketAddr,
) -> Result<(), ConnectionError> {
    let ws = accept_async(stream).await?;
    let (sink, mut stream) = ws.split();

    let (outbox, rx) = channel::outbox();
    let conn = lobby.connect(outbox).await;
    info!("Connection {} opened from {}", conn, addr);

    let writer = tokio::spawn(write_frames(conn, sink, rx));
    let result = read_frames(&lobby, conn, &mut stream).await;

    // Dropping the client drops its outbox, which lets the writer finish.
    lobby.disconnect(conn).await;
    if let Err(e) = writer.await {
        error!("Writer task for connection {} panicked: {}", conn, e);
    }
    info!("Connection {} closed", conn);
    result
}

async fn read_frames(
    lobby: &Lobby,
    conn: ConnectionId,
    stream: &mut WsStream,
) -> Result<(), ConnectionError> {
    while let Some(message) = stream.next().await {
        match message? {
            Message::Text(text) => {
                for request in channel::decode_inbound(&text) {
                    lobby.dispatch(conn, request).await?;
                }
            }
            Message::Close(_) => break,
            Message::Binary(_) => warn!("Ignoring binary frame from connection {}", conn),
            _ => {}
        }
    }
    Ok(())
}

async fn write_frames(conn: ConnectionId, mut sink: WsSink, mut rx: OutboxReceiver) {
    while let Some(batch) = channel::next_batch(&mut rx).await {
        let text = match channel::encode_batch(&batch) {
            Ok(text) => text,
            Err(e) => {
                error!("Failed to encode frame for connection {}: {}", conn, e);
                continue;
            }
        };
        if let Err(e) = sink.send(Message::Text(text)).await {
            debug!("Connection {} stopped accepting frames: {}", conn, e);
            break;
        }
    }
    let _ = sink.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::protocol::{decode_frame, Outbound};
    use shared::ServerMessage;
    use tokio_tungstenite::connect_async;

    async fn spawn_server() -> SocketAddr {
        let config = ServerConfig {
            port: 0,
            ..ServerConfig::default()
        };
        let server = Server::new(&config).await.unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.run());
        addr
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.addr(), "127.0.0.1:8080");
        assert_eq!(config.max_radius, 16);
    }

    #[tokio::test]
    async fn test_run_composes_with_boxed_main_error() {
        async fn serve_briefly(server: Server) -> Result<(), Box<dyn std::error::Error>> {
            tokio::select! {
                result = server.run() => result?,
                _ = tokio::time::sleep(std::time::Duration::from_millis(50)) => {}
            }
            Ok(())
        }

        let config = ServerConfig {
            port: 0,
            ..ServerConfig::default()
        };
        let server = Server::new(&config).await.unwrap();
        assert!(serve_briefly(server).await.is_ok());
    }

    #[tokio::test]
    async fn test_connection_is_greeted_with_guest_name() {
        let addr = spawn_server().await;
        let (mut ws, _) = connect_async(format!("ws://{}", addr)).await.unwrap();

        let frame = ws.next().await.unwrap().unwrap();
        let messages: Vec<Outbound> = decode_frame(&frame.into_text().unwrap())
            .unwrap()
            .into_iter()
            .map(Result::unwrap)
            .collect();

        match &messages[0] {
            Outbound::Message(ServerMessage::SetName { name }) => {
                assert!(name.starts_with("guest_"))
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_frame_keeps_connection_open() {
        let addr = spawn_server().await;
        let (mut ws, _) = connect_async(format!("ws://{}", addr)).await.unwrap();
        ws.next().await.unwrap().unwrap();

        ws.send(Message::Text("garbage".to_string())).await.unwrap();
        ws.send(Message::Text(r#"[{"q": "set_name", "name": "robin"}]"#.to_string()))
            .await
            .unwrap();

        let frame = ws.next().await.unwrap().unwrap();
        assert_eq!(
            frame.into_text().unwrap(),
            r#"[{"q":"set_name","name":"robin"}]"#
        );
    }
}
