use crate::bridge::handle_bridge_text;
use crate::collab::{Collaborators, User};
use crate::hub::Hub;
use crate::session::{Session, SessionKind};
use futures::{SinkExt, StreamExt};
use plaza_canvas::{ChunkStore, Palette};
use plaza_common::config::ServerConfig;
use plaza_common::{PlazaError, Result};
use plaza_logger::{log, LogSeverity::*};
use plaza_protocol::client::USER_HEADER;
use plaza_protocol::{ChatMessage, ChatRequest, ClientPacket, Packet, ServerText};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;

pub const CLIENT_PATH: &str = "/ws";
pub const BRIDGE_PATH: &str = "/mcws";

const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Endpoint picked during the websocket handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Route {
    Client { name: Option<String> },
    Bridge,
}

/// Websocket server for canvas clients and bridges.
pub struct Server {
    listener: TcpListener,
    hub: Arc<Hub>,
    api_key: Option<String>,
    ping_interval: Duration,
    online_counter_interval: Duration,
    cancel: CancellationToken,
}

impl Server {
    pub async fn bind(
        config: &ServerConfig,
        store: Arc<ChunkStore>,
        palette: Arc<Palette>,
        collaborators: Collaborators,
    ) -> Result<Self> {
        let listener = TcpListener::bind(&config.bind).await?;
        if config.api_key.is_none() {
            log("No api key configured, bridge endpoint is disabled".to_owned(), Warning);
        }
        Ok(Self {
            listener,
            hub: Arc::new(Hub::new(store, palette, collaborators)),
            api_key: config.api_key.clone(),
            ping_interval: config.ping_interval(),
            online_counter_interval: config.online_counter_interval(),
            cancel: CancellationToken::new(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// Cancelling this token stops the accept loop and closes every session.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Accepts connections until the shutdown token fires.
    pub async fn run(self) -> Result<()> {
        match self.listener.local_addr() {
            Ok(addr) => log(format!("Listening on {}", addr), Info),
            Err(e) => log(format!("Listening on unknown address: {}", e), Warning),
        }
        let housekeeping = [
            tokio::spawn(liveness_loop(self.hub.clone(), self.ping_interval, self.cancel.clone())),
            tokio::spawn(online_counter_loop(
                self.hub.clone(),
                self.online_counter_interval,
                self.cancel.clone(),
            )),
        ];

        let api_key = Arc::new(self.api_key);
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((socket, addr)) => {
                        log(format!("New connection from: {}", addr), Debug);
                        tokio::spawn(handle_connection(
                            socket,
                            addr,
                            self.hub.clone(),
                            api_key.clone(),
                            self.cancel.child_token(),
                        ));
                    }
                    Err(e) => log(format!("Failed to accept connection: {}", e), Error),
                },
            }
        }

        for task in housekeeping {
            task.abort();
        }
        log("Server stopped accepting connections".to_owned(), Info);
        Ok(())
    }
}

async fn liveness_loop(hub: Arc<Hub>, period: Duration, cancel: CancellationToken) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {
                let terminated = hub.sweep_liveness();
                if terminated > 0 {
                    log(format!("Terminated {} unresponsive sessions", terminated), Info);
                }
            }
        }
    }
}

async fn online_counter_loop(hub: Arc<Hub>, period: Duration, cancel: CancellationToken) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {
                let online = hub.broadcast_online_counter();
                log(format!("{} clients online", online), Debug);
            }
        }
    }
}

fn rejection(status: StatusCode, reason: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(reason.to_owned()));
    *response.status_mut() = status;
    response
}

fn route_request(request: &Request, api_key: Option<&str>) -> std::result::Result<Route, ErrorResponse> {
    match request.uri().path() {
        CLIENT_PATH => Ok(Route::Client {
            name: request
                .headers()
                .get(USER_HEADER)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_owned),
        }),
        BRIDGE_PATH => {
            let presented = request
                .headers()
                .get("authorization")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.strip_prefix("Bearer "));
            match (api_key, presented) {
                (Some(expected), Some(presented)) if expected == presented => Ok(Route::Bridge),
                _ => Err(rejection(StatusCode::UNAUTHORIZED, "invalid api key")),
            }
        }
        _ => Err(rejection(StatusCode::NOT_FOUND, "unknown endpoint")),
    }
}

async fn handle_connection(
    socket: TcpStream,
    addr: SocketAddr,
    hub: Arc<Hub>,
    api_key: Arc<Option<String>>,
    cancel: CancellationToken,
) {
    let mut route = None;
    let callback = |request: &Request, response: Response| -> std::result::Result<Response, ErrorResponse> {
        let picked = route_request(request, api_key.as_deref())?;
        route = Some(picked);
        Ok(response)
    };
    let ws = match tokio_tungstenite::accept_hdr_async(socket, callback).await {
        Ok(ws) => ws,
        Err(e) => {
            log(format!("Handshake with {} failed: {}", addr, e), Debug);
            return;
        }
    };
    let Some(route) = route else {
        return;
    };

    let ip = Some(addr.ip().to_string());
    let (kind, user) = match route {
        Route::Client { name } => (
            SessionKind::Client,
            User {
                name,
                ip,
                external_id: None,
            },
        ),
        Route::Bridge => (
            SessionKind::Bridge,
            User {
                ip,
                ..User::default()
            },
        ),
    };
    let (session, outbound) = Session::new(kind, user, cancel);
    log(format!("Session {} opened as {:?} from {}", session.id(), kind, addr), Info);
    if let Err(e) = serve_session(ws, outbound, &hub, &session).await {
        log(format!("Session {} failed: {}", session.id(), e), Warning);
    }
    log(format!("Session {} closed", session.id()), Info);
}

async fn serve_session(
    ws: WebSocketStream<TcpStream>,
    mut outbound: UnboundedReceiver<Message>,
    hub: &Hub,
    session: &Arc<Session>,
) -> Result<()> {
    let (mut sink, mut stream) = ws.split();
    let writer = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            let closing = matches!(message, Message::Close(_));
            if let Err(e) = sink.send(message).await {
                log(format!("Failed to write frame: {}", e), Debug);
                break;
            }
            if closing {
                break;
            }
        }
    });

    hub.register(session.clone());
    if session.is_client() {
        if let Some(name) = session.user().name.clone() {
            session.send_text(ServerText::Name(name).encode());
        }
    }

    let result = loop {
        let frame = tokio::select! {
            _ = session.terminated() => break Ok(()),
            frame = stream.next() => frame,
        };
        match frame {
            None => break Ok(()),
            Some(Err(e)) => break Err(PlazaError::Transport(e.to_string())),
            Some(Ok(Message::Close(_))) => break Ok(()),
            Some(Ok(Message::Pong(_))) => session.mark_alive(),
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Frame(_))) => {}
            Some(Ok(Message::Binary(bytes))) => {
                if session.is_client() {
                    handle_client_binary(hub, session, &bytes).await;
                } else {
                    log(format!("Bridge session {} sent a binary frame", session.id()), Debug);
                }
            }
            Some(Ok(Message::Text(text))) => {
                if session.is_client() {
                    handle_client_text(hub, session, text.as_str()).await;
                } else {
                    handle_bridge_text(hub, session, text.as_str()).await;
                }
            }
        }
    };

    hub.unregister(session.id());
    session.terminate();
    session.send(Message::Close(None));
    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, writer).await.is_err() {
        log(format!("Writer of session {} did not drain in time", session.id()), Debug);
    }
    result
}

async fn handle_client_binary(hub: &Hub, session: &Session, bytes: &[u8]) {
    let Some(packet) = ClientPacket::decode(bytes) else {
        return;
    };
    match packet {
        ClientPacket::RegisterCanvas(packet) => {
            if hub.store().canvases().get(packet.canvas_id).is_some() {
                session.set_canvas(packet.canvas_id);
            } else {
                log(
                    format!("Session {} asked for unknown canvas {}", session.id(), packet.canvas_id),
                    Debug,
                );
            }
        }
        ClientPacket::RegisterChunk(packet) => session.register_chunk(packet.chunk_id),
        ClientPacket::DeRegisterChunk(packet) => session.deregister_chunk(packet.chunk_id),
        ClientPacket::RegisterMultipleChunks(packet) => {
            for chunk_id in packet.chunk_ids {
                session.register_chunk(chunk_id);
            }
        }
        ClientPacket::DeRegisterMultipleChunks(packet) => {
            for chunk_id in packet.chunk_ids {
                session.deregister_chunk(chunk_id);
            }
        }
        ClientPacket::PixelUpdate(packet) => {
            let outcome = hub
                .place_from_packet(session.user(), session.canvas_id(), packet)
                .await;
            session.send_binary(outcome.to_packet().to_bytes());
        }
    }
}

async fn handle_client_text(hub: &Hub, session: &Session, text: &str) {
    let Some(request) = ChatRequest::parse(text) else {
        return;
    };
    let user = session.user();
    match hub
        .collaborators()
        .chat
        .check(user, &request.message, request.channel_id)
        .await
    {
        Ok(()) => {
            let name = user.name.as_deref().unwrap_or_default();
            hub.broadcast_chat(
                &ChatMessage::new(name, &request.message, "xx", request.channel_id),
                None,
            );
        }
        Err(reason) => {
            let notice = ChatMessage::new("info", &reason, "il", request.channel_id);
            session.send_text(ServerText::Chat(notice).encode());
        }
    }
}
