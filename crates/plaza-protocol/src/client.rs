//! Client side of the binary protocol.
//!
//! [`ClientCore`] holds the session state machine without doing any I/O: each
//! input returns the [`ClientAction`]s the transport has to carry out, in
//! order. [`ProtocolClient`] drives a core over a websocket.

use crate::frames::ServerPacket;
use crate::packet::Packet;
use crate::pixel_return::PixelReturnPacket;
use crate::pixel_update::PixelUpdatePacket;
use crate::register_canvas::RegisterCanvasPacket;
use crate::register_chunk::{DeRegisterChunkPacket, RegisterChunkPacket};
use crate::register_multiple_chunks::RegisterMultipleChunksPacket;
use crate::text::{ChatMessage, ChatRequest, ServerText};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use plaza_canvas::addressing::chunk_id;
use plaza_common::{CanvasId, ChunkCoord, PlazaError, Result};
use plaza_logger::{log, LogSeverity::*};
use std::collections::VecDeque;
use std::pin::Pin;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// Handshake header carrying the display name the session connects as.
pub const USER_HEADER: &str = "x-plaza-user";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Binary(Bytes),
    Text(String),
}

impl From<Frame> for Message {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Binary(bytes) => Message::Binary(bytes),
            Frame::Text(text) => Message::Text(text.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    Open,
    Close,
    PixelUpdate(PixelUpdatePacket),
    PixelReturn(PixelReturnPacket),
    OnlineCounter(u16),
    CoolDown(u32),
    ChangedMe,
    ChatMessage(ChatMessage),
    SetName(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientAction {
    /// Open a new connection.
    Connect,
    /// Drop the current connection silently and open a new one.
    Restart,
    /// Close the connection for good.
    Disconnect,
    Send(Frame),
    Emit(ClientEvent),
}

/// Delay before reconnecting after a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub quick_delay: Duration,
    pub slow_delay: Duration,
    /// Connections that stayed up at least this long reconnect quickly.
    pub stable_after: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            quick_delay: Duration::from_secs(1),
            slow_delay: Duration::from_secs(5),
            stable_after: Duration::from_secs(7),
        }
    }
}

impl ReconnectPolicy {
    /// `uptime` is `None` when the connection never opened.
    pub fn delay(&self, uptime: Option<Duration>) -> Duration {
        match uptime {
            Some(uptime) if uptime > self.stable_after => self.quick_delay,
            _ => self.slow_delay,
        }
    }
}

#[derive(Debug)]
pub struct ClientCore {
    state: ConnectionState,
    name: Option<String>,
    canvas_id: CanvasId,
    chunks: Vec<u16>,
    queue: VecDeque<Frame>,
    opened_at: Option<Instant>,
    policy: ReconnectPolicy,
}

impl Default for ClientCore {
    fn default() -> Self {
        Self::new(ReconnectPolicy::default())
    }
}

impl ClientCore {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            state: ConnectionState::Idle,
            name: None,
            canvas_id: 0,
            chunks: Vec::new(),
            queue: VecDeque::new(),
            opened_at: None,
            policy,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn canvas_id(&self) -> CanvasId {
        self.canvas_id
    }

    pub fn registered_chunks(&self) -> &[u16] {
        &self.chunks
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Starts a connection unless one is open or underway.
    pub fn connect(&mut self) -> Vec<ClientAction> {
        match self.state {
            ConnectionState::Idle | ConnectionState::Closed => {
                self.state = ConnectionState::Connecting;
                vec![ClientAction::Connect]
            }
            _ => Vec::new(),
        }
    }

    /// Sends now when open, otherwise queues and makes sure a connection is
    /// on its way.
    pub fn send_when_ready(&mut self, frame: Frame) -> Vec<ClientAction> {
        if self.is_open() {
            return vec![ClientAction::Send(frame)];
        }
        self.queue.push_back(frame);
        self.connect()
    }

    /// Puts frames that never made it onto the wire back at the head of the
    /// queue, keeping their order. Canvas and chunk registrations are left
    /// out since [`ClientCore::on_open`] sends fresh ones, and chat is
    /// dropped as it would be while disconnected.
    pub fn requeue(&mut self, frames: Vec<Frame>) {
        for frame in frames.into_iter().rev() {
            if !is_replayable(&frame) {
                continue;
            }
            self.queue.push_front(frame);
        }
    }

    pub fn on_open(&mut self, now: Instant) -> Vec<ClientAction> {
        self.state = ConnectionState::Open;
        self.opened_at = Some(now);

        let mut actions = vec![ClientAction::Emit(ClientEvent::Open)];
        actions.push(ClientAction::Send(Frame::Binary(
            RegisterCanvasPacket::new(self.canvas_id).to_bytes(),
        )));
        actions.extend(self.queue.drain(..).map(ClientAction::Send));
        log(format!("Register {} chunks", self.chunks.len()), Debug);
        actions.push(ClientAction::Send(Frame::Binary(
            RegisterMultipleChunksPacket::new(self.chunks.clone()).to_bytes(),
        )));
        actions
    }

    /// Connection ended or could not be established. Returns the delay after
    /// which the transport should call [`ClientCore::connect`] again, `None`
    /// after a deliberate close.
    pub fn on_close(&mut self, now: Instant) -> (Vec<ClientAction>, Option<Duration>) {
        if self.state == ConnectionState::Idle {
            return (Vec::new(), None);
        }
        let uptime = self.opened_at.take().map(|opened| now.saturating_duration_since(opened));
        self.state = ConnectionState::Closed;
        let delay = self.policy.delay(uptime);
        log(
            format!("Socket is closed. Reconnect will be attempted in {:?}", delay),
            Warning,
        );
        (vec![ClientAction::Emit(ClientEvent::Close)], Some(delay))
    }

    pub fn on_binary(&mut self, bytes: &[u8]) -> Vec<ClientAction> {
        if bytes.is_empty() {
            return Vec::new();
        }
        let event = match ServerPacket::decode(bytes) {
            Some(ServerPacket::PixelUpdate(packet)) => ClientEvent::PixelUpdate(packet),
            Some(ServerPacket::PixelReturn(packet)) => ClientEvent::PixelReturn(packet),
            Some(ServerPacket::OnlineCounter(packet)) => ClientEvent::OnlineCounter(packet.total),
            Some(ServerPacket::CoolDown(packet)) => ClientEvent::CoolDown(packet.wait_ms),
            Some(ServerPacket::ChangedMe) => {
                log("Server requested a session reload".to_owned(), Info);
                let mut actions = vec![ClientAction::Emit(ClientEvent::ChangedMe)];
                actions.extend(self.reconnect());
                return actions;
            }
            None => return Vec::new(),
        };
        vec![ClientAction::Emit(event)]
    }

    pub fn on_text(&mut self, text: &str) -> Vec<ClientAction> {
        if text.is_empty() {
            return Vec::new();
        }
        match ServerText::parse(text) {
            Some(ServerText::Name(name)) => {
                self.name = Some(name.clone());
                vec![ClientAction::Emit(ClientEvent::SetName(name))]
            }
            Some(ServerText::Chat(chat)) => vec![ClientAction::Emit(ClientEvent::ChatMessage(chat))],
            None => Vec::new(),
        }
    }

    /// The name only travels at connect time, so a change while connected
    /// forces a reconnect.
    pub fn set_name(&mut self, name: &str) -> Vec<ClientAction> {
        if self.name.as_deref() == Some(name) {
            return Vec::new();
        }
        self.name = Some(name.to_owned());
        if self.is_open() {
            log("Name change requires a websocket restart".to_owned(), Info);
            return self.reconnect();
        }
        Vec::new()
    }

    pub fn set_canvas(&mut self, canvas_id: CanvasId) -> Vec<ClientAction> {
        if self.canvas_id == canvas_id {
            return Vec::new();
        }
        self.canvas_id = canvas_id;
        self.chunks.clear();
        self.send_when_ready(Frame::Binary(RegisterCanvasPacket::new(canvas_id).to_bytes()))
    }

    pub fn register_chunk(&mut self, chunk: ChunkCoord) -> Vec<ClientAction> {
        let id = chunk_id(chunk);
        if !self.chunks.contains(&id) {
            self.chunks.push(id);
        }
        if self.is_open() {
            return vec![ClientAction::Send(Frame::Binary(
                RegisterChunkPacket::new(chunk).to_bytes(),
            ))];
        }
        Vec::new()
    }

    pub fn deregister_chunk(&mut self, chunk: ChunkCoord) -> Vec<ClientAction> {
        let id = chunk_id(chunk);
        self.chunks.retain(|registered| *registered != id);
        if self.is_open() {
            return vec![ClientAction::Send(Frame::Binary(
                DeRegisterChunkPacket::new(chunk).to_bytes(),
            ))];
        }
        Vec::new()
    }

    pub fn request_place_pixel(&mut self, i: u8, j: u8, offset: u32, color: u8) -> Vec<ClientAction> {
        self.send_when_ready(Frame::Binary(
            PixelUpdatePacket::new(i, j, offset, color).to_bytes(),
        ))
    }

    /// Chat is dropped while disconnected.
    pub fn send_chat_message(&mut self, message: &str, channel_id: u32) -> Vec<ClientAction> {
        if self.is_open() {
            return vec![ClientAction::Send(Frame::Text(
                ChatRequest::new(message, channel_id).encode(),
            ))];
        }
        Vec::new()
    }

    /// Restarts an open connection; no-op otherwise.
    pub fn reconnect(&mut self) -> Vec<ClientAction> {
        if !self.is_open() {
            return Vec::new();
        }
        log("Restarting websocket".to_owned(), Info);
        self.state = ConnectionState::Connecting;
        self.opened_at = None;
        vec![ClientAction::Restart]
    }

    pub fn close(&mut self) -> Vec<ClientAction> {
        let was_connected = matches!(
            self.state,
            ConnectionState::Open | ConnectionState::Connecting
        );
        self.state = ConnectionState::Idle;
        self.opened_at = None;
        if was_connected {
            vec![
                ClientAction::Disconnect,
                ClientAction::Emit(ClientEvent::Close),
            ]
        } else {
            Vec::new()
        }
    }
}

fn is_replayable(frame: &Frame) -> bool {
    match frame {
        Frame::Binary(bytes) => bytes.first().is_some_and(|&op_code| {
            op_code != RegisterCanvasPacket::OP_CODE
                && op_code != RegisterMultipleChunksPacket::OP_CODE
        }),
        Frame::Text(_) => false,
    }
}

enum Command {
    SetName(String),
    SetCanvas(CanvasId),
    RegisterChunk(ChunkCoord),
    DeRegisterChunk(ChunkCoord),
    PlacePixel { i: u8, j: u8, offset: u32, color: u8 },
    Chat { message: String, channel_id: u32 },
    Connect,
    Reconnect,
    Close,
}

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Handle to a background client session. Dropping every handle ends the
/// session.
#[derive(Clone)]
pub struct ProtocolClient {
    commands: mpsc::UnboundedSender<Command>,
}

impl ProtocolClient {
    /// Spawns the session task. Nothing connects until the first send or
    /// [`ProtocolClient::connect`].
    pub fn spawn(url: &str) -> (Self, mpsc::UnboundedReceiver<ClientEvent>, JoinHandle<()>) {
        Self::spawn_with_policy(url, ReconnectPolicy::default())
    }

    pub fn spawn_with_policy(
        url: &str,
        policy: ReconnectPolicy,
    ) -> (Self, mpsc::UnboundedReceiver<ClientEvent>, JoinHandle<()>) {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (event_tx, events) = mpsc::unbounded_channel();
        let driver = Driver {
            url: url.to_owned(),
            core: ClientCore::new(policy),
            socket: None,
            events: event_tx,
            reconnect: None,
        };
        let handle = tokio::spawn(driver.run(command_rx));
        (Self { commands }, events, handle)
    }

    fn submit(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| PlazaError::Transport("client session has ended".to_owned()))
    }

    pub fn connect(&self) -> Result<()> {
        self.submit(Command::Connect)
    }

    pub fn set_name(&self, name: &str) -> Result<()> {
        self.submit(Command::SetName(name.to_owned()))
    }

    pub fn set_canvas(&self, canvas_id: CanvasId) -> Result<()> {
        self.submit(Command::SetCanvas(canvas_id))
    }

    pub fn register_chunk(&self, chunk: ChunkCoord) -> Result<()> {
        self.submit(Command::RegisterChunk(chunk))
    }

    pub fn deregister_chunk(&self, chunk: ChunkCoord) -> Result<()> {
        self.submit(Command::DeRegisterChunk(chunk))
    }

    pub fn request_place_pixel(&self, i: u8, j: u8, offset: u32, color: u8) -> Result<()> {
        self.submit(Command::PlacePixel {
            i,
            j,
            offset,
            color,
        })
    }

    pub fn send_chat_message(&self, message: &str, channel_id: u32) -> Result<()> {
        self.submit(Command::Chat {
            message: message.to_owned(),
            channel_id,
        })
    }

    pub fn reconnect(&self) -> Result<()> {
        self.submit(Command::Reconnect)
    }

    pub fn close(&self) -> Result<()> {
        self.submit(Command::Close)
    }
}

struct Driver {
    url: String,
    core: ClientCore,
    socket: Option<Socket>,
    events: mpsc::UnboundedSender<ClientEvent>,
    reconnect: Option<Pin<Box<tokio::time::Sleep>>>,
}

type Incoming = Option<std::result::Result<Message, tokio_tungstenite::tungstenite::Error>>;

async fn next_message(socket: &mut Option<Socket>) -> Incoming {
    match socket.as_mut() {
        Some(socket) => socket.next().await,
        None => futures::future::pending().await,
    }
}

async fn reconnect_due(timer: &mut Option<Pin<Box<tokio::time::Sleep>>>) {
    match timer.as_mut() {
        Some(timer) => timer.await,
        None => futures::future::pending().await,
    }
}

impl Driver {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        loop {
            let actions = tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.apply(command),
                    None => break,
                },
                message = next_message(&mut self.socket) => self.on_message(message),
                _ = reconnect_due(&mut self.reconnect) => {
                    self.reconnect = None;
                    self.core.connect()
                }
            };
            self.perform(actions).await;
        }
        if let Some(mut socket) = self.socket.take() {
            let _ = socket.close(None).await;
        }
    }

    fn apply(&mut self, command: Command) -> Vec<ClientAction> {
        match command {
            Command::SetName(name) => self.core.set_name(&name),
            Command::SetCanvas(canvas_id) => self.core.set_canvas(canvas_id),
            Command::RegisterChunk(chunk) => self.core.register_chunk(chunk),
            Command::DeRegisterChunk(chunk) => self.core.deregister_chunk(chunk),
            Command::PlacePixel {
                i,
                j,
                offset,
                color,
            } => self.core.request_place_pixel(i, j, offset, color),
            Command::Chat {
                message,
                channel_id,
            } => self.core.send_chat_message(&message, channel_id),
            Command::Connect => self.core.connect(),
            Command::Reconnect => self.core.reconnect(),
            Command::Close => {
                self.reconnect = None;
                self.core.close()
            }
        }
    }

    fn on_message(&mut self, message: Incoming) -> Vec<ClientAction> {
        match message {
            Some(Ok(Message::Binary(bytes))) => self.core.on_binary(&bytes),
            Some(Ok(Message::Text(text))) => self.core.on_text(text.as_str()),
            Some(Ok(Message::Close(_))) | None => self.connection_lost(),
            Some(Ok(_)) => Vec::new(),
            Some(Err(e)) => {
                log(format!("Socket encountered error, closing socket: {}", e), Error);
                self.connection_lost()
            }
        }
    }

    fn connection_lost(&mut self) -> Vec<ClientAction> {
        self.socket = None;
        let (actions, delay) = self.core.on_close(Instant::now());
        self.reconnect = delay.map(|delay| Box::pin(tokio::time::sleep(delay)));
        actions
    }

    /// Hands `failed` and every send still pending back to the core so the
    /// next open flushes them.
    fn requeue_sends(&mut self, failed: Frame, pending: &mut VecDeque<ClientAction>) {
        let mut frames = vec![failed];
        pending.retain(|action| match action {
            ClientAction::Send(frame) => {
                frames.push(frame.clone());
                false
            }
            _ => true,
        });
        if frames.len() > 1 {
            log(format!("Requeued {} unsent frames", frames.len()), Debug);
        }
        self.core.requeue(frames);
    }

    async fn perform(&mut self, actions: Vec<ClientAction>) {
        let mut pending: VecDeque<ClientAction> = actions.into();
        while let Some(action) = pending.pop_front() {
            match action {
                ClientAction::Connect => match self.open().await {
                    Ok(socket) => {
                        self.socket = Some(socket);
                        pending.extend(self.core.on_open(Instant::now()));
                    }
                    Err(e) => {
                        log(format!("Could not connect to {}: {}", self.url, e), Warning);
                        pending.extend(self.connection_lost());
                    }
                },
                ClientAction::Restart => {
                    if let Some(mut socket) = self.socket.take() {
                        let _ = socket.close(None).await;
                    }
                    pending.push_front(ClientAction::Connect);
                }
                ClientAction::Disconnect => {
                    if let Some(mut socket) = self.socket.take() {
                        let _ = socket.close(None).await;
                    }
                }
                ClientAction::Send(frame) => {
                    let Some(socket) = self.socket.as_mut() else {
                        self.requeue_sends(frame, &mut pending);
                        continue;
                    };
                    if let Err(e) = socket.send(frame.clone().into()).await {
                        log(format!("Failed to send frame: {}", e), Error);
                        self.requeue_sends(frame, &mut pending);
                        pending.extend(self.connection_lost());
                    }
                }
                ClientAction::Emit(event) => {
                    // nobody listening is fine
                    let _ = self.events.send(event);
                }
            }
        }
    }

    async fn open(&self) -> Result<Socket> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| PlazaError::Transport(e.to_string()))?;
        if let Some(name) = self.core.name() {
            let value = HeaderValue::from_str(name)
                .map_err(|e| PlazaError::Transport(e.to_string()))?;
            request.headers_mut().insert(USER_HEADER, value);
        }
        let (socket, _) = connect_async(request)
            .await
            .map_err(|e| PlazaError::Transport(e.to_string()))?;
        Ok(socket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changed_me::ChangedMePacket;
    use crate::online_counter::OnlineCounterPacket;
    use crate::pixel_return::ReturnCode;
    use assert_matches::assert_matches;

    fn sent(actions: &[ClientAction]) -> Vec<Frame> {
        actions
            .iter()
            .filter_map(|action| match action {
                ClientAction::Send(frame) => Some(frame.clone()),
                _ => None,
            })
            .collect()
    }

    fn binary(bytes: Bytes) -> Frame {
        Frame::Binary(bytes)
    }

    #[test]
    fn test_queued_messages_flush_in_order_after_open() {
        let mut core = ClientCore::default();
        assert_eq!(
            core.request_place_pixel(1, 1, 10, 3),
            vec![ClientAction::Connect]
        );
        // second send while connecting does not connect again
        assert!(core.request_place_pixel(1, 1, 11, 4).is_empty());
        assert_eq!(core.queued(), 2);

        let actions = core.on_open(Instant::now());
        assert_eq!(actions[0], ClientAction::Emit(ClientEvent::Open));
        assert_eq!(
            sent(&actions),
            vec![
                binary(RegisterCanvasPacket::new(0).to_bytes()),
                binary(PixelUpdatePacket::new(1, 1, 10, 3).to_bytes()),
                binary(PixelUpdatePacket::new(1, 1, 11, 4).to_bytes()),
                binary(RegisterMultipleChunksPacket::new(Vec::new()).to_bytes()),
            ]
        );
        assert_eq!(core.queued(), 0);

        // once open, frames go straight out
        assert_eq!(
            sent(&core.request_place_pixel(0, 0, 0, 1)),
            vec![binary(PixelUpdatePacket::new(0, 0, 0, 1).to_bytes())]
        );
    }

    #[test]
    fn test_unsent_frames_are_requeued_after_failed_flush() {
        let mut core = ClientCore::default();
        core.request_place_pixel(1, 1, 10, 3);
        core.request_place_pixel(1, 1, 11, 4);
        core.request_place_pixel(1, 1, 12, 5);

        // the socket dies right after the first pixel went out
        let frames = sent(&core.on_open(Instant::now()));
        assert_eq!(frames.len(), 5);
        core.requeue(frames[2..].to_vec());
        core.on_close(Instant::now());
        assert_eq!(core.queued(), 2);

        assert_eq!(core.connect(), vec![ClientAction::Connect]);
        assert_eq!(
            sent(&core.on_open(Instant::now())),
            vec![
                binary(RegisterCanvasPacket::new(0).to_bytes()),
                binary(PixelUpdatePacket::new(1, 1, 11, 4).to_bytes()),
                binary(PixelUpdatePacket::new(1, 1, 12, 5).to_bytes()),
                binary(RegisterMultipleChunksPacket::new(Vec::new()).to_bytes()),
            ]
        );
    }

    #[test]
    fn test_requeue_goes_ahead_of_newer_frames() {
        let mut core = ClientCore::default();
        core.request_place_pixel(0, 0, 2, 2);
        core.requeue(vec![
            binary(RegisterCanvasPacket::new(0).to_bytes()),
            binary(PixelUpdatePacket::new(0, 0, 1, 1).to_bytes()),
            Frame::Text("hello".to_owned()),
            binary(PixelUpdatePacket::new(0, 0, 1, 2).to_bytes()),
        ]);
        assert_eq!(core.queued(), 3);

        let frames = sent(&core.on_open(Instant::now()));
        assert_eq!(
            frames[1..4],
            [
                binary(PixelUpdatePacket::new(0, 0, 1, 1).to_bytes()),
                binary(PixelUpdatePacket::new(0, 0, 1, 2).to_bytes()),
                binary(PixelUpdatePacket::new(0, 0, 2, 2).to_bytes()),
            ]
        );
    }

    #[test]
    fn test_registrations_survive_reconnect() {
        let mut core = ClientCore::default();
        assert!(core.register_chunk(ChunkCoord::new(1, 2)).is_empty());
        core.register_chunk(ChunkCoord::new(3, 4));
        core.register_chunk(ChunkCoord::new(1, 2));
        core.connect();
        core.on_open(Instant::now());

        let now = Instant::now();
        let (actions, delay) = core.on_close(now);
        assert_eq!(actions, vec![ClientAction::Emit(ClientEvent::Close)]);
        assert!(delay.is_some());
        assert_eq!(core.connect(), vec![ClientAction::Connect]);

        let actions = core.on_open(Instant::now());
        let frames = sent(&actions);
        assert_eq!(
            frames.last(),
            Some(&binary(
                RegisterMultipleChunksPacket::new(vec![0x0102, 0x0304]).to_bytes()
            ))
        );
    }

    #[test]
    fn test_set_canvas_clears_chunks() {
        let mut core = ClientCore::default();
        core.connect();
        core.on_open(Instant::now());
        core.register_chunk(ChunkCoord::new(5, 5));

        assert!(core.set_canvas(0).is_empty());
        assert_eq!(core.registered_chunks(), &[0x0505]);

        let actions = core.set_canvas(2);
        assert_eq!(sent(&actions), vec![binary(RegisterCanvasPacket::new(2).to_bytes())]);
        assert!(core.registered_chunks().is_empty());
    }

    #[test]
    fn test_deregister_removes_chunk() {
        let mut core = ClientCore::default();
        core.register_chunk(ChunkCoord::new(1, 1));
        core.register_chunk(ChunkCoord::new(2, 2));
        assert!(core.deregister_chunk(ChunkCoord::new(1, 1)).is_empty());
        assert_eq!(core.registered_chunks(), &[0x0202]);
    }

    #[test]
    fn test_name_change_restarts_only_when_open() {
        let mut core = ClientCore::default();
        assert!(core.set_name("alice").is_empty());
        core.connect();
        core.on_open(Instant::now());
        assert!(core.set_name("alice").is_empty());
        assert_eq!(core.set_name("bob"), vec![ClientAction::Restart]);
        assert_eq!(core.state(), ConnectionState::Connecting);
        assert_eq!(core.name(), Some("bob"));
    }

    #[test]
    fn test_chat_only_while_open() {
        let mut core = ClientCore::default();
        assert!(core.send_chat_message("hi", 0).is_empty());
        assert_eq!(core.queued(), 0);
        core.connect();
        core.on_open(Instant::now());
        assert_eq!(
            sent(&core.send_chat_message("hi", 1)),
            vec![Frame::Text(r#"["hi",1]"#.to_owned())]
        );
    }

    #[test]
    fn test_server_frames_become_events() {
        let mut core = ClientCore::default();
        core.connect();
        core.on_open(Instant::now());

        assert_eq!(
            core.on_binary(&OnlineCounterPacket::new(12).to_bytes()),
            vec![ClientAction::Emit(ClientEvent::OnlineCounter(12))]
        );
        assert_matches!(
            core.on_binary(&PixelReturnPacket::rejected(ReturnCode::Protected).to_bytes()).as_slice(),
            [ClientAction::Emit(ClientEvent::PixelReturn(p))] if p.code == ReturnCode::Protected
        );
        assert_eq!(
            core.on_binary(&crate::cool_down::CoolDownPacket::new(3000).to_bytes()),
            vec![ClientAction::Emit(ClientEvent::CoolDown(3000))]
        );
        assert!(core.on_binary(&[0x42]).is_empty());
        assert!(core.on_binary(&[]).is_empty());

        assert_eq!(
            core.on_text("\"carol\""),
            vec![ClientAction::Emit(ClientEvent::SetName("carol".to_owned()))]
        );
        assert_eq!(core.name(), Some("carol"));
        assert_matches!(
            core.on_text(r#"["a","b","xx",0]"#).as_slice(),
            [ClientAction::Emit(ClientEvent::ChatMessage(_))]
        );
        assert!(core.on_text("garbage").is_empty());
    }

    #[test]
    fn test_changed_me_triggers_reconnect() {
        let mut core = ClientCore::default();
        core.connect();
        core.on_open(Instant::now());
        assert_eq!(
            core.on_binary(&ChangedMePacket.to_bytes()),
            vec![
                ClientAction::Emit(ClientEvent::ChangedMe),
                ClientAction::Restart
            ]
        );
    }

    #[test]
    fn test_close_stops_reconnecting() {
        let mut core = ClientCore::default();
        core.connect();
        core.on_open(Instant::now());
        assert_eq!(
            core.close(),
            vec![
                ClientAction::Disconnect,
                ClientAction::Emit(ClientEvent::Close)
            ]
        );
        let (actions, delay) = core.on_close(Instant::now());
        assert!(actions.is_empty());
        assert_eq!(delay, None);
    }

    #[test]
    fn test_reconnect_delay_depends_on_uptime() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay(None), Duration::from_secs(5));
        assert_eq!(policy.delay(Some(Duration::from_secs(2))), Duration::from_secs(5));
        assert_eq!(policy.delay(Some(Duration::from_secs(30))), Duration::from_secs(1));

        let mut core = ClientCore::default();
        core.connect();
        let opened = Instant::now();
        core.on_open(opened);
        let (_, delay) = core.on_close(opened + Duration::from_secs(60));
        assert_eq!(delay, Some(Duration::from_secs(1)));

        // a failed connect never opened
        core.connect();
        let (_, delay) = core.on_close(Instant::now());
        assert_eq!(delay, Some(Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn test_client_announces_itself_on_open() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/ws", listener.local_addr().unwrap());
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(socket).await.unwrap();
            let mut frames = Vec::new();
            while frames.len() < 3 {
                if let Some(Ok(Message::Binary(bytes))) = ws.next().await {
                    frames.push(bytes);
                }
            }
            ws.send(Message::text(r#""alice""#)).await.unwrap();
            frames
        });

        let (client, mut events, _task) = ProtocolClient::spawn(&url);
        client.register_chunk(ChunkCoord::new(1, 2)).unwrap();
        client.request_place_pixel(1, 2, 3, 4).unwrap();
        assert_eq!(events.recv().await, Some(ClientEvent::Open));
        assert_eq!(events.recv().await, Some(ClientEvent::SetName("alice".to_owned())));

        let frames = server.await.unwrap();
        assert_eq!(frames[0], RegisterCanvasPacket::new(0).to_bytes());
        assert_eq!(frames[1], PixelUpdatePacket::new(1, 2, 3, 4).to_bytes());
        assert_eq!(frames[2], RegisterMultipleChunksPacket::new(vec![0x0102]).to_bytes());
        client.close().unwrap();
    }

    #[test]
    fn test_frame_into_message() {
        assert_matches!(Message::from(Frame::Text("x".to_owned())), Message::Text(t) if t.as_str() == "x");
        assert_matches!(Message::from(Frame::Binary(Bytes::from_static(&[1]))), Message::Binary(_));
    }
}
