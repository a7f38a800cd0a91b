use crate::collab::User;
use bytes::Bytes;
use plaza_common::CanvasId;
use plaza_logger::{log, LogSeverity::*};
use plaza_protocol::Subscription;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    /// Canvas client on `/ws`.
    Client,
    /// Administrative bridge on `/mcws`.
    Bridge,
}

#[derive(Debug, Default)]
struct View {
    canvas_id: Option<CanvasId>,
    chunks: HashSet<u16>,
}

/// Server side of one websocket connection. Everything sent to it goes
/// through an unbounded queue drained by the connection's writer task, so
/// senders never wait on the peer.
pub struct Session {
    id: Uuid,
    kind: SessionKind,
    user: User,
    outbound: mpsc::UnboundedSender<Message>,
    alive: AtomicBool,
    sub_chat: AtomicBool,
    sub_pixels: AtomicBool,
    sub_online: AtomicBool,
    view: Mutex<View>,
    cancel: CancellationToken,
}

impl Session {
    pub fn new(
        kind: SessionKind,
        user: User,
        cancel: CancellationToken,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<Message>) {
        let (outbound, receiver) = mpsc::unbounded_channel();
        let session = Self {
            id: Uuid::new_v4(),
            kind,
            user,
            outbound,
            alive: AtomicBool::new(true),
            sub_chat: AtomicBool::new(false),
            sub_pixels: AtomicBool::new(false),
            sub_online: AtomicBool::new(false),
            view: Mutex::new(View::default()),
            cancel,
        };
        (Arc::new(session), receiver)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> SessionKind {
        self.kind
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn is_client(&self) -> bool {
        self.kind == SessionKind::Client
    }

    pub fn is_bridge(&self) -> bool {
        self.kind == SessionKind::Bridge
    }

    /// Queues a frame. Returns false once the connection is gone.
    pub fn send(&self, message: Message) -> bool {
        if self.outbound.send(message).is_err() {
            log(format!("Session {} is closed, dropped frame", self.id), Debug);
            return false;
        }
        true
    }

    pub fn send_binary(&self, bytes: Bytes) -> bool {
        self.send(Message::Binary(bytes))
    }

    pub fn send_text(&self, text: String) -> bool {
        self.send(Message::Text(text.into()))
    }

    fn view(&self) -> MutexGuard<'_, View> {
        self.view
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn canvas_id(&self) -> Option<CanvasId> {
        self.view().canvas_id
    }

    /// Switches canvas and drops every chunk registration.
    pub fn set_canvas(&self, canvas_id: CanvasId) {
        let mut view = self.view();
        view.canvas_id = Some(canvas_id);
        view.chunks.clear();
    }

    pub fn register_chunk(&self, chunk_id: u16) {
        self.view().chunks.insert(chunk_id);
    }

    pub fn deregister_chunk(&self, chunk_id: u16) {
        self.view().chunks.remove(&chunk_id);
    }

    pub fn registered_chunks(&self) -> usize {
        self.view().chunks.len()
    }

    /// Whether this session wants pixel updates of `chunk_id` on `canvas_id`.
    pub fn watches(&self, canvas_id: CanvasId, chunk_id: u16) -> bool {
        let view = self.view();
        view.canvas_id == Some(canvas_id) && view.chunks.contains(&chunk_id)
    }

    fn flag(&self, subscription: Subscription) -> &AtomicBool {
        match subscription {
            Subscription::Chat => &self.sub_chat,
            Subscription::Pixels => &self.sub_pixels,
            Subscription::Online => &self.sub_online,
        }
    }

    /// Subscriptions are sticky; subscribing twice changes nothing.
    pub fn subscribe(&self, subscription: Subscription) {
        self.flag(subscription).store(true, Ordering::Relaxed);
    }

    pub fn is_subscribed(&self, subscription: Subscription) -> bool {
        self.flag(subscription).load(Ordering::Relaxed)
    }

    pub fn mark_alive(&self) {
        self.alive.store(true, Ordering::Relaxed);
    }

    /// One liveness round. Returns false if the previous probe went
    /// unanswered; otherwise marks the session tentatively dead and pings it.
    pub fn probe(&self) -> bool {
        if !self.alive.swap(false, Ordering::Relaxed) {
            return false;
        }
        self.send(Message::Ping(Bytes::new()));
        true
    }

    pub fn terminate(&self) {
        self.cancel.cancel();
    }

    pub fn is_open(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    pub fn terminated(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }
}
