use crate::collab::Collaborators;
use crate::session::Session;
use plaza_canvas::{ChunkStore, Palette};
use plaza_common::{CanvasId, ChunkCoord};
use plaza_logger::{log, LogSeverity::*};
use plaza_protocol::cool_down::CoolDownPacket;
use plaza_protocol::online_counter::OnlineCounterPacket;
use plaza_protocol::pixel_update::PixelUpdatePacket;
use plaza_protocol::{BridgeReply, ChatMessage, Packet, ServerText, Subscription};
use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::Mutex;
use uuid::Uuid;

const CHUNK_LOCK_STRIPES: usize = 64;

/// Live sessions plus everything the connection handlers share.
pub struct Hub {
    sessions: RwLock<HashMap<Uuid, Arc<Session>>>,
    store: Arc<ChunkStore>,
    palette: Arc<Palette>,
    collaborators: Collaborators,
    chunk_locks: Vec<Mutex<()>>,
}

impl Hub {
    pub fn new(store: Arc<ChunkStore>, palette: Arc<Palette>, collaborators: Collaborators) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            store,
            palette,
            collaborators,
            chunk_locks: (0..CHUNK_LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
        }
    }

    pub fn store(&self) -> &Arc<ChunkStore> {
        &self.store
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<Uuid, Arc<Session>>> {
        self.sessions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Uuid, Arc<Session>>> {
        self.sessions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn register(&self, session: Arc<Session>) {
        self.write().insert(session.id(), session);
    }

    pub fn unregister(&self, id: Uuid) -> Option<Arc<Session>> {
        self.write().remove(&id)
    }

    pub fn session(&self, id: Uuid) -> Option<Arc<Session>> {
        self.read().get(&id).cloned()
    }

    pub fn client_count(&self) -> usize {
        self.read().values().filter(|s| s.is_client()).count()
    }

    pub fn bridge_count(&self) -> usize {
        self.read().values().filter(|s| s.is_bridge()).count()
    }

    /// Serializes commits to one chunk together with their broadcast.
    pub(crate) fn chunk_lock(&self, canvas_id: CanvasId, chunk: ChunkCoord) -> &Mutex<()> {
        let mut hasher = DefaultHasher::new();
        (canvas_id, chunk.i, chunk.j).hash(&mut hasher);
        &self.chunk_locks[hasher.finish() as usize % CHUNK_LOCK_STRIPES]
    }

    /// Sends a committed pixel to every client watching its chunk and, for
    /// canvas 0, to bridges subscribed to pixels. Returns the recipient count.
    pub fn broadcast_pixel(&self, canvas_id: CanvasId, packet: PixelUpdatePacket) -> usize {
        let chunk_id = plaza_canvas::addressing::chunk_id(packet.chunk());
        let bytes = packet.to_bytes();
        let mut delivered = 0;
        for session in self.read().values() {
            let wanted = if session.is_client() {
                session.watches(canvas_id, chunk_id)
            } else {
                canvas_id == 0 && session.is_subscribed(Subscription::Pixels)
            };
            if wanted && session.send_binary(bytes.clone()) {
                delivered += 1;
            }
        }
        delivered
    }

    pub fn broadcast_online_counter(&self) -> usize {
        let sessions = self.read();
        let total = sessions.values().filter(|s| s.is_client()).count();
        let bytes = OnlineCounterPacket::new(total).to_bytes();
        for session in sessions.values() {
            if session.is_client() || session.is_subscribed(Subscription::Online) {
                session.send_binary(bytes.clone());
            }
        }
        total
    }

    /// Relays a chat line to all clients and to chat-subscribed bridges other
    /// than `origin`.
    pub fn broadcast_chat(&self, chat: &ChatMessage, origin: Option<Uuid>) {
        let to_client = ServerText::Chat(chat.clone()).encode();
        let to_bridge = BridgeReply::Chat(chat.clone()).encode();
        for session in self.read().values() {
            if session.is_client() {
                session.send_text(to_client.clone());
            } else if session.is_subscribed(Subscription::Chat) && Some(session.id()) != origin {
                session.send_text(to_bridge.clone());
            }
        }
    }

    /// Tells every client session of `name` to reload its session data.
    pub fn notify_changed_me(&self, name: &str) -> usize {
        let bytes = plaza_protocol::ServerPacket::ChangedMe.to_bytes();
        let mut notified = 0;
        for session in self.read().values() {
            if session.is_client()
                && session.user().name.as_deref() == Some(name)
                && session.send_binary(bytes.clone())
            {
                notified += 1;
            }
        }
        notified
    }

    /// Pushes a cooldown notice to every client session of `name`, e.g. after
    /// the placement policy changed its cooldown outside of a placement.
    pub fn notify_cool_down(&self, name: &str, wait_ms: u32) -> usize {
        let bytes = CoolDownPacket::new(wait_ms).to_bytes();
        let mut notified = 0;
        for session in self.read().values() {
            if session.is_client()
                && session.user().name.as_deref() == Some(name)
                && session.send_binary(bytes.clone())
            {
                notified += 1;
            }
        }
        notified
    }

    /// Terminates sessions that missed the previous probe and probes the
    /// rest. Returns how many were terminated.
    pub fn sweep_liveness(&self) -> usize {
        let mut terminated = 0;
        for session in self.read().values() {
            if !session.probe() {
                log(format!("Session {} missed its liveness probe", session.id()), Info);
                session.terminate();
                terminated += 1;
            }
        }
        terminated
    }
}
