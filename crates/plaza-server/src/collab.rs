//! Seams to the systems around the synchronization core: placement policy,
//! the directory of bridged external users, and chat moderation.

use futures::future::BoxFuture;
use plaza_common::{CanvasId, PixelCoord};
use plaza_protocol::ReturnCode;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Whoever is asking for something: a websocket session or a bridged
/// external user.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct User {
    /// `None` for anonymous sessions.
    pub name: Option<String>,
    pub ip: Option<String>,
    pub external_id: Option<String>,
}

impl User {
    pub fn named(name: &str) -> Self {
        Self {
            name: Some(name.to_owned()),
            ..Self::default()
        }
    }

    pub fn is_registered(&self) -> bool {
        self.name.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaceOutcome {
    pub code: ReturnCode,
    pub wait_seconds: f64,
    pub cool_down_seconds: f64,
}

impl PlaceOutcome {
    pub fn allowed(wait_seconds: f64, cool_down_seconds: f64) -> Self {
        Self {
            code: ReturnCode::Success,
            wait_seconds,
            cool_down_seconds,
        }
    }

    pub fn rejected(code: ReturnCode) -> Self {
        Self {
            code,
            wait_seconds: 0.0,
            cool_down_seconds: 0.0,
        }
    }

    pub fn success(&self) -> bool {
        self.code.is_success()
    }

    pub fn error(&self) -> Option<String> {
        self.code.message().map(str::to_owned)
    }

    pub fn wait_ms(&self) -> u32 {
        (self.wait_seconds.max(0.0) * 1000.0).min(u32::MAX as f64) as u32
    }

    pub fn cool_down_i16(&self) -> i16 {
        self.cool_down_seconds
            .round()
            .clamp(i16::MIN as f64, i16::MAX as f64) as i16
    }
}

/// Placement policy. The pixel is already known to be inside the canvas,
/// of a valid color and not protected when this is called.
pub trait PixelPlacer: Send + Sync {
    fn place<'a>(
        &'a self,
        user: &'a User,
        canvas_id: CanvasId,
        color: u8,
        coord: PixelCoord,
    ) -> BoxFuture<'a, PlaceOutcome>;
}

/// Allows every placement without cooldown.
#[derive(Debug, Default)]
pub struct FreePlacer;

impl PixelPlacer for FreePlacer {
    fn place<'a>(
        &'a self,
        _user: &'a User,
        _canvas_id: CanvasId,
        _color: u8,
        _coord: PixelCoord,
    ) -> BoxFuture<'a, PlaceOutcome> {
        Box::pin(async { PlaceOutcome::allowed(0.0, 0.0) })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoginInfo {
    pub wait_seconds: Option<f64>,
    /// Account the external user is linked to.
    pub name: Option<String>,
}

/// Presence and account links of the external population behind the bridge.
pub trait BridgeDirectory: Send + Sync {
    fn user_for_external<'a>(&'a self, external_id: &'a str, ip: Option<&'a str>) -> BoxFuture<'a, User>;

    fn report_login<'a>(&'a self, external_id: &'a str, name: &'a str) -> BoxFuture<'a, LoginInfo>;

    fn report_logout<'a>(&'a self, external_id: &'a str) -> BoxFuture<'a, ()>;

    fn report_userlist<'a>(&'a self, users: &'a [(String, String)]) -> BoxFuture<'a, ()>;

    /// Linked account name of an external user, looked up by external name.
    fn display_name<'a>(&'a self, external_name: &'a str) -> BoxFuture<'a, Option<String>>;

    /// Links an external user to an account. Returns the reason on failure.
    fn link_account<'a>(
        &'a self,
        external_id: &'a str,
        external_name: &'a str,
        account: &'a str,
    ) -> BoxFuture<'a, Option<String>>;
}

#[derive(Debug, Clone, Default)]
struct ExternalUser {
    name: String,
    account: Option<String>,
}

/// In-process directory; forgets everything on restart.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    online: RwLock<HashMap<String, ExternalUser>>,
    links: RwLock<HashMap<String, String>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn online_count(&self) -> usize {
        self.online.read().await.len()
    }
}

impl BridgeDirectory for MemoryDirectory {
    fn user_for_external<'a>(&'a self, external_id: &'a str, ip: Option<&'a str>) -> BoxFuture<'a, User> {
        Box::pin(async move {
            User {
                name: self.links.read().await.get(external_id).cloned(),
                ip: ip.map(str::to_owned),
                external_id: Some(external_id.to_owned()),
            }
        })
    }

    fn report_login<'a>(&'a self, external_id: &'a str, name: &'a str) -> BoxFuture<'a, LoginInfo> {
        Box::pin(async move {
            let account = self.links.read().await.get(external_id).cloned();
            self.online.write().await.insert(
                external_id.to_owned(),
                ExternalUser {
                    name: name.to_owned(),
                    account: account.clone(),
                },
            );
            LoginInfo {
                wait_seconds: None,
                name: account,
            }
        })
    }

    fn report_logout<'a>(&'a self, external_id: &'a str) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            self.online.write().await.remove(external_id);
        })
    }

    fn report_userlist<'a>(&'a self, users: &'a [(String, String)]) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let links = self.links.read().await;
            let mut online = self.online.write().await;
            online.clear();
            for (external_id, name) in users {
                online.insert(
                    external_id.clone(),
                    ExternalUser {
                        name: name.clone(),
                        account: links.get(external_id).cloned(),
                    },
                );
            }
        })
    }

    fn display_name<'a>(&'a self, external_name: &'a str) -> BoxFuture<'a, Option<String>> {
        Box::pin(async move {
            self.online
                .read()
                .await
                .values()
                .find(|user| user.name == external_name)
                .and_then(|user| user.account.clone())
        })
    }

    fn link_account<'a>(
        &'a self,
        external_id: &'a str,
        external_name: &'a str,
        account: &'a str,
    ) -> BoxFuture<'a, Option<String>> {
        Box::pin(async move {
            let mut links = self.links.write().await;
            if links.get(external_id).is_some_and(|linked| linked != account) {
                return Some("This account is already linked".to_owned());
            }
            if links.iter().any(|(id, linked)| linked == account && id != external_id) {
                return Some("Another external user is linked to this account".to_owned());
            }
            links.insert(external_id.to_owned(), account.to_owned());
            let mut online = self.online.write().await;
            let entry = online.entry(external_id.to_owned()).or_default();
            entry.name = external_name.to_owned();
            entry.account = Some(account.to_owned());
            None
        })
    }
}

/// Chat moderation. Returns the reason a message is refused.
pub trait ChatFilter: Send + Sync {
    fn check<'a>(&'a self, user: &'a User, message: &'a str, channel_id: u32) -> BoxFuture<'a, Result<(), String>>;
}

/// Accepts any non-empty message of registered users up to a length limit.
#[derive(Debug)]
pub struct OpenChat {
    pub max_len: usize,
}

impl Default for OpenChat {
    fn default() -> Self {
        Self { max_len: 200 }
    }
}

impl ChatFilter for OpenChat {
    fn check<'a>(&'a self, user: &'a User, message: &'a str, _channel_id: u32) -> BoxFuture<'a, Result<(), String>> {
        Box::pin(async move {
            if !user.is_registered() {
                return Err("You are not logged in".to_owned());
            }
            if message.trim().is_empty() {
                return Err("Message is empty".to_owned());
            }
            if message.chars().count() > self.max_len {
                return Err(format!("Message is longer than {} characters", self.max_len));
            }
            Ok(())
        })
    }
}

/// Bundle of collaborators handed to the server.
#[derive(Clone)]
pub struct Collaborators {
    pub placer: Arc<dyn PixelPlacer>,
    pub directory: Arc<dyn BridgeDirectory>,
    pub chat: Arc<dyn ChatFilter>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            placer: Arc::new(FreePlacer),
            directory: Arc::new(MemoryDirectory::new()),
            chat: Arc::new(OpenChat::default()),
        }
    }
}
