//! Commands of the administrative bridge endpoint, acting on canvas 0 on
//! behalf of external users.

use crate::collab::User;
use crate::hub::Hub;
use crate::session::Session;
use plaza_canvas::addressing;
use plaza_common::PixelCoord;
use plaza_logger::{log, LogSeverity::*};
use plaza_protocol::{BridgeCommand, BridgeReply, ChatMessage};

const BRIDGE_CANVAS: u8 = 0;

pub async fn handle_bridge_text(hub: &Hub, session: &Session, text: &str) {
    let Some(command) = BridgeCommand::parse(text) else {
        return;
    };
    let directory = &hub.collaborators().directory;
    match command {
        BridgeCommand::Subscribe(subscription) => session.subscribe(subscription),
        BridgeCommand::SetPixel {
            external_id,
            ip,
            x,
            y,
            color,
        } => {
            if let Some(reply) = set_pixel(hub, external_id, ip, x, y, color).await {
                session.send_text(reply.encode());
            }
        }
        BridgeCommand::Login {
            external_id,
            name,
            ip: _,
        } => {
            let info = directory.report_login(&external_id, &name).await;
            let reply = BridgeReply::Me {
                id: external_id,
                wait_seconds: info.wait_seconds,
                name: info.name,
            };
            session.send_text(reply.encode());
        }
        BridgeCommand::Logout { external_id } => directory.report_logout(&external_id).await,
        BridgeCommand::UserList(users) => directory.report_userlist(&users).await,
        BridgeCommand::ExternalChat { name, message } => {
            let shown = directory.display_name(&name).await.unwrap_or(name);
            let chat = ChatMessage::new(&format!("[MC] {}", shown), &message, "xx", 0);
            hub.broadcast_chat(&chat, Some(session.id()));
        }
        BridgeCommand::Chat(chat) => hub.broadcast_chat(&chat, Some(session.id())),
        BridgeCommand::LinkAccount {
            external_id,
            external_name,
            account,
        } => {
            let error = directory
                .link_account(&external_id, &external_name, &account)
                .await;
            if error.is_none() {
                hub.notify_changed_me(&account);
            }
            let reply = BridgeReply::LinkResult {
                id: external_id,
                error,
            };
            session.send_text(reply.encode());
        }
    }
}

/// Out of palette colors are dropped without a reply.
async fn set_pixel(
    hub: &Hub,
    external_id: Option<String>,
    ip: Option<String>,
    x: i32,
    y: i32,
    color: i64,
) -> Option<BridgeReply> {
    let color = match u8::try_from(color) {
        Ok(color) if (color as usize) < hub.palette().len() => color,
        _ => {
            log(format!("Bridge pixel with invalid color {}", color), Debug);
            return None;
        }
    };
    let coord = PixelCoord::flat(x, y);

    if external_id.is_none() && ip.is_none() {
        let committed = set_pixel_directly(hub, coord, color).await;
        return Some(BridgeReply::PixelResult {
            id: None,
            error: None,
            success: committed,
            wait_seconds: 0.0,
            cool_down_seconds: Some(0.0),
        });
    }

    let user = match external_id.as_deref() {
        Some(id) => {
            hub.collaborators()
                .directory
                .user_for_external(id, ip.as_deref())
                .await
        }
        None => User {
            ip: ip.clone(),
            ..User::default()
        },
    };
    let outcome = hub.place_at_coords(&user, BRIDGE_CANVAS, coord, color).await;
    Some(BridgeReply::PixelResult {
        id: external_id.or(ip),
        error: outcome.error(),
        success: outcome.success(),
        wait_seconds: outcome.wait_seconds,
        cool_down_seconds: (outcome.cool_down_seconds != 0.0).then_some(outcome.cool_down_seconds),
    })
}

async fn set_pixel_directly(hub: &Hub, coord: PixelCoord, color: u8) -> bool {
    let Some(canvas) = hub.store().canvases().get(BRIDGE_CANVAS) else {
        return false;
    };
    let Some((chunk, offset)) = addressing::address_of(canvas, coord) else {
        log(format!("Bridge pixel {:?} is outside canvas {}", coord, BRIDGE_CANVAS), Debug);
        return false;
    };
    match hub.commit_pixel(BRIDGE_CANVAS, chunk, offset, color).await {
        Ok(committed) => committed,
        Err(e) => {
            log(format!("Could not store bridge pixel {:?}: {}", coord, e), Error);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::{Collaborators, MemoryDirectory};
    use crate::session::SessionKind;
    use plaza_canvas::{ChunkStore, MemoryStore, Palette};
    use plaza_common::{Canvas, CanvasTable};
    use plaza_protocol::Subscription;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio_tungstenite::tungstenite::Message;
    use tokio_util::sync::CancellationToken;

    fn hub() -> Hub {
        let mut canvases = BTreeMap::new();
        canvases.insert(0, Canvas::flat("d", 1024));
        let store = Arc::new(ChunkStore::new(
            Arc::new(MemoryStore::new()),
            Arc::new(CanvasTable::new(canvases).unwrap()),
        ));
        let collaborators = Collaborators {
            directory: Arc::new(MemoryDirectory::new()),
            ..Collaborators::default()
        };
        Hub::new(store, Arc::new(Palette::default()), collaborators)
    }

    fn join(hub: &Hub, kind: SessionKind, user: User) -> (Arc<Session>, UnboundedReceiver<Message>) {
        let (session, rx) = Session::new(kind, user, CancellationToken::new());
        hub.register(session.clone());
        (session, rx)
    }

    fn texts(rx: &mut UnboundedReceiver<Message>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(message) = rx.try_recv() {
            if let Message::Text(text) = message {
                out.push(text.as_str().to_owned());
            }
        }
        out
    }

    #[tokio::test]
    async fn test_anonymous_setpxl_writes_directly() {
        let hub = hub();
        let (bridge, mut rx) = join(&hub, SessionKind::Bridge, User::default());
        handle_bridge_text(&hub, &bridge, r#"["setpxl",null,null,3,4,6]"#).await;
        assert_eq!(texts(&mut rx), vec![r#"["retpxl",null,null,true,0,0]"#]);
        let cell = hub.store().get_pixel(0, PixelCoord::flat(3, 4)).await.unwrap();
        assert_eq!(cell.color(), 6);
    }

    #[tokio::test]
    async fn test_setpxl_for_external_user() {
        let hub = hub();
        let (bridge, mut rx) = join(&hub, SessionKind::Bridge, User::default());
        handle_bridge_text(&hub, &bridge, r#"["setpxl","steve","1.2.3.4",0,0,2]"#).await;
        assert_eq!(texts(&mut rx), vec![r#"["retpxl","steve",null,true,0,null]"#]);

        handle_bridge_text(&hub, &bridge, r#"["setpxl","steve","1.2.3.4",9999,0,2]"#).await;
        let replies = texts(&mut rx);
        assert_eq!(replies.len(), 1);
        assert!(replies[0].starts_with(r#"["retpxl","steve",""#));
        assert!(replies[0].contains("false"));
    }

    #[tokio::test]
    async fn test_invalid_color_is_dropped() {
        let hub = hub();
        let (bridge, mut rx) = join(&hub, SessionKind::Bridge, User::default());
        handle_bridge_text(&hub, &bridge, r#"["setpxl",null,null,0,0,-1]"#).await;
        handle_bridge_text(&hub, &bridge, r#"["setpxl",null,null,0,0,200]"#).await;
        assert!(texts(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_external_chat_uses_linked_name() {
        let hub = hub();
        let (origin, mut origin_rx) = join(&hub, SessionKind::Bridge, User::default());
        let (_client, mut client_rx) = join(&hub, SessionKind::Client, User::default());
        origin.subscribe(Subscription::Chat);

        handle_bridge_text(&hub, &origin, r#"["linkacc","id1","Steve","alice"]"#).await;
        assert_eq!(texts(&mut origin_rx), vec![r#"["linkret","id1",null]"#]);

        handle_bridge_text(&hub, &origin, r#"["mcchat","Steve","hello"]"#).await;
        handle_bridge_text(&hub, &origin, r#"["mcchat","Alex","hi"]"#).await;
        assert_eq!(
            texts(&mut client_rx),
            vec![
                r#"["[MC] alice","hello","xx",0]"#.to_owned(),
                r#"["[MC] Alex","hi","xx",0]"#.to_owned(),
            ]
        );
        assert!(texts(&mut origin_rx).is_empty());
    }

    #[tokio::test]
    async fn test_link_notifies_account_sessions() {
        let hub = hub();
        let (bridge, _rx) = join(&hub, SessionKind::Bridge, User::default());
        let (_alice, mut alice_rx) = join(&hub, SessionKind::Client, User::named("alice"));
        handle_bridge_text(&hub, &bridge, r#"["linkacc","id1","Steve","alice"]"#).await;
        assert_matches::assert_matches!(alice_rx.try_recv(), Ok(Message::Binary(_)));

        // a second external user cannot take the same account
        handle_bridge_text(&hub, &bridge, r#"["linkacc","id2","Alex","alice"]"#).await;
        assert!(alice_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_login_replies_me() {
        let hub = hub();
        let (bridge, mut rx) = join(&hub, SessionKind::Bridge, User::default());
        handle_bridge_text(&hub, &bridge, r#"["login","id1","Steve","1.2.3.4"]"#).await;
        assert_eq!(texts(&mut rx), vec![r#"["mcme","id1",null,null]"#]);
        handle_bridge_text(&hub, &bridge, r#"["sub","pxl"]"#).await;
        assert!(bridge.is_subscribed(Subscription::Pixels));
    }
}
