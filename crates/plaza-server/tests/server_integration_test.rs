mod common;

use assert_matches::assert_matches;
use common::*;
use futures::future::join_all;
use futures::SinkExt;
use plaza_common::{ChunkCoord, PixelCoord};
use plaza_protocol::pixel_update::PixelUpdatePacket;
use plaza_protocol::register_chunk::RegisterChunkPacket;
use plaza_protocol::{ClientEvent, Packet, ReturnCode, ServerPacket};
use std::time::Duration;
use tokio_tungstenite::tungstenite::{self, Message};

fn is_return(event: &ClientEvent) -> bool {
    matches!(event, ClientEvent::PixelReturn(_))
}

#[tokio::test]
async fn test_client_gets_name_and_online_counter() {
    let server = start_server().await;
    let (client, mut events) = spawn_client(&server, Some("alice"));
    client.connect().unwrap();

    assert_eq!(wait_for(&mut events, |e| *e == ClientEvent::Open).await, ClientEvent::Open);
    assert_eq!(
        wait_for(&mut events, |e| matches!(e, ClientEvent::SetName(_))).await,
        ClientEvent::SetName("alice".to_owned())
    );
    assert_matches!(
        wait_for(&mut events, |e| matches!(e, ClientEvent::OnlineCounter(_))).await,
        ClientEvent::OnlineCounter(1)
    );
}

#[tokio::test]
async fn test_pixel_reaches_registered_watchers() {
    let server = start_server().await;
    let chunk = ChunkCoord::new(2, 2);

    let (watcher, mut watcher_events) = spawn_client(&server, None);
    watcher.register_chunk(chunk).unwrap();
    watcher.connect().unwrap();
    wait_for(&mut watcher_events, |e| *e == ClientEvent::Open).await;
    // the watcher's own placement comes back only after its registration
    watcher.request_place_pixel(2, 2, 1, 3).unwrap();
    wait_for(&mut watcher_events, is_return).await;

    let (placer, mut placer_events) = spawn_client(&server, None);
    placer.request_place_pixel(2, 2, 0, 5).unwrap();
    assert_matches!(
        wait_for(&mut placer_events, is_return).await,
        ClientEvent::PixelReturn(packet) if packet.code == ReturnCode::Success
    );
    assert_eq!(
        wait_for(&mut watcher_events, |e| *e == ClientEvent::PixelUpdate(PixelUpdatePacket::new(2, 2, 0, 5))).await,
        ClientEvent::PixelUpdate(PixelUpdatePacket::new(2, 2, 0, 5))
    );

    let stored = server.hub.store().get_pixel(0, PixelCoord::flat(0, 0)).await.unwrap();
    assert_eq!(stored.color(), 5);
}

#[tokio::test]
async fn test_placement_rejections_reach_client() {
    let server = start_server().await;
    let (client, mut events) = spawn_client(&server, None);
    client.set_canvas(9).unwrap();
    client.request_place_pixel(0, 0, 0, 1).unwrap();
    assert_matches!(
        wait_for(&mut events, is_return).await,
        ClientEvent::PixelReturn(packet) if packet.code == ReturnCode::InvalidCanvas
    );

    client.set_canvas(1).unwrap();
    client.request_place_pixel(0, 0, 0, 250).unwrap();
    assert_matches!(
        wait_for(&mut events, is_return).await,
        ClientEvent::PixelReturn(packet) if packet.code == ReturnCode::InvalidColor
    );
}

#[tokio::test]
async fn test_bridge_requires_api_key() {
    let server = start_server().await;
    assert_matches!(
        connect_bridge(&server, None).await,
        Err(tungstenite::Error::Http(response)) if response.status() == 401
    );
    assert_matches!(
        connect_bridge(&server, Some("wrong")).await,
        Err(tungstenite::Error::Http(response)) if response.status() == 401
    );
    assert!(connect_bridge(&server, Some(API_KEY)).await.is_ok());
}

#[tokio::test]
async fn test_bridge_pixel_is_broadcast() {
    let server = start_server().await;
    let mut bridge = connect_bridge(&server, Some(API_KEY)).await.unwrap();
    bridge.send(Message::text(r#"["sub","pxl"]"#)).await.unwrap();
    bridge.send(Message::text(r#"["login","id1","Steve",null]"#)).await.unwrap();
    assert_eq!(next_text(&mut bridge).await, r#"["mcme","id1",null,null]"#);

    let (watcher, mut events) = spawn_client(&server, None);
    watcher.register_chunk(ChunkCoord::new(2, 2)).unwrap();
    watcher.connect().unwrap();
    wait_for(&mut events, |e| *e == ClientEvent::Open).await;
    watcher.request_place_pixel(2, 2, 1, 3).unwrap();
    wait_for(&mut events, is_return).await;
    // the bridge sees that placement too
    assert_eq!(
        ServerPacket::decode(&next_binary(&mut bridge).await),
        Some(ServerPacket::PixelUpdate(PixelUpdatePacket::new(2, 2, 1, 3)))
    );

    bridge.send(Message::text(r#"["setpxl",null,null,0,0,5]"#)).await.unwrap();
    assert_eq!(next_text(&mut bridge).await, r#"["retpxl",null,null,true,0,0]"#);
    assert_eq!(
        wait_for(&mut events, |e| matches!(e, ClientEvent::PixelUpdate(_))).await,
        ClientEvent::PixelUpdate(PixelUpdatePacket::new(2, 2, 0, 5))
    );
}

#[tokio::test]
async fn test_chat_reaches_clients_and_bridges() {
    let server = start_server().await;
    let mut bridge = connect_bridge(&server, Some(API_KEY)).await.unwrap();
    bridge.send(Message::text(r#"["sub","chat"]"#)).await.unwrap();
    bridge.send(Message::text(r#"["login","id1","Steve",null]"#)).await.unwrap();
    next_text(&mut bridge).await;

    let (alice, mut alice_events) = spawn_client(&server, Some("alice"));
    alice.connect().unwrap();
    wait_for(&mut alice_events, |e| matches!(e, ClientEvent::SetName(_))).await;
    alice.send_chat_message("hello", 0).unwrap();

    assert_matches!(
        wait_for(&mut alice_events, |e| matches!(e, ClientEvent::ChatMessage(_))).await,
        ClientEvent::ChatMessage(chat) if chat.name == "alice" && chat.text == "hello"
    );
    assert_eq!(next_text(&mut bridge).await, r#"["msg","alice","hello","xx",0]"#);

    bridge.send(Message::text(r#"["mcchat","Steve","hi there"]"#)).await.unwrap();
    assert_matches!(
        wait_for(&mut alice_events, |e| matches!(e, ClientEvent::ChatMessage(_))).await,
        ClientEvent::ChatMessage(chat) if chat.name == "[MC] Steve" && chat.text == "hi there"
    );
}

#[tokio::test]
async fn test_anonymous_chat_is_refused() {
    let server = start_server().await;
    let (client, mut events) = spawn_client(&server, None);
    client.connect().unwrap();
    wait_for(&mut events, |e| *e == ClientEvent::Open).await;
    client.send_chat_message("hello", 0).unwrap();
    assert_matches!(
        wait_for(&mut events, |e| matches!(e, ClientEvent::ChatMessage(_))).await,
        ClientEvent::ChatMessage(chat) if chat.name == "info"
    );
}

#[tokio::test]
async fn test_many_clients_connect() {
    let server = start_server().await;
    let clients = join_all((0..20).map(|n| {
        let (client, mut events) = spawn_client(&server, Some(&format!("user{}", n)));
        async move {
            client.connect().unwrap();
            wait_for(&mut events, |e| matches!(e, ClientEvent::SetName(_))).await;
            (client, events)
        }
    }))
    .await;
    assert_eq!(server.hub.client_count(), 20);

    for (client, _) in &clients {
        client.close().unwrap();
    }
    tokio::time::timeout(WAIT, async {
        while server.hub.client_count() > 0 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_unresponsive_session_is_terminated() {
    let mut config = test_config();
    config.ping_interval_secs = 1;
    let server = start_server_with(config).await;

    let mut raw = connect_bridge(&server, Some(API_KEY)).await.unwrap();
    tokio::time::timeout(WAIT, async {
        while server.hub.bridge_count() == 0 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap();

    // not reading means pings go unanswered
    tokio::time::sleep(Duration::from_millis(3500)).await;
    assert_eq!(server.hub.bridge_count(), 0);

    let mut saw_close = false;
    while let Some(Ok(message)) = futures::StreamExt::next(&mut raw).await {
        if matches!(message, Message::Close(_)) {
            saw_close = true;
        }
    }
    assert!(saw_close);
}

#[tokio::test]
async fn test_raw_client_registration() {
    let server = start_server().await;
    let url = server.client_url();
    let (mut raw, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();
    raw.send(Message::binary(RegisterChunkPacket::new(ChunkCoord::new(2, 2)).to_bytes()))
        .await
        .unwrap();
    // no RegisterCanvas yet, so the placement has no canvas
    raw.send(Message::binary(PixelUpdatePacket::new(2, 2, 0, 1).to_bytes()))
        .await
        .unwrap();
    let reply = loop {
        match ServerPacket::decode(&next_binary(&mut raw).await) {
            Some(ServerPacket::OnlineCounter(_)) => continue,
            other => break other,
        }
    };
    assert_matches!(
        reply,
        Some(ServerPacket::PixelReturn(packet)) if packet.code == ReturnCode::InvalidCanvas
    );
}
