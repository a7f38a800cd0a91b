#![allow(dead_code)]

use futures::StreamExt;
use plaza_canvas::{ChunkStore, MemoryStore, Palette};
use plaza_common::config::ServerConfig;
use plaza_common::Canvas;
use plaza_protocol::{ClientEvent, ProtocolClient};
use plaza_server::{Collaborators, Hub, Server};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

pub const API_KEY: &str = "test-key";
pub const WAIT: Duration = Duration::from_secs(5);

pub type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct TestServer {
    pub addr: SocketAddr,
    pub hub: Arc<Hub>,
    pub cancel: CancellationToken,
    pub task: JoinHandle<()>,
}

impl TestServer {
    pub fn client_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    pub fn bridge_url(&self) -> String {
        format!("ws://{}/mcws", self.addr)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

pub fn test_config() -> ServerConfig {
    let mut config = ServerConfig {
        bind: "127.0.0.1:0".to_owned(),
        api_key: Some(API_KEY.to_owned()),
        online_counter_interval_secs: 1,
        ..ServerConfig::default()
    };
    config.canvases.clear();
    config.canvases.insert("0".to_owned(), Canvas::flat("d", 1024));
    config.canvases.insert("1".to_owned(), Canvas::flat("m", 256));
    config
}

pub async fn start_server() -> TestServer {
    start_server_with(test_config()).await
}

pub async fn start_server_with(config: ServerConfig) -> TestServer {
    let store = Arc::new(ChunkStore::new(
        Arc::new(MemoryStore::new()),
        Arc::new(config.canvas_table().unwrap()),
    ));
    let server = Server::bind(&config, store, Arc::new(Palette::default()), Collaborators::default())
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    let hub = server.hub().clone();
    let cancel = server.shutdown_token();
    let task = tokio::spawn(async move {
        server.run().await.unwrap();
    });
    TestServer {
        addr,
        hub,
        cancel,
        task,
    }
}

pub async fn connect_bridge(server: &TestServer, key: Option<&str>) -> tungstenite::Result<Socket> {
    let mut request = server.bridge_url().into_client_request()?;
    if let Some(key) = key {
        request.headers_mut().insert(
            "authorization",
            HeaderValue::from_str(&format!("Bearer {}", key)).unwrap(),
        );
    }
    connect_async(request).await.map(|(socket, _)| socket)
}

/// Next text frame, skipping control and binary frames.
pub async fn next_text(socket: &mut Socket) -> String {
    tokio::time::timeout(WAIT, async {
        loop {
            match socket.next().await {
                Some(Ok(Message::Text(text))) => return text.as_str().to_owned(),
                Some(Ok(_)) => continue,
                other => panic!("socket ended: {:?}", other),
            }
        }
    })
    .await
    .expect("no text frame in time")
}

pub async fn next_binary(socket: &mut Socket) -> Vec<u8> {
    tokio::time::timeout(WAIT, async {
        loop {
            match socket.next().await {
                Some(Ok(Message::Binary(bytes))) => return bytes.to_vec(),
                Some(Ok(_)) => continue,
                other => panic!("socket ended: {:?}", other),
            }
        }
    })
    .await
    .expect("no binary frame in time")
}

pub fn spawn_client(server: &TestServer, name: Option<&str>) -> (ProtocolClient, UnboundedReceiver<ClientEvent>) {
    let (client, events, _task) = ProtocolClient::spawn(&server.client_url());
    if let Some(name) = name {
        client.set_name(name).unwrap();
    }
    (client, events)
}

/// Waits for the first event matching `wanted`, dropping the ones before it.
pub async fn wait_for<F>(events: &mut UnboundedReceiver<ClientEvent>, wanted: F) -> ClientEvent
where
    F: Fn(&ClientEvent) -> bool,
{
    tokio::time::timeout(WAIT, async {
        loop {
            let event = events.recv().await.expect("client task ended");
            if wanted(&event) {
                return event;
            }
        }
    })
    .await
    .expect("event did not arrive in time")
}
