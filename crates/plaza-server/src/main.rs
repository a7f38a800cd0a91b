use plaza_canvas::{snapshot, ChunkStore, KeyValueStore, MemoryStore, Palette};
use plaza_common::config::ServerConfig;
use plaza_common::Result;
use plaza_logger::{log, set_min_severity, LogSeverity, LogSeverity::*};
use plaza_server::{Collaborators, Server};
use plaza_tiles::{TileConfig, TilePyramid};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

const CHUNK_PREFIX: &str = "ch:";

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        log(format!("Plaza stopped: {}", e), Fatal);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config = ServerConfig::load(std::env::args_os().nth(1).map(PathBuf::from))?;
    match config.log_level.parse::<LogSeverity>() {
        Ok(severity) => {
            set_min_severity(severity);
        }
        Err(e) => log(format!("Ignoring log level: {}", e), Warning),
    }
    log("Plaza init".to_owned(), Info);

    let backend = Arc::new(MemoryStore::new());
    if let Some(path) = &config.snapshot_path {
        snapshot::load(backend.as_ref(), path).await?;
    }
    let chunks = Arc::new(ChunkStore::new(backend.clone(), Arc::new(config.canvas_table()?)));
    let palette = Arc::new(Palette::default());

    let pyramid = TilePyramid::start(
        chunks.clone(),
        palette.clone(),
        TileConfig::from_server_config(&config),
    )
    .await?;
    chunks.set_chunk_listener(pyramid.clone());

    let server = Server::bind(&config, chunks, palette, Collaborators::default()).await?;
    let cancel = server.shutdown_token();
    let snapshots = config.snapshot_path.clone().map(|path| {
        tokio::spawn(snapshot_loop(
            backend.clone(),
            path,
            config.snapshot_interval(),
            cancel.clone(),
        ))
    });
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => log("Shutting down".to_owned(), Info),
            Err(e) => log(format!("Could not listen for ctrl-c: {}", e), Error),
        }
        cancel.cancel();
    });

    server.run().await?;
    pyramid.shutdown();
    if let Some(task) = snapshots {
        task.abort();
    }
    if let Some(path) = &config.snapshot_path {
        snapshot::save(backend.as_ref(), CHUNK_PREFIX, path).await?;
    }
    Ok(())
}

async fn snapshot_loop(
    backend: Arc<MemoryStore>,
    path: PathBuf,
    period: std::time::Duration,
    cancel: CancellationToken,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {
                let store: &dyn KeyValueStore = backend.as_ref();
                if let Err(e) = snapshot::save(store, CHUNK_PREFIX, &path).await {
                    log(format!("Snapshot to {} failed: {}", path.display(), e), Error);
                }
            }
        }
    }
}
