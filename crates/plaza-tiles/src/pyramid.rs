use crate::job::{TileJob, TileRenderer};
use crate::store::TileStore;
use crate::updater::CanvasUpdater;
use crate::worker::{JobSink, TileWorkerPool};
use plaza_canvas::{ChunkChangeListener, ChunkStore, Palette};
use plaza_common::config::ServerConfig;
use plaza_common::{CanvasId, ChunkCoord, Result};
use plaza_logger::{log, LogSeverity::*};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub struct TileConfig {
    pub folder: PathBuf,
    pub workers: usize,
    pub base_interval: Duration,
    pub small_canvas_interval: Duration,
}

impl TileConfig {
    pub fn from_server_config(config: &ServerConfig) -> Self {
        Self {
            folder: config.tile_folder.clone(),
            workers: config.tile_workers,
            base_interval: config.tile_base_interval(),
            small_canvas_interval: config.small_canvas_interval(),
        }
    }
}

/// Keeps the tile pyramids of all flat canvases up to date. Register it as
/// the chunk store's change listener.
pub struct TilePyramid {
    updaters: HashMap<CanvasId, Arc<CanvasUpdater>>,
    pool: Arc<TileWorkerPool>,
    loops: Mutex<Vec<JoinHandle<()>>>,
}

impl TilePyramid {
    /// Initializes every canvas whose tile folder is empty, then starts the
    /// reload loops.
    pub async fn start(chunks: Arc<ChunkStore>, palette: Arc<Palette>, config: TileConfig) -> Result<Arc<Self>> {
        tokio::fs::create_dir_all(&config.folder).await?;
        let tiles = TileStore::new(&config.folder);
        let renderer = Arc::new(TileRenderer::new(chunks.clone(), tiles.clone(), palette));
        let pool = Arc::new(TileWorkerPool::spawn(renderer.clone(), config.workers));
        let sink: Arc<dyn JobSink> = pool.clone();

        let mut updaters = HashMap::new();
        let mut loops = Vec::new();
        for (canvas_id, canvas) in chunks.canvases().iter() {
            if canvas.is_3d {
                continue;
            }
            log(
                format!("Tiling: using folder {}", tiles.canvas_folder(canvas_id).display()),
                Info,
            );
            if !tiles.is_initialized(canvas_id) {
                log(
                    "Tiling: tile folder empty, initializing it, this can take some time".to_owned(),
                    Warning,
                );
                if let Err(e) = renderer.run(TileJob::Initialize { canvas_id }).await {
                    log(format!("Tiling: initializing canvas {} failed: {}", canvas_id, e), Error);
                }
            }
            let updater = Arc::new(CanvasUpdater::new(canvas_id, canvas, sink.clone()));
            loops.extend(updater.spawn_loops(config.base_interval, config.small_canvas_interval));
            updaters.insert(canvas_id, updater);
        }

        Ok(Arc::new(Self {
            updaters,
            pool,
            loops: Mutex::new(loops),
        }))
    }

    pub fn updater(&self, canvas_id: CanvasId) -> Option<&Arc<CanvasUpdater>> {
        self.updaters.get(&canvas_id)
    }

    pub fn shutdown(&self) {
        let loops = std::mem::take(
            &mut *self
                .loops
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        );
        for handle in loops {
            handle.abort();
        }
        self.pool.shutdown();
    }
}

impl ChunkChangeListener for TilePyramid {
    fn chunk_changed(&self, canvas_id: CanvasId, chunk: ChunkCoord) {
        if let Some(updater) = self.updaters.get(&canvas_id) {
            updater.register_chunk_change(chunk);
        }
    }
}
