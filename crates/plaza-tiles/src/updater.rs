use crate::job::TileJob;
use crate::worker::JobSink;
use plaza_canvas::addressing::{level_width, max_tiled_zoom, parent_tile, tile_of_chunk};
use plaza_common::{Canvas, CanvasId, ChunkCoord};
use plaza_logger::{log, LogSeverity::*};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Per-canvas reload queues, one per stored zoom level. Changed chunks
/// enqueue their base tile; each level drains one tile per tick and pushes
/// the parent tile one level up, so a burst of edits costs one render per
/// tile and level.
pub struct CanvasUpdater {
    canvas_id: CanvasId,
    max_tiled_zoom: u32,
    queues: Mutex<Vec<VecDeque<u32>>>,
    sink: Arc<dyn JobSink>,
}

impl CanvasUpdater {
    pub fn new(canvas_id: CanvasId, canvas: &Canvas, sink: Arc<dyn JobSink>) -> Self {
        let max_tiled_zoom = max_tiled_zoom(canvas.size);
        // a canvas that fits one tile still keeps one queue for its texture
        let levels = max_tiled_zoom.max(1) as usize;
        Self {
            canvas_id,
            max_tiled_zoom,
            queues: Mutex::new(vec![VecDeque::new(); levels]),
            sink,
        }
    }

    pub fn canvas_id(&self) -> CanvasId {
        self.canvas_id
    }

    pub fn max_tiled_zoom(&self) -> u32 {
        self.max_tiled_zoom
    }

    pub fn levels(&self) -> u32 {
        self.max_tiled_zoom.max(1)
    }

    fn queues(&self) -> MutexGuard<'_, Vec<VecDeque<u32>>> {
        self.queues
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Tiles waiting on a level.
    pub fn pending(&self, zoom: u32) -> Vec<u32> {
        self.queues()
            .get(zoom as usize)
            .map(|queue| queue.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn register_chunk_change(&self, chunk: ChunkCoord) {
        let base = self.max_tiled_zoom.saturating_sub(1);
        let (x, y) = tile_of_chunk(chunk);
        let tile = x + y * level_width(base);
        let mut queues = self.queues();
        let Some(queue) = queues.get_mut(base as usize) else {
            return;
        };
        if !queue.contains(&tile) {
            queue.push_back(tile);
            log(
                format!("Tiling: enqueued {}, {} / {} for base zoom reload", x, y, self.canvas_id),
                Debug,
            );
        }
    }

    /// Renders at most one queued tile of `zoom`.
    pub fn update_zoom_level(&self, zoom: u32) {
        let mut queues = self.queues();
        let Some(tile) = queues.get_mut(zoom as usize).and_then(VecDeque::pop_front) else {
            return;
        };
        let width = level_width(zoom);
        let (x, y) = (tile % width, tile / width);

        if zoom + 1 == self.max_tiled_zoom {
            self.sink.dispatch(TileJob::BaseTileFromChunks {
                canvas_id: self.canvas_id,
                x,
                y,
            });
        } else if zoom < self.max_tiled_zoom {
            self.sink.dispatch(TileJob::TileFromChildren {
                canvas_id: self.canvas_id,
                zoom,
                x,
                y,
            });
        }

        if zoom == 0 {
            self.sink.dispatch(TileJob::Texture {
                canvas_id: self.canvas_id,
            });
            return;
        }
        let (ux, uy) = parent_tile(x, y);
        let upper = ux + uy * level_width(zoom - 1);
        let queue = &mut queues[zoom as usize - 1];
        if !queue.contains(&upper) {
            queue.push_back(upper);
            log(
                format!("Tiling: enqueued {}, {}, {} for reload", zoom - 1, ux, uy),
                Debug,
            );
        }
    }

    /// Tick period of a level. Each coarser level runs eight times slower.
    pub fn interval(&self, zoom: u32, base_interval: Duration, small_canvas_interval: Duration) -> Duration {
        if self.max_tiled_zoom == 0 {
            return small_canvas_interval;
        }
        let steps = self.max_tiled_zoom.saturating_sub(1 + zoom);
        base_interval.saturating_mul(8u32.saturating_pow(steps))
    }

    /// Starts one ticking task per level.
    pub fn spawn_loops(
        self: &Arc<Self>,
        base_interval: Duration,
        small_canvas_interval: Duration,
    ) -> Vec<JoinHandle<()>> {
        (0..self.levels())
            .map(|zoom| {
                let period = self.interval(zoom, base_interval, small_canvas_interval);
                log(
                    format!(
                        "Tiling: interval for zoom level {} of canvas {} is {:?}",
                        zoom, self.canvas_id, period
                    ),
                    Info,
                );
                let updater = self.clone();
                tokio::spawn(async move {
                    let mut ticker = tokio::time::interval(period);
                    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                    // the first tick completes immediately
                    ticker.tick().await;
                    loop {
                        ticker.tick().await;
                        updater.update_zoom_level(zoom);
                    }
                })
            })
            .collect()
    }
}
