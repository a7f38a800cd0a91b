use crate::render::{chunk_rgb, downsample, Mosaic};
use crate::store::TileStore;
use plaza_canvas::addressing::{level_width, max_tiled_zoom};
use plaza_canvas::{ChunkStore, Palette};
use plaza_common::constants::{TEXTURE_MAX_SIZE, TILE_SIZE, TILE_ZOOM_LEVEL};
use plaza_common::{Canvas, CanvasId, PlazaError, Result};
use plaza_logger::{log, LogSeverity::*};
use std::sync::Arc;
use std::time::Instant;

/// Unit of tile work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileJob {
    /// Tile of the finest stored level, rendered from its 4x4 chunks.
    BaseTileFromChunks { canvas_id: CanvasId, x: u32, y: u32 },
    /// Tile of a coarser level, rendered from its 4x4 children.
    TileFromChildren { canvas_id: CanvasId, zoom: u32, x: u32, y: u32 },
    /// Overview texture of the whole canvas.
    Texture { canvas_id: CanvasId },
    /// Every tile of every level plus the texture.
    Initialize { canvas_id: CanvasId },
}

impl TileJob {
    pub fn canvas_id(&self) -> CanvasId {
        match self {
            TileJob::BaseTileFromChunks { canvas_id, .. }
            | TileJob::TileFromChildren { canvas_id, .. }
            | TileJob::Texture { canvas_id }
            | TileJob::Initialize { canvas_id } => *canvas_id,
        }
    }
}

/// Runs tile jobs. Chunk reads are async; decoding, scaling and PNG encoding
/// run on the blocking pool.
pub struct TileRenderer {
    chunks: Arc<ChunkStore>,
    tiles: TileStore,
    palette: Arc<Palette>,
}

async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| PlazaError::Tile(format!("tile task failed: {}", e)))?
}

impl TileRenderer {
    pub fn new(chunks: Arc<ChunkStore>, tiles: TileStore, palette: Arc<Palette>) -> Self {
        Self {
            chunks,
            tiles,
            palette,
        }
    }

    pub fn tiles(&self) -> &TileStore {
        &self.tiles
    }

    fn canvas(&self, canvas_id: CanvasId) -> Result<Canvas> {
        Ok(self.chunks.canvases().require(canvas_id)?.clone())
    }

    pub async fn run(&self, job: TileJob) -> Result<()> {
        match job {
            TileJob::BaseTileFromChunks { canvas_id, x, y } => {
                self.base_tile(canvas_id, x, y).await
            }
            TileJob::TileFromChildren {
                canvas_id,
                zoom,
                x,
                y,
            } => self.tile_from_children(canvas_id, zoom, x, y).await,
            TileJob::Texture { canvas_id } => self.texture(canvas_id).await,
            TileJob::Initialize { canvas_id } => self.initialize(canvas_id).await,
        }
    }

    /// Fetches the chunk grid `[i0, i0+count) x [j0, j0+count)`, row by row.
    /// Chunks outside the canvas come back as `None`.
    async fn fetch_chunks(
        &self,
        canvas_id: CanvasId,
        per_side: u32,
        i0: u32,
        j0: u32,
        count: u32,
    ) -> Result<Vec<Option<Vec<u8>>>> {
        let mut chunks = Vec::with_capacity((count * count) as usize);
        for j in j0..j0 + count {
            for i in i0..i0 + count {
                if i >= per_side || j >= per_side {
                    chunks.push(None);
                } else {
                    chunks.push(self.chunks.get_chunk(canvas_id, i, j).await?);
                }
            }
        }
        Ok(chunks)
    }

    async fn base_tile(&self, canvas_id: CanvasId, x: u32, y: u32) -> Result<()> {
        let canvas = self.canvas(canvas_id)?;
        let zoom = max_tiled_zoom(canvas.size)
            .checked_sub(1)
            .ok_or_else(|| PlazaError::Tile(format!("canvas {} has no tile levels", canvas_id)))?;
        let chunks = self
            .fetch_chunks(
                canvas_id,
                canvas.chunks_per_side(),
                x * TILE_ZOOM_LEVEL,
                y * TILE_ZOOM_LEVEL,
                TILE_ZOOM_LEVEL,
            )
            .await?;
        let tiles = self.tiles.clone();
        let palette = self.palette.clone();
        blocking(move || {
            let part = TILE_SIZE / TILE_ZOOM_LEVEL;
            let mut mosaic = Mosaic::new(TILE_ZOOM_LEVEL, part);
            for (n, cells) in chunks.iter().enumerate() {
                let rgb = chunk_rgb(&palette, cells.as_deref(), TILE_SIZE);
                let n = n as u32;
                mosaic.place(
                    n % TILE_ZOOM_LEVEL,
                    n / TILE_ZOOM_LEVEL,
                    &downsample(&rgb, TILE_SIZE, TILE_ZOOM_LEVEL),
                );
            }
            tiles.write_tile(canvas_id, zoom, x, y, mosaic.into_rgb(), TILE_SIZE)
        })
        .await?;
        log(
            format!("Tiling: created base tile {}/{}/{}/{}", canvas_id, zoom, x, y),
            Debug,
        );
        Ok(())
    }

    async fn tile_from_children(&self, canvas_id: CanvasId, zoom: u32, x: u32, y: u32) -> Result<()> {
        let tiles = self.tiles.clone();
        let palette = self.palette.clone();
        blocking(move || {
            let part = TILE_SIZE / TILE_ZOOM_LEVEL;
            let mut mosaic = Mosaic::new(TILE_ZOOM_LEVEL, part);
            for dy in 0..TILE_ZOOM_LEVEL {
                for dx in 0..TILE_ZOOM_LEVEL {
                    let child = tiles.read_tile(
                        canvas_id,
                        zoom + 1,
                        x * TILE_ZOOM_LEVEL + dx,
                        y * TILE_ZOOM_LEVEL + dy,
                    )?;
                    let rgb = child
                        .filter(|rgb| rgb.len() == (TILE_SIZE * TILE_SIZE * 3) as usize)
                        .unwrap_or_else(|| {
                            palette.single_color_rgb(0, (TILE_SIZE * TILE_SIZE) as usize)
                        });
                    mosaic.place(dx, dy, &downsample(&rgb, TILE_SIZE, TILE_ZOOM_LEVEL));
                }
            }
            tiles.write_tile(canvas_id, zoom, x, y, mosaic.into_rgb(), TILE_SIZE)
        })
        .await?;
        log(
            format!("Tiling: created tile {}/{}/{}/{}", canvas_id, zoom, x, y),
            Debug,
        );
        Ok(())
    }

    /// Renders the canvas at `TEXTURE_MAX_SIZE` (or full size if smaller),
    /// one chunk row at a time.
    async fn texture(&self, canvas_id: CanvasId) -> Result<()> {
        let canvas = self.canvas(canvas_id)?;
        if canvas.is_3d {
            return Err(PlazaError::Tile(format!("canvas {} is volumetric", canvas_id)));
        }
        let per_side = canvas.chunks_per_side();
        let side = canvas.size.min(TEXTURE_MAX_SIZE);
        let factor = canvas.size / side;
        let part = TILE_SIZE / factor;
        let mut mosaic = Mosaic::new(per_side, part);

        for j in 0..per_side {
            let mut row = Vec::with_capacity(per_side as usize);
            for i in 0..per_side {
                row.push(self.chunks.get_chunk(canvas_id, i, j).await?);
            }
            let palette = self.palette.clone();
            let parts = blocking(move || {
                Ok(row
                    .iter()
                    .map(|cells| {
                        downsample(&chunk_rgb(&palette, cells.as_deref(), TILE_SIZE), TILE_SIZE, factor)
                    })
                    .collect::<Vec<_>>())
            })
            .await?;
            for (i, part) in parts.iter().enumerate() {
                mosaic.place(i as u32, j, part);
            }
        }

        let tiles = self.tiles.clone();
        let texture_side = mosaic.side();
        blocking(move || tiles.write_texture(canvas_id, mosaic.into_rgb(), texture_side)).await?;
        log(format!("Tiling: created texture of canvas {}", canvas_id), Debug);
        Ok(())
    }

    /// Rebuilds the whole pyramid of a canvas, finest level first.
    async fn initialize(&self, canvas_id: CanvasId) -> Result<()> {
        let canvas = self.canvas(canvas_id)?;
        let started = Instant::now();
        let max_zoom = max_tiled_zoom(canvas.size);
        log(
            format!("Tiling: initializing {} levels of canvas {}", max_zoom, canvas_id),
            Info,
        );
        if max_zoom > 0 {
            let base = max_zoom - 1;
            let width = level_width(base);
            for y in 0..width {
                for x in 0..width {
                    self.base_tile(canvas_id, x, y).await?;
                }
            }
            for zoom in (0..base).rev() {
                let width = level_width(zoom);
                for y in 0..width {
                    for x in 0..width {
                        self.tile_from_children(canvas_id, zoom, x, y).await?;
                    }
                }
            }
        }
        self.texture(canvas_id).await?;
        let tiles = self.tiles.clone();
        blocking(move || tiles.mark_initialized(canvas_id)).await?;
        log(
            format!(
                "Tiling: canvas {} initialized in {:.1}s",
                canvas_id,
                started.elapsed().as_secs_f32()
            ),
            Info,
        );
        Ok(())
    }
}
