use crate::addressing::address_of;
use crate::backend::KeyValueStore;
use crate::cell::Cell;
use once_cell::sync::OnceCell;
use plaza_common::{CanvasId, CanvasTable, ChunkCoord, PixelCoord, Result};
use plaza_logger::{log, LogSeverity::*};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Upper bound of the known-chunk cache before it is dropped wholesale.
const KNOWN_CHUNKS_CAPACITY: usize = 1 << 16;

/// Receives every successful chunk mutation. Calls are fire-and-forget and
/// must not block.
pub trait ChunkChangeListener: Send + Sync {
    fn chunk_changed(&self, canvas_id: CanvasId, chunk: ChunkCoord);
}

pub fn chunk_key(canvas_id: CanvasId, i: u32, j: u32) -> String {
    format!("ch:{}:{}:{}", canvas_id, i, j)
}

/// Chunk-granular pixel storage on top of a [`KeyValueStore`].
pub struct ChunkStore {
    backend: Arc<dyn KeyValueStore>,
    canvases: Arc<CanvasTable>,
    known_chunks: Mutex<HashSet<String>>,
    listener: OnceCell<Arc<dyn ChunkChangeListener>>,
}

impl ChunkStore {
    pub fn new(backend: Arc<dyn KeyValueStore>, canvases: Arc<CanvasTable>) -> Self {
        Self {
            backend,
            canvases,
            known_chunks: Mutex::new(HashSet::new()),
            listener: OnceCell::new(),
        }
    }

    pub fn canvases(&self) -> &Arc<CanvasTable> {
        &self.canvases
    }

    pub fn backend(&self) -> &Arc<dyn KeyValueStore> {
        &self.backend
    }

    /// Wires the single chunk-changed listener. Only the first registration
    /// sticks.
    pub fn set_chunk_listener(&self, listener: Arc<dyn ChunkChangeListener>) -> bool {
        if self.listener.set(listener).is_err() {
            log("Chunk change listener already registered".to_owned(), Warning);
            return false;
        }
        true
    }

    /// Raw chunk bytes, `None` if the chunk was never written.
    pub async fn get_chunk(&self, canvas_id: CanvasId, i: u32, j: u32) -> Result<Option<Vec<u8>>> {
        self.backend.get(&chunk_key(canvas_id, i, j)).await
    }

    /// Replaces a whole chunk. Returns false without touching storage if the
    /// buffer has the wrong length for the canvas.
    pub async fn set_chunk(&self, i: u32, j: u32, chunk: Vec<u8>, canvas_id: CanvasId) -> Result<bool> {
        let expected = self.canvases.require(canvas_id)?.chunk_len();
        if chunk.len() != expected {
            log(
                format!(
                    "Tried to set chunk {}:{}:{} with invalid length {} (expected {})",
                    canvas_id,
                    i,
                    j,
                    chunk.len(),
                    expected
                ),
                Error,
            );
            return Ok(false);
        }
        let key = chunk_key(canvas_id, i, j);
        self.backend.set(&key, chunk).await?;
        self.remember(key);
        self.notify(canvas_id, ChunkCoord::new(i, j));
        Ok(true)
    }

    pub async fn set_pixel(&self, canvas_id: CanvasId, cell: Cell, coord: PixelCoord) -> Result<bool> {
        let canvas = self.canvases.require(canvas_id)?;
        let Some((chunk, offset)) = address_of(canvas, coord) else {
            log(
                format!("Pixel {:?} is outside of canvas {}", coord, canvas_id),
                Warning,
            );
            return Ok(false);
        };
        self.set_pixel_in_chunk(chunk.i, chunk.j, offset, cell, canvas_id)
            .await
    }

    /// Cell at a world coordinate; empty for unwritten chunks and for
    /// coordinates outside the canvas.
    pub async fn get_pixel(&self, canvas_id: CanvasId, coord: PixelCoord) -> Result<Cell> {
        let canvas = self.canvases.require(canvas_id)?;
        match address_of(canvas, coord) {
            Some((chunk, offset)) => self.get_pixel_by_offset(canvas_id, chunk.i, chunk.j, offset).await,
            None => Ok(Cell::EMPTY),
        }
    }

    /// Writes one cell. A chunk seen for the first time is created as all
    /// zero with a create-if-absent write, so concurrent initializers never
    /// clobber each other; the cell itself is a single atomic byte write.
    pub async fn set_pixel_in_chunk(
        &self,
        i: u32,
        j: u32,
        offset: u32,
        cell: Cell,
        canvas_id: CanvasId,
    ) -> Result<bool> {
        let canvas = self.canvases.require(canvas_id)?;
        let chunk_len = canvas.chunk_len();
        let per_side = canvas.chunks_per_side();
        if offset as usize >= chunk_len || i >= per_side || j >= per_side {
            log(
                format!(
                    "Rejected pixel at chunk {}:{}:{} offset {}",
                    canvas_id, i, j, offset
                ),
                Error,
            );
            return Ok(false);
        }

        let key = chunk_key(canvas_id, i, j);
        if !self.is_known(&key) {
            self.backend.set_if_absent(&key, vec![0; chunk_len]).await?;
            self.remember(key.clone());
        }
        self.backend
            .bitfield_set_u8(&key, offset as usize, cell.raw())
            .await?;
        self.notify(canvas_id, ChunkCoord::new(i, j));
        Ok(true)
    }

    pub async fn get_pixel_if_exists(
        &self,
        canvas_id: CanvasId,
        i: u32,
        j: u32,
        offset: u32,
    ) -> Result<Option<Cell>> {
        let cell = self
            .backend
            .bitfield_get_u8(&chunk_key(canvas_id, i, j), offset as usize)
            .await?;
        Ok(cell.map(Cell))
    }

    pub async fn get_pixel_by_offset(
        &self,
        canvas_id: CanvasId,
        i: u32,
        j: u32,
        offset: u32,
    ) -> Result<Cell> {
        Ok(self
            .get_pixel_if_exists(canvas_id, i, j, offset)
            .await?
            .unwrap_or(Cell::EMPTY))
    }

    /// Drops the known-chunk cache. Only costs extra create-if-absent calls.
    pub fn forget_known_chunks(&self) {
        self.known_chunks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }

    fn is_known(&self, key: &str) -> bool {
        self.known_chunks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(key)
    }

    fn remember(&self, key: String) {
        let mut known = self
            .known_chunks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if known.len() >= KNOWN_CHUNKS_CAPACITY {
            known.clear();
        }
        known.insert(key);
    }

    fn notify(&self, canvas_id: CanvasId, chunk: ChunkCoord) {
        if let Some(listener) = self.listener.get() {
            listener.chunk_changed(canvas_id, chunk);
        }
    }
}
