//! On-disk layout of rendered tiles.
//!
//! `{folder}/{canvas}/{zoom}/{x}/{y}.png` for pyramid tiles and
//! `{folder}/{canvas}/texture.png` for the overview texture. Everything here
//! blocks and is meant to run on the blocking pool.

use image::{ImageFormat, RgbImage};
use plaza_common::{CanvasId, PlazaError, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

static WRITE_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone)]
pub struct TileStore {
    folder: PathBuf,
}

impl TileStore {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
        }
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn canvas_folder(&self, canvas_id: CanvasId) -> PathBuf {
        self.folder.join(canvas_id.to_string())
    }

    pub fn tile_path(&self, canvas_id: CanvasId, zoom: u32, x: u32, y: u32) -> PathBuf {
        self.canvas_folder(canvas_id)
            .join(zoom.to_string())
            .join(x.to_string())
            .join(format!("{}.png", y))
    }

    pub fn texture_path(&self, canvas_id: CanvasId) -> PathBuf {
        self.canvas_folder(canvas_id).join("texture.png")
    }

    /// A canvas counts as initialized once its level 0 folder exists.
    pub fn is_initialized(&self, canvas_id: CanvasId) -> bool {
        self.canvas_folder(canvas_id).join("0").is_dir()
    }

    pub fn mark_initialized(&self, canvas_id: CanvasId) -> Result<()> {
        std::fs::create_dir_all(self.canvas_folder(canvas_id).join("0"))?;
        Ok(())
    }

    pub fn write_tile(&self, canvas_id: CanvasId, zoom: u32, x: u32, y: u32, rgb: Vec<u8>, side: u32) -> Result<()> {
        write_png(&self.tile_path(canvas_id, zoom, x, y), rgb, side)
    }

    pub fn write_texture(&self, canvas_id: CanvasId, rgb: Vec<u8>, side: u32) -> Result<()> {
        write_png(&self.texture_path(canvas_id), rgb, side)
    }

    /// RGB pixels of a stored tile, `None` if it was never rendered.
    pub fn read_tile(&self, canvas_id: CanvasId, zoom: u32, x: u32, y: u32) -> Result<Option<Vec<u8>>> {
        let path = self.tile_path(canvas_id, zoom, x, y);
        if !path.is_file() {
            return Ok(None);
        }
        let image = image::open(&path)
            .map_err(|e| PlazaError::Tile(format!("{}: {}", path.display(), e)))?;
        Ok(Some(image.to_rgb8().into_raw()))
    }
}

/// Writes a square RGB image, replacing any previous file in one rename.
fn write_png(path: &Path, rgb: Vec<u8>, side: u32) -> Result<()> {
    let image = RgbImage::from_raw(side, side, rgb).ok_or_else(|| {
        PlazaError::Tile(format!("buffer does not hold a {}x{} image", side, side))
    })?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let seq = WRITE_SEQ.fetch_add(1, Ordering::Relaxed);
    let tmp = path.with_extension(format!("png.{}.tmp", seq));
    image
        .save_with_format(&tmp, ImageFormat::Png)
        .map_err(|e| PlazaError::Tile(format!("{}: {}", tmp.display(), e)))?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
