use crate::constants::{
    MAX_CHUNK_COORD, THREE_CANVAS_HEIGHT, THREE_TILE_SIZE, TILE_SIZE, TILE_ZOOM_LEVEL,
};
use crate::error::PlazaError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type Result<T> = std::result::Result<T, PlazaError>;

pub type CanvasId = u8;

/// Chunk coordinates on a canvas grid. `i` runs along x, `j` along the second
/// horizontal axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkCoord {
    pub i: u32,
    pub j: u32,
}

impl ChunkCoord {
    pub fn new(i: u32, j: u32) -> Self {
        Self { i, j }
    }
}

/// World coordinate of a pixel. On volumetric canvases `y` is the height
/// layer and `z` the second horizontal axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelCoord {
    pub x: i32,
    pub y: i32,
    pub z: Option<i32>,
}

impl PixelCoord {
    pub fn flat(x: i32, y: i32) -> Self {
        Self { x, y, z: None }
    }

    pub fn volumetric(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z: Some(z) }
    }
}

/// Static canvas description, read-only to the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Canvas {
    #[serde(default)]
    pub ident: String,
    pub size: u32,
    #[serde(default, rename = "v")]
    pub is_3d: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

impl Canvas {
    pub fn flat(ident: &str, size: u32) -> Self {
        Self {
            ident: ident.to_owned(),
            size,
            is_3d: false,
            height: None,
        }
    }

    pub fn volumetric(ident: &str, size: u32, height: u32) -> Self {
        Self {
            ident: ident.to_owned(),
            size,
            is_3d: true,
            height: Some(height),
        }
    }

    pub fn tile_size(&self) -> u32 {
        if self.is_3d {
            THREE_TILE_SIZE
        } else {
            TILE_SIZE
        }
    }

    /// Number of height layers; 1 for flat canvases.
    pub fn layers(&self) -> u32 {
        if self.is_3d {
            self.height.unwrap_or(THREE_CANVAS_HEIGHT)
        } else {
            1
        }
    }

    /// Exact byte length of every chunk buffer of this canvas.
    pub fn chunk_len(&self) -> usize {
        let side = self.tile_size() as usize;
        side * side * self.layers() as usize
    }

    pub fn chunks_per_side(&self) -> u32 {
        self.size.div_ceil(self.tile_size())
    }

    fn validate(&self, id: CanvasId) -> Result<()> {
        if self.size < 2 || self.size % 2 != 0 {
            return Err(PlazaError::Config(format!(
                "canvas {} has invalid size {}",
                id, self.size
            )));
        }
        if self.is_3d {
            if self.size % THREE_TILE_SIZE != 0 {
                return Err(PlazaError::Config(format!(
                    "3D canvas {} size {} is not a multiple of {}",
                    id, self.size, THREE_TILE_SIZE
                )));
            }
            if self.layers() == 0 {
                return Err(PlazaError::Config(format!("3D canvas {} has no height", id)));
            }
        } else if self.size > TILE_SIZE {
            let mut rest = self.size / TILE_SIZE;
            while rest % TILE_ZOOM_LEVEL == 0 {
                rest /= TILE_ZOOM_LEVEL;
            }
            if rest != 1 || self.size % TILE_SIZE != 0 {
                return Err(PlazaError::Config(format!(
                    "canvas {} size {} is not {} times a power of {}",
                    id, self.size, TILE_SIZE, TILE_ZOOM_LEVEL
                )));
            }
        } else if !self.size.is_power_of_two() {
            return Err(PlazaError::Config(format!(
                "canvas {} size {} is not a power of two",
                id, self.size
            )));
        }
        if self.chunks_per_side() > MAX_CHUNK_COORD + 1 {
            return Err(PlazaError::Config(format!(
                "canvas {} needs {} chunks per side, chunk ids only address {}",
                id,
                self.chunks_per_side(),
                MAX_CHUNK_COORD + 1
            )));
        }
        Ok(())
    }
}

/// Read-only mapping of canvas id to canvas.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CanvasTable {
    canvases: BTreeMap<CanvasId, Canvas>,
}

impl CanvasTable {
    pub fn new(canvases: BTreeMap<CanvasId, Canvas>) -> Result<Self> {
        for (id, canvas) in &canvases {
            canvas.validate(*id)?;
        }
        Ok(Self { canvases })
    }

    /// Builds the table from a JSON-style map whose keys are decimal ids.
    pub fn from_string_keys(raw: &BTreeMap<String, Canvas>) -> Result<Self> {
        let mut canvases = BTreeMap::new();
        for (key, canvas) in raw {
            let id: CanvasId = key
                .parse()
                .map_err(|_| PlazaError::Config(format!("invalid canvas id {:?}", key)))?;
            canvases.insert(id, canvas.clone());
        }
        Self::new(canvases)
    }

    pub fn get(&self, id: CanvasId) -> Option<&Canvas> {
        self.canvases.get(&id)
    }

    pub fn require(&self, id: CanvasId) -> Result<&Canvas> {
        self.get(id).ok_or(PlazaError::UnknownCanvas(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = (CanvasId, &Canvas)> {
        self.canvases.iter().map(|(id, canvas)| (*id, canvas))
    }

    pub fn len(&self) -> usize {
        self.canvases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.canvases.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_chunk_len() {
        assert_eq!(Canvas::flat("d", 1024).chunk_len(), 256 * 256);
        assert_eq!(Canvas::volumetric("v", 1024, 128).chunk_len(), 32 * 32 * 128);
    }

    #[test]
    fn test_canvas_json_uses_short_volumetric_flag() {
        let canvas: Canvas = serde_json::from_str(r#"{"ident":"v","size":1024,"v":true}"#).unwrap();
        assert!(canvas.is_3d);
        assert_eq!(canvas.layers(), THREE_CANVAS_HEIGHT);
    }

    #[test]
    fn test_table_rejects_bad_sizes() {
        let mut raw = BTreeMap::new();
        raw.insert("0".to_owned(), Canvas::flat("d", 2048));
        assert_matches!(CanvasTable::from_string_keys(&raw), Err(PlazaError::Config(_)));

        raw.insert("0".to_owned(), Canvas::flat("d", 131072));
        assert_matches!(CanvasTable::from_string_keys(&raw), Err(PlazaError::Config(_)));

        raw.insert("0".to_owned(), Canvas::flat("d", 65536));
        raw.insert("1".to_owned(), Canvas::flat("m", 256));
        raw.insert("2".to_owned(), Canvas::volumetric("v", 1024, 128));
        let table = CanvasTable::from_string_keys(&raw).unwrap();
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_table_rejects_non_numeric_id() {
        let mut raw = BTreeMap::new();
        raw.insert("main".to_owned(), Canvas::flat("d", 1024));
        assert_matches!(CanvasTable::from_string_keys(&raw), Err(PlazaError::Config(_)));
    }

    #[test]
    fn test_require_unknown_canvas() {
        let table = CanvasTable::default();
        assert_matches!(table.require(3), Err(PlazaError::UnknownCanvas(3)));
    }
}
