pub mod config;
pub mod constants;
pub mod error;
pub mod types;

pub use error::PlazaError;
pub use types::{Canvas, CanvasId, CanvasTable, ChunkCoord, PixelCoord, Result};
