/// Side of a 2D chunk and of every stored tile, in pixels.
pub const TILE_SIZE: u32 = 256;

/// Side of a 3D chunk.
pub const THREE_TILE_SIZE: u32 = 32;

/// Default height of a volumetric canvas.
pub const THREE_CANVAS_HEIGHT: u32 = 128;

/// Tiles (or chunks) per side that fold into one tile of the next coarser level.
pub const TILE_ZOOM_LEVEL: u32 = 4;

/// Upper bound for the side of the overview texture.
pub const TEXTURE_MAX_SIZE: u32 = 4096;

/// Chunk coordinates are packed into the two bytes of a chunk id.
pub const MAX_CHUNK_COORD: u32 = 255;

/// Color indices are six bits wide.
pub const MAX_PALETTE_LEN: usize = 64;

pub const COLOR_MASK: u8 = 0x3F;
pub const PROTECTED_BIT: u8 = 0x80;
