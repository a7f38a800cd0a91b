//! Mapping between world coordinates, chunk coordinates and in-chunk offsets.
//!
//! World coordinates are centered: a canvas of size `s` spans `-s/2 ..= s/2-1`
//! on each horizontal axis. On volumetric canvases `y` is the height layer
//! and is not chunked; `x` and `z` are.

use plaza_common::constants::{THREE_TILE_SIZE, TILE_SIZE, TILE_ZOOM_LEVEL};
use plaza_common::{Canvas, ChunkCoord, PixelCoord};

/// Which axis of a coordinate left the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

/// Mathematical modulo, never negative for positive `m`.
pub fn modulo(n: i64, m: i64) -> i64 {
    n.rem_euclid(m)
}

pub fn tile_size_for(is_3d: bool) -> u32 {
    if is_3d {
        THREE_TILE_SIZE
    } else {
        TILE_SIZE
    }
}

/// Chunk holding a pixel. `None` when the coordinate lies left of or above
/// the canvas origin.
pub fn chunk_of(canvas_size: u32, x: i32, y: i32, z: Option<i32>) -> Option<ChunkCoord> {
    let tile_size = tile_size_for(z.is_some()) as i64;
    let half = canvas_size as i64 / 2;
    let width = z.unwrap_or(y) as i64;
    let cx = (x as i64 + half).div_euclid(tile_size);
    let cy = (width + half).div_euclid(tile_size);
    if cx < 0 || cy < 0 || cx > u32::MAX as i64 || cy > u32::MAX as i64 {
        return None;
    }
    Some(ChunkCoord::new(cx as u32, cy as u32))
}

/// Linear offset of a pixel inside its chunk. `None` for a negative height.
pub fn offset_of(canvas_size: u32, x: i32, y: i32, z: Option<i32>) -> Option<u32> {
    let tile_size = tile_size_for(z.is_some()) as i64;
    let half = canvas_size as i64 / 2;
    let width = z.unwrap_or(y) as i64;
    let layer = match z {
        Some(_) if y < 0 => return None,
        Some(_) => y as i64 * tile_size * tile_size,
        None => 0,
    };
    let cx = modulo(x as i64 + half, tile_size);
    let cy = modulo(width + half, tile_size);
    u32::try_from(layer + cy * tile_size + cx).ok()
}

/// Inverse of [`chunk_of`] and [`offset_of`].
pub fn pixel_from_chunk_offset(
    i: u32,
    j: u32,
    offset: u32,
    canvas_size: u32,
    is_3d: bool,
) -> PixelCoord {
    let tile_size = tile_size_for(is_3d) as i64;
    let offset = offset as i64;
    let cx = offset % tile_size;
    let off = offset - cx;
    let in_layer = off % (tile_size * tile_size);
    let layer = (off - in_layer) / tile_size / tile_size;
    let cy = in_layer / tile_size;

    let half = canvas_size as i64 / 2;
    let x = (i as i64 * tile_size - half + cx) as i32;
    let second = (j as i64 * tile_size - half + cy) as i32;
    if is_3d {
        PixelCoord::volumetric(x, layer as i32, second)
    } else {
        PixelCoord::flat(x, second)
    }
}

/// Number of stored zoom levels of the tile pyramid; 0 when the whole canvas
/// fits in one tile.
pub fn max_tiled_zoom(canvas_size: u32) -> u32 {
    if canvas_size <= TILE_SIZE {
        return 0;
    }
    let ratio = canvas_size as f64 / TILE_SIZE as f64;
    let zoom = ratio.log2() / TILE_ZOOM_LEVEL as f64 * 2.0;
    zoom.floor().max(0.0) as u32
}

pub fn canvas_boundaries(canvas_size: u32) -> (i32, i32) {
    let half = (canvas_size / 2) as i32;
    (-half, half - 1)
}

/// First axis of `coord` outside the canvas, if any.
pub fn out_of_bounds_axis(canvas: &Canvas, coord: PixelCoord) -> Option<Axis> {
    let (min, max) = canvas_boundaries(canvas.size);
    if coord.x < min || coord.x > max {
        return Some(Axis::X);
    }
    match (canvas.is_3d, coord.z) {
        (false, None) => {
            if coord.y < min || coord.y > max {
                return Some(Axis::Y);
            }
        }
        (true, Some(z)) => {
            if coord.y < 0 || coord.y >= canvas.layers() as i32 {
                return Some(Axis::Y);
            }
            if z < min || z > max {
                return Some(Axis::Z);
            }
        }
        _ => return Some(Axis::Z),
    }
    None
}

pub fn in_bounds(canvas: &Canvas, coord: PixelCoord) -> bool {
    out_of_bounds_axis(canvas, coord).is_none()
}

/// Chunk and offset of an in-bounds pixel.
pub fn address_of(canvas: &Canvas, coord: PixelCoord) -> Option<(ChunkCoord, u32)> {
    if !in_bounds(canvas, coord) {
        return None;
    }
    let chunk = chunk_of(canvas.size, coord.x, coord.y, coord.z)?;
    let offset = offset_of(canvas.size, coord.x, coord.y, coord.z)?;
    Some((chunk, offset))
}

/// Packs chunk coordinates into the 16-bit id used on the wire.
pub fn chunk_id(chunk: ChunkCoord) -> u16 {
    (((chunk.i & 0xFF) << 8) | (chunk.j & 0xFF)) as u16
}

pub fn chunk_from_id(id: u16) -> ChunkCoord {
    ChunkCoord::new((id >> 8) as u32, (id & 0xFF) as u32)
}

/// Base-level tile holding a chunk.
pub fn tile_of_chunk(chunk: ChunkCoord) -> (u32, u32) {
    (chunk.i / TILE_ZOOM_LEVEL, chunk.j / TILE_ZOOM_LEVEL)
}

/// Tile one level coarser that covers `(x, y)`.
pub fn parent_tile(x: u32, y: u32) -> (u32, u32) {
    (x / TILE_ZOOM_LEVEL, y / TILE_ZOOM_LEVEL)
}

/// Tiles per side at a zoom level.
pub fn level_width(zoom: u32) -> u32 {
    TILE_ZOOM_LEVEL.pow(zoom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modulo_is_non_negative() {
        assert_eq!(modulo(-1, 256), 255);
        assert_eq!(modulo(-256, 256), 0);
        assert_eq!(modulo(257, 256), 1);
    }

    #[test]
    fn test_center_pixel_1024() {
        assert_eq!(chunk_of(1024, 0, 0, None), Some(ChunkCoord::new(2, 2)));
        assert_eq!(offset_of(1024, 0, 0, None), Some(0));
    }

    #[test]
    fn test_center_pixel_256() {
        assert_eq!(chunk_of(256, 0, 0, None), Some(ChunkCoord::new(0, 0)));
        assert_eq!(offset_of(256, 0, 0, None), Some(128 * 256 + 128));
    }

    #[test]
    fn test_corners() {
        assert_eq!(chunk_of(1024, -512, -512, None), Some(ChunkCoord::new(0, 0)));
        assert_eq!(offset_of(1024, -512, -512, None), Some(0));
        assert_eq!(chunk_of(1024, 511, 511, None), Some(ChunkCoord::new(3, 3)));
        assert_eq!(offset_of(1024, 511, 511, None), Some(256 * 256 - 1));
        assert_eq!(chunk_of(1024, -513, 0, None), None);
    }

    #[test]
    fn test_volumetric_offset_uses_layer_stride() {
        let offset = offset_of(1024, 0, 3, Some(0)).unwrap();
        assert_eq!(offset, 3 * 32 * 32);
        assert_eq!(chunk_of(1024, 0, 3, Some(-1)), Some(ChunkCoord::new(16, 15)));
        assert_eq!(offset_of(1024, 0, -1, Some(0)), None);
    }

    #[test]
    fn test_round_trip_flat() {
        let size = 1024;
        let (min, max) = canvas_boundaries(size);
        for x in (min..=max).step_by(37) {
            for y in (min..=max).step_by(41) {
                let chunk = chunk_of(size, x, y, None).unwrap();
                let offset = offset_of(size, x, y, None).unwrap();
                let back = pixel_from_chunk_offset(chunk.i, chunk.j, offset, size, false);
                assert_eq!(back, PixelCoord::flat(x, y));
            }
        }
        let back = pixel_from_chunk_offset(3, 3, 256 * 256 - 1, size, false);
        assert_eq!(back, PixelCoord::flat(max, max));
    }

    #[test]
    fn test_round_trip_volumetric() {
        let size = 256;
        let (min, max) = canvas_boundaries(size);
        for x in (min..=max).step_by(13) {
            for z in (min..=max).step_by(11) {
                for y in [0, 1, 64, 127] {
                    let chunk = chunk_of(size, x, y, Some(z)).unwrap();
                    let offset = offset_of(size, x, y, Some(z)).unwrap();
                    assert!(offset < 32 * 32 * 128);
                    let back = pixel_from_chunk_offset(chunk.i, chunk.j, offset, size, true);
                    assert_eq!(back, PixelCoord::volumetric(x, y, z));
                }
            }
        }
    }

    #[test]
    fn test_max_tiled_zoom() {
        assert_eq!(max_tiled_zoom(128), 0);
        assert_eq!(max_tiled_zoom(256), 0);
        assert_eq!(max_tiled_zoom(1024), 1);
        assert_eq!(max_tiled_zoom(4096), 2);
        assert_eq!(max_tiled_zoom(65536), 4);
    }

    #[test]
    fn test_bounds() {
        let flat = Canvas::flat("d", 1024);
        assert!(in_bounds(&flat, PixelCoord::flat(-512, 511)));
        assert_eq!(out_of_bounds_axis(&flat, PixelCoord::flat(512, 0)), Some(Axis::X));
        assert_eq!(out_of_bounds_axis(&flat, PixelCoord::flat(0, -513)), Some(Axis::Y));
        assert_eq!(out_of_bounds_axis(&flat, PixelCoord::volumetric(0, 0, 0)), Some(Axis::Z));

        let volume = Canvas::volumetric("v", 256, 128);
        assert!(in_bounds(&volume, PixelCoord::volumetric(0, 127, -128)));
        assert_eq!(out_of_bounds_axis(&volume, PixelCoord::volumetric(0, 128, 0)), Some(Axis::Y));
        assert_eq!(out_of_bounds_axis(&volume, PixelCoord::volumetric(0, 0, 128)), Some(Axis::Z));
        assert_eq!(out_of_bounds_axis(&volume, PixelCoord::flat(0, 0)), Some(Axis::Z));
    }

    #[test]
    fn test_address_of() {
        let flat = Canvas::flat("d", 1024);
        assert_eq!(address_of(&flat, PixelCoord::flat(0, 0)), Some((ChunkCoord::new(2, 2), 0)));
        assert_eq!(address_of(&flat, PixelCoord::flat(600, 0)), None);
    }

    #[test]
    fn test_chunk_id_packing() {
        let chunk = ChunkCoord::new(3, 5);
        assert_eq!(chunk_id(chunk), 0x0305);
        assert_eq!(chunk_from_id(0x0305), chunk);
        assert_eq!(chunk_from_id(chunk_id(ChunkCoord::new(255, 255))), ChunkCoord::new(255, 255));
    }

    #[test]
    fn test_tiles() {
        assert_eq!(tile_of_chunk(ChunkCoord::new(3, 5)), (0, 1));
        assert_eq!(parent_tile(15, 16), (3, 4));
        assert_eq!(level_width(0), 1);
        assert_eq!(level_width(3), 64);
    }
}
