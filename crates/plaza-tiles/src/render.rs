//! Pure pixel work: palette decoding, box downsampling and stitching of
//! square RGB buffers.

use plaza_canvas::Palette;

/// RGB pixels of a chunk. A chunk that was never written renders as palette
/// entry 0.
pub fn chunk_rgb(palette: &Palette, cells: Option<&[u8]>, side: u32) -> Vec<u8> {
    let len = (side * side) as usize;
    match cells {
        Some(cells) if cells.len() >= len => palette.decode_rgb(&cells[..len]),
        _ => palette.single_color_rgb(0, len),
    }
}

/// Averages every `factor`x`factor` block of a square RGB image.
pub fn downsample(rgb: &[u8], side: u32, factor: u32) -> Vec<u8> {
    if factor <= 1 {
        return rgb.to_vec();
    }
    let side = side as usize;
    let factor = factor as usize;
    let target = side / factor;
    let area = (factor * factor) as u32;
    let mut out = Vec::with_capacity(target * target * 3);
    for ty in 0..target {
        for tx in 0..target {
            let mut sum = [0u32; 3];
            for dy in 0..factor {
                let row = (ty * factor + dy) * side;
                for dx in 0..factor {
                    let idx = (row + tx * factor + dx) * 3;
                    sum[0] += rgb[idx] as u32;
                    sum[1] += rgb[idx + 1] as u32;
                    sum[2] += rgb[idx + 2] as u32;
                }
            }
            for channel in sum {
                out.push(((channel + area / 2) / area) as u8);
            }
        }
    }
    out
}

/// Square mosaic of `grid`x`grid` square RGB parts of side `part_side`, given
/// row by row.
pub struct Mosaic {
    grid: u32,
    part_side: u32,
    rgb: Vec<u8>,
}

impl Mosaic {
    pub fn new(grid: u32, part_side: u32) -> Self {
        let side = (grid * part_side) as usize;
        Self {
            grid,
            part_side,
            rgb: vec![0; side * side * 3],
        }
    }

    pub fn side(&self) -> u32 {
        self.grid * self.part_side
    }

    /// Copies `part` into column `col`, row `row` of the grid.
    pub fn place(&mut self, col: u32, row: u32, part: &[u8]) {
        let part_side = self.part_side as usize;
        let side = self.side() as usize;
        let origin_x = col as usize * part_side;
        let origin_y = row as usize * part_side;
        for y in 0..part_side {
            let src = y * part_side * 3;
            let dst = ((origin_y + y) * side + origin_x) * 3;
            self.rgb[dst..dst + part_side * 3].copy_from_slice(&part[src..src + part_side * 3]);
        }
    }

    pub fn into_rgb(self) -> Vec<u8> {
        self.rgb
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_chunk_is_first_color() {
        let palette = Palette::default();
        let rgb = chunk_rgb(&palette, None, 2);
        let first = palette.rgb(0);
        assert_eq!(rgb, [first, first, first, first].concat());
        // short buffers are treated as missing
        assert_eq!(chunk_rgb(&palette, Some(&[1]), 2), rgb);
    }

    #[test]
    fn test_chunk_cells_decode_through_palette() {
        let palette = Palette::default();
        // protected bit does not change the color
        let rgb = chunk_rgb(&palette, Some(&[3, 0x83, 5, 5]), 2);
        assert_eq!(rgb[0..3], palette.rgb(3));
        assert_eq!(rgb[3..6], palette.rgb(3));
        assert_eq!(rgb[9..12], palette.rgb(5));
    }

    #[test]
    fn test_downsample_averages_blocks() {
        // 2x2 image, one block
        let rgb = [0, 0, 0, 100, 100, 100, 200, 200, 200, 100, 100, 100];
        assert_eq!(downsample(&rgb, 2, 2), vec![100, 100, 100]);
        assert_eq!(downsample(&rgb, 2, 1), rgb.to_vec());
    }

    #[test]
    fn test_downsample_uniform_image_keeps_color() {
        let rgb = [10u8, 20, 30].repeat(16 * 16);
        let small = downsample(&rgb, 16, 4);
        assert_eq!(small.len(), 4 * 4 * 3);
        assert_eq!(small, [10u8, 20, 30].repeat(16));
    }

    #[test]
    fn test_mosaic_places_parts() {
        let mut mosaic = Mosaic::new(2, 1);
        mosaic.place(1, 0, &[1, 1, 1]);
        mosaic.place(0, 1, &[2, 2, 2]);
        assert_eq!(mosaic.side(), 2);
        assert_eq!(mosaic.into_rgb(), vec![0, 0, 0, 1, 1, 1, 2, 2, 2, 0, 0, 0]);
    }
}
