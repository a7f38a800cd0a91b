use plaza_common::constants::{COLOR_MASK, MAX_PALETTE_LEN};
use plaza_common::{PlazaError, Result};

/// The colors shipped with the default canvas. Entry 0 is an unset pixel over
/// water, entry 1 an unset pixel on land.
const DEFAULT_COLORS: [[u8; 3]; 32] = [
    [202, 227, 255],
    [255, 255, 255],
    [255, 255, 255],
    [228, 228, 228],
    [196, 196, 196],
    [136, 136, 136],
    [78, 78, 78],
    [0, 0, 0],
    [244, 179, 174],
    [255, 167, 209],
    [255, 84, 178],
    [255, 101, 101],
    [229, 0, 0],
    [154, 0, 0],
    [254, 164, 96],
    [229, 149, 0],
    [160, 106, 66],
    [96, 64, 40],
    [245, 223, 176],
    [255, 248, 137],
    [229, 217, 0],
    [148, 224, 68],
    [2, 190, 1],
    [104, 131, 56],
    [0, 101, 19],
    [202, 227, 255],
    [0, 211, 221],
    [0, 131, 199],
    [0, 0, 234],
    [25, 25, 115],
    [207, 110, 228],
    [130, 0, 128],
];

#[derive(Debug, Clone, Copy, PartialEq)]
struct Entry {
    rgb: [u8; 3],
    abgr: u32,
    rgba: u32,
    float: [f32; 3],
    dark: bool,
}

impl Entry {
    fn new([r, g, b]: [u8; 3]) -> Self {
        let luminance = 0.2126 * r as f32 + 0.7152 * g as f32 + 0.0722 * b as f32;
        Self {
            rgb: [r, g, b],
            abgr: 0xFF00_0000 | (b as u32) << 16 | (g as u32) << 8 | r as u32,
            rgba: (r as u32) << 24 | (g as u32) << 16 | (b as u32) << 8 | 0xFF,
            float: [r as f32 / 256.0, g as f32 / 256.0, b as f32 / 256.0],
            dark: luminance < 128.0,
        }
    }
}

/// Immutable color table. Cells are looked up by their low six bits.
#[derive(Debug, Clone, PartialEq)]
pub struct Palette {
    entries: Vec<Entry>,
}

impl Palette {
    pub fn new(colors: &[[u8; 3]]) -> Result<Self> {
        if colors.is_empty() || colors.len() > MAX_PALETTE_LEN {
            return Err(PlazaError::Config(format!(
                "palette must have between 1 and {} colors, got {}",
                MAX_PALETTE_LEN,
                colors.len()
            )));
        }
        Ok(Self {
            entries: colors.iter().copied().map(Entry::new).collect(),
        })
    }

    pub fn default_colors() -> Self {
        Self {
            entries: DEFAULT_COLORS.iter().copied().map(Entry::new).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry for a cell value; indices past the end fall back to entry 0.
    fn entry(&self, index: u8) -> &Entry {
        self.entries
            .get((index & COLOR_MASK) as usize)
            .unwrap_or(&self.entries[0])
    }

    pub fn rgb(&self, index: u8) -> [u8; 3] {
        self.entry(index).rgb
    }

    /// Little-endian packed color with opaque alpha.
    pub fn abgr(&self, index: u8) -> u32 {
        self.entry(index).abgr
    }

    /// Big-endian packed color with opaque alpha.
    pub fn rgba(&self, index: u8) -> u32 {
        self.entry(index).rgba
    }

    pub fn float(&self, index: u8) -> [f32; 3] {
        self.entry(index).float
    }

    pub fn css(&self, index: u8) -> String {
        let [r, g, b] = self.rgb(index);
        format!("rgb({}, {}, {})", r, g, b)
    }

    pub fn is_dark(&self, index: u8) -> bool {
        self.entry(index).dark
    }

    /// Exact match. With duplicate colors the highest index wins.
    pub fn index_of(&self, r: u8, g: u8, b: u8) -> Option<u8> {
        self.entries
            .iter()
            .rposition(|entry| entry.rgb == [r, g, b])
            .map(|index| index as u8)
    }

    /// Nearest color by squared distance in RGB space. The scan runs from the
    /// highest index down and only moves on a strictly smaller distance.
    pub fn closest_index_of(&self, r: u8, g: u8, b: u8) -> u8 {
        let mut closest_index = 0;
        let mut closest_distance: Option<u32> = None;
        for (index, entry) in self.entries.iter().enumerate().rev() {
            let [er, eg, eb] = entry.rgb;
            let distance = sq_diff(er, r) + sq_diff(eg, g) + sq_diff(eb, b);
            if closest_distance.map_or(true, |closest| closest > distance) {
                closest_index = index;
                closest_distance = Some(distance);
            }
        }
        closest_index as u8
    }

    pub fn decode_abgr(&self, cells: &[u8]) -> Vec<u32> {
        cells.iter().map(|cell| self.abgr(*cell)).collect()
    }

    pub fn decode_rgb(&self, cells: &[u8]) -> Vec<u8> {
        let mut colors = Vec::with_capacity(cells.len() * 3);
        for cell in cells {
            colors.extend_from_slice(&self.rgb(*cell));
        }
        colors
    }

    /// RGB buffer of `length` pixels, all of one color.
    pub fn single_color_rgb(&self, index: u8, length: usize) -> Vec<u8> {
        let rgb = self.rgb(index);
        let mut buffer = Vec::with_capacity(length * 3);
        for _ in 0..length {
            buffer.extend_from_slice(&rgb);
        }
        buffer
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self::default_colors()
    }
}

fn sq_diff(a: u8, b: u8) -> u32 {
    let d = a as i32 - b as i32;
    (d * d) as u32
}
