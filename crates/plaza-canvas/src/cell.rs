use plaza_common::constants::{COLOR_MASK, PROTECTED_BIT};

/// One packed canvas byte: bits 0-5 color index, bit 6 unused, bit 7
/// protected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Cell(pub u8);

impl Cell {
    pub const EMPTY: Cell = Cell(0);

    pub fn new(color: u8, protected: bool) -> Self {
        Cell(color & COLOR_MASK).with_protection(protected)
    }

    pub fn color(self) -> u8 {
        self.0 & COLOR_MASK
    }

    pub fn is_protected(self) -> bool {
        self.0 & PROTECTED_BIT != 0
    }

    pub fn with_protection(self, protected: bool) -> Self {
        if protected {
            Cell(self.0 | PROTECTED_BIT)
        } else {
            Cell(self.0 & !PROTECTED_BIT)
        }
    }

    pub fn raw(self) -> u8 {
        self.0
    }
}

impl From<u8> for Cell {
    fn from(raw: u8) -> Self {
        Cell(raw)
    }
}
