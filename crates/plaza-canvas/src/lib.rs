pub mod addressing;
pub mod backend;
pub mod cell;
pub mod palette;
pub mod snapshot;
pub mod store;

pub use backend::{KeyValueStore, MemoryStore};
pub use cell::Cell;
pub use palette::Palette;
pub use store::{ChunkChangeListener, ChunkStore};
