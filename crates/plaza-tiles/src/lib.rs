pub mod job;
pub mod pyramid;
pub mod render;
pub mod store;
pub mod updater;
pub mod worker;

pub use job::{TileJob, TileRenderer};
pub use pyramid::{TileConfig, TilePyramid};
pub use store::TileStore;
pub use updater::CanvasUpdater;
pub use worker::{JobSink, TileWorkerPool};
