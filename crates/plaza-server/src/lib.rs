pub mod bridge;
pub mod collab;
pub mod hub;
pub mod placement;
pub mod server;
pub mod session;

pub use collab::{
    BridgeDirectory, ChatFilter, Collaborators, FreePlacer, MemoryDirectory, OpenChat, PixelPlacer,
    PlaceOutcome, User,
};
pub use hub::Hub;
pub use server::Server;
pub use session::{Session, SessionKind};
