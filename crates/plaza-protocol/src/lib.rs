pub mod bridge;
pub mod changed_me;
pub mod client;
pub mod cool_down;
pub mod frames;
pub mod online_counter;
pub mod packet;
pub mod pixel_return;
pub mod pixel_update;
pub mod register_canvas;
pub mod register_chunk;
pub mod register_multiple_chunks;
pub mod text;

pub use bridge::{BridgeCommand, BridgeReply, Subscription};
pub use client::{ClientCore, ClientEvent, ProtocolClient, ReconnectPolicy};
pub use frames::{ClientPacket, ServerPacket};
pub use packet::{Packet, PacketBuffer};
pub use pixel_return::ReturnCode;
pub use text::{ChatMessage, ChatRequest, ServerText};
