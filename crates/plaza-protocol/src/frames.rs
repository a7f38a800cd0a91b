//! Opcode dispatch for both directions of the binary protocol.

use crate::changed_me::ChangedMePacket;
use crate::cool_down::CoolDownPacket;
use crate::online_counter::OnlineCounterPacket;
use crate::packet::{Packet, PacketBuffer};
use crate::pixel_return::PixelReturnPacket;
use crate::pixel_update::PixelUpdatePacket;
use crate::register_canvas::RegisterCanvasPacket;
use crate::register_chunk::{DeRegisterChunkPacket, RegisterChunkPacket};
use crate::register_multiple_chunks::{
    DeRegisterMultipleChunksPacket, RegisterMultipleChunksPacket,
};
use bytes::Bytes;
use plaza_logger::{log, LogSeverity::*};
use std::io;

fn read<P: Packet>(bytes: &[u8]) -> io::Result<P> {
    P::read_from_buffer(&mut PacketBuffer::from_bytes(bytes.to_vec()))
}

fn log_dropped(direction: &str, bytes: &[u8], err: io::Error) {
    log(
        format!(
            "Dropped {} frame with opcode {:#04x}: {}",
            direction, bytes[0], err
        ),
        Warning,
    );
}

/// Frames sent from server to client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerPacket {
    PixelUpdate(PixelUpdatePacket),
    PixelReturn(PixelReturnPacket),
    OnlineCounter(OnlineCounterPacket),
    CoolDown(CoolDownPacket),
    ChangedMe,
}

impl ServerPacket {
    /// Unknown opcodes, empty and truncated frames are logged and yield
    /// `None`.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let op_code = *bytes.first()?;
        let packet = match op_code {
            PixelUpdatePacket::OP_CODE => read(bytes).map(ServerPacket::PixelUpdate),
            PixelReturnPacket::OP_CODE => read(bytes).map(ServerPacket::PixelReturn),
            OnlineCounterPacket::OP_CODE => read(bytes).map(ServerPacket::OnlineCounter),
            CoolDownPacket::OP_CODE => read(bytes).map(ServerPacket::CoolDown),
            ChangedMePacket::OP_CODE => {
                read::<ChangedMePacket>(bytes).map(|_| ServerPacket::ChangedMe)
            }
            _ => {
                log(format!("Unknown server opcode {:#04x}", op_code), Warning);
                return None;
            }
        };
        packet.map_err(|e| log_dropped("server", bytes, e)).ok()
    }

    pub fn to_bytes(&self) -> Bytes {
        match self {
            ServerPacket::PixelUpdate(packet) => packet.to_bytes(),
            ServerPacket::PixelReturn(packet) => packet.to_bytes(),
            ServerPacket::OnlineCounter(packet) => packet.to_bytes(),
            ServerPacket::CoolDown(packet) => packet.to_bytes(),
            ServerPacket::ChangedMe => ChangedMePacket.to_bytes(),
        }
    }
}

/// Frames sent from client to server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientPacket {
    RegisterCanvas(RegisterCanvasPacket),
    RegisterChunk(RegisterChunkPacket),
    DeRegisterChunk(DeRegisterChunkPacket),
    RegisterMultipleChunks(RegisterMultipleChunksPacket),
    DeRegisterMultipleChunks(DeRegisterMultipleChunksPacket),
    PixelUpdate(PixelUpdatePacket),
}

impl ClientPacket {
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let op_code = *bytes.first()?;
        let packet = match op_code {
            RegisterCanvasPacket::OP_CODE => read(bytes).map(ClientPacket::RegisterCanvas),
            RegisterChunkPacket::OP_CODE => read(bytes).map(ClientPacket::RegisterChunk),
            DeRegisterChunkPacket::OP_CODE => read(bytes).map(ClientPacket::DeRegisterChunk),
            RegisterMultipleChunksPacket::OP_CODE => {
                read(bytes).map(ClientPacket::RegisterMultipleChunks)
            }
            DeRegisterMultipleChunksPacket::OP_CODE => {
                read(bytes).map(ClientPacket::DeRegisterMultipleChunks)
            }
            PixelUpdatePacket::OP_CODE => read(bytes).map(ClientPacket::PixelUpdate),
            _ => {
                log(format!("Unknown client opcode {:#04x}", op_code), Warning);
                return None;
            }
        };
        packet.map_err(|e| log_dropped("client", bytes, e)).ok()
    }

    pub fn to_bytes(&self) -> Bytes {
        match self {
            ClientPacket::RegisterCanvas(packet) => packet.to_bytes(),
            ClientPacket::RegisterChunk(packet) => packet.to_bytes(),
            ClientPacket::DeRegisterChunk(packet) => packet.to_bytes(),
            ClientPacket::RegisterMultipleChunks(packet) => packet.to_bytes(),
            ClientPacket::DeRegisterMultipleChunks(packet) => packet.to_bytes(),
            ClientPacket::PixelUpdate(packet) => packet.to_bytes(),
        }
    }
}
