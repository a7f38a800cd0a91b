use crate::packet::{Packet, PacketBuffer};
use plaza_canvas::addressing::{chunk_from_id, chunk_id};
use plaza_common::ChunkCoord;
use std::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterChunkPacket {
    pub chunk_id: u16,
}

impl RegisterChunkPacket {
    pub fn new(chunk: ChunkCoord) -> Self {
        Self {
            chunk_id: chunk_id(chunk),
        }
    }

    pub fn chunk(&self) -> ChunkCoord {
        chunk_from_id(self.chunk_id)
    }
}

impl Packet for RegisterChunkPacket {
    const OP_CODE: u8 = 0xA1;

    fn read_from_buffer(buffer: &mut PacketBuffer) -> io::Result<Self> {
        buffer.read_op_code(Self::OP_CODE)?;
        Ok(Self {
            chunk_id: buffer.read_u16()?,
        })
    }

    fn write_to_buffer(&self, buffer: &mut PacketBuffer) {
        buffer.write_u8(Self::OP_CODE);
        buffer.write_u16(self.chunk_id);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeRegisterChunkPacket {
    pub chunk_id: u16,
}

impl DeRegisterChunkPacket {
    pub fn new(chunk: ChunkCoord) -> Self {
        Self {
            chunk_id: chunk_id(chunk),
        }
    }

    pub fn chunk(&self) -> ChunkCoord {
        chunk_from_id(self.chunk_id)
    }
}

impl Packet for DeRegisterChunkPacket {
    const OP_CODE: u8 = 0xA2;

    fn read_from_buffer(buffer: &mut PacketBuffer) -> io::Result<Self> {
        buffer.read_op_code(Self::OP_CODE)?;
        Ok(Self {
            chunk_id: buffer.read_u16()?,
        })
    }

    fn write_to_buffer(&self, buffer: &mut PacketBuffer) {
        buffer.write_u8(Self::OP_CODE);
        buffer.write_u16(self.chunk_id);
    }
}
