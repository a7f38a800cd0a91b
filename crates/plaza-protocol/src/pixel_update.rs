use crate::packet::{Packet, PacketBuffer};
use plaza_common::ChunkCoord;
use std::io;

/// One pixel addressed by chunk and offset. Clients send it as a placement
/// request, the server broadcasts it as a committed change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelUpdatePacket {
    pub i: u8,
    pub j: u8,
    /// 24 bits on the wire.
    pub offset: u32,
    pub color: u8,
}

impl PixelUpdatePacket {
    pub fn new(i: u8, j: u8, offset: u32, color: u8) -> Self {
        Self {
            i,
            j,
            offset,
            color,
        }
    }

    pub fn chunk(&self) -> ChunkCoord {
        ChunkCoord::new(self.i as u32, self.j as u32)
    }
}

impl Packet for PixelUpdatePacket {
    const OP_CODE: u8 = 0xC1;

    fn read_from_buffer(buffer: &mut PacketBuffer) -> io::Result<Self> {
        buffer.read_op_code(Self::OP_CODE)?;
        Ok(Self {
            i: buffer.read_u8()?,
            j: buffer.read_u8()?,
            offset: buffer.read_u24()?,
            color: buffer.read_u8()?,
        })
    }

    fn write_to_buffer(&self, buffer: &mut PacketBuffer) {
        buffer.write_u8(Self::OP_CODE);
        buffer.write_u8(self.i);
        buffer.write_u8(self.j);
        buffer.write_u24(self.offset);
        buffer.write_u8(self.color);
    }
}
