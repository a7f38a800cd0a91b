use crate::packet::{Packet, PacketBuffer};
use std::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OnlineCounterPacket {
    pub total: u16,
}

impl OnlineCounterPacket {
    /// Saturates at `u16::MAX`.
    pub fn new(total: usize) -> Self {
        Self {
            total: u16::try_from(total).unwrap_or(u16::MAX),
        }
    }
}

impl Packet for OnlineCounterPacket {
    const OP_CODE: u8 = 0xA7;

    fn read_from_buffer(buffer: &mut PacketBuffer) -> io::Result<Self> {
        buffer.read_op_code(Self::OP_CODE)?;
        Ok(Self {
            total: buffer.read_u16()?,
        })
    }

    fn write_to_buffer(&self, buffer: &mut PacketBuffer) {
        buffer.write_u8(Self::OP_CODE);
        buffer.write_u16(self.total);
    }
}
