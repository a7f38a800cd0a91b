use crate::packet::{Packet, PacketBuffer};
use std::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoolDownPacket {
    pub wait_ms: u32,
}

impl CoolDownPacket {
    pub fn new(wait_ms: u32) -> Self {
        Self { wait_ms }
    }
}

impl Packet for CoolDownPacket {
    const OP_CODE: u8 = 0xC2;

    fn read_from_buffer(buffer: &mut PacketBuffer) -> io::Result<Self> {
        buffer.read_op_code(Self::OP_CODE)?;
        Ok(Self {
            wait_ms: buffer.read_u32()?,
        })
    }

    fn write_to_buffer(&self, buffer: &mut PacketBuffer) {
        buffer.write_u8(Self::OP_CODE);
        buffer.write_u32(self.wait_ms);
    }
}
