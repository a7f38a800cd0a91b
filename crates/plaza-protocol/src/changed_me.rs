use crate::packet::{Packet, PacketBuffer};
use std::io;

/// Tells a client its session data changed and it should reconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChangedMePacket;

impl Packet for ChangedMePacket {
    const OP_CODE: u8 = 0xA6;

    fn read_from_buffer(buffer: &mut PacketBuffer) -> io::Result<Self> {
        buffer.read_op_code(Self::OP_CODE)?;
        Ok(Self)
    }

    fn write_to_buffer(&self, buffer: &mut PacketBuffer) {
        buffer.write_u8(Self::OP_CODE);
    }
}
