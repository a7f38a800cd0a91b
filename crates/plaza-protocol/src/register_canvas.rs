use crate::packet::{Packet, PacketBuffer};
use plaza_common::CanvasId;
use std::io;

/// Announces the canvas a client is looking at. Clears its chunk
/// registrations server side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterCanvasPacket {
    pub canvas_id: CanvasId,
}

impl RegisterCanvasPacket {
    pub fn new(canvas_id: CanvasId) -> Self {
        Self { canvas_id }
    }
}

impl Packet for RegisterCanvasPacket {
    const OP_CODE: u8 = 0xA0;

    fn read_from_buffer(buffer: &mut PacketBuffer) -> io::Result<Self> {
        buffer.read_op_code(Self::OP_CODE)?;
        Ok(Self {
            canvas_id: buffer.read_u8()?,
        })
    }

    fn write_to_buffer(&self, buffer: &mut PacketBuffer) {
        buffer.write_u8(Self::OP_CODE);
        buffer.write_u8(self.canvas_id);
    }
}
