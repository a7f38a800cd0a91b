use crate::packet::{Packet, PacketBuffer};
use std::io;

fn read_chunk_ids(buffer: &mut PacketBuffer) -> io::Result<Vec<u16>> {
    // reserved byte, always 0
    buffer.read_u8()?;
    if buffer.remaining() % 2 != 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "chunk id list has a dangling byte",
        ));
    }
    let mut chunk_ids = Vec::with_capacity(buffer.remaining() / 2);
    while buffer.remaining() > 0 {
        chunk_ids.push(buffer.read_u16()?);
    }
    Ok(chunk_ids)
}

fn write_chunk_ids(buffer: &mut PacketBuffer, chunk_ids: &[u16]) {
    buffer.write_u8(0);
    for chunk_id in chunk_ids {
        buffer.write_u16(*chunk_id);
    }
}

/// Batched registration, sent once after every (re)connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterMultipleChunksPacket {
    pub chunk_ids: Vec<u16>,
}

impl RegisterMultipleChunksPacket {
    pub fn new(chunk_ids: Vec<u16>) -> Self {
        Self { chunk_ids }
    }
}

impl Packet for RegisterMultipleChunksPacket {
    const OP_CODE: u8 = 0xA3;

    fn read_from_buffer(buffer: &mut PacketBuffer) -> io::Result<Self> {
        buffer.read_op_code(Self::OP_CODE)?;
        Ok(Self {
            chunk_ids: read_chunk_ids(buffer)?,
        })
    }

    fn write_to_buffer(&self, buffer: &mut PacketBuffer) {
        buffer.write_u8(Self::OP_CODE);
        write_chunk_ids(buffer, &self.chunk_ids);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeRegisterMultipleChunksPacket {
    pub chunk_ids: Vec<u16>,
}

impl DeRegisterMultipleChunksPacket {
    pub fn new(chunk_ids: Vec<u16>) -> Self {
        Self { chunk_ids }
    }
}

impl Packet for DeRegisterMultipleChunksPacket {
    const OP_CODE: u8 = 0xA4;

    fn read_from_buffer(buffer: &mut PacketBuffer) -> io::Result<Self> {
        buffer.read_op_code(Self::OP_CODE)?;
        Ok(Self {
            chunk_ids: read_chunk_ids(buffer)?,
        })
    }

    fn write_to_buffer(&self, buffer: &mut PacketBuffer) {
        buffer.write_u8(Self::OP_CODE);
        write_chunk_ids(buffer, &self.chunk_ids);
    }
}
