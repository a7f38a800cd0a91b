use byteorder::{BigEndian, ByteOrder};
use bytes::Bytes;
use std::io;

/// A binary frame: one opcode byte followed by a fixed or variable payload,
/// big endian throughout.
pub trait Packet: Sized {
    /// First byte of every frame of this kind.
    const OP_CODE: u8;

    /// Reads the packet, opcode included, from the buffer.
    fn read_from_buffer(buffer: &mut PacketBuffer) -> io::Result<Self>;

    /// Writes the packet, opcode included, to the buffer.
    fn write_to_buffer(&self, buffer: &mut PacketBuffer);

    /// Serializes the packet into a fresh frame.
    fn to_bytes(&self) -> Bytes {
        let mut buffer = PacketBuffer::new();
        self.write_to_buffer(&mut buffer);
        buffer.into_bytes()
    }

    /// Parses a packet from a received frame.
    fn from_bytes(bytes: &[u8]) -> io::Result<Self> {
        Self::read_from_buffer(&mut PacketBuffer::from_bytes(bytes.to_vec()))
    }
}

/// Packet buffer with a read cursor.
#[derive(Debug, Default)]
pub struct PacketBuffer {
    buffer: Vec<u8>,
    cursor: usize,
}

impl PacketBuffer {
    /// Creates an empty buffer for writing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps received bytes for reading, cursor at the start.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            buffer: bytes,
            cursor: 0,
        }
    }

    /// Hands the written bytes over as a frame.
    pub fn into_bytes(self) -> Bytes {
        Bytes::from(self.buffer)
    }

    /// The whole buffer, regardless of the cursor.
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    /// Byte under the cursor without consuming it.
    pub fn peek_byte(&self) -> Option<u8> {
        self.buffer.get(self.cursor).copied()
    }

    /// Bytes left after the cursor.
    pub fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.cursor)
    }

    /// Consumes the opcode and fails if it is not `expected`.
    pub fn read_op_code(&mut self, expected: u8) -> io::Result<()> {
        let op_code = self.read_u8()?;
        if op_code != expected {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("expected opcode {:#04x}, got {:#04x}", expected, op_code),
            ));
        }
        Ok(())
    }

    fn take(&mut self, len: usize) -> io::Result<&[u8]> {
        if self.remaining() < len {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("EOF while reading {} bytes", len),
            ));
        }
        let start = self.cursor;
        self.cursor += len;
        Ok(&self.buffer[start..self.cursor])
    }

    /// Reads one byte.
    pub fn read_u8(&mut self) -> io::Result<u8> {
        Ok(self.take(1)?[0])
    }

    /// Reads a big endian u16.
    pub fn read_u16(&mut self) -> io::Result<u16> {
        Ok(BigEndian::read_u16(self.take(2)?))
    }

    /// Reads a big endian i16.
    pub fn read_i16(&mut self) -> io::Result<i16> {
        Ok(BigEndian::read_i16(self.take(2)?))
    }

    /// Reads a big endian 24 bit unsigned integer.
    pub fn read_u24(&mut self) -> io::Result<u32> {
        Ok(BigEndian::read_u24(self.take(3)?))
    }

    /// Reads a big endian u32.
    pub fn read_u32(&mut self) -> io::Result<u32> {
        Ok(BigEndian::read_u32(self.take(4)?))
    }

    /// Appends one byte.
    pub fn write_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    /// Appends a big endian u16.
    pub fn write_u16(&mut self, value: u16) {
        let mut raw = [0u8; 2];
        BigEndian::write_u16(&mut raw, value);
        self.buffer.extend_from_slice(&raw);
    }

    /// Appends a big endian i16.
    pub fn write_i16(&mut self, value: i16) {
        let mut raw = [0u8; 2];
        BigEndian::write_i16(&mut raw, value);
        self.buffer.extend_from_slice(&raw);
    }

    /// Writes the low 24 bits of `value`.
    pub fn write_u24(&mut self, value: u32) {
        let mut raw = [0u8; 3];
        BigEndian::write_u24(&mut raw, value & 0x00FF_FFFF);
        self.buffer.extend_from_slice(&raw);
    }

    /// Appends a big endian u32.
    pub fn write_u32(&mut self, value: u32) {
        let mut raw = [0u8; 4];
        BigEndian::write_u32(&mut raw, value);
        self.buffer.extend_from_slice(&raw);
    }
}
