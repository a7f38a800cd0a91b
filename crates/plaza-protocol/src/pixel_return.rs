use crate::packet::{Packet, PacketBuffer};
use std::io;

/// Outcome of a placement request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ReturnCode {
    Success = 0,
    InvalidCanvas = 1,
    XOutOfBounds = 2,
    YOutOfBounds = 3,
    ZOutOfBounds = 4,
    InvalidColor = 5,
    RegisteredOnly = 6,
    NotEnoughPlaced = 7,
    Protected = 8,
    Cooldown = 9,
    Captcha = 10,
    Proxy = 11,
    Unknown = 12,
}

impl ReturnCode {
    /// Codes this build does not know decode as `Unknown`.
    pub fn from_u8(raw: u8) -> Self {
        match raw {
            0 => ReturnCode::Success,
            1 => ReturnCode::InvalidCanvas,
            2 => ReturnCode::XOutOfBounds,
            3 => ReturnCode::YOutOfBounds,
            4 => ReturnCode::ZOutOfBounds,
            5 => ReturnCode::InvalidColor,
            6 => ReturnCode::RegisteredOnly,
            7 => ReturnCode::NotEnoughPlaced,
            8 => ReturnCode::Protected,
            9 => ReturnCode::Cooldown,
            10 => ReturnCode::Captcha,
            11 => ReturnCode::Proxy,
            _ => ReturnCode::Unknown,
        }
    }

    pub fn is_success(self) -> bool {
        self == ReturnCode::Success
    }

    /// Human readable reason, used on the bridge where errors travel as text.
    pub fn message(self) -> Option<&'static str> {
        match self {
            ReturnCode::Success => None,
            ReturnCode::InvalidCanvas => Some("This canvas does not exist"),
            ReturnCode::XOutOfBounds => Some("x coordinate out of bounds"),
            ReturnCode::YOutOfBounds => Some("y coordinate out of bounds"),
            ReturnCode::ZOutOfBounds => Some("z coordinate out of bounds"),
            ReturnCode::InvalidColor => Some("Invalid color"),
            ReturnCode::RegisteredOnly => Some("You need to be logged in to use this canvas"),
            ReturnCode::NotEnoughPlaced => Some("You need to place more pixels first"),
            ReturnCode::Protected => Some("This pixel is protected"),
            ReturnCode::Cooldown => Some("You are still on cooldown"),
            ReturnCode::Captcha => Some("Captcha required"),
            ReturnCode::Proxy => Some("Proxies are not allowed"),
            ReturnCode::Unknown => Some("Unknown error"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelReturnPacket {
    pub code: ReturnCode,
    pub wait_ms: u32,
    /// Cooldown added by this placement, in seconds.
    pub cool_down_seconds: i16,
}

impl PixelReturnPacket {
    pub fn new(code: ReturnCode, wait_ms: u32, cool_down_seconds: i16) -> Self {
        Self {
            code,
            wait_ms,
            cool_down_seconds,
        }
    }

    pub fn rejected(code: ReturnCode) -> Self {
        Self::new(code, 0, 0)
    }
}

impl Packet for PixelReturnPacket {
    const OP_CODE: u8 = 0xC3;

    fn read_from_buffer(buffer: &mut PacketBuffer) -> io::Result<Self> {
        buffer.read_op_code(Self::OP_CODE)?;
        Ok(Self {
            code: ReturnCode::from_u8(buffer.read_u8()?),
            wait_ms: buffer.read_u32()?,
            cool_down_seconds: buffer.read_i16()?,
        })
    }

    fn write_to_buffer(&self, buffer: &mut PacketBuffer) {
        buffer.write_u8(Self::OP_CODE);
        buffer.write_u8(self.code as u8);
        buffer.write_u32(self.wait_ms);
        buffer.write_i16(self.cool_down_seconds);
    }
}
