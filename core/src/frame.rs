//! Length-prefixed string framing as the ball server speaks it:
//! a 4-byte big-endian byte length followed by UTF-16BE text.

use bytes::{Buf, BufMut, BytesMut};

/// Frames larger than this are rejected outright.
pub const MAX_FRAME_BYTES: usize = 64 * 1024;

/// Length header denoting the null string.
const NULL_STRING: u32 = 0xffff_ffff;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("frame length {0} exceeds limit")]
    Oversized(usize),

    #[error("odd frame length {0}")]
    OddLength(usize),

    #[error("invalid utf-16 payload: {0}")]
    Utf16(#[from] std::string::FromUtf16Error),
}

pub fn encode(payload: &str) -> Vec<u8> {
    let units: Vec<u16> = payload.encode_utf16().collect();
    let mut block = Vec::with_capacity(4 + units.len() * 2);
    block.put_u32((units.len() * 2) as u32);
    for unit in units {
        block.put_u16(unit);
    }
    block
}

/// Transactional reader over buffered input. A frame is extracted only
/// once every byte of it has arrived; until then nothing is consumed.
#[derive(Debug, Default)]
pub struct FrameReader {
    buf: BytesMut,
}

impl FrameReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn try_next(&mut self) -> Result<Option<String>, DecodeError> {
        if self.buf.len() < 4 {
            return Ok(None);
        }
        let header = u32::from_be_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]);
        if header == NULL_STRING {
            self.buf.advance(4);
            return Ok(Some(String::new()));
        }
        let len = header as usize;
        if len > MAX_FRAME_BYTES {
            return Err(DecodeError::Oversized(len));
        }
        if len % 2 != 0 {
            return Err(DecodeError::OddLength(len));
        }
        if self.buf.len() < 4 + len {
            return Ok(None);
        }
        self.buf.advance(4);
        let raw = self.buf.split_to(len);
        let units: Vec<u16> = raw
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        let payload = String::from_utf16(&units)?;
        Ok(Some(payload))
    }
}
