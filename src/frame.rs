//! Fixed binary framing: `address (u16 BE) | length (u16 BE) | payload`.

use thiserror::Error;

/// Size of the address and length fields together
pub const HEADER_SIZE: usize = 4;

/// Largest payload the 16-bit length field can describe
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("address {0} is outside the 16-bit range 0..=65535")]
    OutOfRange(i64),
    #[error("payload is {0} bytes, the length field holds at most 65535")]
    PayloadTooLarge(usize),
    #[error("frame truncated: expected {expected} bytes, found {found}")]
    Truncated { expected: usize, found: usize },
    #[error("{0} unexpected bytes after the payload")]
    TrailingBytes(usize),
    #[error("payload is not valid UTF-8")]
    InvalidUtf8(#[from] std::str::Utf8Error),
}

/// A single addressed message
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    address: u16,
    payload: Vec<u8>,
}

impl Message {
    /// Build a message from an unchecked address and a text payload
    pub fn new(address: i64, payload: &str) -> Result<Self, FrameError> {
        let address = u16::try_from(address).map_err(|_| FrameError::OutOfRange(address))?;
        Self::from_bytes(address, payload.as_bytes().to_vec())
    }

    /// Build a message from raw payload bytes
    pub fn from_bytes(address: u16, payload: Vec<u8>) -> Result<Self, FrameError> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(FrameError::PayloadTooLarge(payload.len()));
        }

        Ok(Self { address, payload })
    }

    /// Build from fields read off the wire, where the length already fit in a u16
    pub(crate) fn from_wire(address: u16, payload: Vec<u8>) -> Self {
        debug_assert!(payload.len() <= MAX_PAYLOAD_LEN);
        Self { address, payload }
    }

    pub fn address(&self) -> u16 {
        self.address
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// View the payload as text
    pub fn payload_str(&self) -> Result<&str, FrameError> {
        Ok(std::str::from_utf8(&self.payload)?)
    }

    /// Length of the encoded frame, header included
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// Serialize into the wire layout
    pub fn encode(&self) -> Vec<u8> {
        // Checked in from_bytes()
        let length = self.payload.len() as u16;

        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.extend_from_slice(&self.address.to_be_bytes());
        buf.extend_from_slice(&length.to_be_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Parse exactly one frame out of `buf`
    pub fn decode(buf: &[u8]) -> Result<Self, FrameError> {
        if buf.len() < HEADER_SIZE {
            return Err(FrameError::Truncated {
                expected: HEADER_SIZE,
                found: buf.len(),
            });
        }

        let address = u16::from_be_bytes([buf[0], buf[1]]);
        let length = u16::from_be_bytes([buf[2], buf[3]]) as usize;

        let end = HEADER_SIZE + length;
        if buf.len() < end {
            return Err(FrameError::Truncated {
                expected: end,
                found: buf.len(),
            });
        }
        if buf.len() > end {
            return Err(FrameError::TrailingBytes(buf.len() - end));
        }

        Ok(Self::from_wire(address, buf[HEADER_SIZE..end].to_vec()))
    }
}

/// Validate and encode in one step
pub fn encode(address: i64, payload: &str) -> Result<Vec<u8>, FrameError> {
    Ok(Message::new(address, payload)?.encode())
}
