//! Incremental frame decoding for byte streams.
//!
//! Bytes are consumed one at a time, the same way a UART receive interrupt
//! would see them: address MSB, address LSB, length MSB, length LSB, then
//! `length` bytes of payload.

use std::{
    collections::VecDeque,
    io::{self, Read},
};

use crate::frame::{Message, MAX_PAYLOAD_LEN};

/// Which frames a receiver keeps
#[derive(Copy, Clone, Debug)]
pub struct ReceiverFilter {
    /// Only frames sent to this address are completed; `None` accepts all
    pub local_address: Option<u16>,
    /// Frames declaring a longer payload are reported as invalid and skipped
    pub max_payload: usize,
}

impl Default for ReceiverFilter {
    fn default() -> Self {
        Self {
            local_address: None,
            max_payload: MAX_PAYLOAD_LEN,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReadState {
    /// Need more bytes
    Incomplete,
    /// A full frame for us
    Complete(Message),
    /// A full frame for some other address
    Ignored(u16),
    /// Declared length exceeds the limit; the payload will be skipped
    Invalid { address: u16, length: u16 },
    /// Stream hit EOF
    Disconnected,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Mode {
    AddressMsb,
    AddressLsb,
    LengthMsb,
    LengthLsb,
    Data,
    Discard,
}

pub struct FrameReceiver {
    filter: ReceiverFilter,
    mode: Mode,
    address: u16,
    length: u16,
    data: Vec<u8>,
    /// Bytes left to throw away while in `Mode::Discard`
    skip: usize,
    pending: VecDeque<ReadState>,
    read_buf: Box<[u8]>,
}

impl Default for FrameReceiver {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameReceiver {
    pub fn new() -> Self {
        Self::with_filter(ReceiverFilter::default())
    }

    pub fn with_filter(filter: ReceiverFilter) -> Self {
        Self {
            filter,
            mode: Mode::AddressMsb,
            address: 0,
            length: 0,
            data: vec![],
            skip: 0,
            pending: VecDeque::new(),
            read_buf: vec![0; 4096].into_boxed_slice(),
        }
    }

    /// True when no partial frame is buffered
    pub fn is_idle(&self) -> bool {
        self.mode == Mode::AddressMsb
    }

    /// Advance by one byte
    pub fn push(&mut self, byte: u8) -> ReadState {
        match self.mode {
            Mode::AddressMsb => {
                self.address = (byte as u16) << 8;
                self.mode = Mode::AddressLsb;
            }
            Mode::AddressLsb => {
                self.address |= byte as u16;
                self.mode = Mode::LengthMsb;
            }
            Mode::LengthMsb => {
                self.length = (byte as u16) << 8;
                self.mode = Mode::LengthLsb;
            }
            Mode::LengthLsb => {
                self.length |= byte as u16;
                let length = self.length as usize;

                if length > self.filter.max_payload {
                    self.skip = length;
                    self.mode = Mode::Discard;
                    return ReadState::Invalid {
                        address: self.address,
                        length: self.length,
                    };
                }

                if length == 0 {
                    return self.finish();
                }

                self.data = Vec::with_capacity(length);
                self.mode = Mode::Data;
            }
            Mode::Data => {
                self.data.push(byte);
                if self.data.len() == self.length as usize {
                    return self.finish();
                }
            }
            Mode::Discard => {
                self.skip -= 1;
                if self.skip == 0 {
                    self.mode = Mode::AddressMsb;
                }
            }
        }

        ReadState::Incomplete
    }

    /// Advance by many bytes, returning every non-`Incomplete` state in order
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<ReadState> {
        bytes
            .iter()
            .map(|&b| self.push(b))
            .filter(|state| *state != ReadState::Incomplete)
            .collect()
    }

    /// Pull bytes from `reader` until something happens or the reader has nothing more right now.
    /// Works with both blocking and non-blocking streams.
    pub fn read<R: Read>(&mut self, reader: &mut R) -> io::Result<ReadState> {
        if let Some(state) = self.pending.pop_front() {
            return Ok(state);
        }

        let n = match reader.read(&mut self.read_buf) {
            Ok(0) => return Ok(ReadState::Disconnected),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(ReadState::Incomplete),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(ReadState::Incomplete),
            Err(e) => return Err(e),
        };

        for i in 0..n {
            let state = self.push(self.read_buf[i]);
            if state != ReadState::Incomplete {
                self.pending.push_back(state);
            }
        }

        Ok(self.pending.pop_front().unwrap_or(ReadState::Incomplete))
    }

    fn finish(&mut self) -> ReadState {
        self.mode = Mode::AddressMsb;
        let payload = std::mem::take(&mut self.data);

        match self.filter.local_address {
            Some(local) if local != self.address => ReadState::Ignored(self.address),
            _ => ReadState::Complete(Message::from_wire(self.address, payload)),
        }
    }
}
