//! Frame codec for the Conrad relay card serial protocol.
//!
//! Every exchange is one 4-byte frame in each direction:
//!
//! ```text
//! +--------+---------+------+----------+
//! | opcode | address | data | checksum |
//! +--------+---------+------+----------+
//!   checksum = opcode ^ address ^ data
//! ```
//!
//! A board answers a request with opcode `255 - request`, echoing its own
//! address and carrying the resulting port state (or its firmware version
//! for SETUP). Opcode 255 in a reply means the board refused the command.
//!
//! All wire knowledge lives in this module; nothing else builds frames.

use bytes::{BufMut, BytesMut};
use strum::{Display, FromRepr};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{Error, Malformed, Result};
use crate::tracing::prelude::*;
use crate::types::{BoardAddress, RelayBank, RelayIndex};

/// Bytes per frame, both directions.
pub const FRAME_LEN: usize = 4;

/// Reply opcode a board sends when it could not execute a command.
pub const REPLY_FAILED: u8 = 255;

/// Request opcodes understood by the boards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, FromRepr)]
#[repr(u8)]
pub enum Opcode {
    #[strum(serialize = "SETUP")]
    Setup = 1,
    #[strum(serialize = "GET_PORT")]
    GetPort = 2,
    #[strum(serialize = "SET_PORT")]
    SetPort = 3,
    #[strum(serialize = "SET_SINGLE")]
    SetSingle = 6,
    #[strum(serialize = "DEL_SINGLE")]
    DelSingle = 7,
    #[strum(serialize = "TOGGLE")]
    Toggle = 8,
}

impl Opcode {
    /// Opcode of a successful reply to this request.
    pub fn reply(self) -> u8 {
        REPLY_FAILED - self as u8
    }

    /// Which request a reply opcode answers, if any.
    pub fn answered_by(reply: u8) -> Option<Opcode> {
        Opcode::from_repr(REPLY_FAILED.checked_sub(reply)?)
    }
}

/// A logical command, as handed to the dispatcher by the caller.
///
/// Relay indices and port values are carried unvalidated; they are checked
/// against their ranges before anything is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    SetRelay(u8),
    ClearRelay(u8),
    ToggleRelay(u8),
    ReadPort,
    WritePort(u32),
    InitChain,
}

impl Command {
    pub fn opcode(&self) -> Opcode {
        match self {
            Command::SetRelay(_) => Opcode::SetSingle,
            Command::ClearRelay(_) => Opcode::DelSingle,
            Command::ToggleRelay(_) => Opcode::Toggle,
            Command::ReadPort => Opcode::GetPort,
            Command::WritePort(_) => Opcode::SetPort,
            Command::InitChain => Opcode::Setup,
        }
    }

    /// Check embedded values against their declared ranges.
    pub fn validate(&self) -> Result<()> {
        self.data().map(|_| ())
    }

    fn data(&self) -> Result<u8> {
        match *self {
            Command::SetRelay(relay) | Command::ClearRelay(relay) | Command::ToggleRelay(relay) => {
                Ok(RelayIndex::new(relay)?.mask())
            }
            Command::WritePort(value) => Ok(RelayBank::from_value(value)?.bits()),
            Command::ReadPort | Command::InitChain => Ok(0),
        }
    }
}

/// One frame on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    opcode: u8,
    address: u8,
    data: u8,
}

impl Frame {
    fn new(opcode: u8, address: u8, data: u8) -> Self {
        Self {
            opcode,
            address,
            data,
        }
    }

    pub fn opcode(&self) -> u8 {
        self.opcode
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn data(&self) -> u8 {
        self.data
    }

    pub fn checksum(&self) -> u8 {
        self.opcode ^ self.address ^ self.data
    }

    pub fn to_bytes(&self) -> [u8; FRAME_LEN] {
        [self.opcode, self.address, self.data, self.checksum()]
    }

    /// Parse exactly one frame, verifying length and checksum.
    pub fn from_bytes(bytes: &[u8]) -> std::result::Result<Frame, Malformed> {
        let [opcode, address, data, received] = <[u8; FRAME_LEN]>::try_from(bytes)
            .map_err(|_| Malformed::Length {
                expected: FRAME_LEN,
                actual: bytes.len(),
            })?;

        let frame = Frame::new(opcode, address, data);
        let computed = frame.checksum();
        if received != computed {
            return Err(Malformed::Checksum { received, computed });
        }
        Ok(frame)
    }
}

/// Build the request frame for `command` addressed to `address`.
///
/// Out-of-range values are an internal error here; callers are expected to
/// have validated the command already.
pub fn encode(address: BoardAddress, command: &Command) -> Result<Frame> {
    let data = command
        .data()
        .map_err(|e| Error::Encoding(format!("cannot encode {:?}: {}", command, e)))?;

    // SETUP carries the first address to hand out, not a target.
    let address = match command {
        Command::InitChain => BoardAddress::FIRST,
        _ => address,
    };

    Ok(Frame::new(command.opcode() as u8, address.value(), data))
}

/// Build the frame a board sends in reply to `request`.
pub fn encode_reply(request: Opcode, address: u8, data: u8) -> Frame {
    Frame::new(request.reply(), address, data)
}

/// Build the frame a board sends when it refuses a command.
pub fn encode_failure(address: u8) -> Frame {
    Frame::new(REPLY_FAILED, address, 0)
}

/// Build the SETUP frame a board forwards downstream after claiming an
/// address.
pub fn encode_claim(address: u8) -> Frame {
    Frame::new(Opcode::Setup as u8, address, 0)
}

/// A board's validated answer to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reply {
    /// The request this reply answers
    pub answers: Opcode,
    /// Address of the board that answered
    pub address: u8,
    pub data: u8,
}

impl Reply {
    pub fn bank(&self) -> RelayBank {
        RelayBank::new(self.data)
    }
}

/// Parse and check a board's reply to `request`.
///
/// A request to the broadcast address accepts whatever address the sole
/// board echoes; any other request requires an exact echo.
pub fn decode(bytes: &[u8], request: &Frame) -> Result<Reply> {
    let frame = Frame::from_bytes(bytes)?;
    check_reply(&frame, request)
}

/// Check an already parsed frame against the request it should answer.
pub fn check_reply(frame: &Frame, request: &Frame) -> Result<Reply> {
    if frame.opcode == REPLY_FAILED {
        return Err(Error::Rejected {
            address: frame.address,
            opcode: request.opcode,
        });
    }

    let expected = REPLY_FAILED - request.opcode;
    let answers = match Opcode::answered_by(frame.opcode) {
        Some(op) if frame.opcode == expected => op,
        _ => {
            return Err(Malformed::UnexpectedOpcode {
                expected,
                actual: frame.opcode,
            }
            .into())
        }
    };

    if request.address != BoardAddress::BROADCAST.value() && frame.address != request.address {
        return Err(Malformed::AddressMismatch {
            expected: request.address,
            actual: frame.address,
        }
        .into());
    }

    Ok(Reply {
        answers,
        address: frame.address,
        data: frame.data,
    })
}

/// Splits a byte stream into frames and writes frames out, logging each
/// one at debug level.
#[derive(Debug, Default)]
pub struct FrameCodec;

impl Encoder<Frame> for FrameCodec {
    type Error = Error;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<()> {
        debug!(
            "--> {:3} {:3} {:3} {:3}",
            frame.opcode,
            frame.address,
            frame.data,
            frame.checksum()
        );
        dst.reserve(FRAME_LEN);
        dst.put_slice(&frame.to_bytes());
        Ok(())
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        if src.len() < FRAME_LEN {
            return Ok(None);
        }

        let raw = src.split_to(FRAME_LEN);
        debug!(
            "<-- {:3} {:3} {:3} {:3}",
            raw[0], raw[1], raw[2], raw[3]
        );
        let frame = Frame::from_bytes(&raw).map_err(|e| {
            trace!(bytes = %hex::encode(&raw), "Discarding bad frame");
            e
        })?;
        Ok(Some(frame))
    }
}
