//! Board addressing and chain discovery.
//!
//! Non-`init` commands go to the address the caller names, or to the
//! broadcast address when none is given. Broadcasting is only correct with
//! exactly one board on the chain; nothing here probes the chain to check.
//!
//! Discovery is a shift-register style protocol. The host sends one SETUP
//! frame claiming address 1. The first unassigned board takes it,
//! acknowledges, and forwards a claim for address 2 downstream, and so on.
//! Once the claim has passed the last board it comes back to the host, or
//! simply stops if the ring is open. [`Discovery`] follows this from the
//! host's side, one [`ClaimEvent`] per claim, until it times out.
//!
//! ```text
//! Unassigned --start--> Claiming(1) --Ack(1)--> Claiming(2) --Ack(2)--> ...
//!                           |                        |
//!                   Timeout/Loopback          Timeout/Loopback
//!                           v                        v
//!                      NoBoardFound            Assigned([1, 2, ...])
//! ```

use crate::error::{Error, Malformed, Result};
use crate::protocol::{self, Command, Frame, Opcode, REPLY_FAILED};
use crate::types::{BoardAddress, BoardInfo, ChainTable};

/// Which board a non-`init` command is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddressSpec {
    /// No address given: the only board on the chain
    #[default]
    Sole,
    /// An address assigned by an earlier `init`
    Explicit(u8),
}

impl AddressSpec {
    pub fn from_option(address: Option<u8>) -> Self {
        address.map_or(AddressSpec::Sole, AddressSpec::Explicit)
    }

    pub fn resolve(self) -> Result<BoardAddress> {
        match self {
            AddressSpec::Sole => Ok(BoardAddress::BROADCAST),
            AddressSpec::Explicit(address) => BoardAddress::new(address),
        }
    }
}

/// What the host observed while waiting for the current claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimEvent {
    /// A board accepted `address`
    Ack { address: u8, firmware: u8 },
    /// The claim for `address` came back around the ring unclaimed
    Loopback { address: u8 },
    /// Nothing arrived before the read timeout
    Timeout,
}

impl ClaimEvent {
    pub fn from_frame(frame: &Frame) -> Result<ClaimEvent> {
        match frame.opcode() {
            op if op == Opcode::Setup.reply() => Ok(ClaimEvent::Ack {
                address: frame.address(),
                firmware: frame.data(),
            }),
            op if op == Opcode::Setup as u8 => Ok(ClaimEvent::Loopback {
                address: frame.address(),
            }),
            REPLY_FAILED => Err(Error::Rejected {
                address: frame.address(),
                opcode: Opcode::Setup as u8,
            }),
            actual => Err(Malformed::UnexpectedOpcode {
                expected: Opcode::Setup.reply(),
                actual,
            }
            .into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimState {
    /// No claim sent yet
    Unassigned,
    /// Waiting for a board to accept `next`
    Claiming { next: u8, table: ChainTable },
    /// Every board on the chain holds an address
    Assigned(ChainTable),
}

/// Host side of chain discovery.
#[derive(Debug)]
pub struct Discovery {
    state: ClaimState,
}

impl Default for Discovery {
    fn default() -> Self {
        Self::new()
    }
}

impl Discovery {
    pub fn new() -> Self {
        Self {
            state: ClaimState::Unassigned,
        }
    }

    pub fn state(&self) -> &ClaimState {
        &self.state
    }

    /// Begin claiming; returns the SETUP frame to put on the wire.
    pub fn start(&mut self) -> Result<Frame> {
        if self.state != ClaimState::Unassigned {
            return Err(Error::Encoding("discovery already started".into()));
        }
        let frame = protocol::encode(BoardAddress::BROADCAST, &Command::InitChain)?;
        self.state = ClaimState::Claiming {
            next: frame.address(),
            table: ChainTable::new(),
        };
        Ok(frame)
    }

    /// Advance on one event. Returns the finished table once discovery is
    /// over, `None` while more boards may still answer.
    pub fn step(&mut self, event: ClaimEvent) -> Result<Option<ChainTable>> {
        // Errors leave the state as it was.
        let (next, table) = match &mut self.state {
            ClaimState::Claiming { next, table } => (next, table),
            ClaimState::Assigned(table) => return Ok(Some(table.clone())),
            ClaimState::Unassigned => {
                return Err(Error::Encoding("claim event before discovery started".into()))
            }
        };

        match event {
            ClaimEvent::Ack { address, .. } | ClaimEvent::Loopback { address }
                if address != *next =>
            {
                Err(Malformed::AddressMismatch {
                    expected: *next,
                    actual: address,
                }
                .into())
            }
            ClaimEvent::Ack { firmware, .. } => {
                // A board accepting a claim past the last usable address.
                let address = BoardAddress::new(*next)
                    .map_err(|_| Error::ChainOverflow { assigned: table.clone() })?;
                table.push(BoardInfo { address, firmware });
                *next += 1;
                Ok(None)
            }
            ClaimEvent::Loopback { .. } | ClaimEvent::Timeout => {
                if table.is_empty() {
                    return Err(Error::NoBoardFound);
                }
                let table = table.clone();
                self.state = ClaimState::Assigned(table.clone());
                Ok(Some(table))
            }
        }
    }
}
