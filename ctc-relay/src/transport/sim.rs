//! Simulated chain of relay boards.
//!
//! Each board runs the same small state machine as the hardware: it powers
//! up unassigned, takes the address carried by the first SETUP frame that
//! reaches it, acknowledges, and forwards the claim for the next address
//! downstream. After the last board the forwarded claim loops back to the
//! host. Addressed frames that do not match a board are passed on; frames
//! nobody accepts are lost.

use std::collections::VecDeque;
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::time;

use super::{timed_out, Transport};
use crate::protocol::{self, Frame, Opcode, FRAME_LEN};
use crate::types::RelayBank;

/// Firmware version every simulated board reports.
pub const FIRMWARE_VERSION: u8 = 11;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardState {
    Unassigned,
    Assigned(u8),
}

/// One simulated board.
#[derive(Debug, Clone)]
pub struct SimBoard {
    state: BoardState,
    port: RelayBank,
}

/// What a board does with one incoming frame.
struct Handled {
    reply: Option<Frame>,
    forward: Option<Frame>,
}

impl SimBoard {
    fn new() -> Self {
        Self {
            state: BoardState::Unassigned,
            port: RelayBank::default(),
        }
    }

    pub fn state(&self) -> BoardState {
        self.state
    }

    pub fn port(&self) -> RelayBank {
        self.port
    }

    fn own_address(&self) -> u8 {
        match self.state {
            BoardState::Assigned(address) => address,
            BoardState::Unassigned => 0,
        }
    }

    fn receive(&mut self, frame: Frame) -> Handled {
        if frame.opcode() == Opcode::Setup as u8 {
            // SETUP restarts numbering, so re-running init re-addresses
            // boards that already hold an address.
            let address = frame.address();
            self.state = BoardState::Assigned(address);
            return Handled {
                reply: Some(protocol::encode_reply(
                    Opcode::Setup,
                    address,
                    FIRMWARE_VERSION,
                )),
                forward: Some(protocol::encode_claim(address.wrapping_add(1))),
            };
        }

        let broadcast = frame.address() == 0;
        let mine = matches!(self.state, BoardState::Assigned(a) if a == frame.address());
        if !broadcast && !mine {
            return Handled {
                reply: None,
                forward: Some(frame),
            };
        }

        let reply = self.execute(&frame);
        Handled {
            reply: Some(reply),
            forward: broadcast.then_some(frame),
        }
    }

    fn execute(&mut self, frame: &Frame) -> Frame {
        let address = self.own_address();
        let Some(op) = Opcode::from_repr(frame.opcode()) else {
            return protocol::encode_failure(address);
        };

        let data = frame.data();
        self.port = match op {
            Opcode::GetPort => self.port,
            Opcode::SetPort => RelayBank::new(data),
            Opcode::SetSingle => RelayBank::new(self.port.bits() | data),
            Opcode::DelSingle => RelayBank::new(self.port.bits() & !data),
            Opcode::Toggle => RelayBank::new(self.port.bits() ^ data),
            Opcode::Setup => return protocol::encode_failure(address),
        };
        protocol::encode_reply(op, address, self.port.bits())
    }
}

/// A chain of simulated boards behind one link.
#[derive(Debug, Default)]
pub struct SimulatedChain {
    boards: Vec<SimBoard>,
    inbox: BytesMut,
    outbox: VecDeque<u8>,
}

impl SimulatedChain {
    pub fn new(boards: usize) -> Self {
        Self {
            boards: (0..boards).map(|_| SimBoard::new()).collect(),
            ..Default::default()
        }
    }

    pub fn boards(&self) -> &[SimBoard] {
        &self.boards
    }

    fn deliver(&mut self, frame: Frame) {
        let mut in_flight = Some(frame);
        for board in &mut self.boards {
            let Some(frame) = in_flight.take() else {
                break;
            };
            let handled = board.receive(frame);
            if let Some(reply) = handled.reply {
                self.outbox.extend(reply.to_bytes());
            }
            in_flight = handled.forward;
        }

        // Only claims make it around the ring back to the host.
        if let Some(frame) = in_flight {
            if !self.boards.is_empty() && frame.opcode() == Opcode::Setup as u8 {
                self.outbox.extend(frame.to_bytes());
            }
        }
    }
}

#[async_trait]
impl Transport for SimulatedChain {
    async fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.inbox.extend_from_slice(bytes);
        while self.inbox.len() >= FRAME_LEN {
            let raw = self.inbox.split_to(FRAME_LEN);
            match Frame::from_bytes(&raw) {
                Ok(frame) => self.deliver(frame),
                Err(_) => {
                    if !self.boards.is_empty() {
                        let address = self.boards[0].own_address();
                        self.outbox
                            .extend(protocol::encode_failure(address).to_bytes());
                    }
                }
            }
        }
        Ok(())
    }

    async fn read(&mut self, max: usize, timeout: Duration) -> io::Result<Vec<u8>> {
        if self.outbox.is_empty() {
            time::sleep(timeout).await;
            return Err(timed_out(timeout));
        }
        let n = max.min(self.outbox.len());
        Ok(self.outbox.drain(..n).collect())
    }

    async fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Command;
    use crate::types::BoardAddress;

    async fn exchange(chain: &mut SimulatedChain, address: u8, cmd: Command) -> Vec<u8> {
        let frame = protocol::encode(BoardAddress::new(address).unwrap(), &cmd).unwrap();
        chain.write(&frame.to_bytes()).await.unwrap();
        let mut out = Vec::new();
        while let Ok(bytes) = chain.read(64, Duration::ZERO).await {
            out.extend(bytes);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn test_setup_assigns_in_chain_order() {
        let mut chain = SimulatedChain::new(3);
        let out = exchange(&mut chain, 0, Command::InitChain).await;

        let expected: Vec<u8> = [
            [254, 1, 11, 254 ^ 1 ^ 11],
            [254, 2, 11, 254 ^ 2 ^ 11],
            [254, 3, 11, 254 ^ 3 ^ 11],
            [1, 4, 0, 1 ^ 4],
        ]
        .concat();
        assert_eq!(out, expected);
        let states: Vec<_> = chain.boards().iter().map(|b| b.state()).collect();
        assert_eq!(
            states,
            [
                BoardState::Assigned(1),
                BoardState::Assigned(2),
                BoardState::Assigned(3)
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_addressed_frame_reaches_only_its_board() {
        let mut chain = SimulatedChain::new(3);
        exchange(&mut chain, 0, Command::InitChain).await;

        let out = exchange(&mut chain, 2, Command::WritePort(0x81)).await;
        assert_eq!(out, [252, 2, 0x81, 252 ^ 2 ^ 0x81]);
        assert_eq!(chain.boards()[0].port(), RelayBank::default());
        assert_eq!(chain.boards()[1].port(), RelayBank::new(0x81));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unassigned_board_ignores_addressed_frames() {
        let mut chain = SimulatedChain::new(1);
        let out = exchange(&mut chain, 1, Command::SetRelay(0)).await;
        assert!(out.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_bad_checksum_is_refused() {
        let mut chain = SimulatedChain::new(1);
        chain.write(&[6, 0, 1, 0]).await.unwrap();
        let out = chain.read(4, Duration::ZERO).await.unwrap();
        assert_eq!(out, [255, 0, 0, 255]);
    }
}
