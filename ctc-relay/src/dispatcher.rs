//! Command dispatcher: the public entry point of the core.
//!
//! A [`Dispatcher`] borrows a transport for the duration of one or more
//! commands. Each command is validated, encoded, written, and answered by
//! exactly one reply frame (discovery reads one frame per claim). Nothing is
//! retried; the first failure is returned to the caller.

use std::io;
use std::time::Duration;

use bytes::BytesMut;
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::codec::{Decoder, Encoder};

use crate::addressing::{AddressSpec, ClaimEvent, Discovery};
use crate::error::{Error, Malformed, Result};
use crate::protocol::{self, Command, Frame, FrameCodec, FRAME_LEN};
use crate::tracing::prelude::*;
use crate::transport::Transport;
use crate::types::{ChainTable, RelayBank};

/// Outcome of a successful command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CommandResult {
    /// Relay state reported by the board after the command took effect
    Port { address: u8, bank: RelayBank },
    /// Boards found by `init`
    Chain { boards: ChainTable },
}

pub struct Dispatcher<'a, T: Transport + ?Sized> {
    transport: &'a mut T,
    codec: FrameCodec,
    rx: BytesMut,
    read_timeout: Duration,
}

impl<'a, T: Transport + ?Sized> Dispatcher<'a, T> {
    pub fn new(transport: &'a mut T, read_timeout: Duration) -> Self {
        Self {
            transport,
            codec: FrameCodec,
            rx: BytesMut::with_capacity(FRAME_LEN),
            read_timeout,
        }
    }

    /// Run one command against the board selected by `address`.
    ///
    /// Out-of-range relay indices, port values and addresses fail with
    /// [`Error::InvalidArgument`] before anything is written. So does an
    /// explicit address on `init`, which always starts claiming at 1.
    pub async fn execute(&mut self, command: Command, address: AddressSpec) -> Result<CommandResult> {
        command.validate()?;

        if command == Command::InitChain {
            if let AddressSpec::Explicit(address) = address {
                return Err(Error::InvalidArgument(format!(
                    "init addresses the whole chain, address {} not allowed",
                    address
                )));
            }
            let boards = self.discover().await?;
            return Ok(CommandResult::Chain { boards });
        }

        let address = address.resolve()?;
        let request = protocol::encode(address, &command)?;
        self.send(request).await?;

        let frame = self.receive().await?.ok_or_else(|| {
            Error::Transport(io::Error::new(
                io::ErrorKind::TimedOut,
                format!(
                    "no reply from board {} within {} ms",
                    address,
                    self.read_timeout.as_millis()
                ),
            ))
        })?;
        let reply = protocol::check_reply(&frame, &request)?;

        debug!(
            command = %reply.answers,
            address = reply.address,
            port = %reply.bank(),
            "Command acknowledged"
        );
        Ok(CommandResult::Port {
            address: reply.address,
            bank: reply.bank(),
        })
    }

    async fn discover(&mut self) -> Result<ChainTable> {
        let mut discovery = Discovery::new();
        let claim = discovery.start()?;
        info!("Initializing relay card chain");
        self.send(claim).await?;

        loop {
            let event = match self.receive().await? {
                Some(frame) => ClaimEvent::from_frame(&frame)?,
                None => ClaimEvent::Timeout,
            };
            match event {
                ClaimEvent::Ack { address, firmware } => {
                    info!(address, firmware, "Board claimed address");
                }
                ClaimEvent::Loopback { address } => {
                    debug!(address, "Claim returned to host");
                }
                ClaimEvent::Timeout => {
                    debug!("No further acknowledgment");
                }
            }
            if let Some(table) = discovery.step(event)? {
                return Ok(table);
            }
        }
    }

    async fn send(&mut self, frame: Frame) -> Result<()> {
        // Anything still buffered belongs to an earlier exchange.
        self.rx.clear();
        let mut buf = BytesMut::with_capacity(FRAME_LEN);
        self.codec.encode(frame, &mut buf)?;
        self.transport.write(&buf).await?;
        Ok(())
    }

    /// Read one frame. `None` means the timeout expired before any byte
    /// arrived; a partial frame at the deadline is malformed.
    async fn receive(&mut self) -> Result<Option<Frame>> {
        let deadline = Instant::now() + self.read_timeout;
        loop {
            match self.codec.decode(&mut self.rx) {
                Ok(Some(frame)) => return Ok(Some(frame)),
                Ok(None) => {}
                Err(e) => {
                    self.rx.clear();
                    return Err(e);
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.transport.read(FRAME_LEN - self.rx.len(), remaining).await {
                Ok(bytes) => self.rx.extend_from_slice(&bytes),
                Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                    if self.rx.is_empty() {
                        return Ok(None);
                    }
                    let actual = self.rx.len();
                    self.rx.clear();
                    return Err(Malformed::Length {
                        expected: FRAME_LEN,
                        actual,
                    }
                    .into());
                }
                Err(e) => {
                    self.rx.clear();
                    return Err(e.into());
                }
            }
        }
    }
}
