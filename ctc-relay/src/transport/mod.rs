//! Physical transport layer for the relay card link.
//!
//! The core only needs a byte pipe with a bounded read: the [`Transport`]
//! trait. [`serial::SerialTransport`] drives a real serial port;
//! [`mock::MockTransport`] replays scripted replies and
//! [`sim::SimulatedChain`] emulates a chain of boards, so the protocol logic
//! can be exercised without hardware.
//!
//! Opening a transport is the constructor's job. The caller owns the
//! transport, lends it to the dispatcher, and closes it afterwards.

use std::io;
use std::time::Duration;

use async_trait::async_trait;

pub mod mock;
pub mod serial;
pub mod sim;

/// Byte-oriented link to the first board of the chain.
#[async_trait]
pub trait Transport: Send {
    /// Write all of `bytes` to the link.
    async fn write(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Read between 1 and `max` bytes.
    ///
    /// Fails with [`io::ErrorKind::TimedOut`] if nothing arrives within
    /// `timeout`, and with [`io::ErrorKind::UnexpectedEof`] if the link is
    /// closed.
    async fn read(&mut self, max: usize, timeout: Duration) -> io::Result<Vec<u8>>;

    /// Flush and release the link.
    async fn close(&mut self) -> io::Result<()>;
}

pub(crate) fn timed_out(timeout: Duration) -> io::Error {
    io::Error::new(
        io::ErrorKind::TimedOut,
        format!("no data within {} ms", timeout.as_millis()),
    )
}
