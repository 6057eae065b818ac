//! Scripted transport for tests.
//!
//! Replies are queued up front and handed out in order, regardless of what
//! was written. A [`Scripted::Silence`] entry, or an empty queue, makes the
//! next read wait out its timeout and fail the way a dead link would.

use std::collections::VecDeque;
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time;

use super::{timed_out, Transport};

/// One scripted step of the far side of the link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scripted {
    Bytes(Vec<u8>),
    Silence,
    Closed,
}

#[derive(Debug, Default)]
pub struct MockTransport {
    script: VecDeque<Scripted>,
    written: Vec<Vec<u8>>,
    closed: bool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue bytes for the next read(s).
    pub fn reply(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.script.push_back(Scripted::Bytes(bytes.into()));
        self
    }

    pub fn silence(mut self) -> Self {
        self.script.push_back(Scripted::Silence);
        self
    }

    pub fn hang_up(mut self) -> Self {
        self.script.push_back(Scripted::Closed);
        self
    }

    /// Every write, in order.
    pub fn written(&self) -> &[Vec<u8>] {
        &self.written
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "mock closed"));
        }
        self.written.push(bytes.to_vec());
        Ok(())
    }

    async fn read(&mut self, max: usize, timeout: Duration) -> io::Result<Vec<u8>> {
        match self.script.pop_front() {
            Some(Scripted::Bytes(mut bytes)) => {
                if bytes.len() > max {
                    let rest = bytes.split_off(max);
                    self.script.push_front(Scripted::Bytes(rest));
                }
                Ok(bytes)
            }
            Some(Scripted::Closed) => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "mock link closed",
            )),
            Some(Scripted::Silence) | None => {
                time::sleep(timeout).await;
                Err(timed_out(timeout))
            }
        }
    }

    async fn close(&mut self) -> io::Result<()> {
        self.closed = true;
        Ok(())
    }
}
