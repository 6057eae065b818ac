//! Serial port transport.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time;
use tokio_serial::{
    ClearBuffer, DataBits, FlowControl, Parity, SerialPort, SerialPortBuilderExt, SerialStream,
    StopBits,
};

use super::{timed_out, Transport};
use crate::config::LinkConfig;
use crate::error::Result;
use crate::tracing::prelude::*;

/// The relay cards' serial link: 8N1, no flow control.
pub struct SerialTransport {
    port: SerialStream,
    path: String,
}

impl SerialTransport {
    /// Open the port named in `config` and drop anything left in its
    /// buffers by a previous run.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(config: &LinkConfig) -> Result<Self> {
        debug!(tty = %config.tty, baud = config.baud_rate, "Opening serial port");

        let port = tokio_serial::new(&config.tty, config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .open_native_async()?;
        port.clear(ClearBuffer::All)?;

        Ok(Self {
            port,
            path: config.tty.clone(),
        })
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.port.write_all(bytes).await?;
        self.port.flush().await
    }

    async fn read(&mut self, max: usize, timeout: Duration) -> io::Result<Vec<u8>> {
        let mut buf = vec![0u8; max.max(1)];
        match time::timeout(timeout, self.port.read(&mut buf)).await {
            Err(_) => Err(timed_out(timeout)),
            Ok(Ok(0)) => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("serial port {} closed", self.path),
            )),
            Ok(Ok(n)) => {
                buf.truncate(n);
                Ok(buf)
            }
            Ok(Err(e)) => Err(e),
        }
    }

    async fn close(&mut self) -> io::Result<()> {
        trace!(tty = %self.path, "Closing serial port");
        self.port.flush().await
    }
}
