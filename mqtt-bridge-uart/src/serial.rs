//! Serial link to the sensor microcontroller.

use std::io;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio_serial::SerialStream;

use crate::config::SerialConfig;

/// Serial channel errors.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("failed to open serial port {port}: {message}")]
    OpenFailed { port: String, message: String },

    #[error("failed to write to serial port {port}: {source}")]
    WriteFailed {
        port: String,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Closed,
    Open,
}

/// Request/response line channel as seen by the poller.
#[allow(async_fn_in_trait)]
pub trait SensorChannel {
    /// Write a single request byte.
    async fn send_command(&mut self, command: u8) -> Result<(), ChannelError>;

    /// Next complete line, or `None` if nothing usable arrived in time.
    async fn read_line(&mut self) -> Option<String>;

    /// Release the underlying port. Idempotent.
    fn close(&mut self);
}

/// Line-oriented channel over a serial port.
///
/// Generic over the byte stream so that tests can drive it through an
/// in-memory pipe.
pub struct SerialChannel<S = SerialStream> {
    port: String,
    stream: Option<BufReader<S>>,
    read_timeout: Duration,
    /// Bytes of a line whose terminator has not arrived yet.
    pending: Vec<u8>,
}

impl SerialChannel<SerialStream> {
    /// Open the serial port described by `config`.
    pub fn open(config: &SerialConfig) -> Result<Self, ChannelError> {
        let parity = match config.parity.to_lowercase().as_str() {
            "even" => tokio_serial::Parity::Even,
            "odd" => tokio_serial::Parity::Odd,
            _ => tokio_serial::Parity::None,
        };

        let stop_bits = match config.stop_bits {
            2 => tokio_serial::StopBits::Two,
            _ => tokio_serial::StopBits::One,
        };

        let data_bits = match config.data_bits {
            5 => tokio_serial::DataBits::Five,
            6 => tokio_serial::DataBits::Six,
            7 => tokio_serial::DataBits::Seven,
            _ => tokio_serial::DataBits::Eight,
        };

        let builder = tokio_serial::new(&config.port, config.baud_rate)
            .parity(parity)
            .stop_bits(stop_bits)
            .data_bits(data_bits)
            .timeout(config.read_timeout());

        let stream = SerialStream::open(&builder).map_err(|e| ChannelError::OpenFailed {
            port: config.port.clone(),
            message: e.to_string(),
        })?;

        tracing::info!(
            port = %config.port,
            baud_rate = config.baud_rate,
            "Serial port opened"
        );

        Ok(Self::from_stream(
            config.port.clone(),
            stream,
            config.read_timeout(),
        ))
    }
}

impl<S> SerialChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap an already open byte stream.
    pub fn from_stream(port: impl Into<String>, stream: S, read_timeout: Duration) -> Self {
        Self {
            port: port.into(),
            stream: Some(BufReader::new(stream)),
            read_timeout,
            pending: Vec::new(),
        }
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn state(&self) -> ChannelState {
        if self.stream.is_some() {
            ChannelState::Open
        } else {
            ChannelState::Closed
        }
    }

    /// Close after a failed read or write. The port is not reopened, so no
    /// further readings arrive until the bridge is restarted.
    fn close_on_fault(&mut self, error: &io::Error) {
        if self.stream.is_some() {
            tracing::error!(
                port = %self.port,
                error = %error,
                "Serial I/O failed, closing port; restart the bridge to resume polling"
            );
        }
        self.close();
    }

    fn take_line(&mut self) -> Option<String> {
        let mut bytes = std::mem::take(&mut self.pending);
        while matches!(bytes.last(), Some(b'\n' | b'\r')) {
            bytes.pop();
        }

        match String::from_utf8(bytes) {
            Ok(line) => Some(line),
            Err(e) => {
                tracing::warn!(port = %self.port, error = %e, "Discarding undecodable line");
                None
            }
        }
    }
}

impl<S> SensorChannel for SerialChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    async fn send_command(&mut self, command: u8) -> Result<(), ChannelError> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(ChannelError::WriteFailed {
                port: self.port.clone(),
                source: io::Error::new(io::ErrorKind::NotConnected, "channel closed"),
            });
        };

        let result = async {
            stream.write_all(&[command]).await?;
            stream.flush().await
        }
        .await;

        if let Err(source) = result {
            self.close_on_fault(&source);
            return Err(ChannelError::WriteFailed {
                port: self.port.clone(),
                source,
            });
        }

        Ok(())
    }

    async fn read_line(&mut self) -> Option<String> {
        let stream = self.stream.as_mut()?;

        // Only wait for the rest of a line that has started arriving
        if self.pending.is_empty() {
            let ready = tokio::time::timeout(Duration::ZERO, stream.fill_buf())
                .await
                .map(|filled| filled.map(|buf| !buf.is_empty()));

            match ready {
                Err(_) => {
                    tracing::trace!(port = %self.port, "Nothing received");
                    return None;
                }
                Ok(Ok(true)) => {}
                Ok(Ok(false)) => {
                    let eof = io::Error::from(io::ErrorKind::UnexpectedEof);
                    self.close_on_fault(&eof);
                    return None;
                }
                Ok(Err(e)) => {
                    self.close_on_fault(&e);
                    return None;
                }
            }
        }

        let stream = self.stream.as_mut()?;

        // read_until keeps partial bytes in `pending` when the timeout fires
        match tokio::time::timeout(self.read_timeout, stream.read_until(b'\n', &mut self.pending))
            .await
        {
            Err(_) => {
                tracing::debug!(port = %self.port, buffered = self.pending.len(), "Line incomplete within read timeout");
                None
            }
            Ok(Ok(0)) => {
                let eof = io::Error::from(io::ErrorKind::UnexpectedEof);
                self.close_on_fault(&eof);
                None
            }
            Ok(Ok(_)) => self.take_line(),
            Ok(Err(e)) => {
                self.close_on_fault(&e);
                None
            }
        }
    }

    fn close(&mut self) {
        if self.stream.take().is_some() {
            self.pending.clear();
            tracing::info!(port = %self.port, "Serial port closed");
        }
    }
}
