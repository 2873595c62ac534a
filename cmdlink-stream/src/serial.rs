//! Serial port streams.
use std::{fmt::Display, io, time::Duration};

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{DataBits, FlowControl, Parity, SerialPortBuilderExt, SerialStream, StopBits};
use tokio_util::sync::CancellationToken;

use crate::{ByteStream, cancelled, guarded, not_connected};

/// A serial port opened in 8N1 mode without flow control.
///
/// Created through [`crate::open`] with a `serial://<device>:<baud>` dial string,
/// or with [`SerialClient::connect`].
pub struct SerialClient {
    path: String,
    baud: u32,
    io_timeout: Option<Duration>,
    token: CancellationToken,
    port: Option<SerialStream>,
}

impl SerialClient {
    /// Creates a client and opens the device.
    pub async fn connect(
        token: CancellationToken,
        path: impl Into<String>,
        baud: u32,
    ) -> io::Result<SerialClient> {
        let mut client = SerialClient {
            path: path.into(),
            baud,
            io_timeout: None,
            token,
            port: None,
        };
        client.open().await?;
        Ok(client)
    }

    /// Sets a deadline for every single read and write.
    ///
    /// An operation that misses the deadline fails with [`io::ErrorKind::TimedOut`],
    /// leaving the port usable.
    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = Some(timeout);
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn baud(&self) -> u32 {
        self.baud
    }

    fn check_cancelled(&mut self) -> io::Result<()> {
        if self.token.is_cancelled() {
            self.port = None;
            return Err(cancelled());
        }
        Ok(())
    }
}

#[async_trait]
impl ByteStream for SerialClient {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.check_cancelled()?;
        let port = self.port.as_mut().ok_or_else(not_connected)?;
        let result = guarded(&self.token, self.io_timeout, port.read(buf)).await;
        if self.token.is_cancelled() {
            self.port = None;
        }
        result
    }

    async fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.check_cancelled()?;
        let port = self.port.as_mut().ok_or_else(not_connected)?;
        let result = guarded(&self.token, self.io_timeout, port.write(buf)).await;
        if self.token.is_cancelled() {
            self.port = None;
        }
        result
    }

    async fn open(&mut self) -> io::Result<()> {
        if self.token.is_cancelled() {
            return Err(cancelled());
        }
        self.port = None;
        let port = tokio_serial::new(self.path.as_str(), self.baud)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .open_native_async()
            .map_err(io::Error::from)?;
        log::info!("Opened {}", self);
        self.port = Some(port);
        Ok(())
    }

    async fn close(&mut self) -> io::Result<()> {
        self.token.cancel();
        if self.port.take().is_some() {
            log::debug!("Closing {}", self);
        }
        Ok(())
    }
}

impl Display for SerialClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "serial connection to {}:{} 8N1", self.path, self.baud)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn missing_device() {
        let result =
            SerialClient::connect(CancellationToken::new(), "/dev/cmdlink-missing", 9600).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn cancelled_before_open() {
        let token = CancellationToken::new();
        token.cancel();
        let err = match SerialClient::connect(token, "/dev/cmdlink-missing", 9600).await {
            Err(err) => err,
            Ok(client) => panic!("{} unexpectedly opened", client),
        };
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }

    #[tokio::test]
    async fn closed_client_refuses_io() {
        let mut client = SerialClient {
            path: "/dev/ttyS0".to_string(),
            baud: 115200,
            io_timeout: None,
            token: CancellationToken::new(),
            port: None,
        };
        assert_eq!(client.to_string(), "serial connection to /dev/ttyS0:115200 8N1");
        assert_eq!(
            client.read(&mut [0u8; 4]).await.unwrap_err().kind(),
            io::ErrorKind::NotConnected
        );
        client.close().await.unwrap();
        client.close().await.unwrap();
        assert!(client.write(b"x").await.is_err());
        assert!(client.open().await.is_err());
    }
}
