//! Adapter from tokio I/O objects to [`ByteStream`].
use std::{fmt::Display, io};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{ByteStream, not_connected};

/// Wraps any tokio reader/writer, e.g. one end of a [`tokio::io::duplex`] pipe,
/// a unix socket or a child process' stdio.
///
/// The wrapped object cannot be recreated, so [`ByteStream::open`] is unsupported.
pub struct IoStream<T> {
    label: String,
    io: Option<T>,
}

impl<T> IoStream<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(label: impl Into<String>, io: T) -> IoStream<T> {
        IoStream {
            label: label.into(),
            io: Some(io),
        }
    }

    /// Returns the wrapped object, unless the stream was closed.
    pub fn into_inner(self) -> Option<T> {
        self.io
    }
}

#[async_trait]
impl<T> ByteStream for IoStream<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.io.as_mut() {
            Some(io) => io.read(buf).await,
            None => Err(not_connected()),
        }
    }

    async fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.io.as_mut() {
            Some(io) => io.write(buf).await,
            None => Err(not_connected()),
        }
    }

    async fn open(&mut self) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("{} cannot be reopened", self.label),
        ))
    }

    async fn close(&mut self) -> io::Result<()> {
        match self.io.take() {
            Some(mut io) => io.shutdown().await,
            None => Ok(()),
        }
    }
}

impl<T> Display for IoStream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.label)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn duplex_round_trip() {
        let (near, mut far) = tokio::io::duplex(64);
        let mut stream = IoStream::new("duplex", near);
        assert_eq!(stream.to_string(), "duplex");

        stream.write(b"ping").await.unwrap();
        let mut buf = [0u8; 8];
        let n = far.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"ping");

        far.write_all(b"pong").await.unwrap();
        let n = stream.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"pong");
    }

    #[tokio::test]
    async fn closed_stream_rejects_io() {
        let (near, _far) = tokio::io::duplex(64);
        let mut stream = IoStream::new("duplex", near);
        stream.close().await.unwrap();
        stream.close().await.unwrap();
        assert!(stream.write(b"x").await.is_err());
        assert_eq!(
            stream.open().await.unwrap_err().kind(),
            io::ErrorKind::Unsupported
        );
    }
}
