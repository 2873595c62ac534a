//! # cmdlink Streams
//!
//! Transport-agnostic byte streams for the cmdlink arbiter.
//!
//! ## Overview
//!
//! A [`ByteStream`] is anything that can read and write bytes, and that can be closed and
//! reopened at will. Every stream describes itself through [`std::fmt::Display`].
//! Streams do not retry or reconnect on their own, errors are handed to the caller.
//!
//! This crate provides:
//!
//! - [`NetClient`]: TCP and UDP client connections
//! - [`SerialClient`]: serial ports in 8N1 mode
//! - [`IoStream`]: an adapter for any tokio I/O object, such as [`tokio::io::duplex`] pipes
//! - [`Dial`] and [`open`]: selection of a transport from a dial string
//!
//! ## Dial Strings
//!
//! The scheme of a dial string selects the transport, the remainder is transport specific:
//!
//! - `tcp://<host:port>`, `tcp4://<host:port>`, `tcp6://<host:port>`
//! - `udp://<host:port>`, `udp4://<host:port>`, `udp6://<host:port>`
//! - `serial://<device>:<baud>`, `rs232://<device>:<baud>`
//!
//! ```ignore
//! use cmdlink_stream::{ByteStream, open};
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//!
//! let token = CancellationToken::new();
//! let mut stream = open(&token, Duration::from_secs(1), "tcp://localhost:2000").await?;
//! stream.write(b"PING\r\n").await?;
//! ```
//!
//! ## Cancellation
//!
//! Network and serial streams are bound to a [`tokio_util::sync::CancellationToken`]. Once the token is
//! cancelled, every operation fails fast and the connection is closed, unblocking pending reads.
use std::{fmt::Display, future::Future, io, time::Duration};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

pub mod dial;
pub mod io_stream;
pub mod net;
pub mod serial;

pub use dial::{Dial, DialError, Scheme, open};
pub use io_stream::IoStream;
pub use net::NetClient;
pub use serial::SerialClient;

/// A bidirectional, closable and reopenable byte-oriented transport.
///
/// Errors are plain [`io::Error`]s. Errors of kind [`io::ErrorKind::TimedOut`],
/// [`io::ErrorKind::WouldBlock`] and [`io::ErrorKind::Interrupted`] indicate that
/// the stream is still usable.
#[async_trait]
pub trait ByteStream: Display + Send {
    /// Reads whatever is available into `buf`, waiting until at least one byte arrived.
    /// Returns 0 at end of stream.
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Writes bytes from `buf`, returning how many were accepted.
    async fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Drops the current connection, if any, and establishes a new one.
    async fn open(&mut self) -> io::Result<()>;

    /// Closes the connection. Closing an already closed stream succeeds.
    async fn close(&mut self) -> io::Result<()>;
}

#[async_trait]
impl<S: ByteStream + ?Sized> ByteStream for Box<S> {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read(buf).await
    }

    async fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        (**self).write(buf).await
    }

    async fn open(&mut self) -> io::Result<()> {
        (**self).open().await
    }

    async fn close(&mut self) -> io::Result<()> {
        (**self).close().await
    }
}

/// The error returned by streams once their cancellation token fired.
pub(crate) fn cancelled() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "stream was cancelled")
}

pub(crate) fn not_connected() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "stream is not open")
}

/// Races `op` against cancellation and the optional per-operation deadline.
pub(crate) async fn guarded<T>(
    token: &CancellationToken,
    deadline: Option<Duration>,
    op: impl Future<Output = io::Result<T>>,
) -> io::Result<T> {
    let op = async {
        match deadline {
            Some(deadline) => tokio::time::timeout(deadline, op).await.unwrap_or_else(|_| {
                Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "stream operation timed out",
                ))
            }),
            None => op.await,
        }
    };
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(cancelled()),
        result = op => result,
    }
}
