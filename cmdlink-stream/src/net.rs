//! TCP and UDP client streams.
use std::{fmt::Display, io, net::SocketAddr, time::Duration};

use async_trait::async_trait;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpStream, UdpSocket, lookup_host},
};
use tokio_util::sync::CancellationToken;

use crate::{ByteStream, cancelled, dial::Scheme, guarded, not_connected};

enum Connection {
    Tcp(TcpStream),
    Udp(UdpSocket),
}

/// Client side of a TCP connection or a connected UDP socket.
///
/// Created through [`crate::open`] or [`NetClient::connect`].
pub struct NetClient {
    scheme: Scheme,
    address: String,
    connect_timeout: Duration,
    io_timeout: Option<Duration>,
    token: CancellationToken,
    conn: Option<Connection>,
}

impl NetClient {
    /// Creates a client and opens the connection.
    ///
    /// A zero `connect_timeout` disables the connect deadline.
    /// `scheme` must be one of the network schemes.
    pub async fn connect(
        token: CancellationToken,
        connect_timeout: Duration,
        scheme: Scheme,
        address: impl Into<String>,
    ) -> io::Result<NetClient> {
        let mut client = NetClient {
            scheme,
            address: address.into(),
            connect_timeout,
            io_timeout: None,
            token,
            conn: None,
        };
        client.open().await?;
        Ok(client)
    }

    /// Sets a deadline for every single read and write.
    ///
    /// An operation that misses the deadline fails with [`io::ErrorKind::TimedOut`],
    /// leaving the connection usable.
    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = Some(timeout);
        self
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Resolves the address, keeping only addresses of the family the scheme allows.
    async fn resolve(&self) -> io::Result<Vec<SocketAddr>> {
        let addrs: Vec<SocketAddr> = lookup_host(self.address.as_str())
            .await?
            .filter(|addr| self.scheme.accepts(addr))
            .collect();
        if addrs.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("No {} address found for {}", self.scheme, self.address),
            ));
        }
        Ok(addrs)
    }

    async fn dial(&self) -> io::Result<Connection> {
        let mut last_err = None;
        for addr in self.resolve().await? {
            let attempt = if self.scheme.is_udp() {
                let local: SocketAddr = if addr.is_ipv4() {
                    ([0u8; 4], 0).into()
                } else {
                    ([0u16; 8], 0).into()
                };
                match UdpSocket::bind(local).await {
                    Ok(socket) => socket.connect(addr).await.map(|_| Connection::Udp(socket)),
                    Err(err) => Err(err),
                }
            } else {
                TcpStream::connect(addr).await.map(Connection::Tcp)
            };
            match attempt {
                Ok(conn) => {
                    log::info!("Connected to {} via {}", addr, self.scheme);
                    return Ok(conn);
                }
                Err(err) => {
                    log::debug!("Connecting to {} failed: {}", addr, err);
                    last_err = Some(err);
                }
            }
        }
        Err(last_err.unwrap_or_else(not_connected))
    }

    /// Fails fast once cancelled, closing the connection first.
    fn check_cancelled(&mut self) -> io::Result<()> {
        if self.token.is_cancelled() {
            self.conn = None;
            return Err(cancelled());
        }
        Ok(())
    }
}

#[async_trait]
impl ByteStream for NetClient {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.check_cancelled()?;
        let result = match self.conn.as_mut() {
            None => return Err(not_connected()),
            Some(Connection::Tcp(stream)) => {
                guarded(&self.token, self.io_timeout, stream.read(buf)).await
            }
            Some(Connection::Udp(socket)) => {
                guarded(&self.token, self.io_timeout, socket.recv(buf)).await
            }
        };
        if self.token.is_cancelled() {
            self.conn = None;
        }
        result
    }

    async fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.check_cancelled()?;
        let result = match self.conn.as_mut() {
            None => return Err(not_connected()),
            Some(Connection::Tcp(stream)) => {
                guarded(&self.token, self.io_timeout, stream.write(buf)).await
            }
            Some(Connection::Udp(socket)) => {
                guarded(&self.token, self.io_timeout, socket.send(buf)).await
            }
        };
        if self.token.is_cancelled() {
            self.conn = None;
        }
        result
    }

    async fn open(&mut self) -> io::Result<()> {
        if self.token.is_cancelled() {
            return Err(cancelled());
        }
        // Any previous connection is dropped, errors included.
        if let Some(Connection::Tcp(mut stream)) = self.conn.take() {
            let _ = stream.shutdown().await;
        }
        let dial = self.dial();
        let conn = if self.connect_timeout.is_zero() {
            guarded(&self.token, None, dial).await?
        } else {
            guarded(&self.token, Some(self.connect_timeout), dial).await?
        };
        self.conn = Some(conn);
        Ok(())
    }

    async fn close(&mut self) -> io::Result<()> {
        self.token.cancel();
        match self.conn.take() {
            Some(Connection::Tcp(mut stream)) => {
                log::debug!("Closing {}", self);
                match stream.shutdown().await {
                    Err(err) if err.kind() != io::ErrorKind::NotConnected => Err(err),
                    _ => Ok(()),
                }
            }
            Some(Connection::Udp(_)) | None => Ok(()),
        }
    }
}

impl Display for NetClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} connection to {}", self.scheme, self.address)
    }
}
