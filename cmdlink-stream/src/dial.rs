//! Dial strings and the transport registry.
use std::{
    error::Error,
    fmt::Display,
    io,
    net::SocketAddr,
    str::FromStr,
    time::Duration,
};

use tokio_util::sync::CancellationToken;

use crate::{ByteStream, NetClient, SerialClient};

/// Transport schemes known to [`open`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Scheme {
    Tcp,
    Tcp4,
    Tcp6,
    Udp,
    Udp4,
    Udp6,
}

impl Scheme {
    const ALL: [Scheme; 6] = [
        Scheme::Tcp,
        Scheme::Tcp4,
        Scheme::Tcp6,
        Scheme::Udp,
        Scheme::Udp4,
        Scheme::Udp6,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Tcp => "tcp",
            Scheme::Tcp4 => "tcp4",
            Scheme::Tcp6 => "tcp6",
            Scheme::Udp => "udp",
            Scheme::Udp4 => "udp4",
            Scheme::Udp6 => "udp6",
        }
    }

    pub fn is_udp(&self) -> bool {
        matches!(self, Scheme::Udp | Scheme::Udp4 | Scheme::Udp6)
    }

    /// Whether the scheme may connect to the address' family.
    pub fn accepts(&self, addr: &SocketAddr) -> bool {
        match self {
            Scheme::Tcp4 | Scheme::Udp4 => addr.is_ipv4(),
            Scheme::Tcp6 | Scheme::Udp6 => addr.is_ipv6(),
            Scheme::Tcp | Scheme::Udp => true,
        }
    }
}

impl Display for Scheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that may occur when parsing a dial string.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum DialError {
    /// The string is not of the form `<scheme>://<address>`.
    Malformed(String),
    /// No transport is registered for the scheme.
    UnknownScheme(String),
}

impl Display for DialError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DialError::Malformed(dial) => write!(f, "Dial string {:?} not in correct form", dial),
            DialError::UnknownScheme(scheme) => {
                write!(f, "No known way to create a stream for scheme {:?}", scheme)
            }
        }
    }
}

impl Error for DialError {}

impl From<DialError> for io::Error {
    fn from(value: DialError) -> Self {
        io::Error::new(io::ErrorKind::InvalidInput, value)
    }
}

/// A parsed dial string.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Dial {
    /// `<scheme>://<host>:<port>`
    Net { scheme: Scheme, address: String },
    /// `serial://<device>:<baud>` or `rs232://<device>:<baud>`
    Serial { path: String, baud: u32 },
}

const SERIAL_SCHEMES: [&str; 2] = ["serial", "rs232"];

impl FromStr for Dial {
    type Err = DialError;

    fn from_str(dial: &str) -> Result<Self, Self::Err> {
        let (scheme, rest) = dial
            .split_once("://")
            .ok_or_else(|| DialError::Malformed(dial.to_string()))?;
        if SERIAL_SCHEMES.contains(&scheme) {
            let (path, baud) = rest
                .rsplit_once(':')
                .ok_or_else(|| DialError::Malformed(dial.to_string()))?;
            let baud = baud
                .parse()
                .map_err(|_| DialError::Malformed(dial.to_string()))?;
            if path.is_empty() {
                return Err(DialError::Malformed(dial.to_string()));
            }
            return Ok(Dial::Serial {
                path: path.to_string(),
                baud,
            });
        }
        let scheme = Scheme::ALL
            .into_iter()
            .find(|s| s.as_str() == scheme)
            .ok_or_else(|| DialError::UnknownScheme(scheme.to_string()))?;

        // host may itself contain colons (IPv6), the port is after the last one
        let (host, port) = rest
            .rsplit_once(':')
            .ok_or_else(|| DialError::Malformed(dial.to_string()))?;
        if host.is_empty() || port.is_empty() || !port.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(DialError::Malformed(dial.to_string()));
        }

        Ok(Dial::Net {
            scheme,
            address: rest.to_string(),
        })
    }
}

impl Display for Dial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dial::Net { scheme, address } => write!(f, "{}://{}", scheme, address),
            Dial::Serial { path, baud } => write!(f, "serial://{}:{}", path, baud),
        }
    }
}

impl Dial {
    /// Opens the transport this dial string describes.
    ///
    /// For network transports `timeout` bounds the connection attempt, for serial ports
    /// it bounds every read and write. A zero `timeout` disables either.
    pub async fn open(
        &self,
        token: CancellationToken,
        timeout: Duration,
    ) -> io::Result<Box<dyn ByteStream>> {
        match self {
            Dial::Net { scheme, address } => {
                let client = NetClient::connect(token, timeout, *scheme, address.clone()).await?;
                Ok(Box::new(client))
            }
            Dial::Serial { path, baud } => {
                let client = SerialClient::connect(token, path.clone(), *baud).await?;
                if timeout.is_zero() {
                    Ok(Box::new(client))
                } else {
                    Ok(Box::new(client.with_io_timeout(timeout)))
                }
            }
        }
    }
}

/// Parses `dial` and opens the selected transport.
///
/// The stream is bound to a child of `token` and `timeout` bounds the connection attempt.
pub async fn open(
    token: &CancellationToken,
    timeout: Duration,
    dial: &str,
) -> io::Result<Box<dyn ByteStream>> {
    let dial: Dial = dial.parse()?;
    log::debug!("Opening {}", dial);
    dial.open(token.child_token(), timeout).await
}
