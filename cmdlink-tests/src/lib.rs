//! Loopback devices for the end-to-end tests.
use std::net::SocketAddr;

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, UdpSocket},
};

/// Computes the reply to one received chunk. An empty reply sends nothing.
pub type Reply = fn(&[u8]) -> Vec<u8>;

/// A toy line-based device:
///
/// - `OK ...` is acknowledged with `ACK\r\n`
/// - `ERR ...` is rejected with `NAK\r\n`
/// - `Garbage` is answered with `Rxd>7`
/// - anything else is ignored
pub fn device(request: &[u8]) -> Vec<u8> {
    if request.starts_with(b"OK") {
        b"ACK\r\n".to_vec()
    } else if request.starts_with(b"ERR") {
        b"NAK\r\n".to_vec()
    } else if request == b"Garbage" {
        b"Rxd>7".to_vec()
    } else {
        Vec::new()
    }
}

/// Serves [`Reply`]s on a loopback socket with an ephemeral port.
#[derive(Clone, Copy)]
pub struct Responder {
    greeting: &'static [u8],
    reply: Reply,
}

impl Responder {
    pub fn new(reply: Reply) -> Responder {
        Responder {
            greeting: b"",
            reply,
        }
    }

    /// Bytes sent unprompted to every new TCP connection.
    pub fn greeting(mut self, greeting: &'static [u8]) -> Self {
        self.greeting = greeting;
        self
    }

    pub async fn tcp(self) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut tcp, _)) = listener.accept().await {
                let Responder { greeting, reply } = self;
                tokio::spawn(async move {
                    if tcp.write_all(greeting).await.is_err() {
                        return;
                    }
                    let mut buf = [0u8; 1024];
                    loop {
                        let n = match tcp.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => n,
                        };
                        let answer = reply(&buf[..n]);
                        if tcp.write_all(&answer).await.is_err() {
                            return;
                        }
                    }
                });
            }
        });
        addr
    }

    pub async fn udp(self) -> SocketAddr {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = [0u8; 1024];
            while let Ok((n, peer)) = socket.recv_from(&mut buf).await {
                let answer = (self.reply)(&buf[..n]);
                if !answer.is_empty() && socket.send_to(&answer, peer).await.is_err() {
                    return;
                }
            }
        });
        addr
    }
}

/// Formats `addr` as a dial string for `scheme`.
pub fn dial(scheme: &str, addr: SocketAddr) -> String {
    format!("{}://{}", scheme, addr)
}
