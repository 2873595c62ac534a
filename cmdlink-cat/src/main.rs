//! # cmdlink-cat
//!
//! A small netcat on top of the cmdlink arbiter.
//!
//! ## Overview
//!
//! Without a subcommand, every line read from stdin is written to the stream and everything
//! received from the stream is copied to stdout until stdin ends or Ctrl-C is pressed.
//!
//! The `send` subcommand performs a single exchange: the payload is written, the reply is
//! accumulated until it contains the `--expect` or `--fail` marker, and the resulting
//! response is printed. The exit code is non-zero if the exchange did not succeed.
use std::error::Error;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use cmdlink_arbiter::{Arbiter, Builder};
use cmdlink_stream::{Dial, NetClient, SerialClient};
use env_logger::Env;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;

/// Per-read deadline in interactive mode, so that writes get a turn on the stream.
const READ_SLICE: Duration = Duration::from_millis(50);

#[derive(Subcommand, Eq, PartialEq, Clone, Debug)]
enum Mode {
    /// Send a single payload and wait for the reply
    Send {
        payload: String,
        #[arg(short, long, help = "Reply marker that signals success")]
        expect: Option<String>,
        #[arg(short, long, help = "Reply marker that signals failure")]
        fail: Option<String>,
        #[arg(
            short,
            long,
            help = "How long to wait for a reply in milliseconds",
            default_value = "1000"
        )]
        wait_ms: u64,
    },
}

#[derive(Parser, Debug)]
#[command(about = "Pipe console I/O through a byte stream selected by a dial string", long_about=None)]
struct Args {
    #[arg(short, long, default_value = "tcp://localhost:2000")]
    dial: Dial,

    #[arg(
        short,
        long,
        help = "Connect timeout in milliseconds",
        default_value = "1000"
    )]
    timeout_ms: u64,

    #[arg(long, help = "Terminate written lines with \\r\\n instead of \\n")]
    crlf: bool,

    #[clap(subcommand)]
    mode: Option<Mode>,
}

impl Args {
    fn line_ending(&self) -> &'static [u8] {
        if self.crlf { b"\r\n" } else { b"\n" }
    }
}

/// Dials a stream whose reads give up after [`READ_SLICE`].
async fn connect(token: &CancellationToken, timeout: Duration, dial: &Dial) -> io::Result<Arbiter> {
    match dial {
        Dial::Net { scheme, address } => {
            let client = NetClient::connect(token.child_token(), timeout, *scheme, address.clone())
                .await?
                .with_io_timeout(READ_SLICE);
            Ok(Builder::new().build(Box::new(client), token))
        }
        Dial::Serial { path, baud } => {
            let client = SerialClient::connect(token.child_token(), path.clone(), *baud)
                .await?
                .with_io_timeout(READ_SLICE);
            Ok(Builder::new().build(Box::new(client), token))
        }
    }
}

async fn send(
    arbiter: &Arbiter,
    payload: &[u8],
    expect: Option<&str>,
    fail: Option<&str>,
    wait: Duration,
) -> Result<(), Box<dyn Error>> {
    let response = arbiter
        .simple(
            payload,
            expect.map(str::as_bytes),
            fail.map(str::as_bytes),
            wait,
        )
        .await;
    println!("{}", response);
    match response.into_result() {
        Ok(_) => Ok(()),
        Err(err) => Err(err.into()),
    }
}

/// Copies stdin lines to the stream and stream bytes to stdout.
async fn interactive(arbiter: Arc<Arbiter>, line_ending: &[u8]) -> io::Result<()> {
    let token = arbiter.cancellation_token().clone();

    let reader = {
        let arbiter = arbiter.clone();
        let token = token.clone();
        tokio::spawn(async move {
            let mut stdout = tokio::io::stdout();
            let mut buf = [0u8; 1024];
            loop {
                match arbiter.read(&mut buf).await {
                    Ok(0) => {
                        log::info!("{} reached end of stream", arbiter);
                        token.cancel();
                        return Ok(());
                    }
                    Ok(n) => {
                        stdout.write_all(&buf[..n]).await?;
                        stdout.flush().await?;
                    }
                    Err(err) if err.kind() == io::ErrorKind::TimedOut => {}
                    Err(_) if token.is_cancelled() => return Ok(()),
                    Err(err) => {
                        token.cancel();
                        return Err(err);
                    }
                }
            }
        })
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = token.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            log::debug!("End of input");
            break;
        };
        let mut payload = line.into_bytes();
        payload.extend_from_slice(line_ending);
        log::trace!("Tx {:02x?}", payload);
        arbiter.write(&payload).await?;
    }

    arbiter.close().await?;
    reader.await.map_err(io::Error::other)?
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    log::debug!("Parsed arguments: dial={}, timeout_ms={}", args.dial, args.timeout_ms);

    let token = CancellationToken::new();
    {
        let token = token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::info!("Interrupted");
                token.cancel();
            }
        });
    }

    let timeout = Duration::from_millis(args.timeout_ms);
    log::info!("Connecting to {}", args.dial);

    match &args.mode {
        Some(Mode::Send {
            payload,
            expect,
            fail,
            wait_ms,
        }) => {
            let arbiter = Arbiter::dial(&token, timeout, &args.dial.to_string()).await?;
            let mut bytes = payload.clone().into_bytes();
            bytes.extend_from_slice(args.line_ending());
            let result = send(
                &arbiter,
                &bytes,
                expect.as_deref(),
                fail.as_deref(),
                Duration::from_millis(*wait_ms),
            )
            .await;
            arbiter.close().await?;
            result
        }
        None => {
            let arbiter = connect(&token, timeout, &args.dial).await?;
            interactive(Arc::new(arbiter), args.line_ending()).await?;
            Ok(())
        }
    }
}
