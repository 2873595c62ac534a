use std::{fmt::Display, io, sync::Arc, time::Duration};

use cmdlink_protocol::{Arg, Classifier, Command, Error, Markers, Response};
use cmdlink_stream::ByteStream;
use tokio::{
    sync::{Mutex, OwnedMutexGuard, oneshot},
    time::{Instant, sleep_until},
};
use tokio_util::sync::CancellationToken;

use crate::{
    Builder,
    accumulator::{Accumulator, Status},
    config::Config,
};

type Stream = Box<dyn ByteStream>;

/// Serializes command/response exchanges over one byte stream.
///
/// All operations take `&self`, so an arbiter can be shared between tasks behind an [`Arc`].
/// Exchanges never overlap: the stream is locked from draining stale bytes until the
/// response has been classified.
pub struct Arbiter {
    stream: Arc<Mutex<Stream>>,
    token: CancellationToken,
    config: Config,
    label: String,
}

impl Arbiter {
    /// Parse `dial`, open the selected transport and wrap it with the default [`Config`].
    pub async fn dial(
        parent: &CancellationToken,
        timeout: Duration,
        dial: &str,
    ) -> io::Result<Arbiter> {
        Builder::new().dial(parent, timeout, dial).await
    }

    /// Wrap an already open stream with the default [`Config`].
    pub fn new(stream: Stream, parent: &CancellationToken) -> Arbiter {
        Builder::new().build(stream, parent)
    }

    pub(crate) fn with_config(stream: Stream, token: CancellationToken, config: Config) -> Arbiter {
        let label = stream.to_string();
        log::debug!("Arbitrating {}", label);
        Arbiter {
            stream: Arc::new(Mutex::new(stream)),
            token,
            config,
            label,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The token bounding every operation of this arbiter.
    /// Cancelling it has the same effect on pending exchanges as [`Arbiter::close`].
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.token
    }

    /// Render `command` with `args`, send it and classify the reply with the command's patterns.
    ///
    /// Rendering errors are returned without touching the stream.
    pub async fn control(&self, command: &Command, args: &[Arg]) -> Response {
        let bytes = match command.render(args) {
            Ok(bytes) => bytes,
            Err(err) => {
                log::debug!("Not sending {}: {}", command.name(), err);
                return Response::failed(err, Duration::ZERO);
            }
        };
        log::debug!("Control {}", command.name());
        self.exchange(&bytes, command.timeout(), command.clone())
            .await
    }

    /// Send raw bytes and wait until the reply contains `success` or `failure`.
    ///
    /// Absent or empty markers never match; with neither marker the exchange
    /// can only end by timeout, cancellation or a stream error.
    pub async fn simple(
        &self,
        cmd: &[u8],
        success: Option<&[u8]>,
        failure: Option<&[u8]>,
        duration: Duration,
    ) -> Response {
        self.exchange(cmd, duration, Markers::new(success, failure))
            .await
    }

    /// Send raw bytes and accumulate the reply until `classifier` reaches a verdict
    /// or `budget` runs out.
    ///
    /// The budget and the reported duration count from the start of the write. Draining stale
    /// bytes beforehand is bounded separately by [`Config::drain_window`].
    pub async fn exchange<C: Classifier>(
        &self,
        cmd: &[u8],
        budget: Duration,
        classifier: C,
    ) -> Response {
        let mut stream = match self.acquire().await {
            Some(stream) => stream,
            None => return Response::failed(Error::Cancelled, Duration::ZERO),
        };
        if self.drain(&mut stream).await.is_err() {
            return Response::failed(Error::Cancelled, Duration::ZERO);
        }

        let start = Instant::now();
        let deadline = start + budget;
        log::debug!("Sending {} bytes to {}", cmd.len(), self.label);
        log::trace!("Tx {:02x?}", cmd);
        let written = tokio::select! {
            biased;
            _ = self.token.cancelled() => {
                return Response::failed(Error::Cancelled, start.elapsed());
            }
            _ = sleep_until(deadline) => {
                return Response::failed(Error::Timeout(budget), start.elapsed());
            }
            written = stream.write(cmd) => written,
        };
        match written {
            Ok(n) if n == cmd.len() => {}
            Ok(n) => {
                let err = Error::ShortWrite {
                    written: n,
                    expected: cmd.len(),
                };
                return Response::failed(err, start.elapsed());
            }
            Err(err) => return Response::failed(Error::Write(err), start.elapsed()),
        }

        let accumulator = Accumulator::new(
            self.token.clone(),
            budget,
            deadline,
            self.config.poll_interval,
            self.config.read_chunk,
            classifier,
        );
        let (tx, rx) = oneshot::channel();
        tokio::spawn(accumulator.run(stream, tx));

        match rx.await {
            Ok(Status { bytes, error }) => Response::new(bytes, error, start.elapsed()),
            Err(_) => {
                log::error!("Accumulator for {} exited without reporting", self.label);
                Response::failed(Error::Abandoned, start.elapsed())
            }
        }
    }

    /// Lock the stream, unless the arbiter is or gets cancelled first.
    async fn acquire(&self) -> Option<OwnedMutexGuard<Stream>> {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => None,
            guard = self.stream.clone().lock_owned() => Some(guard),
        }
    }

    /// Discard whatever is already buffered on the stream.
    ///
    /// Takes at most one drain window in total, so a stream that keeps talking
    /// cannot hold the exchange back. Fails only if the arbiter was cancelled.
    async fn drain(&self, stream: &mut Stream) -> Result<(), Error> {
        let deadline = Instant::now() + self.config.drain_window;
        let mut chunk = vec![0u8; self.config.read_chunk];
        let mut discarded = 0;
        loop {
            let read = tokio::select! {
                biased;
                _ = self.token.cancelled() => return Err(Error::Cancelled),
                _ = sleep_until(deadline) => break,
                read = stream.read(&mut chunk) => read,
            };
            match read {
                Ok(0) => break,
                Ok(n) => {
                    log::trace!("Discarding {:02x?}", &chunk[..n]);
                    discarded += n;
                }
                Err(err) => {
                    log::trace!("Drain stopped: {}", err);
                    break;
                }
            }
        }
        if discarded > 0 {
            log::debug!("Discarded {} stale bytes from {}", discarded, self.label);
        }
        Ok(())
    }

    /// Read directly from the stream, bypassing classification.
    ///
    /// Like every pass-through operation, this fails with [`io::ErrorKind::NotConnected`]
    /// once the arbiter is cancelled, including while waiting.
    pub async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut stream = self.acquire().await.ok_or_else(cancelled)?;
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(cancelled()),
            read = stream.read(buf) => read,
        }
    }

    /// Write directly to the stream.
    pub async fn write(&self, buf: &[u8]) -> io::Result<usize> {
        let mut stream = self.acquire().await.ok_or_else(cancelled)?;
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(cancelled()),
            written = stream.write(buf) => written,
        }
    }

    /// Reopen the underlying stream.
    pub async fn open(&self) -> io::Result<()> {
        let mut stream = self.acquire().await.ok_or_else(cancelled)?;
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(cancelled()),
            opened = stream.open() => opened,
        }
    }

    /// Cancel pending exchanges and close the stream.
    ///
    /// Every later operation fails. Closing twice is not an error.
    pub async fn close(&self) -> io::Result<()> {
        self.token.cancel();
        log::info!("Closing {}", self);
        // Every holder of the lock races the token, so this does not wait long.
        self.stream.lock().await.close().await
    }
}

fn cancelled() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "arbiter was cancelled")
}

impl Display for Arbiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Arbiter over {}", self.label)
    }
}
