use std::{io, time::Duration};

use cmdlink_stream::ByteStream;
use tokio_util::sync::CancellationToken;

use crate::Arbiter;

#[derive(Debug, Clone)]
pub struct Config {
    /// How long a single read may wait while discarding stale bytes before an exchange.
    pub drain_window: Duration,
    /// Pause between reads that delivered nothing.
    pub poll_interval: Duration,
    /// Size of the buffer handed to each read.
    pub read_chunk: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            drain_window: Duration::from_millis(2),
            poll_interval: Duration::from_millis(1),
            read_chunk: 1024,
        }
    }
}

/// Builder to create an [Arbiter] instance and modify configuration options
///
/// # Example
///
/// ```ignore
/// use cmdlink_arbiter::Builder;
/// use std::time::Duration;
///
/// let arbiter = Builder::new()
///     .drain_window(Duration::from_millis(10))
///     .read_chunk(4096)
///     .build(stream, &token);
/// ```
#[derive(Default)]
pub struct Builder {
    config: Config,
}

impl Builder {
    pub fn new() -> Builder {
        Builder::default()
    }

    /// Set how long to wait for more stale bytes before sending a command.
    pub fn drain_window(mut self, window: Duration) -> Self {
        self.config.drain_window = window;
        self
    }

    /// Set the pause between reads that returned no data
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    /// Set the maximum number of bytes requested per read. Zero is treated as one.
    pub fn read_chunk(mut self, size: usize) -> Self {
        self.config.read_chunk = size.max(1);
        self
    }

    /// Wrap an already open stream. The arbiter's token is a child of `parent`.
    pub fn build(self, stream: Box<dyn ByteStream>, parent: &CancellationToken) -> Arbiter {
        Arbiter::with_config(stream, parent.child_token(), self.config)
    }

    /// Open the transport selected by `dial` and wrap it.
    ///
    /// The transport is bound to a child of the arbiter's token,
    /// so closing the arbiter also unblocks the transport.
    pub async fn dial(
        self,
        parent: &CancellationToken,
        timeout: Duration,
        dial: &str,
    ) -> io::Result<Arbiter> {
        let token = parent.child_token();
        let stream = cmdlink_stream::open(&token, timeout, dial).await?;
        Ok(Arbiter::with_config(stream, token, self.config))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use cmdlink_stream::IoStream;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.drain_window, Duration::from_millis(2));
        assert_eq!(config.poll_interval, Duration::from_millis(1));
        assert_eq!(config.read_chunk, 1024);
    }

    #[tokio::test]
    async fn builder_applies_options() {
        let (near, _far) = tokio::io::duplex(64);
        let parent = CancellationToken::new();
        let arbiter = Builder::new()
            .drain_window(Duration::from_millis(7))
            .poll_interval(Duration::from_millis(3))
            .read_chunk(0)
            .build(Box::new(IoStream::new("pipe", near)), &parent);

        assert_eq!(arbiter.config().drain_window, Duration::from_millis(7));
        assert_eq!(arbiter.config().poll_interval, Duration::from_millis(3));
        assert_eq!(arbiter.config().read_chunk, 1);

        parent.cancel();
        assert!(arbiter.cancellation_token().is_cancelled());
    }
}
