//! The read-and-classify loop behind every exchange.
use std::{future::Future, io};

use bytes::{Bytes, BytesMut};
use cmdlink_protocol::{Classifier, Error, ReadDisposition, Verdict};
use cmdlink_stream::ByteStream;
use tokio::{
    sync::oneshot,
    time::{Duration, Instant, sleep, sleep_until},
};
use tokio_util::sync::CancellationToken;

/// Message handed from the accumulator task back to the waiting exchange.
#[derive(Debug)]
pub(crate) struct Status {
    pub bytes: Bytes,
    pub error: Option<Error>,
}

enum Interrupt {
    Cancelled,
    TimedOut,
}

/// Reads a stream until the classifier reaches a verdict, the deadline passes,
/// the token is cancelled, or the stream fails.
pub(crate) struct Accumulator<C> {
    token: CancellationToken,
    budget: Duration,
    deadline: Instant,
    poll_interval: Duration,
    read_chunk: usize,
    classifier: C,
    buffer: BytesMut,
}

impl<C: Classifier> Accumulator<C> {
    /// `deadline` is when the `budget` runs out, counted from the write of the command.
    pub fn new(
        token: CancellationToken,
        budget: Duration,
        deadline: Instant,
        poll_interval: Duration,
        read_chunk: usize,
        classifier: C,
    ) -> Accumulator<C> {
        Accumulator {
            token,
            budget,
            deadline,
            poll_interval,
            read_chunk: read_chunk.max(1),
            classifier,
            buffer: BytesMut::new(),
        }
    }

    /// Runs to completion and reports exactly once over `tx`.
    ///
    /// `stream` is held until after the report has been sent.
    pub async fn run<S>(mut self, mut stream: S, tx: oneshot::Sender<Status>)
    where
        S: std::ops::DerefMut,
        S::Target: ByteStream,
    {
        let status = self.accumulate(&mut *stream).await;
        if tx.send(status).is_err() {
            log::debug!("Exchange was abandoned before the accumulator reported");
        }
        drop(stream);
    }

    async fn accumulate<S: ByteStream + ?Sized>(&mut self, stream: &mut S) -> Status {
        let mut chunk = vec![0u8; self.read_chunk];
        loop {
            let read = match guarded(&self.token, self.deadline, stream.read(&mut chunk)).await {
                Ok(read) => read,
                Err(interrupt) => return self.interrupted(interrupt),
            };

            let idle = match read {
                Ok(0) => true,
                Ok(n) => {
                    log::trace!("Accumulated {:02x?}", &chunk[..n]);
                    self.buffer.extend_from_slice(&chunk[..n]);
                    false
                }
                Err(err) => match ReadDisposition::of(&err) {
                    ReadDisposition::Retry => true,
                    ReadDisposition::Fatal => return self.fatal(err),
                },
            };

            match self.classifier.classify(&self.buffer) {
                Verdict::Insufficient => {}
                Verdict::Success => {
                    log::debug!("Success after {} bytes", self.buffer.len());
                    return self.finish(None);
                }
                Verdict::Failure => {
                    log::debug!("Failure response after {} bytes", self.buffer.len());
                    return self.finish(Some(Error::FailureResponse));
                }
            }

            if idle {
                let pause = sleep(self.poll_interval);
                if let Err(interrupt) = guarded(&self.token, self.deadline, pause).await {
                    return self.interrupted(interrupt);
                }
            }
        }
    }

    fn interrupted(&mut self, interrupt: Interrupt) -> Status {
        match interrupt {
            Interrupt::Cancelled => {
                log::debug!("Exchange cancelled");
                self.finish(Some(Error::Cancelled))
            }
            Interrupt::TimedOut => {
                log::debug!("Exchange timed out after {:?}", self.budget);
                self.finish(Some(Error::Timeout(self.budget)))
            }
        }
    }

    fn fatal(&mut self, err: io::Error) -> Status {
        log::debug!("Stream failed while reading: {}", err);
        self.finish(Some(Error::Stream(err)))
    }

    fn finish(&mut self, error: Option<Error>) -> Status {
        Status {
            bytes: self.buffer.split().freeze(),
            error,
        }
    }
}

/// Races `fut` against cancellation and the deadline, in that order of priority.
async fn guarded<F: Future>(
    token: &CancellationToken,
    deadline: Instant,
    fut: F,
) -> Result<F::Output, Interrupt> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(Interrupt::Cancelled),
        _ = sleep_until(deadline) => Err(Interrupt::TimedOut),
        out = fut => Ok(out),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use async_trait::async_trait;
    use cmdlink_protocol::{ErrorKind, Markers};
    use std::{collections::VecDeque, fmt::Display};

    /// Replays a fixed script of reads, then stays silent.
    struct Scripted {
        reads: VecDeque<io::Result<Vec<u8>>>,
    }

    impl Scripted {
        fn new(reads: impl IntoIterator<Item = io::Result<&'static [u8]>>) -> Scripted {
            Scripted {
                reads: reads.into_iter().map(|r| r.map(<[u8]>::to_vec)).collect(),
            }
        }
    }

    impl Display for Scripted {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("scripted")
        }
    }

    #[async_trait]
    impl ByteStream for Scripted {
        async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.reads.pop_front() {
                Some(Ok(bytes)) => {
                    buf[..bytes.len()].copy_from_slice(&bytes);
                    Ok(bytes.len())
                }
                Some(Err(err)) => Err(err),
                None => std::future::pending().await,
            }
        }

        async fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len())
        }

        async fn open(&mut self) -> io::Result<()> {
            Ok(())
        }

        async fn close(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    async fn accumulate(
        stream: Scripted,
        markers: Markers,
        budget: Duration,
        token: CancellationToken,
    ) -> Status {
        let accumulator = Accumulator::new(
            token,
            budget,
            Instant::now() + budget,
            Duration::from_millis(1),
            64,
            markers,
        );
        let (tx, rx) = oneshot::channel();
        tokio::spawn(accumulator.run(Box::new(stream), tx));
        rx.await.unwrap()
    }

    fn meow() -> Markers {
        Markers::new(Some(b"meow"), Some(b"woof"))
    }

    #[tokio::test]
    async fn marker_split_across_reads() {
        let stream = Scripted::new([Ok(&b"..me"[..]), Ok(&b"ow.."[..])]);
        let status = accumulate(stream, meow(), Duration::from_secs(1), CancellationToken::new()).await;
        assert!(status.error.is_none());
        assert_eq!(&status.bytes[..], b"..meow..");
    }

    #[tokio::test]
    async fn failure_marker() {
        let stream = Scripted::new([Ok(&b"woof"[..])]);
        let status = accumulate(stream, meow(), Duration::from_secs(1), CancellationToken::new()).await;
        assert_eq!(status.error.unwrap().kind(), ErrorKind::FailureResponse);
        assert_eq!(&status.bytes[..], b"woof");
    }

    #[tokio::test]
    async fn recoverable_errors_and_end_of_stream_keep_reading() {
        let stream = Scripted::new([
            Ok(&b"me"[..]),
            Err(io::Error::from(io::ErrorKind::TimedOut)),
            Ok(&b""[..]),
            Err(io::Error::from(io::ErrorKind::WouldBlock)),
            Ok(&b"ow"[..]),
        ]);
        let status = accumulate(stream, meow(), Duration::from_secs(1), CancellationToken::new()).await;
        assert!(status.error.is_none());
        assert_eq!(&status.bytes[..], b"meow");
    }

    #[tokio::test]
    async fn fatal_error_stops_reading() {
        let stream = Scripted::new([
            Ok(&b"me"[..]),
            Err(io::Error::from(io::ErrorKind::ConnectionReset)),
            Ok(&b"ow"[..]),
        ]);
        let status = accumulate(stream, meow(), Duration::from_secs(1), CancellationToken::new()).await;
        let err = status.error.unwrap();
        assert_eq!(err.kind(), ErrorKind::StreamFailure);
        assert!(!err.is_timeout());
        assert!(!err.is_temporary());
        assert_eq!(&status.bytes[..], b"me");
    }

    #[tokio::test]
    async fn silent_stream_times_out() {
        let stream = Scripted::new([Ok(&b"partial"[..])]);
        let start = Instant::now();
        let status = accumulate(
            stream,
            meow(),
            Duration::from_millis(100),
            CancellationToken::new(),
        )
        .await;
        assert!(start.elapsed() >= Duration::from_millis(100));
        let err = status.error.unwrap();
        assert!(err.is_timeout());
        assert!(err.is_temporary());
        assert_eq!(&status.bytes[..], b"partial");
    }

    #[tokio::test]
    async fn cancellation_wins() {
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });
        let start = Instant::now();
        let status = accumulate(Scripted::new([]), meow(), Duration::from_secs(5), token).await;
        assert!(start.elapsed() < Duration::from_secs(1));
        let err = status.error.unwrap();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert!(!err.is_timeout());
        assert!(status.bytes.is_empty());
    }

    #[tokio::test]
    async fn dropped_receiver_does_not_panic() {
        let accumulator = Accumulator::new(
            CancellationToken::new(),
            Duration::from_secs(1),
            Instant::now() + Duration::from_secs(1),
            Duration::from_millis(1),
            64,
            meow(),
        );
        let (tx, rx) = oneshot::channel();
        drop(rx);
        accumulator
            .run(Box::new(Scripted::new([Ok(&b"meow"[..])])), tx)
            .await;
    }
}
