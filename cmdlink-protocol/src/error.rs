use std::{
    error::Error as StdError,
    fmt::Display,
    io::{self, ErrorKind as IoErrorKind},
    time::Duration,
};

/// Errors produced while building, rendering or exchanging a command.
///
/// Every error that ends a [`crate::Response`] is one of these variants.
/// Compare errors through [`Error::kind`] rather than by value.
#[derive(Debug)]
pub enum Error {
    /// The command prototype could not be parsed (e.g. an unbalanced brace).
    InvalidPrototype(String),
    /// One of the command's patterns is not a valid regular expression.
    InvalidPattern(regex::Error),
    /// Wrong number or type of arguments for the prototype. The command was never sent.
    MalformedArguments { rendered: String, reason: String },
    /// The rendered command does not match its validation pattern. The command was never sent.
    ValidationMismatch { rendered: String, pattern: String },
    /// The stream accepted fewer bytes than the command holds.
    ShortWrite { written: usize, expected: usize },
    /// Writing the command failed.
    Write(io::Error),
    /// The accumulated bytes matched the failure criteria.
    FailureResponse,
    /// No success or failure criteria matched within the budget.
    Timeout(Duration),
    /// The owning arbiter was cancelled or closed.
    Cancelled,
    /// The stream returned a fatal read error.
    Stream(io::Error),
    /// The accumulator exited without reporting an outcome.
    Abandoned,
}

/// Identity-comparable discriminant of an [`Error`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ErrorKind {
    InvalidCommand,
    MalformedArguments,
    ValidationMismatch,
    WriteFailure,
    FailureResponse,
    Timeout,
    Cancelled,
    StreamFailure,
    Abandoned,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidPrototype(_) | Error::InvalidPattern(_) => ErrorKind::InvalidCommand,
            Error::MalformedArguments { .. } => ErrorKind::MalformedArguments,
            Error::ValidationMismatch { .. } => ErrorKind::ValidationMismatch,
            Error::ShortWrite { .. } | Error::Write(_) => ErrorKind::WriteFailure,
            Error::FailureResponse => ErrorKind::FailureResponse,
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Stream(_) => ErrorKind::StreamFailure,
            Error::Abandoned => ErrorKind::Abandoned,
        }
    }

    /// True if the error was caused by a deadline of some sort.
    /// The stream is then assumed to still be usable.
    pub fn is_timeout(&self) -> bool {
        match self {
            Error::Timeout(_) => true,
            Error::Write(err) | Error::Stream(err) => io_is_timeout(err),
            _ => false,
        }
    }

    /// True if retrying the same exchange may succeed.
    pub fn is_temporary(&self) -> bool {
        match self {
            Error::Timeout(_) => true,
            Error::Write(err) | Error::Stream(err) => io_is_temporary(err),
            _ => false,
        }
    }
}

impl From<regex::Error> for Error {
    fn from(value: regex::Error) -> Self {
        Error::InvalidPattern(value)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidPrototype(reason) => write!(f, "Invalid command prototype: {}", reason),
            Error::InvalidPattern(err) => write!(f, "Invalid command pattern: {}", err),
            Error::MalformedArguments { rendered, reason } => write!(
                f,
                "Proper arguments not provided to expand command {:?}: {}",
                rendered, reason
            ),
            Error::ValidationMismatch { rendered, pattern } => write!(
                f,
                "Formed command {:?} does not match allowable format {:?}",
                rendered, pattern
            ),
            Error::ShortWrite { written, expected } => write!(
                f,
                "Short write: only {} of {} command bytes were sent",
                written, expected
            ),
            Error::Write(err) => write!(f, "Unable to send command: {}", err),
            Error::FailureResponse => write!(f, "Command received error response"),
            Error::Timeout(budget) => write!(
                f,
                "Command timed out after {:?} before receiving the proper response",
                budget
            ),
            Error::Cancelled => write!(f, "Arbiter's cancellation token was triggered"),
            Error::Stream(err) => write!(f, "Error reading from stream: {}", err),
            Error::Abandoned => write!(f, "Accumulator exited without an outcome"),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::InvalidPattern(err) => Some(err),
            Error::Write(err) | Error::Stream(err) => Some(err),
            _ => None,
        }
    }
}

/// How the accumulator treats an error returned by a stream read.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ReadDisposition {
    /// Treat the read as having delivered zero bytes and keep reading.
    Retry,
    /// Stop accumulating and surface the error.
    Fatal,
}

impl ReadDisposition {
    pub fn of(err: &io::Error) -> ReadDisposition {
        match err.kind() {
            IoErrorKind::TimedOut | IoErrorKind::WouldBlock | IoErrorKind::Interrupted => {
                ReadDisposition::Retry
            }
            _ => ReadDisposition::Fatal,
        }
    }
}

fn io_is_timeout(err: &io::Error) -> bool {
    matches!(err.kind(), IoErrorKind::TimedOut | IoErrorKind::WouldBlock)
}

fn io_is_temporary(err: &io::Error) -> bool {
    ReadDisposition::of(err) == ReadDisposition::Retry
}

/// Checks whether an arbitrary error is flagged as a timeout.
///
/// # Panics
///
/// Panics if `err` is `None`. There is no meaningful answer for a missing error,
/// so callers must check for one before classifying it.
pub fn is_timeout(err: Option<&(dyn StdError + 'static)>) -> bool {
    let Some(err) = err else {
        panic!("Unable to determine what to do with a missing error");
    };
    if let Some(err) = err.downcast_ref::<Error>() {
        err.is_timeout()
    } else if let Some(err) = err.downcast_ref::<io::Error>() {
        io_is_timeout(err)
    } else {
        false
    }
}

/// Checks whether an arbitrary error is flagged as temporary.
///
/// # Panics
///
/// Panics if `err` is `None`, see [`is_timeout`].
pub fn is_temporary(err: Option<&(dyn StdError + 'static)>) -> bool {
    let Some(err) = err else {
        panic!("Unable to determine what to do with a missing error");
    };
    if let Some(err) = err.downcast_ref::<Error>() {
        err.is_temporary()
    } else if let Some(err) = err.downcast_ref::<io::Error>() {
        io_is_temporary(err)
    } else {
        false
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn as_dyn(err: &Error) -> Option<&(dyn StdError + 'static)> {
        Some(err)
    }

    #[test]
    fn timeout_is_timeout_and_temporary() {
        let err = Error::Timeout(Duration::from_millis(300));
        assert!(is_timeout(as_dyn(&err)));
        assert!(is_temporary(as_dyn(&err)));
        assert_eq!(err.kind(), ErrorKind::Timeout);
    }

    #[test]
    fn failure_response_is_neither() {
        let err = Error::FailureResponse;
        assert!(!is_timeout(as_dyn(&err)));
        assert!(!is_temporary(as_dyn(&err)));
    }

    #[test]
    fn cancelled_is_neither() {
        let err = Error::Cancelled;
        assert!(!err.is_timeout());
        assert!(!err.is_temporary());
    }

    #[test]
    fn stream_errors_follow_io_kind() {
        let reset = Error::Stream(io::Error::from(IoErrorKind::ConnectionReset));
        assert!(!reset.is_timeout());
        assert!(!reset.is_temporary());

        let timed_out = Error::Write(io::Error::from(IoErrorKind::TimedOut));
        assert!(timed_out.is_timeout());
        assert!(timed_out.is_temporary());
        assert_eq!(timed_out.kind(), ErrorKind::WriteFailure);
    }

    #[test]
    fn plain_io_errors_are_classified() {
        let interrupted = io::Error::from(IoErrorKind::Interrupted);
        assert!(!is_timeout(Some(&interrupted)));
        assert!(is_temporary(Some(&interrupted)));
    }

    #[test]
    fn foreign_errors_are_neither() {
        let err = "nope".parse::<u32>().unwrap_err();
        assert!(!is_timeout(Some(&err)));
        assert!(!is_temporary(Some(&err)));
    }

    #[test]
    #[should_panic]
    fn missing_error_panics() {
        is_timeout(None);
    }

    #[test]
    fn read_disposition() {
        assert_eq!(
            ReadDisposition::of(&io::Error::from(IoErrorKind::WouldBlock)),
            ReadDisposition::Retry
        );
        assert_eq!(
            ReadDisposition::of(&io::Error::from(IoErrorKind::BrokenPipe)),
            ReadDisposition::Fatal
        );
    }
}
