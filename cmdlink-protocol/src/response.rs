use std::{error::Error as StdError, fmt::Display, time::Duration};

use bytes::Bytes;

use crate::error::{self, Error};

/// The outcome of one exchange.
///
/// `bytes` always holds everything that was accumulated up to the terminal
/// classification, including when the exchange failed, so partial matches can be diagnosed.
#[derive(Debug, Default)]
pub struct Response {
    /// Raw bytes received during the exchange
    pub bytes: Bytes,
    /// `None` if the success criteria matched
    pub error: Option<Error>,
    /// How long the exchange took
    pub duration: Duration,
}

impl Response {
    pub fn new(bytes: Bytes, error: Option<Error>, duration: Duration) -> Response {
        Response {
            bytes,
            error,
            duration,
        }
    }

    /// A response that ended before anything was read.
    pub fn failed(error: Error, duration: Duration) -> Response {
        Response::new(Bytes::new(), Some(error), duration)
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// # Panics
    ///
    /// Panics if the exchange succeeded, see [`error::is_timeout`].
    pub fn is_timeout(&self) -> bool {
        error::is_timeout(self.error.as_ref().map(|e| e as &(dyn StdError + 'static)))
    }

    /// # Panics
    ///
    /// Panics if the exchange succeeded, see [`error::is_temporary`].
    pub fn is_temporary(&self) -> bool {
        error::is_temporary(self.error.as_ref().map(|e| e as &(dyn StdError + 'static)))
    }

    /// Converts into a `Result`, keeping the bytes on success.
    pub fn into_result(self) -> Result<Bytes, Error> {
        match self.error {
            None => Ok(self.bytes),
            Some(err) => Err(err),
        }
    }
}

impl Display for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Response> Rx Bytes: \"{}\"\tErrors: ", self.bytes.escape_ascii())?;
        match &self.error {
            Some(err) => write!(f, "{}", err)?,
            None => write!(f, "none")?,
        }
        write!(f, "\tDuration: {:?}", self.duration)
    }
}

#[test]
fn display_response() {
    let rsp = Response::new(
        Bytes::from_static(b"OK\r\n"),
        None,
        Duration::from_millis(12),
    );
    assert_eq!(
        rsp.to_string(),
        "Response> Rx Bytes: \"OK\\r\\n\"\tErrors: none\tDuration: 12ms"
    );
}

#[test]
fn failed_response_is_classified() {
    let rsp = Response::failed(Error::Timeout(Duration::from_millis(1)), Duration::ZERO);
    assert!(!rsp.is_success());
    assert!(rsp.is_timeout());
    assert!(rsp.is_temporary());
    assert!(rsp.bytes.is_empty());
}

#[test]
#[should_panic]
fn successful_response_cannot_be_classified() {
    Response::default().is_timeout();
}
