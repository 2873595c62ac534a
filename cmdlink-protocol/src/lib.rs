//! # cmdlink Protocol Library
//!
//! Value types for command-and-control exchanges over arbitrary byte streams.
//!
//! ## Overview
//!
//! Many devices (instruments, motor controllers, PDUs, test equipment) are driven by sending
//! a short textual command and then waiting for a response that signals success or failure.
//! This crate describes such exchanges without performing any I/O:
//!
//! - [`Command`]: a named prototype rendered with positional arguments, an optional
//!   validation pattern for the rendered bytes, and optional success/failure patterns
//!   for the response
//! - [`Commands`]: a name-keyed collection of commands
//! - [`Classifier`]: decides whether accumulated response bytes are a success, a failure
//!   or still insufficient. [`Command`] and [`Markers`] implement it.
//! - [`Response`]: the outcome of an exchange
//! - [`Error`]: the closed set of ways an exchange can end unsuccessfully
//!
//! The exchanges themselves are run by the `cmdlink-arbiter` crate.
//!
//! ## Basic Usage
//!
//! ### Rendering a Command
//!
//! ```
//! use cmdlink_protocol::{Arg, Command, ErrorKind};
//!
//! let speed = Command::builder("set speed", "SPD {:03}\r\n")
//!     .validate(r"^SPD [0-9]{3}\r\n$")
//!     .success("^OK")
//!     .failure("^ERR")
//!     .build()
//!     .expect("Patterns are valid");
//!
//! assert_eq!(speed.render(&[Arg::from(42)]).unwrap(), b"SPD 042\r\n");
//!
//! let err = speed.render(&[]).unwrap_err();
//! assert_eq!(err.kind(), ErrorKind::MalformedArguments);
//! ```
//!
//! ### Classifying Responses
//!
//! ```
//! use cmdlink_protocol::{Classifier, Markers, Verdict};
//!
//! let markers = Markers::new(Some(b"meow"), Some(b"woof"));
//! assert_eq!(markers.classify(b"me"), Verdict::Insufficient);
//! assert_eq!(markers.classify(b"meow"), Verdict::Success);
//! assert_eq!(markers.classify(b"meow woof"), Verdict::Failure);
//! ```
//!
//! ## Error Handling
//!
//! Errors can be classified as timeouts or temporary errors with [`Error::is_timeout`]
//! and [`Error::is_temporary`], or for arbitrary errors with [`is_timeout`] and [`is_temporary`].
//! A timeout indicates that the stream is still usable, while a cancellation indicates
//! that it should be considered closed.

pub mod classify;
pub mod command;
pub mod error;
pub mod response;
pub mod template;

pub use classify::{Classifier, Markers, Verdict};
pub use command::{Command, CommandBuilder, Commands};
pub use error::{Error, ErrorKind, ReadDisposition, is_temporary, is_timeout};
pub use response::Response;
pub use template::{Arg, Template};
