//! # cmdlink Arbiter
//!
//! Command-and-control exchanges over arbitrary byte streams.
//!
//! ## Overview
//!
//! An [`Arbiter`] owns one [`cmdlink_stream::ByteStream`] and runs exchanges on it, one at a time:
//!
//! 1. The stream is locked, so concurrent callers queue up
//! 2. Bytes that arrived since the previous exchange are discarded
//! 3. The command is written with a single write
//! 4. Incoming bytes are accumulated and handed to a [`cmdlink_protocol::Classifier`]
//!    after every read until it reports success or failure
//! 5. The exchange ends early if its time budget runs out or the arbiter is cancelled
//!
//! Every exchange produces exactly one [`cmdlink_protocol::Response`], which holds all
//! accumulated bytes, the error (if any) and the duration measured from just before the write.
//!
//! ## Basic Usage
//!
//! ```ignore
//! use cmdlink_arbiter::Arbiter;
//! use cmdlink_protocol::Command;
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//!
//! let token = CancellationToken::new();
//! let arbiter = Arbiter::dial(&token, Duration::from_secs(1), "tcp://localhost:2000").await?;
//!
//! // Raw bytes with substring markers
//! let response = arbiter
//!     .simple(b"*IDN?\n", Some(b"\n"), Some(b"ERR"), Duration::from_millis(500))
//!     .await;
//! println!("{}", response);
//!
//! // Rendered commands with regex classification
//! let volume = Command::builder("volume", "VOL {}\r\n")
//!     .validate(r"^VOL [0-9]{1,2}\r\n$")
//!     .success(r"^OK")
//!     .failure(r"^ERR")
//!     .build()?;
//! let response = arbiter.control(&volume, &[11.into()]).await;
//! if !response.is_success() && response.is_temporary() {
//!     // retry
//! }
//!
//! arbiter.close().await?;
//! ```
//!
//! ## Cancellation
//!
//! Each arbiter derives its own [`tokio_util::sync::CancellationToken`] from the parent given
//! at construction. Cancelling either token or calling [`Arbiter::close`] ends pending
//! exchanges promptly with [`cmdlink_protocol::Error::Cancelled`] and fails all later ones.
mod accumulator;
mod arbiter;
pub mod config;

pub use arbiter::Arbiter;
pub use config::{Builder, Config};
