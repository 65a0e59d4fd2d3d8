//! livelog: a live log relay.
//!
//! One producer uploads an opaque byte stream over a long-lived `PUT`; any
//! number of consumers follow the same bytes over `GET`, each from its own
//! byte offset, while the upload is still in flight or after it finishes.
//! The process hosts exactly one stream and is restarted per job, so memory
//! held by the backing buffer is reclaimed by process exit.
//!
//! The core is the fan-out machinery in [`stream`], [`observer`], and
//! [`buffer`]; the HTTP surface in [`server`] is a thin boundary over it.
//!
//! # Example
//!
//! ```ignore
//! use livelog::{ByteRange, LogStream};
//!
//! let stream = LogStream::open(upload_body)?;
//! let reader = stream.reader();
//! tokio::spawn(stream.consume());
//!
//! let mut observer = reader.observe(ByteRange::whole());
//! observer.write_to(&mut socket).await?;
//! ```

pub mod buffer;
pub mod config;
pub mod error;
pub mod observer;
pub mod range;
pub mod server;
pub mod stream;

pub use config::{Config, ConfigError, TlsConfig};
pub use error::{Error, Result};
pub use observer::Observer;
pub use range::{ByteRange, RangeError, Stop};
pub use stream::{LogStream, StreamReader, StreamState};
