//! A library providing asynchronous, follow-mode tailing of a single (namely
//! log) file.
//!
//! A [`TailSession`] keeps track of which file currently lives at the path and
//! how far into it has been read. It re-checks on every change notification
//! (driven by [`notify`](https://crates.io/crates/notify)) and on a fixed poll
//! interval, and reports what it finds as [`TailEvent`]s: complete lines, and
//! the file being created, rotated, truncated or deleted.
//!
//! ## Example
//!
//! ```no_run
//! use filetail::{open_tail, TailEvent};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), filetail::Error> {
//!     // The file doesn't have to exist yet.
//!     let mut tail = open_tail("some/file.log")?;
//!
//!     while let Some(event) = tail.next_event().await {
//!         match event {
//!             TailEvent::Line(line) => println!("{}: {}", line.info().line_index, line.line()),
//!             other => println!("-- {}", other.kind()),
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Caveats
//!
//! Lines are delimited by `\n` only; a preceding `\r` is kept. A line longer
//! than the read buffer (32 KiB by default) is not reassembled: each full
//! buffer without a line boundary is reported as [`TailEvent::Partial`] and
//! skipped over.

mod config;
mod emitter;
mod error;
mod events;
mod identity;
mod reader;
mod session;

pub use config::{TailOptions, DEFAULT_CHUNK_SIZE, DEFAULT_POLL_INTERVAL};
pub use emitter::{EventKind, Line, LineInfo, ListenerError, TailEvent};
pub use error::{Error, Result};
pub use session::{open_tail, TailBuilder, TailSession};

#[cfg(doctest)]
doc_comment::doctest!("../README.md");
