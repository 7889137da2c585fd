//! The observable surface of a tail session.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::warn;

use crate::error::Error;

/// Error type listeners may return to report a failure back to the session.
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

/// A synchronous event callback, invoked from within the reconciliation pass
/// that produced the event.
pub type Listener = Box<dyn FnMut(&TailEvent) -> Result<(), ListenerError> + Send>;

/// Position of a [`Line`] within the tracked file.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct LineInfo {
    /// Zero-based count of lines delivered before this one for the current file.
    pub line_index: u64,
    /// Offset of the first byte of the line.
    pub byte_offset: u64,
    /// Length of the line in bytes, excluding the `\n`.
    pub byte_length: u64,
    /// The tailed path.
    pub path: PathBuf,
}

/// One complete line captured from the tailed file.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Line {
    text: String,
    info: LineInfo,
}

impl Line {
    pub(crate) fn new(text: String, info: LineInfo) -> Self {
        Line { text, info }
    }

    /// Returns the line content, without the trailing `\n`.
    pub fn line(&self) -> &str {
        &self.text
    }

    /// Returns the position metadata for the line.
    pub fn info(&self) -> &LineInfo {
        &self.info
    }

    /// Returns a reference to the file from where the line was read.
    pub fn source(&self) -> &Path {
        self.info.path.as_path()
    }

    pub fn into_inner(self) -> (String, LineInfo) {
        let Line { text, info } = self;

        (text, info)
    }
}

/// Everything a tail session reports.
#[derive(Clone, Debug)]
pub enum TailEvent {
    /// A file is now tracked from its first byte.
    New,
    /// The tracked file was swapped for a different one at the same path.
    /// Always followed by [`TailEvent::New`].
    Replaced,
    /// The tracked file shrank and is re-read from the start.
    Reset,
    Line(Line),
    /// A full read buffer with no line boundary in it.
    Partial(Vec<u8>),
    /// A recoverable problem. The session keeps running.
    Issue(Arc<Error>),
    /// The tracked file is no longer reachable.
    Gone,
}

/// Discriminant of a [`TailEvent`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum EventKind {
    New,
    Replaced,
    Reset,
    Line,
    Partial,
    Issue,
    Gone,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::New => "new",
            EventKind::Replaced => "replaced",
            EventKind::Reset => "reset",
            EventKind::Line => "line",
            EventKind::Partial => "partial",
            EventKind::Issue => "issue",
            EventKind::Gone => "gone",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TailEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            TailEvent::New => EventKind::New,
            TailEvent::Replaced => EventKind::Replaced,
            TailEvent::Reset => EventKind::Reset,
            TailEvent::Line(_) => EventKind::Line,
            TailEvent::Partial(_) => EventKind::Partial,
            TailEvent::Issue(_) => EventKind::Issue,
            TailEvent::Gone => EventKind::Gone,
        }
    }

    /// Returns the captured line, if this is a [`TailEvent::Line`].
    pub fn as_line(&self) -> Option<&Line> {
        match self {
            TailEvent::Line(line) => Some(line),
            _ => None,
        }
    }
}

/// Fans events out to registered listeners, in registration order.
#[derive(Default)]
pub(crate) struct Emitter {
    listeners: Vec<Listener>,
}

impl fmt::Debug for Emitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl Emitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, listener: Listener) {
        self.listeners.push(listener);
    }

    /// Delivers `event` to every listener.
    ///
    /// A listener that errors or panics does not stop delivery to the others.
    /// Its failure is turned into an [`TailEvent::Issue`] sent to the
    /// remaining listeners. Failures while delivering an issue are only logged.
    pub fn emit(&mut self, event: &TailEvent) {
        let failures = self.deliver(event, None);

        if let TailEvent::Issue(_) = event {
            for (_, reason) in failures {
                warn!(%reason, "listener failed while handling an issue");
            }
            return;
        }

        for (failed, reason) in failures {
            warn!(%reason, event = %event.kind(), "listener failed");
            let issue = TailEvent::Issue(Arc::new(Error::Listener(reason)));
            for (_, reason) in self.deliver(&issue, Some(failed)) {
                warn!(%reason, "listener failed while handling an issue");
            }
        }
    }

    fn deliver(&mut self, event: &TailEvent, skip: Option<usize>) -> Vec<(usize, String)> {
        let mut failures = Vec::new();

        for (idx, listener) in self.listeners.iter_mut().enumerate() {
            if skip == Some(idx) {
                continue;
            }

            match panic::catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => failures.push((idx, e.to_string())),
                Err(payload) => failures.push((idx, panic_message(payload))),
            }
        }

        failures
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("listener panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("listener panicked: {}", s)
    } else {
        "listener panicked".to_string()
    }
}
