//! Everything related to following one path over time: reconciling the file on
//! disk against what was last seen, and the handle callers hold on to.

use std::fmt;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task;
use std::time::Duration;

use futures_util::stream::Stream as FuturesStream;
use tokio::sync::{mpsc, Notify};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, trace, warn};

use crate::config::TailOptions;
use crate::emitter::{Emitter, Line, LineInfo, Listener, ListenerError, TailEvent};
use crate::error::{Error, Result};
use crate::events::{resolve_path, PathWatch};
use crate::identity::{Change, FileIdentity, IdentityTracker};
use crate::reader::{decode_chunk, read_increment, Segment};

/// The reconciliation engine for a single path.
///
/// Passes are serialized by construction: every entry point takes `&mut self`
/// and the only owner is the session task, which runs one pass at a time.
pub(crate) struct Tailer {
    path: PathBuf,
    tracker: IdentityTracker,
    watch: PathWatch,
    watch_error_reported: bool,
    emitter: Emitter,
    finished: Arc<AtomicBool>,
    buf: Vec<u8>,
    passes: u64,
}

impl Tailer {
    pub fn new(
        path: PathBuf,
        options: &TailOptions,
        emitter: Emitter,
        wake: mpsc::Sender<()>,
        finished: Arc<AtomicBool>,
    ) -> Self {
        Tailer {
            path,
            tracker: IdentityTracker::default(),
            watch: PathWatch::new(wake),
            watch_error_reported: false,
            emitter,
            finished,
            buf: vec![0; options.chunk_size],
            passes: 0,
        }
    }

    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    fn emit(&mut self, event: TailEvent) {
        if !self.is_finished() {
            self.emitter.emit(&event);
        }
    }

    /// Brings the tracked state in line with the file on disk, emitting
    /// whatever changed.
    ///
    /// Passes run back to back for as long as the file holds bytes that
    /// haven't been scanned yet, so a backlog larger than the read buffer is
    /// drained without waiting for the next trigger.
    pub async fn reconcile(&mut self) {
        loop {
            if self.is_finished() {
                return;
            }

            match self.pass().await {
                Ok(true) => trace!(offset = self.tracker.byte_offset(), "backlog remains"),
                Ok(false) => return,
                Err(err) => {
                    self.fail(err);
                    return;
                }
            }
        }
    }

    /// One stat, classify, read and re-arm sequence. Returns `true` if a
    /// backlog remains.
    async fn pass(&mut self) -> Result<bool> {
        self.passes += 1;
        trace!(pass = self.passes, path = %self.path.display(), "reconciling");

        let meta = tokio::fs::metadata(&self.path).await?;
        if self.is_finished() {
            return Ok(false);
        }
        if meta.is_dir() {
            return Err(Error::IsDirectory(self.path.clone()));
        }

        let identity = FileIdentity::from_metadata(&meta);
        let size = meta.len();

        match self.tracker.classify(identity, size) {
            Change::New => {
                debug!(path = %self.path.display(), size, "tracking new file");
                self.tracker.adopt(identity, size);
                self.emit(TailEvent::New);
            }
            Change::Replaced => {
                debug!(
                    path = %self.path.display(),
                    old = ?self.tracker.identity(),
                    new = ?identity,
                    size,
                    "file replaced"
                );
                self.tracker.adopt(identity, size);
                // The existing subscription still points at the old file.
                self.watch.teardown();
                self.emit(TailEvent::Replaced);
                self.emit(TailEvent::New);
            }
            Change::Reset => {
                debug!(
                    path = %self.path.display(),
                    old_size = self.tracker.known_size(),
                    size,
                    "file shrank"
                );
                self.tracker.adopt(identity, size);
                self.emit(TailEvent::Reset);
            }
            Change::Grown => {
                trace!(from = self.tracker.known_size(), to = size, "file grew");
                self.tracker.grow(size);
            }
            Change::Unchanged => {}
        }

        if self.tracker.has_backlog() {
            self.read().await?;
        }

        if self.is_finished() {
            return Ok(false);
        }

        self.ensure_watch();

        Ok(self.tracker.has_backlog())
    }

    /// Reads one buffer's worth past the current offset and emits the lines
    /// found in it.
    async fn read(&mut self) -> Result<()> {
        let from = self.tracker.byte_offset();
        let known_size = self.tracker.known_size();

        let handle = self.tracker.open_handle(&self.path).await?;
        let n = read_increment(handle, from, known_size, &mut self.buf).await?;
        if self.is_finished() {
            return Ok(());
        }

        let decoded = decode_chunk(&self.buf[..n], n == self.buf.len());
        let first_index = self.tracker.line_index();
        let mut lines = 0;

        for segment in &decoded.segments {
            let event = match *segment {
                Segment::Line { start, bytes } => {
                    let info = LineInfo {
                        line_index: first_index + lines,
                        byte_offset: from + start as u64,
                        byte_length: bytes.len() as u64,
                        path: self.path.clone(),
                    };
                    lines += 1;
                    let text = String::from_utf8_lossy(bytes).into_owned();
                    TailEvent::Line(Line::new(text, info))
                }
                Segment::Partial(bytes) => {
                    debug!(offset = from, len = bytes.len(), "no line boundary in full buffer");
                    TailEvent::Partial(bytes.to_vec())
                }
            };

            if self.finished.load(Ordering::Acquire) {
                return Ok(());
            }
            self.emitter.emit(&event);
        }

        self.tracker.advance(n as u64, decoded.consumed as u64, lines);

        Ok(())
    }

    fn ensure_watch(&mut self) {
        match self.watch.ensure(&self.path) {
            Ok(_) => self.watch_error_reported = false,
            Err(err) => {
                // Polling still drives the session, so this only gets
                // reported once per tracked file.
                if !self.watch_error_reported {
                    warn!(path = %self.path.display(), error = %err, "falling back to polling");
                    self.watch_error_reported = true;
                    self.emit(TailEvent::Issue(Arc::new(err)));
                }
            }
        }
    }

    /// Tears down all tracking after a stat or read failure. The next trigger
    /// starts over, treating whatever is found as a new file.
    fn fail(&mut self, err: Error) {
        if self.tracker.is_tracking() {
            warn!(path = %self.path.display(), error = %err, "tracked file is gone");
            self.emit(TailEvent::Issue(Arc::new(err)));
            self.emit(TailEvent::Gone);
        } else {
            trace!(path = %self.path.display(), error = %err, "file not available");
        }

        self.watch.teardown();
        self.watch_error_reported = false;
        self.tracker.clear();
    }

    fn shutdown(&mut self) {
        self.watch.teardown();
        self.tracker.clear();
    }
}

/// Drives `tailer` until stopped, then hands it back with its watch and file
/// handle released.
async fn run(
    mut tailer: Tailer,
    mut wake: mpsc::Receiver<()>,
    stop: Arc<Notify>,
    poll_interval: Duration,
) -> Tailer {
    tailer.reconcile().await;

    let mut timer = time::interval_at(Instant::now() + poll_interval, poll_interval);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = stop.notified() => break,
            Some(()) = wake.recv() => trace!("woken"),
            _ = timer.tick() => trace!("poll"),
        }

        if tailer.is_finished() {
            break;
        }
        tailer.reconcile().await;
    }

    tailer.shutdown();
    debug!(
        path = %tailer.path.display(),
        passes = tailer.passes,
        "tail session stopped"
    );

    tailer
}

/// Configures and starts a [`TailSession`].
pub struct TailBuilder {
    path: PathBuf,
    options: TailOptions,
    listeners: Vec<Listener>,
}

impl fmt::Debug for TailBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TailBuilder")
            .field("path", &self.path)
            .field("options", &self.options)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl TailBuilder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        TailBuilder {
            path: path.into(),
            options: TailOptions::default(),
            listeners: Vec::new(),
        }
    }

    pub fn options(mut self, options: TailOptions) -> Self {
        self.options = options;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.options.poll_interval = interval;
        self
    }

    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.options.chunk_size = chunk_size;
        self
    }

    /// Registers a callback run synchronously for every event, before the
    /// event is made available on the session stream.
    ///
    /// An `Err` or panic from the callback is reported as
    /// [`TailEvent::Issue`] to everyone else and never stops the session.
    pub fn listener<F>(mut self, listener: F) -> Self
    where
        F: FnMut(&TailEvent) -> Result<(), ListenerError> + Send + 'static,
    {
        self.listeners.push(Box::new(listener));
        self
    }

    /// Starts following the path. The first reconciliation pass is already
    /// scheduled when this returns.
    ///
    /// Must be called from within a tokio runtime. Fails only if the path or
    /// options are unusable. A path that doesn't exist yet is fine.
    pub fn open(self) -> Result<TailSession> {
        let TailBuilder {
            path,
            options,
            listeners,
        } = self;

        options.validate()?;
        let path = resolve_path(path)?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| Error::NoRuntime)?;

        let (wake_tx, wake_rx) = mpsc::channel(1);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let finished = Arc::new(AtomicBool::new(false));
        let stop = Arc::new(Notify::new());

        let mut emitter = Emitter::new();
        for listener in listeners {
            emitter.subscribe(listener);
        }
        emitter.subscribe(Box::new(move |event: &TailEvent| -> Result<(), ListenerError> {
            // The receiver lives in `TailSession`. Nobody reading the stream
            // is not an error.
            let _ = event_tx.send(event.clone());
            Ok(())
        }));

        let tailer = Tailer::new(
            path.clone(),
            &options,
            emitter,
            wake_tx.clone(),
            finished.clone(),
        );
        debug!(path = %path.display(), ?options, "starting tail session");
        runtime.spawn(run(tailer, wake_rx, stop.clone(), options.poll_interval));

        Ok(TailSession {
            path,
            finished,
            stop,
            wake: wake_tx,
            events: event_rx,
        })
    }
}

/// Follows a single file, and can be polled to receive its [`TailEvent`]s.
///
/// The work happens on a background task that reconciles the file whenever a
/// change notification arrives, on every poll interval, and whenever
/// [`trigger`](TailSession::trigger) is called. Dropping the session stops it.
pub struct TailSession {
    path: PathBuf,
    finished: Arc<AtomicBool>,
    stop: Arc<Notify>,
    wake: mpsc::Sender<()>,
    events: mpsc::UnboundedReceiver<TailEvent>,
}

impl fmt::Debug for TailSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TailSession")
            .field("path", &self.path)
            .field("finished", &self.is_finished())
            .finish()
    }
}

impl TailSession {
    /// Returns the absolute path being followed.
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Asks for a reconciliation pass. Requests made while one is already
    /// pending are folded into it.
    pub fn trigger(&self) {
        if !self.is_finished() {
            let _ = self.wake.try_send(());
        }
    }

    /// Stops the session for good. Calling it again does nothing.
    ///
    /// Any pass still in flight discards its results, and no events are
    /// delivered afterwards.
    pub fn stop(&self) {
        if !self.finished.swap(true, Ordering::AcqRel) {
            debug!(path = %self.path.display(), "stopping tail session");
            self.stop.notify_one();
        }
    }

    /// Alias for [`stop`](TailSession::stop).
    pub fn close(&self) {
        self.stop()
    }

    /// Waits for the next event. Returns `None` once the session is stopped.
    pub async fn next_event(&mut self) -> Option<TailEvent> {
        if self.is_finished() {
            return None;
        }
        self.events.recv().await
    }

    /// Waits for the next [`Line`], skipping every other kind of event.
    pub async fn next_line(&mut self) -> Option<Line> {
        while let Some(event) = self.next_event().await {
            if let TailEvent::Line(line) = event {
                return Some(line);
            }
        }
        None
    }
}

impl Drop for TailSession {
    fn drop(&mut self) {
        self.stop();
    }
}

impl FuturesStream for TailSession {
    type Item = TailEvent;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> task::Poll<Option<Self::Item>> {
        if self.is_finished() {
            return task::Poll::Ready(None);
        }
        self.events.poll_recv(cx)
    }
}

/// Starts following `path` with default options.
///
/// See [`TailBuilder`] for tuning and synchronous listeners.
pub fn open_tail(path: impl Into<PathBuf>) -> Result<TailSession> {
    TailBuilder::new(path).open()
}
