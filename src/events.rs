//! Everything related to watching the tailed path for filesystem changes.

use std::fmt::{self, Debug, Formatter};
use std::path::{Path, PathBuf};

use notify::{EventKind, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};

/// Change-notification subscription for a single path.
///
/// Internally, `PathWatch` holds a [`notify::RecommendedWatcher`] whose
/// callback does nothing but nudge the session's wake channel. The channel
/// has capacity one, so a burst of notifications collapses into at most one
/// pending reconciliation pass.
pub(crate) struct PathWatch {
    inner: Option<notify::RecommendedWatcher>,
    wake: mpsc::Sender<()>,
}

impl Debug for PathWatch {
    fn fmt(&self, f: &mut Formatter) -> Result<(), fmt::Error> {
        f.debug_struct("PathWatch")
            .field("active", &self.is_active())
            .finish()
    }
}

impl PathWatch {
    pub fn new(wake: mpsc::Sender<()>) -> Self {
        PathWatch { inner: None, wake }
    }

    pub fn is_active(&self) -> bool {
        self.inner.is_some()
    }

    /// Subscribes to changes of `path` unless already subscribed.
    ///
    /// Returns `true` if a new subscription was established.
    pub fn ensure(&mut self, path: &Path) -> Result<bool> {
        if self.inner.is_some() {
            return Ok(false);
        }

        let wake = self.wake.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                // Our own reads must not feed back into more passes.
                Ok(event) if matches!(event.kind, EventKind::Access(_)) => return,
                Ok(event) => trace!(kind = ?event.kind, "change notification"),
                Err(e) => warn!(error = %e, "change notification error"),
            }
            // A full channel already has a pass queued, and a closed one
            // means the session is gone. Either way there's nothing to do.
            let _ = wake.try_send(());
        })?;

        watcher.watch(path, RecursiveMode::NonRecursive)?;
        debug!(path = %path.display(), "watch established");

        self.inner = Some(watcher);

        Ok(true)
    }

    /// Drops the subscription, if any.
    pub fn teardown(&mut self) {
        if self.inner.take().is_some() {
            debug!("watch torn down");
        }
    }
}

/// Makes `path` absolute and checks that it can name a regular file.
///
/// The parent directory is canonicalized when it exists. The file itself is
/// left alone so that a later replacement at the same path is still followed.
pub(crate) fn resolve_path(path: impl Into<PathBuf>) -> Result<PathBuf> {
    let path = path.into();

    if path.as_os_str().is_empty() {
        return Err(Error::EmptyPath);
    }

    let filename = path
        .file_name()
        .ok_or_else(|| Error::InvalidPath(path.clone()))?
        .to_os_string();

    let dir = match path.parent() {
        None => std::env::current_dir()?,
        Some(parent) => {
            if parent == Path::new("") {
                std::env::current_dir()?
            } else {
                parent.to_path_buf()
            }
        }
    };

    let dir = if let Ok(linked_dir) = dir.read_link() {
        linked_dir
    } else {
        dir
    };

    let dir = if let Ok(abs_dir) = dir.canonicalize() {
        abs_dir
    } else if dir.is_relative() {
        std::env::current_dir()?.join(dir)
    } else {
        dir
    };

    let path = dir.join(filename);

    if path.is_dir() {
        return Err(Error::IsDirectory(path));
    }

    Ok(path)
}
