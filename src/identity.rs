//! What it means for the tailed file to have "changed".

use std::fs::Metadata;
use std::io;
use std::path::Path;

use tokio::fs::File;

/// Token identifying a file on disk across renames, but not across
/// delete and recreate.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub(crate) struct FileIdentity {
    device: u64,
    inode: u64,
}

impl FileIdentity {
    #[cfg(unix)]
    pub fn from_metadata(meta: &Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;

        FileIdentity {
            device: meta.dev(),
            inode: meta.ino(),
        }
    }

    // No stable file index outside of unix, so creation time stands in for
    // the inode.
    #[cfg(not(unix))]
    pub fn from_metadata(meta: &Metadata) -> Self {
        let inode = meta
            .created()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);

        FileIdentity { device: 0, inode }
    }

    #[cfg(test)]
    pub(crate) fn from_parts(device: u64, inode: u64) -> Self {
        FileIdentity { device, inode }
    }
}

/// Outcome of comparing a fresh stat against the tracked file.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Change {
    /// Nothing was tracked before.
    New,
    /// A different file now lives at the path.
    Replaced,
    /// Same file, but it shrank.
    Reset,
    /// Same file, more bytes.
    Grown,
    Unchanged,
}

/// Per-file read state, reset as a unit whenever the file identity changes.
#[derive(Debug, Default)]
pub(crate) struct IdentityTracker {
    identity: Option<FileIdentity>,
    known_size: u64,
    /// Start of the next unconsumed line.
    byte_offset: u64,
    /// End of the last byte range handed to the decoder. Bytes between
    /// `byte_offset` and here are a withheld partial line.
    scanned_to: u64,
    line_index: u64,
    handle: Option<File>,
}

impl IdentityTracker {
    pub fn identity(&self) -> Option<FileIdentity> {
        self.identity
    }

    pub fn is_tracking(&self) -> bool {
        self.identity.is_some()
    }

    pub fn known_size(&self) -> u64 {
        self.known_size
    }

    pub fn byte_offset(&self) -> u64 {
        self.byte_offset
    }

    pub fn line_index(&self) -> u64 {
        self.line_index
    }

    pub fn classify(&self, identity: FileIdentity, size: u64) -> Change {
        match self.identity {
            None => Change::New,
            Some(current) if current != identity => Change::Replaced,
            Some(_) if size < self.known_size => Change::Reset,
            Some(_) if size > self.known_size => Change::Grown,
            Some(_) => Change::Unchanged,
        }
    }

    /// Forgets the tracked file entirely and releases the read handle.
    pub fn clear(&mut self) {
        *self = IdentityTracker::default();
    }

    /// Starts tracking `identity` from its first byte.
    pub fn adopt(&mut self, identity: FileIdentity, size: u64) {
        self.clear();
        self.identity = Some(identity);
        self.known_size = size;
    }

    pub fn grow(&mut self, size: u64) {
        debug_assert!(size >= self.known_size);
        self.known_size = size;
    }

    /// `true` if bytes up to `known_size` have not yet been scanned.
    pub fn has_backlog(&self) -> bool {
        self.scanned_to < self.known_size
    }

    /// Records the outcome of one read: `scanned` bytes were examined starting
    /// at `byte_offset`, of which `consumed` were turned into events.
    pub fn advance(&mut self, scanned: u64, consumed: u64, lines: u64) {
        debug_assert!(consumed <= scanned);
        self.scanned_to = if scanned == 0 {
            // Nothing came back even though stat said otherwise; wait for the
            // next size change rather than spinning on the same range.
            self.known_size
        } else {
            self.byte_offset + scanned
        };
        self.byte_offset += consumed;
        self.line_index += lines;
        debug_assert!(self.byte_offset <= self.known_size);
    }

    #[cfg(test)]
    pub fn has_handle(&self) -> bool {
        self.handle.is_some()
    }

    #[cfg(test)]
    pub fn replace_handle(&mut self, handle: File) {
        self.handle = Some(handle);
    }

    /// Returns the read handle, opening `path` on first use.
    pub async fn open_handle(&mut self, path: &Path) -> io::Result<&mut File> {
        let handle = match self.handle.take() {
            Some(handle) => handle,
            None => File::open(path).await?,
        };

        Ok(self.handle.insert(handle))
    }
}
