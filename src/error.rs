use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while constructing or running a tail session.
///
/// Only the path and option variants are ever returned to a caller directly.
/// Everything else is raised inside a running session and delivered as
/// [`TailEvent::Issue`](crate::TailEvent::Issue).
#[derive(Debug, Error)]
pub enum Error {
    #[error("Path to tail must not be empty")]
    EmptyPath,
    #[error("Path does not name a file: {0}")]
    InvalidPath(PathBuf),
    #[error("Path is a directory: {0}")]
    IsDirectory(PathBuf),
    #[error("Must be called from within a tokio runtime")]
    NoRuntime,
    #[error("Invalid option: {0}")]
    InvalidOption(&'static str),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Failed to watch path: {0}")]
    Watch(#[from] notify::Error),
    #[error("Listener failed: {0}")]
    Listener(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
