//! Everything related to reading newly appended bytes and splitting them into
//! lines.

use std::io;

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Reads the bytes between `from_offset` and `known_size` into `buf`, bounded
/// by `buf.len()`.
///
/// Returns the number of bytes read, which may be short if the file shrank
/// underneath us. Offsets are left to the caller.
pub(crate) async fn read_increment(
    handle: &mut File,
    from_offset: u64,
    known_size: u64,
    buf: &mut [u8],
) -> io::Result<usize> {
    let available = known_size.saturating_sub(from_offset);
    let want = buf.len().min(usize::try_from(available).unwrap_or(usize::MAX));
    if want == 0 {
        return Ok(0);
    }

    handle.seek(io::SeekFrom::Start(from_offset)).await?;

    let mut filled = 0;
    while filled < want {
        let n = handle.read(&mut buf[filled..want]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }

    Ok(filled)
}

/// A decoded piece of a chunk.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum Segment<'a> {
    /// A complete line without its `\n`, starting `start` bytes into the chunk.
    Line { start: usize, bytes: &'a [u8] },
    /// A whole chunk that held no line boundary at all.
    Partial(&'a [u8]),
}

#[derive(Debug, Default)]
pub(crate) struct Decoded<'a> {
    pub segments: Vec<Segment<'a>>,
    /// Bytes of the chunk accounted for by `segments`.
    pub consumed: usize,
}

/// Splits `chunk` on `\n`.
///
/// Bytes after the last boundary are left unconsumed, so the caller re-reads
/// them once more data arrives. The exception is a chunk that fills the whole
/// read buffer (`is_full`) without containing any boundary: it is handed back
/// as a [`Segment::Partial`] and consumed, so a single oversized line can
/// never stall the reader.
pub(crate) fn decode_chunk(chunk: &[u8], is_full: bool) -> Decoded<'_> {
    let mut decoded = Decoded::default();
    let mut start = 0;

    for (pos, _) in chunk.iter().enumerate().filter(|(_, b)| **b == b'\n') {
        decoded.segments.push(Segment::Line {
            start,
            bytes: &chunk[start..pos],
        });
        start = pos + 1;
    }
    decoded.consumed = start;

    if decoded.segments.is_empty() && is_full && !chunk.is_empty() {
        decoded.segments.push(Segment::Partial(chunk));
        decoded.consumed = chunk.len();
    }

    decoded
}
