//! Prints the lines appended to a file, following rotation and truncation.
//!
//! Usage:
//!     tail /path/to/file
//!
//! The file may not exist yet. Set `FILETAIL_POLL_MS` to change the poll
//! interval and `RUST_LOG=filetail=debug` to see what the session is doing.

use std::time::Duration;

use filetail::{TailBuilder, TailEvent};
use tracing_subscriber::EnvFilter;

#[tokio::main]
pub async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let path = std::env::args()
        .nth(1)
        .ok_or("usage: tail /path/to/file")?;

    let mut builder = TailBuilder::new(path);
    if let Ok(ms) = std::env::var("FILETAIL_POLL_MS") {
        builder = builder.poll_interval(Duration::from_millis(ms.parse()?));
    }
    let mut tail = builder.open()?;

    loop {
        tokio::select! {
            event = tail.next_event() => match event {
                Some(TailEvent::Line(line)) => {
                    let info = line.info();
                    println!("line: {} {}", info.line_index, line.line());
                }
                Some(TailEvent::Partial(bytes)) => println!("partial: {} bytes", bytes.len()),
                Some(TailEvent::Issue(err)) => eprintln!("issue: {}", err),
                Some(other) => println!("-- {}", other.kind()),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                tail.stop();
                break;
            }
        }
    }

    Ok(())
}
