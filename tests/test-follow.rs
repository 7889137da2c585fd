use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use filetail::{EventKind, TailBuilder, TailEvent, TailSession};
use tempfile::tempdir;
use tokio::time;

const TIMEOUT_2_SEC: Duration = Duration::from_millis(2000);
const POLL_50_MS: Duration = Duration::from_millis(50);

fn append(path: &Path, data: &[u8]) {
    let mut file = OpenOptions::new().append(true).open(path).unwrap();
    file.write_all(data).unwrap();
    file.sync_all().unwrap();
}

async fn expect_event(tail: &mut TailSession) -> TailEvent {
    time::timeout(TIMEOUT_2_SEC, tail.next_event())
        .await
        .expect("timed out waiting for event")
        .expect("session ended")
}

#[tokio::test]
pub async fn test_follow_appends() {
    let logdir = tempdir().unwrap();
    let logfile = logdir.path().join("foo.log");
    File::create(&logfile).unwrap();

    let mut tail = TailBuilder::new(&logfile)
        .poll_interval(POLL_50_MS)
        .open()
        .unwrap();
    assert!(tail.path().ends_with("foo.log"));

    assert_eq!(expect_event(&mut tail).await.kind(), EventKind::New);

    append(&logfile, b"abc\n");
    let event = expect_event(&mut tail).await;
    let line = event.as_line().expect("expected line");
    assert_eq!(line.line(), "abc");
    assert_eq!(line.info().line_index, 0);
    assert_eq!(line.info().byte_offset, 0);
    assert_eq!(line.info().byte_length, 3);

    // No newline yet, so nothing to report
    append(&logfile, b"de");
    tail.trigger();
    assert!(time::timeout(Duration::from_millis(300), tail.next_event())
        .await
        .is_err());

    append(&logfile, b"f\n");
    let line = time::timeout(TIMEOUT_2_SEC, tail.next_line())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(line.line(), "def");
    assert_eq!(line.info().line_index, 1);
    assert_eq!(line.info().byte_offset, 4);
    assert_eq!(line.info().byte_length, 3);
}

#[tokio::test]
pub async fn test_lines_in_order() {
    let logdir = tempdir().unwrap();
    let logfile = logdir.path().join("many.log");
    File::create(&logfile).unwrap();

    // Small buffer so the backlog takes several passes
    let mut tail = TailBuilder::new(&logfile)
        .poll_interval(POLL_50_MS)
        .chunk_size(16)
        .open()
        .unwrap();
    assert_eq!(expect_event(&mut tail).await.kind(), EventKind::New);

    let mut expected = Vec::new();
    for i in 0..20 {
        let line = format!("line number {}", i);
        append(&logfile, format!("{}\n", line).as_bytes());
        expected.push(line);
    }

    let mut seen = Vec::new();
    while seen.len() < expected.len() {
        let line = time::timeout(TIMEOUT_2_SEC, tail.next_line())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(line.info().line_index, seen.len() as u64);
        seen.push(line.line().to_string());
    }

    assert_eq!(seen, expected);
}

#[tokio::test]
pub async fn test_partial_for_oversized_line() {
    let logdir = tempdir().unwrap();
    let logfile = logdir.path().join("wide.log");
    File::create(&logfile).unwrap();

    let mut tail = TailBuilder::new(&logfile)
        .poll_interval(POLL_50_MS)
        .chunk_size(8)
        .open()
        .unwrap();
    assert_eq!(expect_event(&mut tail).await.kind(), EventKind::New);

    append(&logfile, b"0123456789ABCDEFGH\n");

    match expect_event(&mut tail).await {
        TailEvent::Partial(bytes) => assert_eq!(bytes, b"01234567".to_vec()),
        other => panic!("expected partial, got {:?}", other),
    }
    match expect_event(&mut tail).await {
        TailEvent::Partial(bytes) => assert_eq!(bytes, b"89ABCDEF".to_vec()),
        other => panic!("expected partial, got {:?}", other),
    }
    let line = time::timeout(TIMEOUT_2_SEC, tail.next_line())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(line.line(), "GH");
    assert_eq!(line.info().byte_offset, 16);
}

#[tokio::test]
pub async fn test_file_created_later() {
    let logdir = tempdir().unwrap();
    let logfile = logdir.path().join("later.log");

    let mut tail = TailBuilder::new(&logfile)
        .poll_interval(POLL_50_MS)
        .open()
        .unwrap();

    let mut file = File::create(&logfile).unwrap();
    file.write_all(b"hello\n").unwrap();
    file.sync_all().unwrap();

    assert_eq!(expect_event(&mut tail).await.kind(), EventKind::New);
    let line = time::timeout(TIMEOUT_2_SEC, tail.next_line())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(line.line(), "hello");
    assert_eq!(line.info().line_index, 0);
}
