// Integration tests for the connection read and write pumps

mod common;

use anyhow::Result;
use common::*;
use std::sync::atomic::Ordering;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use vishing_sim::audio::AudioFrame;
use vishing_sim::transport::{read_pump, write_pump, Frame, FrameKind};

#[tokio::test]
async fn test_read_pump_forwards_binary_frames_in_order() -> Result<()> {
    let (reader, _writer, client) = connection();
    let (caller_tx, mut caller_rx) = mpsc::channel(128);

    client.send(Frame::binary(vec![1, 1]));
    client.send(Frame::text("not audio"));
    client.send(Frame::binary(vec![2, 2]));
    client.send(Frame::binary(vec![3, 3]));
    drop(client);

    let forwarded = read_pump(reader, "alice", caller_tx, CancellationToken::new()).await?;
    assert_eq!(forwarded, 3);

    for n in 1..=3u8 {
        let frame = caller_rx.recv().await.expect("forwarded frame");
        assert_eq!(frame.as_bytes(), &[n, n]);
    }
    // Peer close closes the caller queue
    assert!(caller_rx.recv().await.is_none());
    Ok(())
}

#[tokio::test]
async fn test_read_pump_stops_on_cancel() -> Result<()> {
    let (reader, _writer, _client) = connection();
    let (caller_tx, mut caller_rx) = mpsc::channel::<AudioFrame>(128);
    let cancel = CancellationToken::new();

    let pump = tokio::spawn(read_pump(reader, "alice", caller_tx, cancel.clone()));
    cancel.cancel();

    let forwarded = tokio::time::timeout(WAIT, pump).await???;
    assert_eq!(forwarded, 0);
    assert!(caller_rx.recv().await.is_none());
    Ok(())
}

#[tokio::test]
async fn test_write_pump_sends_replies_then_closes() -> Result<()> {
    let (_reader, writer, mut client) = connection();
    let (reply_tx, reply_rx) = mpsc::channel(128);

    reply_tx.send(AudioFrame::new(vec![7, 7])).await?;
    reply_tx.send(AudioFrame::new(vec![8, 8])).await?;
    drop(reply_tx);

    let written = write_pump(writer, "alice", reply_rx, CancellationToken::new()).await?;
    assert_eq!(written, 2);

    let first = client.next_frame().await.expect("first reply");
    assert_eq!(first.kind, FrameKind::Binary);
    assert_eq!(first.payload, vec![7, 7]);
    let second = client.next_frame().await.expect("second reply");
    assert_eq!(second.payload, vec![8, 8]);

    assert_eq!(client.closes.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn test_write_pump_closes_on_cancel() -> Result<()> {
    let (_reader, writer, client) = connection();
    let (_reply_tx, reply_rx) = mpsc::channel::<AudioFrame>(128);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let written = write_pump(writer, "alice", reply_rx, cancel).await?;
    assert_eq!(written, 0);
    assert_eq!(client.closes.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn test_write_pump_exits_on_write_error() -> Result<()> {
    let (_reader, writer, _client) = failing_connection();
    let (reply_tx, reply_rx) = mpsc::channel(128);
    reply_tx.send(AudioFrame::new(vec![1, 2])).await?;

    let result = write_pump(writer, "alice", reply_rx, CancellationToken::new()).await;
    assert!(result.is_err());
    Ok(())
}
