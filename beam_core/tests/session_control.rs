//! Cancellation, connect deadlines, and single-session exclusivity.

use std::path::PathBuf;
use std::time::Duration;

use beam_core::transfer::{dial, make_receiver_endpoint, make_sender_endpoint};
use beam_core::{ReceiverSession, ReceiverState, SenderSession, SenderState, Ticket, TransferError};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

fn temp_dir() -> PathBuf {
    let mut dir = std::env::temp_dir();
    dir.push(format!("beam_test_{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// A sender endpoint that never accepts, so dials stay unanswered.
fn silent_sender_ticket(length: u64) -> anyhow::Result<(quinn::Endpoint, Ticket)> {
    let endpoint = make_sender_endpoint("127.0.0.1:0".parse()?)?;
    let addr = endpoint.local_addr()?;
    let ticket = Ticket::new(addr, blake3::hash(b"never served").into(), length);
    Ok((endpoint, ticket))
}

#[tokio::test]
async fn cancelling_a_listening_sender_ends_the_session() -> anyhow::Result<()> {
    let dir = temp_dir();
    let source = dir.join("source.bin");
    std::fs::write(&source, b"some content")?;

    let cancel = CancellationToken::new();
    let mut sender = SenderSession::open(&source, "127.0.0.1:0".parse()?, cancel.clone()).await?;

    let task = tokio::spawn(async move {
        let outcome = sender.serve().await;
        (outcome, sender.state())
    });

    sleep(Duration::from_millis(200)).await;
    cancel.cancel();

    let (outcome, state) = timeout(Duration::from_secs(5), task).await??;
    assert!(matches!(outcome, Err(TransferError::Cancelled)));
    assert_eq!(state, SenderState::Cancelled);

    let _ = std::fs::remove_dir_all(&dir);
    Ok(())
}

#[tokio::test]
async fn cancelling_a_dialing_receiver_ends_the_session() -> anyhow::Result<()> {
    let dir = temp_dir();
    let dest = dir.join("dest.bin");
    let (_endpoint, ticket) = silent_sender_ticket(1024)?;

    let cancel = CancellationToken::new();
    let mut receiver = ReceiverSession::new(ticket, &dest, cancel.clone())
        .with_dial_timeout(Duration::from_secs(30));

    let canceller = cancel.clone();
    tokio::spawn(async move {
        sleep(Duration::from_millis(300)).await;
        canceller.cancel();
    });

    let outcome = timeout(Duration::from_secs(5), receiver.run()).await?;
    assert!(matches!(outcome, Err(TransferError::Cancelled)));
    assert_eq!(receiver.state(), ReceiverState::Failed);
    assert!(!dest.exists(), "no output may appear for a cancelled dial");

    let _ = std::fs::remove_dir_all(&dir);
    Ok(())
}

#[tokio::test]
async fn unanswered_dial_times_out() -> anyhow::Result<()> {
    let dir = temp_dir();
    let dest = dir.join("dest.bin");
    let (_endpoint, ticket) = silent_sender_ticket(1024)?;

    let mut receiver = ReceiverSession::new(ticket, &dest, CancellationToken::new())
        .with_dial_timeout(Duration::from_secs(1));

    let outcome = timeout(Duration::from_secs(15), receiver.run()).await?;
    assert!(
        matches!(outcome, Err(TransferError::ConnectTimeout(_))),
        "expected ConnectTimeout, got {:?}",
        outcome
    );
    assert_eq!(receiver.state(), ReceiverState::Failed);
    assert!(!dest.exists());

    let _ = std::fs::remove_dir_all(&dir);
    Ok(())
}

#[tokio::test]
async fn second_connection_is_turned_away_without_disturbing_the_first() -> anyhow::Result<()> {
    let dir = temp_dir();
    let source = dir.join("source.bin");
    std::fs::write(&source, vec![7u8; 512 * 1024])?;

    let cancel = CancellationToken::new();
    let mut sender = SenderSession::open(&source, "127.0.0.1:0".parse()?, cancel.clone()).await?;
    let addr = sender.ticket().addr;

    let sender_task = tokio::spawn(async move {
        let outcome = sender.serve().await;
        (outcome, sender.state())
    });

    // First peer connects and sits on the connection without pulling.
    let first = make_receiver_endpoint()?;
    let idle = CancellationToken::new();
    let first_conn = dial(&first, addr, Duration::from_secs(5), &idle).await?;
    sleep(Duration::from_millis(200)).await;

    // Second peer must be turned away while the first session is live.
    let second = make_receiver_endpoint()?;
    let refused = dial(&second, addr, Duration::from_secs(2), &idle).await;
    assert!(
        matches!(
            refused,
            Err(TransferError::ConnectRefused(_)) | Err(TransferError::ConnectTimeout(_))
        ),
        "second connection should not be admitted, got {:?}",
        refused
    );

    // The in-progress session was not disturbed.
    assert!(first_conn.close_reason().is_none());

    cancel.cancel();
    let (outcome, state) = timeout(Duration::from_secs(5), sender_task).await??;
    assert!(matches!(outcome, Err(TransferError::Cancelled)));
    assert_eq!(state, SenderState::Cancelled);

    let _ = std::fs::remove_dir_all(&dir);
    Ok(())
}
