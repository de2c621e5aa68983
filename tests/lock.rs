//! Advisory lock retry behavior: `LockWait::Blocking` retries a
//! `BLOCKED` reply with a 1s backoff; `LockWait::NonBlocking` surfaces it
//! immediately.

mod support;

use ninep::{Client, FCall, Flock, LockFlag, LockStatus, LockType, LockWait, P92000L};
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};
use support::{qid, rversion, spawn_server};

fn test_flock() -> Flock {
    Flock {
        typ: LockType::WRLOCK,
        flags: LockFlag::empty(),
        start: 0,
        length: 0,
        proc_id: 1,
        client_id: "test".to_owned(),
    }
}

#[tokio::test]
async fn blocking_lock_retries_until_success() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let a = attempts.clone();

    let (client_io, server_io) = tokio::io::duplex(1 << 16);
    spawn_server(server_io, move |msg| {
        let reply = match msg.body {
            FCall::TVersion { .. } => return Some(rversion(msg.tag, 8192)),
            FCall::TAttach { .. } => FCall::RAttach { qid: qid(0) },
            FCall::TLock { .. } => {
                let n = a.fetch_add(1, Ordering::SeqCst);
                let status = if n < 2 { LockStatus::BLOCKED } else { LockStatus::SUCCESS };
                FCall::RLock { status }
            }
            _ => return None,
        };
        Some(ninep::Msg { tag: msg.tag, body: reply })
    });

    let client = Client::connect(client_io, 8192, P92000L).await.unwrap();
    let (root, _) = ninep::attach(client, "/", "alice").await.unwrap();

    let status = root.lock(test_flock(), LockWait::Blocking).await.unwrap();
    assert_eq!(status, LockStatus::SUCCESS);
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn non_blocking_lock_surfaces_blocked_on_the_first_try() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let a = attempts.clone();

    let (client_io, server_io) = tokio::io::duplex(1 << 16);
    spawn_server(server_io, move |msg| {
        let reply = match msg.body {
            FCall::TVersion { .. } => return Some(rversion(msg.tag, 8192)),
            FCall::TAttach { .. } => FCall::RAttach { qid: qid(0) },
            FCall::TLock { .. } => {
                a.fetch_add(1, Ordering::SeqCst);
                FCall::RLock { status: LockStatus::BLOCKED }
            }
            _ => return None,
        };
        Some(ninep::Msg { tag: msg.tag, body: reply })
    });

    let client = Client::connect(client_io, 8192, P92000L).await.unwrap();
    let (root, _) = ninep::attach(client, "/", "alice").await.unwrap();

    let status = root.lock(test_flock(), LockWait::NonBlocking).await.unwrap();
    assert_eq!(status, LockStatus::BLOCKED);
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}
