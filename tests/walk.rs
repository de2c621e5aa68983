//! Walk behavior: batching at the 16-name wire limit, intermediate
//! clunking, and short-walk propagation.

mod support;

use ninep::{Client, Error, FCall, P92000L};
use support::{qid, rversion, spawn_server};
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

#[tokio::test]
async fn reports_short_walk_with_the_qids_resolved_so_far() {
    let (client_io, server_io) = tokio::io::duplex(1 << 16);
    spawn_server(server_io, |msg| {
        let reply = match msg.body {
            FCall::TVersion { .. } => return Some(rversion(msg.tag, 8192)),
            FCall::TAttach { .. } => FCall::RAttach { qid: qid(1) },
            FCall::TWalk { ref wnames, .. } => {
                // "a/b" resolves, "a/b/c" does not.
                let resolved = wnames.len().min(2);
                FCall::RWalk {
                    wqids: (0..resolved).map(|i| qid(2 + i as u64)).collect(),
                }
            }
            _ => return None,
        };
        Some(ninep::Msg { tag: msg.tag, body: reply })
    });

    let client = Client::connect(client_io, 8192, P92000L).await.unwrap();
    let (root, _) = ninep::attach(client, "/srv", "alice").await.unwrap();

    let names = vec!["a".to_owned(), "b".to_owned(), "c".to_owned()];
    let err = root.walk(&names).await.unwrap_err();
    match err {
        Error::ShortWalk(qids) => assert_eq!(qids.len(), 2),
        other => panic!("expected ShortWalk, got {other:?}"),
    }
}

#[tokio::test]
async fn batches_long_walks_at_sixteen_names_and_clunks_intermediates() {
    let walk_calls = Arc::new(AtomicUsize::new(0));
    let clunk_calls = Arc::new(AtomicUsize::new(0));
    let wc = walk_calls.clone();
    let cc = clunk_calls.clone();

    let (client_io, server_io) = tokio::io::duplex(1 << 16);
    spawn_server(server_io, move |msg| {
        let reply = match msg.body {
            FCall::TVersion { .. } => return Some(rversion(msg.tag, 8192)),
            FCall::TAttach { .. } => FCall::RAttach { qid: qid(0) },
            FCall::TWalk { ref wnames, .. } => {
                wc.fetch_add(1, Ordering::SeqCst);
                FCall::RWalk {
                    wqids: wnames.iter().enumerate().map(|(i, _)| qid(i as u64 + 1)).collect(),
                }
            }
            FCall::TClunk { .. } => {
                cc.fetch_add(1, Ordering::SeqCst);
                FCall::RClunk
            }
            _ => return None,
        };
        Some(ninep::Msg { tag: msg.tag, body: reply })
    });

    let client = Client::connect(client_io, 8192, P92000L).await.unwrap();
    let (root, _) = ninep::attach(client, "/", "alice").await.unwrap();

    let names: Vec<String> = (0..40).map(|i| format!("n{i}")).collect();
    let (_final, qids) = root.walk(&names).await.unwrap();

    assert_eq!(qids.len(), 40);
    // 16 + 16 + 8 names => three Twalk calls, two intermediate clunks.
    assert_eq!(walk_calls.load(Ordering::SeqCst), 3);
    assert_eq!(clunk_calls.load(Ordering::SeqCst), 2);
}
