//! Concurrency properties of the connection engine itself: correct tag
//! correlation under many simultaneous callers, and `close()` hanging up
//! every outstanding call.

mod support;

use ninep::{Client, Error, FCall, GetAttrMask, P92000L};
use support::{qid, rversion, spawn_server};

fn zero_stat() -> ninep::Stat {
    let t = ninep::Time { sec: 0, nsec: 0 };
    ninep::Stat {
        mode: 0,
        uid: 0,
        gid: 0,
        nlink: 0,
        rdev: 0,
        size: 0,
        blksize: 0,
        blocks: 0,
        atime: t,
        mtime: t,
        ctime: t,
    }
}

#[tokio::test]
async fn concurrent_calls_are_correlated_by_tag_not_arrival_order() {
    let (client_io, server_io) = tokio::io::duplex(1 << 20);
    spawn_server(server_io, |msg| {
        let reply = match msg.body {
            FCall::TVersion { .. } => return Some(rversion(msg.tag, 8192)),
            FCall::TGetAttr { fid, .. } => FCall::RGetAttr {
                valid: GetAttrMask::empty(),
                qid: qid(fid as u64),
                stat: zero_stat(),
            },
            _ => return None,
        };
        Some(ninep::Msg { tag: msg.tag, body: reply })
    });

    let client = Client::connect(client_io, 8192, P92000L).await.unwrap();

    let mut tasks = Vec::new();
    for fid in 0..32u32 {
        let client = client.clone();
        tasks.push(tokio::spawn(async move {
            match client
                .call(FCall::TGetAttr { fid, req_mask: GetAttrMask::empty() })
                .await
                .unwrap()
            {
                FCall::RGetAttr { qid, .. } => assert_eq!(qid.path, fid as u64),
                other => panic!("unexpected reply: {other:?}"),
            }
        }));
    }
    for t in tasks {
        t.await.unwrap();
    }
}

#[tokio::test]
async fn close_hangs_up_every_outstanding_call_with_client_closed() {
    let (client_io, server_io) = tokio::io::duplex(1 << 16);
    spawn_server(server_io, |msg| match msg.body {
        FCall::TVersion { .. } => Some(rversion(msg.tag, 8192)),
        // Anything else is never answered, simulating a server that hung.
        _ => None,
    });

    let client = Client::connect(client_io, 8192, P92000L).await.unwrap();

    let mut tasks = Vec::new();
    for fid in 0..5u32 {
        let c = client.clone();
        tasks.push(tokio::spawn(async move { c.call(FCall::TClunk { fid }).await }));
    }
    // Give every call a chance to register its tag before we hang up.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    client.close().await;

    for t in tasks {
        let result = t.await.unwrap();
        assert!(matches!(result, Err(Error::ClientClosed)));
    }
}
