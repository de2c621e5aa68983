//! The negotiated `msize` bounds every frame in both directions for the
//! rest of the connection's life, not just the handshake frame.

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
async fn a_reply_frame_over_the_negotiated_msize_closes_the_connection() {
    // RGetAttr's wire encoding (valid + qid + stat + 4 reserved u64s)
    // alone already runs past 128 bytes, so negotiating the protocol
    // minimum here is enough to provoke an oversized reply without any
    // artificial padding.
    let (client_io, server_io) = tokio::io::duplex(1 << 16);
    spawn_server(server_io, |msg| match msg.body {
        FCall::TVersion { .. } => Some(rversion(msg.tag, 128)),
        FCall::TGetAttr { fid, .. } => Some(ninep::Msg {
            tag: msg.tag,
            body: FCall::RGetAttr {
                valid: GetAttrMask::ALL,
                qid: qid(fid as u64),
                stat: zero_stat(),
            },
        }),
        _ => None,
    });

    let client = Client::connect(client_io, 128, P92000L).await.unwrap();
    assert_eq!(client.msize(), 128);

    let result = client
        .call(FCall::TGetAttr {
            fid: 0,
            req_mask: GetAttrMask::ALL,
        })
        .await;
    assert!(matches!(result, Err(Error::ClientClosed)));
}
