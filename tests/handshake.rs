//! Version negotiation against an in-process server.

mod support;

use ninep::{Client, Error, FCall, IOHDRSZ, P92000L};
use support::{rversion, spawn_server};

#[tokio::test]
async fn negotiates_down_to_the_servers_msize() {
    let (client_io, server_io) = tokio::io::duplex(1 << 16);
    spawn_server(server_io, |msg| match msg.body {
        FCall::TVersion { .. } => Some(rversion(msg.tag, 32768)),
        _ => None,
    });

    let client = Client::connect(client_io, 65536, P92000L).await.unwrap();
    assert_eq!(client.msize(), 32768);
    assert_eq!(client.version(), P92000L);
    assert_eq!(client.msize() - IOHDRSZ, 32768 - 24);
}

#[tokio::test]
async fn rejects_a_version_mismatch() {
    let (client_io, server_io) = tokio::io::duplex(1 << 16);
    spawn_server(server_io, |msg| match msg.body {
        FCall::TVersion { .. } => Some(ninep::Msg {
            tag: msg.tag,
            body: FCall::RVersion {
                msize: 8192,
                version: ninep::VERSION_UNKNOWN.to_owned(),
            },
        }),
        _ => None,
    });

    let err = Client::connect(client_io, 8192, P92000L).await.unwrap_err();
    assert!(matches!(err, Error::Protocol(_)));
}

#[tokio::test]
async fn rejects_an_out_of_range_msize() {
    let (client_io, server_io) = tokio::io::duplex(1 << 16);
    spawn_server(server_io, |msg| match msg.body {
        FCall::TVersion { .. } => Some(rversion(msg.tag, 99999)),
        _ => None,
    });

    let err = Client::connect(client_io, 8192, P92000L).await.unwrap_err();
    assert!(matches!(err, Error::Protocol(_)));
}
