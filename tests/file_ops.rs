//! Create/write/read round trip, directory listing, and the
//! `msize - IOHDRSZ` read cap, each against a small stateful mock server.

mod support;

use ninep::{Client, DirEntry, FCall, P92000L};
use std::sync::{Arc, Mutex};
use support::{qid, rversion, spawn_server};

#[tokio::test]
async fn create_write_clunk_then_reopen_and_read_back() {
    let content: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));
    let c = content.clone();

    let (client_io, server_io) = tokio::io::duplex(1 << 16);
    spawn_server(server_io, move |msg| {
        let reply = match msg.body {
            FCall::TVersion { .. } => return Some(rversion(msg.tag, 8192)),
            FCall::TAttach { .. } => FCall::RAttach { qid: qid(1) },
            FCall::TlCreate { .. } => FCall::RlCreate { qid: qid(2), iounit: 0 },
            FCall::TWrite { ref data, .. } => {
                *c.lock().unwrap() = data.0.clone();
                FCall::RWrite { count: data.0.len() as u32 }
            }
            FCall::TClunk { .. } => FCall::RClunk,
            FCall::TWalk { ref wnames, .. } => FCall::RWalk {
                wqids: wnames.iter().map(|_| qid(2)).collect(),
            },
            FCall::TlOpen { .. } => FCall::RlOpen { qid: qid(2), iounit: 0 },
            FCall::TRead { count, .. } => {
                let buf = c.lock().unwrap();
                let n = (count as usize).min(buf.len());
                FCall::RRead { data: ninep::Data(buf[..n].to_vec()) }
            }
            _ => return None,
        };
        Some(ninep::Msg { tag: msg.tag, body: reply })
    });

    let client = Client::connect(client_io, 8192, P92000L).await.unwrap();
    let (dir, _) = ninep::attach(client.clone(), "/", "alice").await.unwrap();
    let (_qid, _iounit) = dir.create("hello", 0, 0o644, 0).await.unwrap();
    dir.write(0, b"world").await.unwrap();
    dir.clunk().await.unwrap();

    let (dir2, _) = ninep::attach(client, "/", "alice").await.unwrap();
    let (hello, wqids) = dir2.walk(&["hello".to_owned()]).await.unwrap();
    assert_eq!(wqids.len(), 1);
    hello.open(0).await.unwrap();
    let mut buf = [0u8; 16];
    let n = hello.read(0, &mut buf).await.unwrap();
    assert_eq!(&buf[..n], b"world");
    hello.clunk().await.unwrap();
}

#[tokio::test]
async fn readdir_and_dir_iter_see_the_same_entries() {
    let (client_io, server_io) = tokio::io::duplex(1 << 16);
    spawn_server(server_io, |msg| {
        let reply = match msg.body {
            FCall::TVersion { .. } => return Some(rversion(msg.tag, 8192)),
            FCall::TAttach { .. } => FCall::RAttach { qid: qid(1) },
            FCall::TReadDir { offset, .. } if offset == 0 => FCall::RReadDir {
                data: ninep::DirEntryData::with(vec![
                    DirEntry { qid: qid(1), offset: 1, typ: 4, name: ".".to_owned() },
                    DirEntry { qid: qid(1), offset: 2, typ: 4, name: "..".to_owned() },
                ]),
            },
            FCall::TReadDir { .. } => FCall::RReadDir { data: ninep::DirEntryData::new() },
            _ => return None,
        };
        Some(ninep::Msg { tag: msg.tag, body: reply })
    });

    let client = Client::connect(client_io, 8192, P92000L).await.unwrap();
    let (root, _) = ninep::attach(client, "/", "alice").await.unwrap();

    let entries = root.readdir(0, 4096).await.unwrap();
    assert_eq!(entries.len(), 2);

    let mut iter = root.dir_iter();
    let mut names = Vec::new();
    while let Some(e) = iter.next().await.unwrap() {
        names.push(e.name);
    }
    assert_eq!(names, vec![".".to_owned(), "..".to_owned()]);
    assert!(iter.next().await.unwrap().is_none());
}

#[tokio::test]
async fn dir_iter_unget_replays_the_pushed_back_entry() {
    let (client_io, server_io) = tokio::io::duplex(1 << 16);
    spawn_server(server_io, |msg| {
        let reply = match msg.body {
            FCall::TVersion { .. } => return Some(rversion(msg.tag, 8192)),
            FCall::TAttach { .. } => FCall::RAttach { qid: qid(1) },
            FCall::TReadDir { offset, .. } if offset == 0 => FCall::RReadDir {
                data: ninep::DirEntryData::with(vec![DirEntry {
                    qid: qid(1),
                    offset: 1,
                    typ: 4,
                    name: "only".to_owned(),
                }]),
            },
            FCall::TReadDir { .. } => FCall::RReadDir { data: ninep::DirEntryData::new() },
            _ => return None,
        };
        Some(ninep::Msg { tag: msg.tag, body: reply })
    });

    let client = Client::connect(client_io, 8192, P92000L).await.unwrap();
    let (root, _) = ninep::attach(client, "/", "alice").await.unwrap();
    let mut iter = root.dir_iter();

    let first = iter.next().await.unwrap().unwrap();
    assert_eq!(first.name, "only");
    iter.unget(first.clone());
    let replayed = iter.next().await.unwrap().unwrap();
    assert_eq!(replayed.name, first.name);
    assert!(iter.next().await.unwrap().is_none());
}

#[tokio::test]
async fn read_is_capped_at_msize_minus_iohdrsz() {
    let (client_io, server_io) = tokio::io::duplex(1 << 20);
    spawn_server(server_io, |msg| {
        let reply = match msg.body {
            FCall::TVersion { .. } => return Some(rversion(msg.tag, 4096)),
            FCall::TAttach { .. } => FCall::RAttach { qid: qid(1) },
            FCall::TWalk { ref wnames, .. } => FCall::RWalk {
                wqids: wnames.iter().map(|_| qid(2)).collect(),
            },
            FCall::TlOpen { .. } => FCall::RlOpen { qid: qid(2), iounit: 0 },
            FCall::TRead { count, .. } => {
                assert_eq!(count, 4096 - 24);
                FCall::RRead { data: ninep::Data(vec![7u8; count as usize]) }
            }
            _ => return None,
        };
        Some(ninep::Msg { tag: msg.tag, body: reply })
    });

    let client = Client::connect(client_io, 65536, P92000L).await.unwrap();
    let (root, _) = ninep::attach(client, "/", "alice").await.unwrap();
    let (big, _) = root.walk(&["big".to_owned()]).await.unwrap();
    big.open(0).await.unwrap();

    let mut buf = vec![0u8; 100 * 1024];
    let n = big.read(0, &mut buf).await.unwrap();
    assert_eq!(n, (4096 - 24) as usize);
}
