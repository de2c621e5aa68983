//! A tiny in-process 9P2000.L server used to drive `Client`/`ClientFile`
//! end-to-end without a real transport. Built on `tokio::io::duplex` the
//! same way the engine's own handshake test would: the "server" half is
//! just another `AsyncRead + AsyncWrite` stream, framed identically.

use bytes::{Buf, BufMut, BytesMut};
use futures::{SinkExt, StreamExt};
use ninep::{FCall, Msg, QId, QIdType};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

fn codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_offset(0)
        .length_field_length(4)
        .length_adjustment(-4)
        .little_endian()
        .new_codec()
}

/// Spawn a task that answers every request `handler` returns `Some` for,
/// in arrival order, and drops the rest silently (used to simulate a
/// server that never answers a particular call).
pub fn spawn_server<S, F>(stream: S, mut handler: F) -> tokio::task::JoinHandle<()>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
    F: FnMut(Msg) -> Option<Msg> + Send + 'static,
{
    // Every test drives its client engine through a mock server spawned
    // here, so this is the one place to make the engine's trace/debug/warn
    // logging visible (RUST_LOG=ninep=trace cargo test -- --nocapture).
    let _ = env_logger::try_init();

    tokio::spawn(async move {
        let (r, w) = tokio::io::split(stream);
        let mut read = FramedRead::new(r, codec());
        let mut write = FramedWrite::new(w, codec());
        while let Some(Ok(bytes)) = read.next().await {
            let mut reader = bytes.reader();
            let msg = ninep::serialize::read_msg(&mut reader).expect("decode request frame");
            if let Some(reply) = handler(msg) {
                let mut buf = BytesMut::new().writer();
                ninep::serialize::write_msg(&mut buf, &reply).expect("encode reply frame");
                if write.send(buf.into_inner().freeze()).await.is_err() {
                    return;
                }
            }
        }
    })
}

/// A qid with the given path, no special type bits, version 0.
pub fn qid(path: u64) -> QId {
    QId {
        typ: QIdType::FILE,
        version: 0,
        path,
    }
}

/// Reply to `Tversion` with the given msize, echoing back the version
/// 9P2000.L clients always request.
pub fn rversion(tag: u16, msize: u32) -> Msg {
    Msg {
        tag,
        body: FCall::RVersion {
            msize,
            version: ninep::P92000L.to_owned(),
        },
    }
}
