//! The connection engine: owns the transport, multiplexes concurrent
//! calls across a single byte stream by tag, and negotiates the
//! session during the version handshake.
//!
//! # Protocol
//! 9P2000.L

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex as StdMutex,
        atomic::{AtomicBool, Ordering},
    },
};

use bytes::{Buf, BufMut, BytesMut};
use futures::{SinkExt, StreamExt};
use log::{debug, trace, warn};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::{Mutex as TokioMutex, oneshot},
};
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

use crate::{
    error::Error,
    fcall::{FCall, Msg, NOFID, NOTAG, P92000L},
    serialize,
    utils::Result,
};

/// A boxed, type-erased transport half. Boxing here is what lets
/// `Client` stay non-generic: a handle obtained from one engine has the
/// same concrete type as a handle obtained from any other, regardless
/// of whether the caller connected over TCP, a Unix socket, or an
/// in-memory duplex stream in tests.
type BoxedRead = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWrite = Box<dyn AsyncWrite + Send + Unpin>;

/// `max_frame` bounds the length field's declared payload size (the
/// frame's `size - 4`), matching spec's `size > msize` rejection. The
/// codec itself enforces only the upper bound; the lower bound (`size
/// <= 5`, i.e. a frame too short to even carry a kind byte and a tag)
/// is checked explicitly in `read_msg`, since `LengthDelimitedCodec`
/// has no minimum-length knob.
fn frame_codec(max_frame: u32) -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_offset(0)
        .length_field_length(4)
        .length_adjustment(-4)
        .max_frame_length(max_frame as usize)
        .little_endian()
        .new_codec()
}

/// A single-shot delivery slot for one outstanding tag.
type Slot = oneshot::Sender<Result<FCall>>;

struct TagTable {
    inflight: HashMap<u16, Slot>,
    next_tag: u16,
    closed: bool,
}

impl TagTable {
    fn new() -> Self {
        TagTable {
            inflight: HashMap::new(),
            next_tag: 0,
            closed: false,
        }
    }

    /// Hang up every live waiter with `ClientClosed` and mark the table
    /// closed. Idempotent: draining an already-empty map is a no-op.
    fn hangup(&mut self) {
        self.closed = true;
        for (_, tx) in self.inflight.drain() {
            let _ = tx.send(Err(Error::ClientClosed));
        }
    }
}

struct FidPool {
    allocated: std::collections::HashSet<u32>,
    next_fid: u32,
}

impl FidPool {
    fn new() -> Self {
        FidPool {
            allocated: std::collections::HashSet::new(),
            next_fid: 0,
        }
    }

    fn acquire(&mut self) -> Result<u32> {
        if self.allocated.len() >= (NOFID as usize - 1) {
            return Err(Error::FidsExhausted);
        }
        loop {
            let fid = self.next_fid;
            self.next_fid = if fid == NOFID - 1 { 0 } else { fid + 1 };
            if fid == NOFID {
                continue;
            }
            if self.allocated.insert(fid) {
                return Ok(fid);
            }
        }
    }

    fn release(&mut self, fid: u32) {
        self.allocated.remove(&fid);
    }
}

/// The client-side protocol engine for one 9P2000.L connection.
///
/// Owns the transport halves, a write mutex serializing outgoing
/// frames, the tag allocator with its in-flight delivery table, and the
/// fid allocator. Cloning an `Arc<Client>` is how callers and handles
/// share the engine; the engine itself tracks no handles (see
/// `DESIGN.md` on ownership direction).
pub struct Client {
    msize: u32,
    version: String,
    tags: Arc<StdMutex<TagTable>>,
    fids: StdMutex<FidPool>,
    write: TokioMutex<FramedWrite<BoxedWrite, LengthDelimitedCodec>>,
    closed: AtomicBool,
}

impl Client {
    /// Run the `Tversion`/`Rversion` handshake over `transport`, then
    /// spawn the reader task and return the ready engine.
    ///
    /// `requested_msize` is the caller's upper bound; the negotiated
    /// `msize` actually adopted satisfies `128 <= msize <= requested_msize`.
    /// `version` is almost always [`P92000L`] — this engine speaks no
    /// other dialect past the handshake itself.
    pub async fn connect<T>(transport: T, requested_msize: u32, version: &str) -> Result<Arc<Client>>
    where
        T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (read_half, write_half) = tokio::io::split(transport);
        let read_half: BoxedRead = Box::new(read_half);
        let write_half: BoxedWrite = Box::new(write_half);
        // Before negotiation the only bound we know is the caller's own
        // requested ceiling; it's what we'd reject an oversized Rversion
        // against anyway, since no server may offer an msize above it.
        let mut framed_read = FramedRead::new(read_half, frame_codec(requested_msize));
        let mut framed_write = FramedWrite::new(write_half, frame_codec(requested_msize));

        let req = Msg {
            tag: NOTAG,
            body: FCall::TVersion {
                msize: requested_msize,
                version: version.to_owned(),
            },
        };
        trace!("→ {:?}", req);
        if let Err(e) = send_msg(&mut framed_write, &req).await {
            let _ = framed_write.close().await;
            return Err(e);
        }

        let resp = match framed_read.next().await {
            Some(Ok(bytes)) => read_msg(bytes)?,
            Some(Err(e)) => {
                let _ = framed_write.close().await;
                return Err(classify_frame_error(e));
            }
            None => {
                let _ = framed_write.close().await;
                return Err(Error::ClientClosed);
            }
        };
        trace!("← {:?}", resp);

        if resp.tag != NOTAG {
            let _ = framed_write.close().await;
            return Err(Error::Protocol(
                "Rversion carried a tag other than NOTAG".into(),
            ));
        }
        let (negotiated_msize, negotiated_version) = match resp.body {
            FCall::RVersion { msize, version } => (msize, version),
            FCall::RlError { ecode } => {
                let _ = framed_write.close().await;
                return Err(Error::from_errno(ecode));
            }
            _ => {
                let _ = framed_write.close().await;
                return Err(Error::Protocol("expected Rversion".into()));
            }
        };
        if negotiated_version != version {
            let _ = framed_write.close().await;
            return Err(Error::Protocol(format!(
                "version negotiation failed: requested {:?}, server offered {:?}",
                version, negotiated_version
            )));
        }
        if !(128..=requested_msize).contains(&negotiated_msize) {
            let _ = framed_write.close().await;
            return Err(Error::Protocol(format!(
                "negotiated msize {} outside of [128, {}]",
                negotiated_msize, requested_msize
            )));
        }

        // Rebind both halves' length bound to the negotiated msize now
        // that it's known, so oversized frames are rejected against the
        // value actually in force for the rest of the connection's life
        // rather than the caller's original ceiling.
        framed_read
            .decoder_mut()
            .set_max_frame_length(negotiated_msize as usize);
        framed_write
            .encoder_mut()
            .set_max_frame_length(negotiated_msize as usize);

        let tags = Arc::new(StdMutex::new(TagTable::new()));

        let client = Arc::new(Client {
            msize: negotiated_msize,
            version: negotiated_version,
            tags: tags.clone(),
            fids: StdMutex::new(FidPool::new()),
            write: TokioMutex::new(framed_write),
            closed: AtomicBool::new(false),
        });

        tokio::spawn(reader_task(framed_read, tags));

        Ok(client)
    }

    /// Negotiated maximum message size for this connection.
    pub fn msize(&self) -> u32 {
        self.msize
    }

    /// Negotiated protocol version string (always [`P92000L`] on success).
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Allocate a fid slot. Released via [`Client::release_fid`] once the
    /// caller is done with it — on every path, including failure.
    pub fn acquire_fid(&self) -> Result<u32> {
        self.fids.lock().unwrap().acquire()
    }

    /// Release a fid slot previously returned by [`Client::acquire_fid`].
    pub fn release_fid(&self, fid: u32) {
        self.fids.lock().unwrap().release(fid);
    }

    fn acquire_tag(&self) -> Result<(u16, oneshot::Receiver<Result<FCall>>)> {
        let mut table = self.tags.lock().unwrap();
        if table.closed {
            return Err(Error::ClientClosed);
        }
        if table.inflight.len() >= (NOTAG as usize - 1) {
            return Err(Error::TagsExhausted);
        }
        loop {
            let tag = table.next_tag;
            table.next_tag = if tag == NOTAG - 1 { 0 } else { tag + 1 };
            if tag == NOTAG {
                continue;
            }
            if let std::collections::hash_map::Entry::Vacant(e) = table.inflight.entry(tag) {
                let (tx, rx) = oneshot::channel();
                e.insert(tx);
                return Ok((tag, rx));
            }
        }
    }

    fn release_tag(&self, tag: u16) {
        self.tags.lock().unwrap().inflight.remove(&tag);
    }

    /// Issue one request and await its matching response.
    ///
    /// Allocates a tag, stamps it on `fcall`, writes the frame, and
    /// waits on that tag's delivery slot. On a write failure the tag is
    /// released immediately (see `DESIGN.md`'s Open Question resolution)
    /// rather than left for the reader to discover.
    pub async fn call(&self, fcall: FCall) -> Result<FCall> {
        let (tag, rx) = self.acquire_tag()?;
        let msg = Msg { tag, body: fcall };
        trace!("→ {:?}", msg);

        if let Err(e) = self.write_msg(&msg).await {
            self.release_tag(tag);
            return Err(e);
        }

        match rx.await {
            Ok(result) => result,
            Err(_) => Err(Error::ClientClosed),
        }
    }

    async fn write_msg(&self, msg: &Msg) -> Result<()> {
        let mut buf = BytesMut::new().writer();
        serialize::write_msg(&mut buf, msg)?;
        let frame = buf.into_inner().freeze();
        let mut w = self.write.lock().await;
        w.send(frame).await?;
        Ok(())
    }

    /// Close the connection. Idempotent. Shuts down the write half and
    /// hangs up every outstanding call with `ClientClosed`; the reader
    /// task exits on its next read (an EOF or error on the now-closed
    /// stream).
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        {
            let mut w = self.write.lock().await;
            let _ = w.close().await;
        }
        self.tags.lock().unwrap().hangup();
        debug!("client engine closed");
    }
}

/// `bytes` is the frame payload with the 4-byte length field already
/// stripped by `LengthDelimitedCodec`; the declared wire `size` is
/// therefore `bytes.len() + 4`. Per spec.md §4.1/§8, a declared `size
/// <= 5` is rejected here at the framing layer itself, without
/// advancing into `serialize::read_msg`; a `size` of 6 or more but
/// still too short to hold a real message (e.g. missing the tag) is
/// left to fail there instead, as an ordinary short-buffer decode
/// error.
fn read_msg(bytes: bytes::BytesMut) -> Result<Msg> {
    if bytes.len() + 4 <= 5 {
        return Err(Error::Codec(format!(
            "frame size {} is at or below the minimum of 5",
            bytes.len() + 4
        )));
    }
    serialize::read_msg(&mut bytes.reader()).map_err(|e| Error::Codec(e.to_string()))
}

async fn send_msg(
    framed: &mut FramedWrite<BoxedWrite, LengthDelimitedCodec>,
    msg: &Msg,
) -> Result<()> {
    let mut buf = BytesMut::new().writer();
    serialize::write_msg(&mut buf, msg).map_err(|e| Error::Codec(e.to_string()))?;
    framed.send(buf.into_inner().freeze()).await?;
    Ok(())
}

/// `LengthDelimitedCodec` reports an over-`max_frame_length` frame as an
/// `io::Error` of kind `InvalidData` ("frame size too big"), indistinguishable
/// at the type level from a genuine transport failure. Since every other
/// read error this codec can produce (UnexpectedEof, ConnectionReset, ...)
/// carries a different kind, this reclassifies that one case as a framing
/// violation (`Error::Codec`) rather than a dead transport (`Error::Io`).
fn classify_frame_error(e: std::io::Error) -> Error {
    if e.kind() == std::io::ErrorKind::InvalidData {
        Error::Codec(e.to_string())
    } else {
        Error::Io(e)
    }
}

/// The dedicated reader task: demultiplexes responses back to their
/// waiting callers by tag. Exactly one of these runs per connection.
async fn reader_task(
    mut framed: FramedRead<BoxedRead, LengthDelimitedCodec>,
    tags: Arc<StdMutex<TagTable>>,
) {
    loop {
        let bytes = match framed.next().await {
            Some(Ok(b)) => b,
            Some(Err(e)) => {
                warn!("transport read error, closing connection: {}", e);
                tags.lock().unwrap().hangup();
                return;
            }
            None => {
                warn!("transport closed by peer");
                tags.lock().unwrap().hangup();
                return;
            }
        };

        let msg = match read_msg(bytes) {
            Ok(m) => m,
            Err(e) => {
                warn!("codec error decoding frame, closing connection: {}", e);
                tags.lock().unwrap().hangup();
                return;
            }
        };
        trace!("← {:?}", msg);

        let mut table = tags.lock().unwrap();
        if let Some(tx) = table.inflight.remove(&msg.tag) {
            drop(table);
            // A failed send means the slot's receiver is gone already
            // (the caller who owned this tag has moved on); nothing to do.
            let _ = tx.send(Ok(msg.body));
        } else {
            debug!("dropping late response for released tag {}", msg.tag);
        }
    }
}

/// `true` if `version` is the only dialect this engine attaches to.
pub(crate) fn is_supported_version(version: &str) -> bool {
    version == P92000L
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_msg_rejects_a_declared_size_at_or_below_five() {
        // A 1-byte payload is wire size 5 — rejected at the framing
        // layer itself, before any attempt to decode a message out of it.
        let err = read_msg(BytesMut::from(&b"\x78"[..])).unwrap_err();
        assert!(matches!(err, Error::Codec(_)));
    }

    #[test]
    fn read_msg_rejects_a_frame_too_short_to_hold_a_tag() {
        // Wire size 6: past the framing-layer floor, but still one byte
        // short of a full kind+tag; fails inside serialize::read_msg
        // instead, as an ordinary decode error.
        let err = read_msg(BytesMut::from(&b"\x78\x00"[..])).unwrap_err();
        assert!(matches!(err, Error::Codec(_)));
    }

    #[test]
    fn read_msg_accepts_the_minimum_viable_frame() {
        // RClunk: kind=121 (0x79), tag=0xbeef, empty body. Payload is 3
        // bytes, wire size 7 — the smallest frame any real message
        // produces.
        let result = read_msg(BytesMut::from(&b"\x79\xef\xbe"[..]));
        assert!(result.is_ok());
    }

    #[test]
    fn classify_frame_error_distinguishes_oversize_from_transport_failure() {
        let oversize = std::io::Error::new(std::io::ErrorKind::InvalidData, "frame size too big");
        assert!(matches!(classify_frame_error(oversize), Error::Codec(_)));

        let reset = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert!(matches!(classify_frame_error(reset), Error::Io(_)));
    }
}
