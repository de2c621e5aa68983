#![forbid(unsafe_code)]
//! Client-side 9P2000.L protocol engine.
//!
//! This crate implements the client half of the 9P2000.L remote
//! file-system protocol: the wire codec, a request/response
//! multiplexing engine that drives a single transport connection, and a
//! handle-oriented file API layered above it.
//!
//! # Overview
//!
//! 9P was originally developed for the Plan 9 distributed operating
//! system. 9P2000.L is an extended variant adding Linux-specific
//! semantics (proper permission handling, symbolic links, POSIX-like
//! `stat`/`statfs`, advisory locking).
//!
//! This crate is the *engine*, not a mountable filesystem: it takes an
//! already-connected, ordered byte stream (a `TcpStream`, a Unix
//! socket, anything implementing `AsyncRead + AsyncWrite`) and performs
//! the version handshake, then hands back a [`client::Client`] that
//! [`file::attach`] turns into a [`file::ClientFile`] root handle.
//! Building a FUSE adapter, a CLI, or any other consumer of the file
//! API is explicitly out of scope here; this crate only exposes the
//! handle API those adapters would map OS semantics onto.
//!
//! # Getting started
//!
//! ```no_run
//! use ninep::{client::Client, file};
//!
//! # async fn go() -> ninep::Result<()> {
//! let stream = tokio::net::TcpStream::connect("127.0.0.1:564").await?;
//! let client = Client::connect(stream, 65536, ninep::fcall::P92000L).await?;
//!
//! let (root, _qid) = file::attach(client, "/export", "alice").await?;
//! let (hello, _qids) = root.walk(&["hello".to_owned()]).await?;
//! hello.open(0 /* L_O_RDONLY */).await?;
//!
//! let mut buf = vec![0u8; 4096];
//! let n = hello.read(0, &mut buf).await?;
//! println!("read {} bytes", n);
//!
//! hello.clunk().await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Message flow
//!
//! 1. **Version negotiation**: [`client::Client::connect`] sends
//!    `Tversion`, expects `Rversion`, and adopts the server's `msize`
//!    (never higher than requested).
//! 2. **Attach**: [`file::attach`] associates a fresh fid with a root
//!    of the server's tree.
//! 3. **Operations**: [`file::ClientFile`] methods (`walk`, `open`,
//!    `read`, `write`, `mkdir`, `rename`, `getattr`/`setattr`,
//!    `readdir`, `fsync`, `lock`, `statfs`, …).
//! 4. **Cleanup**: [`file::ClientFile::clunk`] or
//!    [`file::ClientFile::remove`] release the fid, exactly once,
//!    however they're reached.
//!
//! # Fid and tag management
//!
//! A "fid" is a 32-bit handle the client assigns to denote an open path
//! or walked location on the server; a "tag" is a 16-bit per-request
//! identifier correlating a request with its response. Both are
//! allocated from bounded pools owned by [`client::Client`] and
//! released on every code path — success, protocol error, or transport
//! death — so a long-lived connection never leaks either.
//!
//! # Error handling
//!
//! Every fallible operation returns [`error::Error`]. A response of
//! `Rlerror` is not treated as a crate-internal error condition; it
//! surfaces as [`error::Error::ServerError`] carrying the raw Linux
//! errno, so callers can treat e.g. `ENOENT` as ordinary data rather
//! than an exceptional failure.
//!
//! # Concurrency
//!
//! [`client::Client`] is safe to share behind an `Arc` and call from any
//! number of concurrent tasks: `call` suspends on a write mutex (to
//! serialize outgoing frames) and a per-tag delivery slot, never while
//! holding the tag table lock. One dedicated reader task per connection
//! demultiplexes responses back to their waiters by tag; the server may
//! answer out of order.
//!
//! # Safety
//!
//! This crate forbids unsafe code (`#![forbid(unsafe_code)]`).
pub mod client;
pub mod error;
pub mod fcall;
pub mod file;
pub mod serialize;
#[macro_use]
pub mod utils;

pub use crate::client::Client;
pub use crate::error::Error;
pub use crate::error::errno;
pub use crate::error::string as errstr;
pub use crate::fcall::*;
pub use crate::file::{ClientFile, DirIter, LockWait, attach};
pub use crate::utils::Result;
