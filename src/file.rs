//! The handle layer: `attach`, the attached-root handle `ClientFile`,
//! and the operations built on it (walk, open, create, read/write,
//! mkdir, rename, remove, getattr/setattr, fsync, readdir, statfs,
//! advisory locking) plus the lazy `DirIter` directory iterator.
//!
//! # Protocol
//! 9P2000.L

use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use crate::{
    client::{self, Client},
    error::Error,
    fcall::{
        DirEntry, FCall, Flock, GetAttrMask, LockStatus, NOFID, NONUNAME, QId, SetAttr,
        SetAttrMask, StatFs,
    },
    fcall::{Data, IOHDRSZ, READDIRHDRSZ},
    utils::Result,
};

/// Names are walked in batches of at most this many at a time, per
/// `Twalk`'s wire limit.
const WALK_BATCH: usize = 16;

/// An attached fid paired with the connection it was issued on.
///
/// `clunk`/`remove` run exactly once regardless of which is called, how
/// many times, or from how many places: a `ClientFile` dropped without
/// either leaks the fid on the server, so callers that want a clean
/// teardown must call one explicitly.
pub struct ClientFile {
    client: Arc<Client>,
    fid: u32,
    clunked: AtomicBool,
}

impl ClientFile {
    fn new(client: Arc<Client>, fid: u32) -> Self {
        ClientFile {
            client,
            fid,
            clunked: AtomicBool::new(false),
        }
    }

    /// The fid this handle denotes on the server.
    pub fn fid(&self) -> u32 {
        self.fid
    }

    async fn finish(&self, remove: bool) -> Result<()> {
        if self.clunked.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let fid = self.fid;
        let result = if remove {
            self.client.call(FCall::TRemove { fid }).await
        } else {
            self.client.call(FCall::TClunk { fid }).await
        };
        self.client.release_fid(fid);
        match result {
            Ok(FCall::RRemove) | Ok(FCall::RClunk) => Ok(()),
            Ok(FCall::RlError { ecode }) => Err(Error::from_errno(ecode)),
            Ok(_) => Err(Error::Protocol("expected Rclunk or Rremove".into())),
            Err(e) => Err(e),
        }
    }

    /// Forget this fid on the server without removing the file.
    pub async fn clunk(&self) -> Result<()> {
        self.finish(false).await
    }

    /// Remove the file this fid denotes, then forget the fid.
    pub async fn remove(&self) -> Result<()> {
        self.finish(true).await
    }

    async fn walk_once(&self, names: &[String]) -> Result<(ClientFile, Vec<QId>)> {
        let newfid = self.client.acquire_fid()?;
        let result = self
            .client
            .call(FCall::TWalk {
                fid: self.fid,
                newfid,
                wnames: names.to_vec(),
            })
            .await;
        match result {
            Ok(FCall::RWalk { wqids }) => {
                if wqids.len() != names.len() {
                    self.client.release_fid(newfid);
                    return Err(Error::ShortWalk(wqids));
                }
                Ok((ClientFile::new(self.client.clone(), newfid), wqids))
            }
            Ok(FCall::RlError { ecode }) => {
                self.client.release_fid(newfid);
                Err(Error::from_errno(ecode))
            }
            Ok(_) => {
                self.client.release_fid(newfid);
                Err(Error::Protocol("expected Rwalk".into()))
            }
            Err(e) => {
                self.client.release_fid(newfid);
                Err(e)
            }
        }
    }

    /// Derive a new handle by walking `names` from this one.
    ///
    /// Processes `names` in batches of at most 16 (the wire limit per
    /// `Twalk`); after a successful batch the previous intermediate
    /// handle is clunked (never the original `self`). If the server
    /// returns fewer qids than a batch requested, the new fid was not
    /// installed; the engine releases it and returns
    /// [`Error::ShortWalk`] carrying every qid resolved so far,
    /// including qids from earlier successful batches.
    pub async fn walk(&self, names: &[String]) -> Result<(ClientFile, Vec<QId>)> {
        if names.is_empty() {
            return self.walk_once(&[]).await;
        }

        let mut current: Option<ClientFile> = None;
        let mut qids = Vec::with_capacity(names.len());
        let mut remaining = names;

        loop {
            let batch_len = remaining.len().min(WALK_BATCH);
            let (batch, rest) = remaining.split_at(batch_len);
            remaining = rest;

            let source = current.as_ref().unwrap_or(self);
            match source.walk_once(batch).await {
                Ok((new_handle, new_qids)) => {
                    qids.extend(new_qids);
                    if let Some(prev) = current.take() {
                        let _ = prev.clunk().await;
                    }
                    current = Some(new_handle);
                }
                Err(Error::ShortWalk(partial)) => {
                    qids.extend(partial);
                    if let Some(prev) = current.take() {
                        let _ = prev.clunk().await;
                    }
                    return Err(Error::ShortWalk(qids));
                }
                Err(e) => {
                    if let Some(prev) = current.take() {
                        let _ = prev.clunk().await;
                    }
                    return Err(e);
                }
            }

            if remaining.is_empty() {
                break;
            }
        }

        Ok((current.expect("at least one successful batch"), qids))
    }

    /// Open this fid for I/O with the given `L_O_*` flags.
    pub async fn open(&self, flags: u32) -> Result<QId> {
        match self.client.call(FCall::TlOpen { fid: self.fid, flags }).await {
            Ok(FCall::RlOpen { qid, .. }) => Ok(qid),
            Ok(FCall::RlError { ecode }) => Err(Error::from_errno(ecode)),
            Ok(_) => Err(Error::Protocol("expected Rlopen".into())),
            Err(e) => Err(e),
        }
    }

    /// Create `name` under this (directory) fid and open it. The fid
    /// now denotes the newly created file, not the directory — walk
    /// again from a sibling handle to get the directory back.
    pub async fn create(&self, name: &str, flags: u32, mode: u32, gid: u32) -> Result<(QId, u32)> {
        match self
            .client
            .call(FCall::TlCreate {
                fid: self.fid,
                name: name.to_owned(),
                flags,
                mode,
                gid,
            })
            .await
        {
            Ok(FCall::RlCreate { qid, iounit }) => Ok((qid, iounit)),
            Ok(FCall::RlError { ecode }) => Err(Error::from_errno(ecode)),
            Ok(_) => Err(Error::Protocol("expected Rlcreate".into())),
            Err(e) => Err(e),
        }
    }

    /// Read into `buf` at `offset`. The request is capped at
    /// `msize - IOHDRSZ`; a short read is valid and returned as such.
    pub async fn read(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let cap = (self.client.msize().saturating_sub(IOHDRSZ)) as usize;
        let want = buf.len().min(cap);
        match self
            .client
            .call(FCall::TRead {
                fid: self.fid,
                offset,
                count: want as u32,
            })
            .await
        {
            Ok(FCall::RRead { data }) => {
                if data.0.len() > want {
                    return Err(Error::Protocol("Rread returned more data than requested".into()));
                }
                buf[..data.0.len()].copy_from_slice(&data.0);
                Ok(data.0.len())
            }
            Ok(FCall::RlError { ecode }) => Err(Error::from_errno(ecode)),
            Ok(_) => Err(Error::Protocol("expected Rread".into())),
            Err(e) => Err(e),
        }
    }

    /// Write `buf` at `offset`. The request is capped at
    /// `msize - IOHDRSZ`; a short write is valid and returned as such
    /// (the server's `count`, which may be less than `buf.len()`).
    pub async fn write(&self, offset: u64, buf: &[u8]) -> Result<usize> {
        let cap = (self.client.msize().saturating_sub(IOHDRSZ)) as usize;
        let chunk = &buf[..buf.len().min(cap)];
        match self
            .client
            .call(FCall::TWrite {
                fid: self.fid,
                offset,
                data: Data(chunk.to_vec()),
            })
            .await
        {
            Ok(FCall::RWrite { count }) => Ok(count as usize),
            Ok(FCall::RlError { ecode }) => Err(Error::from_errno(ecode)),
            Ok(_) => Err(Error::Protocol("expected Rwrite".into())),
            Err(e) => Err(e),
        }
    }

    /// Create a directory named `name` under this (directory) fid.
    /// Returns the child's qid; walk to it to get a handle.
    pub async fn mkdir(&self, name: &str, mode: u32, gid: u32) -> Result<QId> {
        match self
            .client
            .call(FCall::TMkDir {
                dfid: self.fid,
                name: name.to_owned(),
                mode,
                gid,
            })
            .await
        {
            Ok(FCall::RMkDir { qid }) => Ok(qid),
            Ok(FCall::RlError { ecode }) => Err(Error::from_errno(ecode)),
            Ok(_) => Err(Error::Protocol("expected Rmkdir".into())),
            Err(e) => Err(e),
        }
    }

    /// Rename this file to `newname` under `newparent`. This handle's
    /// fid remains valid and now denotes the renamed file.
    pub async fn rename(&self, newparent: &ClientFile, newname: &str) -> Result<()> {
        match self
            .client
            .call(FCall::TRename {
                fid: self.fid,
                dfid: newparent.fid,
                name: newname.to_owned(),
            })
            .await
        {
            Ok(FCall::RRename) => Ok(()),
            Ok(FCall::RlError { ecode }) => Err(Error::from_errno(ecode)),
            Ok(_) => Err(Error::Protocol("expected Rrename".into())),
            Err(e) => Err(e),
        }
    }

    /// Fetch the attributes selected by `mask`.
    pub async fn getattr(&self, mask: GetAttrMask) -> Result<(QId, crate::fcall::Stat)> {
        match self
            .client
            .call(FCall::TGetAttr {
                fid: self.fid,
                req_mask: mask,
            })
            .await
        {
            Ok(FCall::RGetAttr { qid, stat, .. }) => Ok((qid, stat)),
            Ok(FCall::RlError { ecode }) => Err(Error::from_errno(ecode)),
            Ok(_) => Err(Error::Protocol("expected Rgetattr".into())),
            Err(e) => Err(e),
        }
    }

    /// Apply the fields of `stat` selected by `valid`.
    pub async fn setattr(&self, valid: SetAttrMask, stat: SetAttr) -> Result<()> {
        match self
            .client
            .call(FCall::TSetAttr {
                fid: self.fid,
                valid,
                stat,
            })
            .await
        {
            Ok(FCall::RSetAttr) => Ok(()),
            Ok(FCall::RlError { ecode }) => Err(Error::from_errno(ecode)),
            Ok(_) => Err(Error::Protocol("expected Rsetattr".into())),
            Err(e) => Err(e),
        }
    }

    /// Filesystem-level statistics for the tree this fid belongs to.
    pub async fn statfs(&self) -> Result<StatFs> {
        match self.client.call(FCall::TStatFs { fid: self.fid }).await {
            Ok(FCall::RStatFs { statfs }) => Ok(statfs),
            Ok(FCall::RlError { ecode }) => Err(Error::from_errno(ecode)),
            Ok(_) => Err(Error::Protocol("expected Rstatfs".into())),
            Err(e) => Err(e),
        }
    }

    /// Flush this file's data to stable storage on the server.
    pub async fn fsync(&self) -> Result<()> {
        match self.client.call(FCall::TFSync { fid: self.fid }).await {
            Ok(FCall::RFSync) => Ok(()),
            Ok(FCall::RlError { ecode }) => Err(Error::from_errno(ecode)),
            Ok(_) => Err(Error::Protocol("expected Rfsync".into())),
            Err(e) => Err(e),
        }
    }

    /// One `Treaddir` call. `count` is capped at `msize - READDIRHDRSZ`.
    /// Prefer [`ClientFile::dir_iter`] for iterating a whole directory.
    pub async fn readdir(&self, offset: u64, count: u32) -> Result<Vec<DirEntry>> {
        let cap = self.client.msize().saturating_sub(READDIRHDRSZ);
        let count = count.min(cap);
        match self
            .client
            .call(FCall::TReadDir {
                fid: self.fid,
                offset,
                count,
            })
            .await
        {
            Ok(FCall::RReadDir { data }) => Ok(data.data),
            Ok(FCall::RlError { ecode }) => Err(Error::from_errno(ecode)),
            Ok(_) => Err(Error::Protocol("expected Rreaddir".into())),
            Err(e) => Err(e),
        }
    }

    /// A lazy, restartable iterator over this directory's entries.
    /// Restarting means constructing a fresh iterator; this one cannot
    /// rewind.
    pub fn dir_iter(&self) -> DirIter<'_> {
        DirIter::new(self)
    }

    /// Place or release an advisory lock.
    ///
    /// `wait` selects how a `BLOCKED` status is handled: `NonBlocking`
    /// surfaces it immediately to the caller as "would block"
    /// ([`LockStatus::BLOCKED`]); `Blocking` retries with a 1s backoff
    /// (matching the reference client) until `SUCCESS` or a
    /// non-retriable status (`ERROR`/`GRACE`).
    pub async fn lock(&self, flock: Flock, wait: LockWait) -> Result<LockStatus> {
        loop {
            match self
                .client
                .call(FCall::TLock {
                    fid: self.fid,
                    flock: flock.clone(),
                })
                .await
            {
                Ok(FCall::RLock { status }) => {
                    if status == LockStatus::BLOCKED && wait == LockWait::Blocking {
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        continue;
                    }
                    return Ok(status);
                }
                Ok(FCall::RlError { ecode }) => return Err(Error::from_errno(ecode)),
                Ok(_) => return Err(Error::Protocol("expected Rlock".into())),
                Err(e) => return Err(e),
            }
        }
    }
}

/// How [`ClientFile::lock`] should handle a `BLOCKED` reply.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LockWait {
    /// Surface `BLOCKED` to the caller as "would block" after one try.
    NonBlocking,
    /// Retry with a 1s backoff until `SUCCESS` or a non-retriable status.
    Blocking,
}

/// Attach `uname`/`aname` on `client`'s tree, returning the root handle
/// and its qid. Requires the connection to have negotiated 9P2000.L.
pub async fn attach(client: Arc<Client>, aname: &str, uname: &str) -> Result<(ClientFile, QId)> {
    if !client::is_supported_version(client.version()) {
        return Err(Error::Protocol(format!(
            "cannot attach to a 9P2000.L mount over negotiated version {:?}",
            client.version()
        )));
    }
    let fid = client.acquire_fid()?;
    let result = client
        .call(FCall::TAttach {
            fid,
            afid: NOFID,
            uname: uname.to_owned(),
            aname: aname.to_owned(),
            n_uname: NONUNAME,
        })
        .await;
    match result {
        Ok(FCall::RAttach { qid }) => Ok((ClientFile::new(client, fid), qid)),
        Ok(FCall::RlError { ecode }) => {
            client.release_fid(fid);
            Err(Error::from_errno(ecode))
        }
        Ok(_) => {
            client.release_fid(fid);
            Err(Error::Protocol("expected Rattach".into()))
        }
        Err(e) => {
            client.release_fid(fid);
            Err(e)
        }
    }
}

/// A lazy, restartable directory cursor built on successive `readdir`
/// calls, with one-entry pushback for readers that look ahead.
pub struct DirIter<'a> {
    file: &'a ClientFile,
    offset: u64,
    buffered: VecDeque<DirEntry>,
    pushback: Option<DirEntry>,
    exhausted: bool,
}

impl<'a> DirIter<'a> {
    fn new(file: &'a ClientFile) -> Self {
        DirIter {
            file,
            offset: 0,
            buffered: VecDeque::new(),
            pushback: None,
            exhausted: false,
        }
    }

    /// Push `entry` back so the next call to [`DirIter::next`] returns
    /// it again. Holds at most one entry; a second `unget` before the
    /// first is consumed replaces it.
    pub fn unget(&mut self, entry: DirEntry) {
        self.pushback = Some(entry);
    }

    /// The next directory entry, or `None` once the directory is
    /// exhausted.
    pub async fn next(&mut self) -> Result<Option<DirEntry>> {
        if let Some(entry) = self.pushback.take() {
            return Ok(Some(entry));
        }
        if let Some(entry) = self.buffered.pop_front() {
            self.offset = entry.offset;
            return Ok(Some(entry));
        }
        if self.exhausted {
            return Ok(None);
        }

        let count = self.file.client.msize().saturating_sub(READDIRHDRSZ);
        let entries = self.file.readdir(self.offset, count).await?;
        if entries.is_empty() {
            self.exhausted = true;
            return Ok(None);
        }
        self.buffered.extend(entries);
        let entry = self.buffered.pop_front().expect("just populated");
        self.offset = entry.offset;
        Ok(Some(entry))
    }
}
