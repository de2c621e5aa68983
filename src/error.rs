//! Error kinds produced by the connection engine and handle layer.

use std::fmt;

use crate::fcall::QId;

/// Errors produced anywhere in the client engine.
#[derive(Debug)]
pub enum Error {
    /// A read or write on the underlying transport failed.
    Io(::std::io::Error),
    /// The engine is closed, locally or because the transport died.
    ClientClosed,
    /// The 16-bit tag pool is exhausted (`0xFFFE` calls already in flight).
    TagsExhausted,
    /// The 32-bit fid pool is exhausted.
    FidsExhausted,
    /// A message failed to encode or decode: a value too long on encode
    /// (an over-long string, a walk name list over 16 entries, an
    /// over-long byte blob), a short/corrupt buffer on decode, or a
    /// framed size field out of the `(5, msize]` range. Distinct from
    /// [`Error::Io`], which is a genuine transport read/write failure —
    /// a `Codec` error means bytes arrived (or were about to be sent)
    /// but didn't parse.
    Codec(String),
    /// A well-formed frame arrived carrying a message kind the caller did
    /// not expect (e.g. a `Twalk` answered with `Rclunk`).
    Protocol(String),
    /// A walk returned fewer qids than names requested; carries the qids
    /// successfully resolved so far.
    ShortWalk(Vec<QId>),
    /// The server replied with `Rlerror`.
    ServerError { errno: u32, message: String },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "transport error: {}", e),
            Error::ClientClosed => write!(f, "client closed"),
            Error::TagsExhausted => write!(f, "tags exhausted"),
            Error::FidsExhausted => write!(f, "fids exhausted"),
            Error::Codec(msg) => write!(f, "codec error: {}", msg),
            Error::Protocol(msg) => write!(f, "protocol error: {}", msg),
            Error::ShortWalk(qids) => {
                write!(f, "short walk, {} qid(s) resolved", qids.len())
            }
            Error::ServerError { errno, message } => write!(f, "{} (errno {})", message, errno),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<::std::io::Error> for Error {
    fn from(e: ::std::io::Error) -> Error {
        Error::Io(e)
    }
}

impl Error {
    /// Build a `ServerError` from a raw `Rlerror.ecode`, rendering the
    /// canonical text via [`string`].
    pub fn from_errno(ecode: u32) -> Error {
        Error::ServerError {
            errno: ecode,
            message: string(ecode),
        }
    }
}

/// Linux-amd64 errno numbers, as carried on the wire by `Rlerror.ecode`.
///
/// The engine never maps these to local-OS equivalents (9P2000.L embeds
/// Linux numbers regardless of client platform); that translation, if
/// needed, is an adapter's job.
pub mod errno {
    pub const E2BIG: u32 = 0x7;
    pub const EACCES: u32 = 0xd;
    pub const EADDRINUSE: u32 = 0x62;
    pub const EADDRNOTAVAIL: u32 = 0x63;
    pub const EADV: u32 = 0x44;
    pub const EAFNOSUPPORT: u32 = 0x61;
    pub const EAGAIN: u32 = 0xb;
    pub const EALREADY: u32 = 0x72;
    pub const EBADE: u32 = 0x34;
    pub const EBADF: u32 = 0x9;
    pub const EBADFD: u32 = 0x4d;
    pub const EBADMSG: u32 = 0x4a;
    pub const EBADR: u32 = 0x35;
    pub const EBADRQC: u32 = 0x38;
    pub const EBADSLT: u32 = 0x39;
    pub const EBFONT: u32 = 0x3b;
    pub const EBUSY: u32 = 0x10;
    pub const ECANCELED: u32 = 0x7d;
    pub const ECHILD: u32 = 0xa;
    pub const ECHRNG: u32 = 0x2c;
    pub const ECOMM: u32 = 0x46;
    pub const ECONNABORTED: u32 = 0x67;
    pub const ECONNREFUSED: u32 = 0x6f;
    pub const ECONNRESET: u32 = 0x68;
    pub const EDEADLK: u32 = 0x23;
    pub const EDEADLOCK: u32 = 0x23;
    pub const EDESTADDRREQ: u32 = 0x59;
    pub const EDOM: u32 = 0x21;
    pub const EDOTDOT: u32 = 0x49;
    pub const EDQUOT: u32 = 0x7a;
    pub const EEXIST: u32 = 0x11;
    pub const EFAULT: u32 = 0xe;
    pub const EFBIG: u32 = 0x1b;
    pub const EHOSTDOWN: u32 = 0x70;
    pub const EHOSTUNREACH: u32 = 0x71;
    pub const EHWPOISON: u32 = 0x85;
    pub const EIDRM: u32 = 0x2b;
    pub const EILSEQ: u32 = 0x54;
    pub const EINPROGRESS: u32 = 0x73;
    pub const EINTR: u32 = 0x4;
    pub const EINVAL: u32 = 0x16;
    pub const EIO: u32 = 0x5;
    pub const EISCONN: u32 = 0x6a;
    pub const EISDIR: u32 = 0x15;
    pub const EISNAM: u32 = 0x78;
    pub const EKEYEXPIRED: u32 = 0x7f;
    pub const EKEYREJECTED: u32 = 0x81;
    pub const EKEYREVOKED: u32 = 0x80;
    pub const EL2HLT: u32 = 0x33;
    pub const EL2NSYNC: u32 = 0x2d;
    pub const EL3HLT: u32 = 0x2e;
    pub const EL3RST: u32 = 0x2f;
    pub const ELIBACC: u32 = 0x4f;
    pub const ELIBBAD: u32 = 0x50;
    pub const ELIBEXEC: u32 = 0x53;
    pub const ELIBMAX: u32 = 0x52;
    pub const ELIBSCN: u32 = 0x51;
    pub const ELNRNG: u32 = 0x30;
    pub const ELOOP: u32 = 0x28;
    pub const EMEDIUMTYPE: u32 = 0x7c;
    pub const EMFILE: u32 = 0x18;
    pub const EMLINK: u32 = 0x1f;
    pub const EMSGSIZE: u32 = 0x5a;
    pub const EMULTIHOP: u32 = 0x48;
    pub const ENAMETOOLONG: u32 = 0x24;
    pub const ENAVAIL: u32 = 0x77;
    pub const ENETDOWN: u32 = 0x64;
    pub const ENETRESET: u32 = 0x66;
    pub const ENETUNREACH: u32 = 0x65;
    pub const ENFILE: u32 = 0x17;
    pub const ENOANO: u32 = 0x37;
    pub const ENOBUFS: u32 = 0x69;
    pub const ENOCSI: u32 = 0x32;
    pub const ENODATA: u32 = 0x3d;
    pub const ENODEV: u32 = 0x13;
    pub const ENOENT: u32 = 0x2;
    pub const ENOEXEC: u32 = 0x8;
    pub const ENOKEY: u32 = 0x7e;
    pub const ENOLCK: u32 = 0x25;
    pub const ENOLINK: u32 = 0x43;
    pub const ENOMEDIUM: u32 = 0x7b;
    pub const ENOMEM: u32 = 0xc;
    pub const ENOMSG: u32 = 0x2a;
    pub const ENONET: u32 = 0x40;
    pub const ENOPKG: u32 = 0x41;
    pub const ENOPROTOOPT: u32 = 0x5c;
    pub const ENOSPC: u32 = 0x1c;
    pub const ENOSR: u32 = 0x3f;
    pub const ENOSTR: u32 = 0x3c;
    pub const ENOSYS: u32 = 0x26;
    pub const ENOTBLK: u32 = 0xf;
    pub const ENOTCONN: u32 = 0x6b;
    pub const ENOTDIR: u32 = 0x14;
    pub const ENOTEMPTY: u32 = 0x27;
    pub const ENOTNAM: u32 = 0x76;
    pub const ENOTRECOVERABLE: u32 = 0x83;
    pub const ENOTSOCK: u32 = 0x58;
    pub const ENOTSUP: u32 = 0x5f;
    pub const ENOTTY: u32 = 0x19;
    pub const ENOTUNIQ: u32 = 0x4c;
    pub const ENXIO: u32 = 0x6;
    pub const EOPNOTSUPP: u32 = 0x5f;
    pub const EOVERFLOW: u32 = 0x4b;
    pub const EOWNERDEAD: u32 = 0x82;
    pub const EPERM: u32 = 0x1;
    pub const EPFNOSUPPORT: u32 = 0x60;
    pub const EPIPE: u32 = 0x20;
    pub const EPROTO: u32 = 0x47;
    pub const EPROTONOSUPPORT: u32 = 0x5d;
    pub const EPROTOTYPE: u32 = 0x5b;
    pub const ERANGE: u32 = 0x22;
    pub const EREMCHG: u32 = 0x4e;
    pub const EREMOTE: u32 = 0x42;
    pub const EREMOTEIO: u32 = 0x79;
    pub const ERESTART: u32 = 0x55;
    pub const ERFKILL: u32 = 0x84;
    pub const EROFS: u32 = 0x1e;
    pub const ESHUTDOWN: u32 = 0x6c;
    pub const ESOCKTNOSUPPORT: u32 = 0x5e;
    pub const ESPIPE: u32 = 0x1d;
    pub const ESRCH: u32 = 0x3;
    pub const ESRMNT: u32 = 0x45;
    pub const ESTALE: u32 = 0x74;
    pub const ESTRPIPE: u32 = 0x56;
    pub const ETIME: u32 = 0x3e;
    pub const ETIMEDOUT: u32 = 0x6e;
    pub const ETOOMANYREFS: u32 = 0x6d;
    pub const ETXTBSY: u32 = 0x1a;
    pub const EUCLEAN: u32 = 0x75;
    pub const EUNATCH: u32 = 0x31;
    pub const EUSERS: u32 = 0x57;
    pub const EWOULDBLOCK: u32 = 0xb;
    pub const EXDEV: u32 = 0x12;
    pub const EXFULL: u32 = 0x36;
}

const ERRNO_TEXT: &[(u32, &str)] = &[
    (1, "operation not permitted"),
    (2, "no such file or directory"),
    (3, "no such process"),
    (4, "interrupted system call"),
    (5, "input/output error"),
    (6, "no such device or address"),
    (7, "argument list too long"),
    (8, "exec format error"),
    (9, "bad file descriptor"),
    (10, "no child processes"),
    (11, "resource temporarily unavailable"),
    (12, "cannot allocate memory"),
    (13, "permission denied"),
    (14, "bad address"),
    (15, "block device required"),
    (16, "device or resource busy"),
    (17, "file exists"),
    (18, "invalid cross-device link"),
    (19, "no such device"),
    (20, "not a directory"),
    (21, "is a directory"),
    (22, "invalid argument"),
    (23, "too many open files in system"),
    (24, "too many open files"),
    (25, "inappropriate ioctl for device"),
    (26, "text file busy"),
    (27, "file too large"),
    (28, "no space left on device"),
    (29, "illegal seek"),
    (30, "read-only file system"),
    (31, "too many links"),
    (32, "broken pipe"),
    (33, "numerical argument out of domain"),
    (34, "numerical result out of range"),
    (35, "resource deadlock avoided"),
    (36, "file name too long"),
    (37, "no locks available"),
    (38, "function not implemented"),
    (39, "directory not empty"),
    (40, "too many levels of symbolic links"),
    (42, "no message of desired type"),
    (43, "identifier removed"),
    (44, "channel number out of range"),
    (45, "level 2 not synchronized"),
    (46, "level 3 halted"),
    (47, "level 3 reset"),
    (48, "link number out of range"),
    (49, "protocol driver not attached"),
    (50, "no CSI structure available"),
    (51, "level 2 halted"),
    (52, "invalid exchange"),
    (53, "invalid request descriptor"),
    (54, "exchange full"),
    (55, "no anode"),
    (56, "invalid request code"),
    (57, "invalid slot"),
    (59, "bad font file format"),
    (60, "device not a stream"),
    (61, "no data available"),
    (62, "timer expired"),
    (63, "out of streams resources"),
    (64, "machine is not on the network"),
    (65, "package not installed"),
    (66, "object is remote"),
    (67, "link has been severed"),
    (68, "advertise error"),
    (69, "srmount error"),
    (70, "communication error on send"),
    (71, "protocol error"),
    (72, "multihop attempted"),
    (73, "RFS specific error"),
    (74, "bad message"),
    (75, "value too large for defined data type"),
    (76, "name not unique on network"),
    (77, "file descriptor in bad state"),
    (78, "remote address changed"),
    (79, "can not access a needed shared library"),
    (80, "accessing a corrupted shared library"),
    (81, ".lib section in a.out corrupted"),
    (82, "attempting to link in too many shared libraries"),
    (83, "cannot exec a shared library directly"),
    (84, "invalid or incomplete multibyte or wide character"),
    (85, "interrupted system call should be restarted"),
    (86, "streams pipe error"),
    (87, "too many users"),
    (88, "socket operation on non-socket"),
    (89, "destination address required"),
    (90, "message too long"),
    (91, "protocol wrong type for socket"),
    (92, "protocol not available"),
    (93, "protocol not supported"),
    (94, "socket type not supported"),
    (95, "operation not supported"),
    (96, "protocol family not supported"),
    (97, "address family not supported by protocol"),
    (98, "address already in use"),
    (99, "cannot assign requested address"),
    (100, "network is down"),
    (101, "network is unreachable"),
    (102, "network dropped connection on reset"),
    (103, "software caused connection abort"),
    (104, "connection reset by peer"),
    (105, "no buffer space available"),
    (106, "transport endpoint is already connected"),
    (107, "transport endpoint is not connected"),
    (108, "cannot send after transport endpoint shutdown"),
    (109, "too many references: cannot splice"),
    (110, "connection timed out"),
    (111, "connection refused"),
    (112, "host is down"),
    (113, "no route to host"),
    (114, "operation already in progress"),
    (115, "operation now in progress"),
    (116, "stale NFS file handle"),
    (117, "structure needs cleaning"),
    (118, "not a XENIX named type file"),
    (119, "no XENIX semaphores available"),
    (120, "is a named type file"),
    (121, "remote I/O error"),
    (122, "disk quota exceeded"),
    (123, "no medium found"),
    (124, "wrong medium type"),
    (125, "operation canceled"),
    (126, "required key not available"),
    (127, "key has expired"),
    (128, "key has been revoked"),
    (129, "key was rejected by service"),
    (130, "owner died"),
    (131, "state not recoverable"),
    (132, "operation not possible due to RF-kill"),
];

/// Render a wire errno as canonical short text, falling back to
/// `Error: errno(<n>)` for codes this table doesn't know.
pub fn string(ecode: u32) -> String {
    match ERRNO_TEXT.iter().find(|(n, _)| *n == ecode) {
        Some((_, s)) => s.to_string(),
        None => format!("Error: errno({})", ecode),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_errno_renders_canonical_text() {
        assert_eq!(string(errno::ENOENT), "no such file or directory");
        assert_eq!(string(2), "no such file or directory");
    }

    #[test]
    fn unknown_errno_falls_back() {
        assert_eq!(string(9999), "Error: errno(9999)");
        // gaps in the table (41, 58) also fall back
        assert_eq!(string(41), "Error: errno(41)");
    }

    #[test]
    fn display_formats_server_error() {
        let e = Error::from_errno(errno::ENOENT);
        assert_eq!(format!("{}", e), "no such file or directory (errno 2)");
    }
}
