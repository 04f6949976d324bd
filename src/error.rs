//! Error kinds.
//!
//! The resolver and the inode manager translate low-level conditions (missing
//! keys, type mismatches, lock contention) into one of the canonical POSIX-style
//! tags below. Callers propagate the tag unchanged; the public facade attaches
//! a `syscall` label and the offending path for diagnostics.

use std::fmt;
use std::path::PathBuf;

/// A canonical POSIX-style error tag, independent of the path/syscall context
/// that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ErrorKind {
    #[error("no such file or directory")]
    NoEntry,
    #[error("file exists")]
    Exists,
    #[error("permission denied")]
    AccessDenied,
    #[error("operation not permitted")]
    NotPermitted,
    #[error("not a directory")]
    NotDirectory,
    #[error("is a directory")]
    IsDirectory,
    #[error("directory not empty")]
    NotEmpty,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("bad file descriptor")]
    BadFd,
    #[error("too many levels of symbolic links")]
    SymlinkLoop,
    #[error("resource busy")]
    Busy,
    #[error("file too large")]
    FileTooBig,
    #[error("no such device")]
    NoDevice,
    #[error("name too long")]
    NameTooLong,
    #[error("chunk failed authentication")]
    CorruptedChunk,
    #[error("master key does not match store")]
    KeyIncorrect,
}

impl ErrorKind {
    /// The conventional `errno` mnemonic for this kind, used in diagnostics.
    pub fn errno_name(self) -> &'static str {
        match self {
            ErrorKind::NoEntry => "ENOENT",
            ErrorKind::Exists => "EEXIST",
            ErrorKind::AccessDenied => "EACCES",
            ErrorKind::NotPermitted => "EPERM",
            ErrorKind::NotDirectory => "ENOTDIR",
            ErrorKind::IsDirectory => "EISDIR",
            ErrorKind::NotEmpty => "ENOTEMPTY",
            ErrorKind::InvalidArgument => "EINVAL",
            ErrorKind::BadFd => "EBADF",
            ErrorKind::SymlinkLoop => "ELOOP",
            ErrorKind::Busy => "EBUSY",
            ErrorKind::FileTooBig => "EFBIG",
            ErrorKind::NoDevice => "ENODEV",
            ErrorKind::NameTooLong => "ENAMETOOLONG",
            ErrorKind::CorruptedChunk => "ECORRUPT",
            ErrorKind::KeyIncorrect => "EKEYINCORRECT",
        }
    }
}

/// A filesystem error, carrying the canonical [`ErrorKind`] plus diagnostic
/// context (the syscall that raised it and the path(s) involved).
#[derive(Debug, Clone)]
pub struct FsError {
    pub kind: ErrorKind,
    pub syscall: Option<&'static str>,
    pub path: Option<PathBuf>,
    pub dest: Option<PathBuf>,
}

impl FsError {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            syscall: None,
            path: None,
            dest: None,
        }
    }

    pub fn with_syscall(mut self, syscall: &'static str) -> Self {
        self.syscall = Some(syscall);
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_dest(mut self, dest: impl Into<PathBuf>) -> Self {
        self.dest = Some(dest.into());
        self
    }
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind.errno_name())?;
        if let Some(syscall) = self.syscall {
            write!(f, ": {syscall}")?;
        }
        if let Some(path) = &self.path {
            write!(f, " '{}'", path.display())?;
        }
        if let Some(dest) = &self.dest {
            write!(f, " -> '{}'", dest.display())?;
        }
        write!(f, " ({})", self.kind)
    }
}

impl std::error::Error for FsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

impl From<ErrorKind> for FsError {
    fn from(kind: ErrorKind) -> Self {
        FsError::new(kind)
    }
}

pub type FsResult<T> = Result<T, FsError>;

/// Shorthand for constructing a bare [`FsError`] from a [`ErrorKind`], mirroring
/// the `ok_or!`/`some_or!` early-return helpers used throughout the teacher's
/// syscall layer.
macro_rules! fs_err {
    ($kind:expr) => {
        $crate::error::FsError::new($kind)
    };
    ($kind:expr, $syscall:expr) => {
        $crate::error::FsError::new($kind).with_syscall($syscall)
    };
}
pub(crate) use fs_err;
