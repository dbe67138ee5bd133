//! Error kinds returned to callers.
//!
//! Internally everything propagates with `?` through [`Error`]; the
//! facade in [`crate::fs::ops`] adapts these down to the boolean /
//! nullable-handle return values the external contract specifies.

use thiserror::Error;

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Every non-fatal condition the filesystem core can report.
///
/// Programming errors (a deny-write count exceeding the open count, a
/// wrong-sized on-disk inode, a missing filesystem device) are `assert!`/
/// `panic!` violations, not variants here — per the spec, those terminate
/// the process rather than unwind as a reportable error.
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum Error {
    /// The path was empty, a component exceeded [`crate::param::NAME_MAX`]
    /// bytes, a component descended into a file, or an intermediate
    /// directory component was missing.
    #[error("invalid path")]
    PathInvalid,

    /// The final path component does not exist.
    #[error("no such file or directory")]
    NotFound,

    /// `create`/`mkdir` target a name that already exists.
    #[error("already exists")]
    AlreadyExists,

    /// `remove` targeted a non-empty directory.
    #[error("directory not empty")]
    NotEmpty,

    /// `remove` targeted a directory with more than one open reference.
    #[error("directory in use")]
    InUse,

    /// The free-map has no sector left to allocate.
    #[error("no space left on device")]
    NoSpace,

    /// A transient buffer allocation failed; callers see a short count,
    /// not this error, in the read/write paths — reserved for allocation
    /// sites that have no short-count fallback.
    #[error("out of memory")]
    OutOfMemory,

    /// The inode's deny-write count is greater than zero.
    #[error("write denied")]
    WriteDenied,
}
