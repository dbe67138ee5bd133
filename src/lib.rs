//! A small on-disk filesystem core: multi-level-indexed inodes, a
//! write-back sector cache with clock eviction, a hierarchical directory
//! layer, and a facade tying them together over a flat, sector-addressable
//! block device.
//!
//! The block device itself is an external collaborator, reached only
//! through the [`block::BlockDevice`] trait — this crate never touches a
//! real disk directly. See [`block::MemBlockDevice`] for tests and
//! [`block::FileBlockDevice`] for the `mkfs` binary.

pub mod block;
pub mod cache;
pub mod error;
pub mod fs;
pub mod param;

pub use error::{Error, Result};
pub use fs::{File, Filesystem, OpenDir, OpenInode};
