//! Filesystem core: on-disk layout, the inode layer, the directory
//! layer, path resolution, and the public facade.

pub mod directory;
pub mod inode;
pub mod ops;
pub mod path;
pub mod repr;

pub use inode::OpenInode;
pub use ops::{File, Filesystem, OpenDir};
