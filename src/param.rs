//! Compile-time tunables for the filesystem core.
//!
//! Centralized the way the teacher's `param.rs` / `ov6_kernel_params`
//! gather magic numbers in one place instead of scattering them through
//! the implementation.

/// Size in bytes of a single addressable sector.
pub const SECTOR_SIZE: usize = 512;

/// Number of direct sector pointers stored in an on-disk inode.
pub const DIRECT_POINTERS: usize = 100;

/// Number of `u32` sector pointers that fit in one sector (indirect and
/// double-indirect index blocks).
pub const POINTERS_PER_SECTOR: usize = SECTOR_SIZE / size_of::<u32>();

/// Largest file offset (in sectors) reachable through direct + indirect +
/// double-indirect pointers.
pub const MAX_FILE_SECTORS: usize =
    DIRECT_POINTERS + POINTERS_PER_SECTOR + POINTERS_PER_SECTOR * POINTERS_PER_SECTOR;

/// Largest file size in bytes.
pub const MAX_FILE_SIZE: usize = MAX_FILE_SECTORS * SECTOR_SIZE;

/// Magic constant stamped into every on-disk inode.
pub const INODE_MAGIC: u32 = 0x494e_4f44;

/// Maximum length of a single path component / directory entry name,
/// excluding the NUL terminator.
pub const NAME_MAX: usize = 14;

/// Sector holding the free-map file's inode.
pub const FREE_MAP_SECTOR: u32 = 0;

/// Sector holding the root directory's inode.
pub const ROOT_DIR_SECTOR: u32 = 1;

/// Default number of slots in the sector cache.
pub const DEFAULT_CACHE_SECTORS: usize = 64;
