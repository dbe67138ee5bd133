//! On-disk byte layouts.
//!
//! Every type here is cast directly over a raw sector buffer with
//! [`dataview::Pod`], the same technique the teacher's `ov6_fs_types`
//! crate uses instead of serializing through `serde`. Fields are ordered
//! so the compiler never needs to insert implicit padding — any padding
//! bytes are explicit, zeroed fields, which keeps every bit pattern a
//! valid (if sometimes meaningless) instance, a requirement `Pod` relies
//! on for safety.

use dataview::{Pod, PodMethods as _};

use crate::param::{DIRECT_POINTERS, NAME_MAX, POINTERS_PER_SECTOR, SECTOR_SIZE};

/// On-disk inode: exactly one sector.
///
/// Mirrors `original_source/src/filesys/inode.c`'s `struct inode_disk`
/// field-for-field (modulo `is_dir`/`length` being stored as `u32` here
/// instead of `bool`/`off_t`, to keep every field naturally aligned and
/// avoid compiler-inserted padding).
#[repr(C)]
#[derive(Pod, Clone, Copy)]
pub struct DiskInode {
    pub direct: [u32; DIRECT_POINTERS],
    pub indirect: u32,
    pub double_indirect: u32,
    pub length: i32,
    pub is_dir: u32,
    pub magic: u32,
    _unused: [u8; UNUSED_LEN],
}

const HEADER_LEN: usize = DIRECT_POINTERS * 4 + 4 + 4 + 4 + 4 + 4;
const UNUSED_LEN: usize = SECTOR_SIZE - HEADER_LEN;
const _: () = assert!(size_of::<DiskInode>() == SECTOR_SIZE);

impl DiskInode {
    #[must_use]
    pub fn zeroed(is_dir: bool, magic: u32) -> Self {
        let mut inode = Self::zeroed_raw();
        inode.is_dir = u32::from(is_dir);
        inode.magic = magic;
        inode
    }

    fn zeroed_raw() -> Self {
        Self {
            direct: [0; DIRECT_POINTERS],
            indirect: 0,
            double_indirect: 0,
            length: 0,
            is_dir: 0,
            magic: 0,
            _unused: [0; UNUSED_LEN],
        }
    }

    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.is_dir != 0
    }

    #[must_use]
    pub fn length(&self) -> usize {
        usize::try_from(self.length).unwrap_or(0)
    }

    pub fn set_length(&mut self, length: usize) {
        self.length = i32::try_from(length).expect("file length overflows i32");
    }

    #[must_use]
    pub fn direct(&self, i: usize) -> Option<u32> {
        non_zero(self.direct[i])
    }

    pub fn set_direct(&mut self, i: usize, sector: Option<u32>) {
        self.direct[i] = sector.unwrap_or(0);
    }

    #[must_use]
    pub fn indirect(&self) -> Option<u32> {
        non_zero(self.indirect)
    }

    pub fn set_indirect(&mut self, sector: Option<u32>) {
        self.indirect = sector.unwrap_or(0);
    }

    #[must_use]
    pub fn double_indirect(&self) -> Option<u32> {
        non_zero(self.double_indirect)
    }

    pub fn set_double_indirect(&mut self, sector: Option<u32>) {
        self.double_indirect = sector.unwrap_or(0);
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; SECTOR_SIZE] {
        self.as_bytes_view()
    }

    pub fn from_bytes(buf: &[u8; SECTOR_SIZE]) -> Self {
        *buf.as_data_view().get::<Self>(0)
    }

    fn as_bytes_view(&self) -> &[u8; SECTOR_SIZE] {
        // SAFETY: `DiskInode` is `#[repr(C)]`, `Pod`, and exactly
        // `SECTOR_SIZE` bytes (asserted above).
        unsafe { &*std::ptr::from_ref(self).cast() }
    }
}

fn non_zero(v: u32) -> Option<u32> {
    if v == 0 { None } else { Some(v) }
}

/// An indirect (or double-indirect) index block: 128 sector pointers.
#[repr(C)]
#[derive(Pod, Clone, Copy)]
pub struct IndirectBlock {
    pointers: [u32; POINTERS_PER_SECTOR],
}
const _: () = assert!(size_of::<IndirectBlock>() == SECTOR_SIZE);

impl IndirectBlock {
    #[must_use]
    pub fn zeroed() -> Self {
        Self {
            pointers: [0; POINTERS_PER_SECTOR],
        }
    }

    #[must_use]
    pub fn get(&self, i: usize) -> Option<u32> {
        non_zero(self.pointers[i])
    }

    pub fn set(&mut self, i: usize, sector: Option<u32>) {
        self.pointers[i] = sector.unwrap_or(0);
    }

    pub fn from_bytes(buf: &[u8; SECTOR_SIZE]) -> Self {
        *buf.as_data_view().get::<Self>(0)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; SECTOR_SIZE] {
        // SAFETY: `IndirectBlock` is `#[repr(C)]`, `Pod`, and exactly
        // `SECTOR_SIZE` bytes (asserted above).
        unsafe { &*std::ptr::from_ref(self).cast() }
    }
}

/// A directory entry, stored back-to-back from offset 0 in a directory's
/// inode data.
///
/// `name` holds one byte more than [`NAME_MAX`] so every field stays
/// 4-byte aligned with no compiler-inserted padding; the final byte is
/// always zero and carries no meaning beyond NUL-termination.
pub const DIR_ENTRY_SIZE: usize = 4 + 4 + (NAME_MAX + 2);

#[repr(C)]
#[derive(Pod, Clone, Copy)]
pub struct DirEntry {
    in_use: u32,
    inode_sector: u32,
    name: [u8; NAME_MAX + 2],
}
const _: () = assert!(size_of::<DirEntry>() == DIR_ENTRY_SIZE);

impl DirEntry {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            in_use: 0,
            inode_sector: 0,
            name: [0; NAME_MAX + 2],
        }
    }

    #[must_use]
    pub fn in_use(&self) -> bool {
        self.in_use != 0
    }

    #[must_use]
    pub fn inode_sector(&self) -> u32 {
        self.inode_sector
    }

    #[must_use]
    pub fn name(&self) -> &str {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(0);
        std::str::from_utf8(&self.name[..len]).unwrap_or("")
    }

    pub fn set(&mut self, name: &str, inode_sector: u32) {
        assert!(name.len() <= NAME_MAX);
        self.in_use = 1;
        self.inode_sector = inode_sector;
        self.name = [0; NAME_MAX + 2];
        self.name[..name.len()].copy_from_slice(name.as_bytes());
    }

    pub fn clear(&mut self) {
        self.in_use = 0;
    }

    pub fn from_bytes(buf: &[u8; DIR_ENTRY_SIZE]) -> Self {
        *buf.as_data_view().get::<Self>(0)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; DIR_ENTRY_SIZE] {
        // SAFETY: `DirEntry` is `#[repr(C)]`, `Pod`, and exactly
        // `DIR_ENTRY_SIZE` bytes (asserted above).
        unsafe { &*std::ptr::from_ref(self).cast() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disk_inode_round_trips_through_bytes() {
        let mut inode = DiskInode::zeroed(true, crate::param::INODE_MAGIC);
        inode.set_length(1234);
        inode.set_direct(0, Some(5));
        inode.set_indirect(Some(9));
        let bytes = *inode.as_bytes();
        let restored = DiskInode::from_bytes(&bytes);
        assert_eq!(restored.length(), 1234);
        assert!(restored.is_dir());
        assert_eq!(restored.direct(0), Some(5));
        assert_eq!(restored.indirect(), Some(9));
        assert_eq!(restored.magic, crate::param::INODE_MAGIC);
    }

    #[test]
    fn dir_entry_name_round_trip() {
        let mut entry = DirEntry::empty();
        entry.set("hello", 42);
        assert!(entry.in_use());
        assert_eq!(entry.name(), "hello");
        assert_eq!(entry.inode_sector(), 42);
        let bytes = *entry.as_bytes();
        let restored = DirEntry::from_bytes(&bytes);
        assert_eq!(restored.name(), "hello");
    }
}
