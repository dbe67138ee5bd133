//! The hierarchical directory layer: a directory's content is just a
//! flat array of [`DirEntry`] slots, entry 0 always the `..` link to its
//! parent (the root directory's `..` points to itself).
//!
//! `original_source/` does not carry a `directory.c`, so the entry
//! layout and the `..`-as-entry-zero convention are adapted from the
//! spec's description rather than ported line-for-line; the lookup/add/
//! remove operations still follow `filesys.c`'s usage of `dir_lookup`/
//! `dir_add`/`dir_remove`/`dir_entry_count`.

use crate::{
    error::{Error, Result},
    fs::{
        inode::OpenInode,
        repr::{DIR_ENTRY_SIZE, DirEntry},
    },
};

/// A directory, viewed through its backing inode.
pub struct Directory<D> {
    inode: OpenInode<D>,
}

impl<D: crate::block::BlockDevice> Directory<D> {
    /// Wraps an already-open directory inode.
    ///
    /// # Panics
    ///
    /// Panics if `inode` is not a directory.
    #[must_use]
    pub fn open(inode: OpenInode<D>) -> Self {
        assert!(inode.is_dir(), "Directory::open called on a non-directory inode");
        Self { inode }
    }

    /// Creates a new, empty directory inode whose `..` points at
    /// `parent_sector`, and opens it.
    pub fn create(
        ctx: &std::sync::Arc<super::inode::FsContext<D>>,
        parent_sector: u32,
    ) -> Result<OpenInode<D>> {
        let inode = OpenInode::create(ctx, DIR_ENTRY_SIZE, true)?;
        let mut dot_dot = DirEntry::empty();
        dot_dot.set("..", parent_sector);
        inode.write_at(dot_dot.as_bytes(), 0)?;
        Ok(inode)
    }

    #[must_use]
    pub fn inode(&self) -> &OpenInode<D> {
        &self.inode
    }

    fn num_slots(&self) -> usize {
        self.inode.length() / DIR_ENTRY_SIZE
    }

    fn entry_at(&self, index: usize) -> Option<DirEntry> {
        let offset = index * DIR_ENTRY_SIZE;
        if offset >= self.inode.length() {
            return None;
        }
        let mut buf = [0u8; DIR_ENTRY_SIZE];
        let read = self.inode.read_at(&mut buf, offset);
        (read == DIR_ENTRY_SIZE).then(|| DirEntry::from_bytes(&buf))
    }

    /// Sector of the inode named `name` in this directory, if any.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<u32> {
        (0..self.num_slots()).find_map(|i| {
            let entry = self.entry_at(i)?;
            (entry.in_use() && entry.name() == name).then(|| entry.inode_sector())
        })
    }

    /// Adds a new entry, reusing a tombstoned slot if one exists.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PathInvalid`] if `name` is empty or longer than
    /// [`crate::param::NAME_MAX`] bytes, or [`Error::AlreadyExists`] if
    /// `name` is already present.
    pub fn add(&self, name: &str, sector: u32) -> Result<()> {
        if name.is_empty() || name.len() > crate::param::NAME_MAX {
            return Err(Error::PathInvalid);
        }
        if self.lookup(name).is_some() {
            return Err(Error::AlreadyExists);
        }
        let free_slot = (0..self.num_slots()).find(|&i| !self.entry_at(i).is_some_and(|e| e.in_use()));
        let index = free_slot.unwrap_or_else(|| self.num_slots());
        let mut entry = DirEntry::empty();
        entry.set(name, sector);
        self.inode.write_at(entry.as_bytes(), index * DIR_ENTRY_SIZE)?;
        Ok(())
    }

    /// Tombstones the entry named `name`. The slot is not reclaimed by
    /// shrinking the directory; [`Self::add`] reuses it later.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no such entry exists, or
    /// [`Error::PathInvalid`] for the reserved `..` slot at index 0.
    pub fn remove(&self, name: &str) -> Result<()> {
        let index = (0..self.num_slots())
            .find(|&i| self.entry_at(i).is_some_and(|e| e.in_use() && e.name() == name))
            .ok_or(Error::NotFound)?;
        if index == 0 {
            return Err(Error::PathInvalid);
        }
        let mut entry = self.entry_at(index).expect("index found by the search above");
        entry.clear();
        self.inode.write_at(entry.as_bytes(), index * DIR_ENTRY_SIZE)?;
        Ok(())
    }

    /// Sector of the directory's parent (itself, for the root directory).
    #[must_use]
    pub fn parent_sector(&self) -> u32 {
        self.entry_at(0)
            .expect("every directory has a `..` entry at index 0")
            .inode_sector()
    }

    /// Number of live entries, excluding the `..` slot.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.entries().count()
    }

    /// Iterates live `(name, inode_sector)` pairs, excluding `..`.
    pub fn entries(&self) -> impl Iterator<Item = (String, u32)> + '_ {
        (1..self.num_slots()).filter_map(move |i| {
            let entry = self.entry_at(i)?;
            entry.in_use().then(|| (entry.name().to_string(), entry.inode_sector()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{block::MemBlockDevice, fs::inode::FsContext, param::ROOT_DIR_SECTOR};

    fn root_dir() -> (std::sync::Arc<FsContext<MemBlockDevice>>, Directory<MemBlockDevice>) {
        let ctx = FsContext::format(MemBlockDevice::new(2048), 64).unwrap();
        let root = OpenInode::open(&ctx, ROOT_DIR_SECTOR);
        (ctx.clone(), Directory::open(root))
    }

    #[test]
    fn fresh_directory_has_only_dot_dot() {
        let (_ctx, dir) = root_dir();
        assert_eq!(dir.entry_count(), 0);
        assert_eq!(dir.parent_sector(), ROOT_DIR_SECTOR);
    }

    #[test]
    fn add_then_lookup() {
        let (_ctx, dir) = root_dir();
        dir.add("file.txt", 42).unwrap();
        assert_eq!(dir.lookup("file.txt"), Some(42));
        assert_eq!(dir.entry_count(), 1);
    }

    #[test]
    fn duplicate_add_fails() {
        let (_ctx, dir) = root_dir();
        dir.add("a", 1).unwrap();
        assert_eq!(dir.add("a", 2), Err(Error::AlreadyExists));
    }

    #[test]
    fn empty_name_is_rejected() {
        let (_ctx, dir) = root_dir();
        assert_eq!(dir.add("", 1), Err(Error::PathInvalid));
        assert_eq!(dir.entry_count(), 0);
    }

    #[test]
    fn overlong_name_is_rejected() {
        let (_ctx, dir) = root_dir();
        let name = "a".repeat(crate::param::NAME_MAX + 1);
        assert_eq!(dir.add(&name, 1), Err(Error::PathInvalid));
        assert_eq!(dir.entry_count(), 0);
    }

    #[test]
    fn remove_then_reuse_slot() {
        let (_ctx, dir) = root_dir();
        dir.add("a", 1).unwrap();
        dir.remove("a").unwrap();
        assert_eq!(dir.lookup("a"), None);
        dir.add("b", 2).unwrap();
        assert_eq!(dir.entry_count(), 1);
    }

    #[test]
    fn removing_dot_dot_is_rejected() {
        let (_ctx, dir) = root_dir();
        assert_eq!(dir.remove(".."), Err(Error::PathInvalid));
    }

    #[test]
    fn child_directory_points_back_to_parent() {
        let (ctx, dir) = root_dir();
        let child_inode = Directory::create(&ctx, dir.inode().sector()).unwrap();
        let child = Directory::open(child_inode);
        assert_eq!(child.parent_sector(), dir.inode().sector());
    }
}
