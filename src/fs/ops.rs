//! The filesystem facade: the single entry point callers use, tying
//! together path resolution, the directory layer, and the inode layer.
//!
//! Grounded on `original_source/src/filesys/filesys.c`'s
//! `filesys_create`/`filesys_open`/`filesys_remove`/`filesys_lookup`/
//! `filesys_mkdir`/`filesys_open_dir`; `chdir` is `[ADDED]`, mirroring
//! how `userprog/syscall.c`'s `chdir` handler is built from
//! `filesys_open_dir` in the original.

use std::sync::Arc;

use log::info;

use crate::{
    block::BlockDevice,
    error::{Error, Result},
    fs::{
        directory::Directory,
        inode::{FsContext, OpenInode},
        path,
    },
    param::{DEFAULT_CACHE_SECTORS, ROOT_DIR_SECTOR},
};

/// An open regular file.
pub struct File<D> {
    inode: OpenInode<D>,
}

impl<D: BlockDevice> File<D> {
    fn new(inode: OpenInode<D>) -> Self {
        Self { inode }
    }

    #[must_use]
    pub fn inode(&self) -> &OpenInode<D> {
        &self.inode
    }

    #[must_use]
    pub fn length(&self) -> usize {
        self.inode.length()
    }

    #[must_use]
    pub fn read_at(&self, buf: &mut [u8], offset: usize) -> usize {
        self.inode.read_at(buf, offset)
    }

    pub fn write_at(&self, buf: &[u8], offset: usize) -> Result<usize> {
        self.inode.write_at(buf, offset)
    }

    pub fn deny_write(&self) {
        self.inode.deny_write();
    }

    pub fn allow_write(&self) {
        self.inode.allow_write();
    }
}

/// An open directory, positioned for iteration via [`Self::entries`].
pub struct OpenDir<D> {
    dir: Directory<D>,
}

impl<D: BlockDevice> OpenDir<D> {
    fn new(dir: Directory<D>) -> Self {
        Self { dir }
    }

    #[must_use]
    pub fn inode(&self) -> &OpenInode<D> {
        self.dir.inode()
    }

    /// Consumes this handle, returning the underlying inode handle —
    /// e.g. to install as a new working directory after `chdir`.
    #[must_use]
    pub fn into_inode(self) -> OpenInode<D> {
        self.dir.inode().clone()
    }

    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.dir.entry_count()
    }

    pub fn entries(&self) -> impl Iterator<Item = (String, u32)> + '_ {
        self.dir.entries()
    }
}

/// The filesystem facade.
pub struct Filesystem<D> {
    ctx: Arc<FsContext<D>>,
}

impl<D: BlockDevice> Filesystem<D> {
    /// Formats a fresh filesystem over `device` and mounts it.
    pub fn format(device: D) -> Result<Self> {
        Self::format_with_cache(device, DEFAULT_CACHE_SECTORS)
    }

    pub fn format_with_cache(device: D, cache_sectors: usize) -> Result<Self> {
        info!("formatting filesystem");
        Ok(Self {
            ctx: FsContext::format(device, cache_sectors)?,
        })
    }

    /// Mounts an already-formatted filesystem.
    pub fn mount(device: D) -> Result<Self> {
        Self::mount_with_cache(device, DEFAULT_CACHE_SECTORS)
    }

    pub fn mount_with_cache(device: D, cache_sectors: usize) -> Result<Self> {
        info!("mounting filesystem");
        Ok(Self {
            ctx: FsContext::mount(device, cache_sectors)?,
        })
    }

    /// Flushes every buffered write to the device. Should be called
    /// before the filesystem is dropped.
    pub fn done(&self) -> Result<()> {
        self.ctx.done()
    }

    /// An inode handle for the root directory, suitable as an initial
    /// working directory.
    #[must_use]
    pub fn root(&self) -> OpenInode<D> {
        OpenInode::open(&self.ctx, ROOT_DIR_SECTOR)
    }

    fn resolve(&self, cwd: &OpenInode<D>, path: &str) -> Result<(Directory<D>, String)> {
        let resolved = path::resolve(&self.ctx, cwd, path)?;
        Ok((resolved.parent, resolved.name))
    }

    /// Creates a new regular file of `initial_size` bytes and opens it.
    pub fn create(&self, cwd: &OpenInode<D>, path: &str, initial_size: usize) -> Result<File<D>> {
        let (parent, name) = self.resolve(cwd, path)?;
        if name == "." || parent.lookup(&name).is_some() {
            return Err(Error::AlreadyExists);
        }
        let inode = OpenInode::create(&self.ctx, initial_size, false)?;
        if let Err(err) = parent.add(&name, inode.sector()) {
            inode.mark_removed();
            return Err(err);
        }
        Ok(File::new(inode))
    }

    /// Opens an existing regular file.
    pub fn open(&self, cwd: &OpenInode<D>, path: &str) -> Result<File<D>> {
        let (parent, name) = self.resolve(cwd, path)?;
        let sector = if name == "." {
            parent.inode().sector()
        } else {
            parent.lookup(&name).ok_or(Error::NotFound)?
        };
        let inode = OpenInode::open(&self.ctx, sector);
        if inode.is_dir() {
            return Err(Error::PathInvalid);
        }
        Ok(File::new(inode))
    }

    /// Opens an existing directory.
    pub fn open_dir(&self, cwd: &OpenInode<D>, path: &str) -> Result<OpenDir<D>> {
        let (parent, name) = self.resolve(cwd, path)?;
        let inode = if name == "." {
            parent.inode().clone()
        } else {
            let sector = parent.lookup(&name).ok_or(Error::NotFound)?;
            OpenInode::open(&self.ctx, sector)
        };
        if !inode.is_dir() {
            return Err(Error::PathInvalid);
        }
        Ok(OpenDir::new(Directory::open(inode)))
    }

    /// Resolves and opens `path` as a directory, handing back a handle
    /// the caller installs as its new working directory.
    pub fn chdir(&self, cwd: &OpenInode<D>, path: &str) -> Result<OpenInode<D>> {
        Ok(self.open_dir(cwd, path)?.into_inode())
    }

    /// Creates a new, empty directory.
    pub fn mkdir(&self, cwd: &OpenInode<D>, path: &str) -> Result<()> {
        let (parent, name) = self.resolve(cwd, path)?;
        if name == "." || parent.lookup(&name).is_some() {
            return Err(Error::AlreadyExists);
        }
        let inode = Directory::create(&self.ctx, parent.inode().sector())?;
        if let Err(err) = parent.add(&name, inode.sector()) {
            inode.mark_removed();
            return Err(err);
        }
        Ok(())
    }

    /// Whether `path` names an existing file or directory, and if so
    /// whether it is a directory.
    pub fn lookup(&self, cwd: &OpenInode<D>, path: &str) -> Result<bool> {
        let (parent, name) = self.resolve(cwd, path)?;
        if name == "." {
            return Ok(true);
        }
        let Some(sector) = parent.lookup(&name) else {
            return Ok(false);
        };
        Ok(OpenInode::open(&self.ctx, sector).is_dir())
    }

    /// Removes a file, or an empty directory with no other open handles.
    ///
    /// # Errors
    ///
    /// [`Error::NotEmpty`] if `path` is a non-empty directory;
    /// [`Error::InUse`] if `path` is a directory with another open
    /// handle elsewhere.
    pub fn remove(&self, cwd: &OpenInode<D>, path: &str) -> Result<()> {
        let (parent, name) = self.resolve(cwd, path)?;
        if name == "." {
            return Err(Error::PathInvalid);
        }
        let sector = parent.lookup(&name).ok_or(Error::NotFound)?;
        let inode = OpenInode::open(&self.ctx, sector);
        if inode.is_dir() {
            let dir = Directory::open(inode);
            if dir.entry_count() != 0 {
                return Err(Error::NotEmpty);
            }
            if dir.inode().open_count() != 1 {
                return Err(Error::InUse);
            }
            parent.remove(&name)?;
            dir.inode().mark_removed();
        } else {
            parent.remove(&name)?;
            inode.mark_removed();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::MemBlockDevice;

    fn fs() -> Filesystem<MemBlockDevice> {
        Filesystem::format_with_cache(MemBlockDevice::new(4096), 64).unwrap()
    }

    #[test]
    fn create_open_write_read_round_trip() {
        let fs = fs();
        let root = fs.root();
        let file = fs.create(&root, "/greeting.txt", 0).unwrap();
        file.write_at(b"hello", 0).unwrap();
        drop(file);
        let reopened = fs.open(&root, "/greeting.txt").unwrap();
        let mut buf = [0u8; 5];
        reopened.read_at(&mut buf, 0);
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn create_duplicate_fails() {
        let fs = fs();
        let root = fs.root();
        fs.create(&root, "/a", 0).unwrap();
        assert_eq!(fs.create(&root, "/a", 0).unwrap_err(), Error::AlreadyExists);
    }

    #[test]
    fn create_in_missing_parent_fails() {
        let fs = fs();
        let root = fs.root();
        assert_eq!(
            fs.create(&root, "/no/such/dir/file.txt", 0).unwrap_err(),
            Error::PathInvalid
        );
    }

    #[test]
    fn mkdir_then_nested_create() {
        let fs = fs();
        let root = fs.root();
        fs.mkdir(&root, "/sub").unwrap();
        fs.create(&root, "/sub/nested.txt", 0).unwrap();
        let dir = fs.open_dir(&root, "/sub").unwrap();
        assert_eq!(dir.entry_count(), 1);
    }

    #[test]
    fn remove_nonempty_directory_fails() {
        let fs = fs();
        let root = fs.root();
        fs.mkdir(&root, "/sub").unwrap();
        fs.create(&root, "/sub/nested.txt", 0).unwrap();
        assert_eq!(fs.remove(&root, "/sub").unwrap_err(), Error::NotEmpty);
    }

    #[test]
    fn remove_open_directory_forbidden_until_closed() {
        let fs = fs();
        let root = fs.root();
        fs.mkdir(&root, "/sub").unwrap();
        let handle = fs.open_dir(&root, "/sub").unwrap();
        assert_eq!(fs.remove(&root, "/sub").unwrap_err(), Error::InUse);
        drop(handle);
        fs.remove(&root, "/sub").unwrap();
    }

    #[test]
    fn chdir_then_relative_create() {
        let fs = fs();
        let root = fs.root();
        fs.mkdir(&root, "/home").unwrap();
        let cwd = fs.chdir(&root, "/home").unwrap();
        fs.create(&cwd, "note.txt", 0).unwrap();
        assert!(fs.lookup(&root, "/home/note.txt").unwrap());
    }

    #[test]
    fn write_past_end_extends_and_zero_fills_gap() {
        let fs = fs();
        let root = fs.root();
        let file = fs.create(&root, "/sparse", 0).unwrap();
        file.write_at(b"end", 4096).unwrap();
        assert_eq!(file.length(), 4099);
        let mut gap = [0xFFu8; 4096];
        file.read_at(&mut gap, 0);
        assert!(gap.iter().all(|&b| b == 0));
    }

    #[test]
    fn deny_write_blocks_writes_through_any_handle() {
        let fs = fs();
        let root = fs.root();
        let file = fs.create(&root, "/locked", 0).unwrap();
        file.deny_write();
        let other = fs.open(&root, "/locked").unwrap();
        assert_eq!(other.write_at(b"x", 0).unwrap_err(), Error::WriteDenied);
        file.allow_write();
        other.write_at(b"x", 0).unwrap();
    }
}
