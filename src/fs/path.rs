//! Path resolution: splits a path into a parent directory and a final
//! component name, descending component-by-component with a one-step
//! look-ahead so the final component need not already exist.
//!
//! Ported from `original_source/src/filesys/filesys.c`'s `resolve_path`/
//! `get_next_part`, with one correction: the original rejects a path
//! only when `strnlen(path, 3) == 0`, which silently accepts the empty
//! string anyway and is almost certainly a copy-paste slip (`3` bears no
//! relation to anything in scope); this resolves the open question by
//! rejecting every empty path outright.

use std::sync::Arc;

use crate::{
    block::BlockDevice,
    error::{Error, Result},
    param::{NAME_MAX, ROOT_DIR_SECTOR},
};

use super::{directory::Directory, inode::{FsContext, OpenInode}};

/// The result of resolving a path: the directory that contains (or
/// would contain) the final component, and that component's name.
///
/// `name` is the literal `"."` sentinel when `path` consisted entirely
/// of slashes, meaning "the starting directory itself" rather than a
/// named entry within it.
pub struct Resolved<D> {
    pub parent: Directory<D>,
    pub name: String,
}

/// Resolves `path` against `cwd` (used when `path` is relative) or the
/// root directory (when `path` starts with `/`).
///
/// # Errors
///
/// Returns [`Error::PathInvalid`] for an empty path, an over-long
/// component, or a non-final component that doesn't name an existing
/// directory.
pub fn resolve<D: BlockDevice>(
    ctx: &Arc<FsContext<D>>,
    cwd: &OpenInode<D>,
    path: &str,
) -> Result<Resolved<D>> {
    if path.is_empty() {
        return Err(Error::PathInvalid);
    }

    let start = if path.starts_with('/') {
        OpenInode::open(ctx, ROOT_DIR_SECTOR)
    } else {
        cwd.clone()
    };

    let parts: Vec<&str> = path.split('/').filter(|part| !part.is_empty()).collect();
    if parts.iter().any(|part| part.len() > NAME_MAX) {
        return Err(Error::PathInvalid);
    }

    let mut current = Directory::open(start);
    let Some((&last, ancestors)) = parts.split_last() else {
        // The path was made entirely of slashes: it names the starting
        // directory itself, not an entry within it.
        return Ok(Resolved {
            parent: current,
            name: ".".to_string(),
        });
    };

    for &part in ancestors {
        let sector = current.lookup(part).ok_or(Error::PathInvalid)?;
        let inode = OpenInode::open(ctx, sector);
        if !inode.is_dir() {
            return Err(Error::PathInvalid);
        }
        current = Directory::open(inode);
    }

    Ok(Resolved {
        parent: current,
        name: last.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{block::MemBlockDevice, fs::inode::FsContext, param::ROOT_DIR_SECTOR};

    fn ctx() -> Arc<FsContext<MemBlockDevice>> {
        FsContext::format(MemBlockDevice::new(2048), 64).unwrap()
    }

    #[test]
    fn empty_path_is_invalid() {
        let ctx = ctx();
        let root = OpenInode::open(&ctx, ROOT_DIR_SECTOR);
        assert_eq!(resolve(&ctx, &root, "").unwrap_err(), Error::PathInvalid);
    }

    #[test]
    fn root_only_path_resolves_to_dot() {
        let ctx = ctx();
        let root = OpenInode::open(&ctx, ROOT_DIR_SECTOR);
        let resolved = resolve(&ctx, &root, "/").unwrap();
        assert_eq!(resolved.name, ".");
        assert_eq!(resolved.parent.inode().sector(), ROOT_DIR_SECTOR);
    }

    #[test]
    fn relative_single_component_uses_cwd_as_parent() {
        let ctx = ctx();
        let root = OpenInode::open(&ctx, ROOT_DIR_SECTOR);
        let resolved = resolve(&ctx, &root, "file.txt").unwrap();
        assert_eq!(resolved.name, "file.txt");
        assert_eq!(resolved.parent.inode().sector(), ROOT_DIR_SECTOR);
    }

    #[test]
    fn descending_through_a_file_is_invalid() {
        let ctx = ctx();
        let root = OpenInode::open(&ctx, ROOT_DIR_SECTOR);
        let root_dir = Directory::open(root.clone());
        let file = OpenInode::create(&ctx, 0, false).unwrap();
        root_dir.add("afile", file.sector()).unwrap();
        assert_eq!(
            resolve(&ctx, &root, "afile/nested").unwrap_err(),
            Error::PathInvalid
        );
    }

    #[test]
    fn missing_intermediate_directory_is_invalid() {
        let ctx = ctx();
        let root = OpenInode::open(&ctx, ROOT_DIR_SECTOR);
        assert_eq!(
            resolve(&ctx, &root, "nope/file.txt").unwrap_err(),
            Error::PathInvalid
        );
    }

    #[test]
    fn missing_final_component_still_resolves() {
        let ctx = ctx();
        let root = OpenInode::open(&ctx, ROOT_DIR_SECTOR);
        let resolved = resolve(&ctx, &root, "/not_yet_created").unwrap();
        assert_eq!(resolved.name, "not_yet_created");
    }
}
