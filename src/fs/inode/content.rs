//! Byte-addressed access to an inode's data, and the on-disk
//! `inode_create`/`inode_resize` algorithms.
//!
//! These are free functions over a `sector: u32` rather than methods on a
//! handle, mirroring how `original_source/src/filesys/inode.c` keeps
//! `struct inode_disk` (the on-disk layout, read fresh from the cache on
//! every call) entirely separate from `struct inode` (the open-handle
//! bookkeeping layer, see [`super::InodeShared`]).

use log::{debug, warn};

use crate::{
    block::BlockDevice,
    error::{Error, Result},
    fs::repr::{DiskInode, IndirectBlock},
    param::{DIRECT_POINTERS, POINTERS_PER_SECTOR, SECTOR_SIZE},
};

use super::FsContext;

fn direct_bound(i: usize) -> usize {
    SECTOR_SIZE * i
}

fn indirect_bound(i: usize) -> usize {
    SECTOR_SIZE * (DIRECT_POINTERS + i)
}

fn double_indirect_bound(i: usize, j: usize) -> usize {
    SECTOR_SIZE * (DIRECT_POINTERS + POINTERS_PER_SECTOR + POINTERS_PER_SECTOR * i + j)
}

fn read_indirect<D: BlockDevice>(ctx: &FsContext<D>, sector: u32) -> IndirectBlock {
    let mut buf = [0u8; SECTOR_SIZE];
    ctx.cache.read(sector, &mut buf).expect("block device read failed");
    IndirectBlock::from_bytes(&buf)
}

fn write_indirect<D: BlockDevice>(ctx: &FsContext<D>, sector: u32, block: &IndirectBlock) {
    ctx.cache
        .write(sector, block.as_bytes())
        .expect("block device write failed");
}

fn zero_sector<D: BlockDevice>(ctx: &FsContext<D>, sector: u32) {
    ctx.cache
        .write(sector, &[0u8; SECTOR_SIZE])
        .expect("block device write failed");
}

fn load_disk_inode<D: BlockDevice>(ctx: &FsContext<D>, sector: u32) -> DiskInode {
    let mut buf = [0u8; SECTOR_SIZE];
    ctx.cache.read(sector, &mut buf).expect("block device read failed");
    DiskInode::from_bytes(&buf)
}

fn store_disk_inode<D: BlockDevice>(ctx: &FsContext<D>, sector: u32, inode: &DiskInode) {
    ctx.cache
        .write(sector, inode.as_bytes())
        .expect("block device write failed");
}

/// Current length, in bytes, of the inode stored at `sector`.
pub(super) fn inode_length<D: BlockDevice>(ctx: &FsContext<D>, sector: u32) -> usize {
    load_disk_inode(ctx, sector).length()
}

/// Whether the inode stored at `sector` is a directory.
pub(super) fn inode_is_dir<D: BlockDevice>(ctx: &FsContext<D>, sector: u32) -> bool {
    load_disk_inode(ctx, sector).is_dir()
}

/// Maps a byte offset within a file to the sector that holds it.
///
/// Returns `None` for an offset at or past `inode.length()`, matching
/// `byte_to_sector`'s `-1` sentinel in the original.
pub(super) fn byte_to_sector<D: BlockDevice>(
    ctx: &FsContext<D>,
    inode: &DiskInode,
    pos: usize,
) -> Option<u32> {
    if pos >= inode.length() {
        return None;
    }
    let sector_offset = pos / SECTOR_SIZE;
    if sector_offset < DIRECT_POINTERS {
        return inode.direct(sector_offset);
    }
    if sector_offset < DIRECT_POINTERS + POINTERS_PER_SECTOR {
        let indirect = read_indirect(ctx, inode.indirect()?);
        return indirect.get(sector_offset - DIRECT_POINTERS);
    }
    let idx = sector_offset - DIRECT_POINTERS - POINTERS_PER_SECTOR;
    let outer = read_indirect(ctx, inode.double_indirect()?);
    let inner_sector = outer.get(idx / POINTERS_PER_SECTOR)?;
    let inner = read_indirect(ctx, inner_sector);
    inner.get(idx % POINTERS_PER_SECTOR)
}

/// Grows or shrinks `inode` to exactly `new_length` bytes, allocating or
/// releasing data and index sectors as needed. On allocation failure,
/// rolls back to `inode`'s length at entry and returns [`Error::NoSpace`].
pub(super) fn resize<D: BlockDevice>(
    ctx: &FsContext<D>,
    inode: &mut DiskInode,
    new_length: usize,
) -> Result<()> {
    let old_length = inode.length();
    if try_resize(ctx, inode, new_length).is_err() {
        try_resize(ctx, inode, old_length).expect("rollback to a previously valid length failed");
        return Err(Error::NoSpace);
    }
    Ok(())
}

fn try_resize<D: BlockDevice>(
    ctx: &FsContext<D>,
    inode: &mut DiskInode,
    new_length: usize,
) -> Result<()> {
    for i in 0..DIRECT_POINTERS {
        if new_length <= direct_bound(i) {
            if let Some(s) = inode.direct(i) {
                ctx.free_map.release(s);
                inode.set_direct(i, None);
            }
        } else if inode.direct(i).is_none() {
            let s = ctx.free_map.allocate().ok_or(Error::NoSpace)?;
            zero_sector(ctx, s);
            inode.set_direct(i, Some(s));
        }
    }

    if inode.indirect().is_none() && new_length <= direct_bound(DIRECT_POINTERS) {
        inode.set_length(new_length);
        return Ok(());
    }

    let indirect_sector = match inode.indirect() {
        Some(s) => s,
        None => {
            let s = ctx.free_map.allocate().ok_or(Error::NoSpace)?;
            inode.set_indirect(Some(s));
            zero_sector(ctx, s);
            s
        }
    };
    let mut indirect = read_indirect(ctx, indirect_sector);
    for i in 0..POINTERS_PER_SECTOR {
        if new_length <= indirect_bound(i) {
            if let Some(s) = indirect.get(i) {
                ctx.free_map.release(s);
                indirect.set(i, None);
            }
        } else if indirect.get(i).is_none() {
            let s = ctx.free_map.allocate().ok_or(Error::NoSpace)?;
            zero_sector(ctx, s);
            indirect.set(i, Some(s));
        }
    }
    if new_length <= direct_bound(DIRECT_POINTERS) {
        ctx.free_map.release(indirect_sector);
        inode.set_indirect(None);
    } else {
        write_indirect(ctx, indirect_sector, &indirect);
    }

    if inode.double_indirect().is_none() && new_length <= indirect_bound(POINTERS_PER_SECTOR) {
        inode.set_length(new_length);
        return Ok(());
    }

    let double_sector = match inode.double_indirect() {
        Some(s) => s,
        None => {
            let s = ctx.free_map.allocate().ok_or(Error::NoSpace)?;
            inode.set_double_indirect(Some(s));
            zero_sector(ctx, s);
            s
        }
    };
    let mut outer = read_indirect(ctx, double_sector);
    for i in 0..POINTERS_PER_SECTOR {
        let inner_sector = match outer.get(i) {
            Some(s) => s,
            None => {
                if new_length <= double_indirect_bound(i, 0) {
                    continue;
                }
                let s = ctx.free_map.allocate().ok_or(Error::NoSpace)?;
                outer.set(i, Some(s));
                zero_sector(ctx, s);
                s
            }
        };
        let mut inner = read_indirect(ctx, inner_sector);
        for j in 0..POINTERS_PER_SECTOR {
            if new_length <= double_indirect_bound(i, j) {
                if let Some(s) = inner.get(j) {
                    ctx.free_map.release(s);
                    inner.set(j, None);
                }
            } else if inner.get(j).is_none() {
                let s = ctx.free_map.allocate().ok_or(Error::NoSpace)?;
                zero_sector(ctx, s);
                inner.set(j, Some(s));
            }
        }
        if new_length <= double_indirect_bound(i, 0) {
            if let Some(s) = outer.get(i) {
                ctx.free_map.release(s);
                outer.set(i, None);
            }
        } else {
            write_indirect(ctx, inner_sector, &inner);
        }
    }
    if new_length <= indirect_bound(POINTERS_PER_SECTOR) {
        ctx.free_map.release(double_sector);
        inode.set_double_indirect(None);
    } else {
        write_indirect(ctx, double_sector, &outer);
    }

    inode.set_length(new_length);
    Ok(())
}

/// Allocates `sector`, formats a fresh on-disk inode of `length` bytes and
/// `is_dir`-ness there, and writes it to the cache.
///
/// Unlike [`super::OpenInode::open`], this never touches the open-inode
/// table: it operates purely on the on-disk layout, mirroring
/// `inode_create` in the original.
pub(super) fn create<D: BlockDevice>(
    ctx: &FsContext<D>,
    sector: u32,
    length: usize,
    is_dir: bool,
) -> Result<()> {
    let mut inode = DiskInode::zeroed(is_dir, crate::param::INODE_MAGIC);
    {
        let _resize_guard = ctx.resize_lock.lock().unwrap();
        resize(ctx, &mut inode, length)?;
        store_disk_inode(ctx, sector, &inode);
    }
    debug!("created inode at sector {sector} ({length} bytes, is_dir={is_dir})");
    Ok(())
}

/// Reads up to `buf.len()` bytes starting at `offset`, returning the
/// number of bytes actually read (short on end-of-file).
pub(super) fn read_at<D: BlockDevice>(
    ctx: &FsContext<D>,
    sector: u32,
    buf: &mut [u8],
    offset: usize,
) -> usize {
    let inode = load_disk_inode(ctx, sector);
    let mut bytes_read = 0;
    let mut offset = offset;
    while bytes_read < buf.len() {
        let Some(sector_idx) = byte_to_sector(ctx, &inode, offset) else {
            break;
        };
        let sector_ofs = offset % SECTOR_SIZE;
        let inode_left = inode.length() - offset;
        let sector_left = SECTOR_SIZE - sector_ofs;
        let chunk = (buf.len() - bytes_read).min(inode_left).min(sector_left);
        if chunk == 0 {
            break;
        }
        let mut block = [0u8; SECTOR_SIZE];
        ctx.cache.read(sector_idx, &mut block).expect("block device read failed");
        buf[bytes_read..bytes_read + chunk].copy_from_slice(&block[sector_ofs..sector_ofs + chunk]);
        bytes_read += chunk;
        offset += chunk;
    }
    bytes_read
}

/// Writes `buf` starting at `offset`, growing the inode first if the
/// write would extend past its current length. Returns the number of
/// bytes actually written (short only on allocation failure while
/// growing; a write fully within the current length never short-writes).
pub(super) fn write_at<D: BlockDevice>(
    ctx: &FsContext<D>,
    sector: u32,
    buf: &[u8],
    offset: usize,
) -> Result<usize> {
    let mut inode = load_disk_inode(ctx, sector);
    if offset + buf.len() > inode.length() {
        let _resize_guard = ctx.resize_lock.lock().unwrap();
        // Re-read under the lock: another writer may have already grown
        // this inode while we were waiting for it.
        inode = load_disk_inode(ctx, sector);
        if offset + buf.len() > inode.length() {
            resize(ctx, &mut inode, offset + buf.len())?;
            store_disk_inode(ctx, sector, &inode);
        }
    }

    let mut bytes_written = 0;
    let mut offset = offset;
    while bytes_written < buf.len() {
        let Some(sector_idx) = byte_to_sector(ctx, &inode, offset) else {
            break;
        };
        let sector_ofs = offset % SECTOR_SIZE;
        let inode_left = inode.length() - offset;
        let sector_left = SECTOR_SIZE - sector_ofs;
        let chunk = (buf.len() - bytes_written).min(inode_left).min(sector_left);
        if chunk == 0 {
            break;
        }

        if sector_ofs == 0 && chunk == SECTOR_SIZE {
            let full: &[u8; SECTOR_SIZE] = buf[bytes_written..bytes_written + SECTOR_SIZE]
                .try_into()
                .expect("chunk is exactly one sector");
            ctx.cache.write(sector_idx, full).expect("block device write failed");
        } else {
            let mut block = [0u8; SECTOR_SIZE];
            if sector_ofs > 0 || chunk < sector_left {
                ctx.cache.read(sector_idx, &mut block).expect("block device read failed");
            }
            block[sector_ofs..sector_ofs + chunk]
                .copy_from_slice(&buf[bytes_written..bytes_written + chunk]);
            ctx.cache.write(sector_idx, &block).expect("block device write failed");
        }

        bytes_written += chunk;
        offset += chunk;
    }
    Ok(bytes_written)
}

/// Frees every data/index sector owned by the inode at `sector`, then
/// releases the inode's own sector. Called once, from
/// [`super::InodeShared`]'s `Drop` impl, when a removed inode's last
/// opener goes away.
pub(super) fn destroy<D: BlockDevice>(ctx: &FsContext<D>, sector: u32) {
    let mut inode = load_disk_inode(ctx, sector);
    {
        let _resize_guard = ctx.resize_lock.lock().unwrap();
        try_resize(ctx, &mut inode, 0).expect("freeing all blocks of an inode cannot run out of space");
    }
    ctx.free_map.release(sector);
    warn!("destroyed removed inode at sector {sector}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{block::MemBlockDevice, fs::inode::FsContext};

    fn ctx(num_sectors: u64) -> std::sync::Arc<FsContext<MemBlockDevice>> {
        FsContext::format(MemBlockDevice::new(num_sectors as usize), 64).unwrap()
    }

    #[test]
    fn create_read_write_round_trip() {
        let ctx = ctx(4096);
        let sector = ctx.free_map.allocate().unwrap();
        create(&ctx, sector, 0, false).unwrap();
        let data = b"hello, sector-addressable world";
        let written = write_at(&ctx, sector, data, 0).unwrap();
        assert_eq!(written, data.len());
        let mut out = vec![0u8; data.len()];
        let read = read_at(&ctx, sector, &mut out, 0);
        assert_eq!(read, data.len());
        assert_eq!(&out, data);
    }

    #[test]
    fn write_past_direct_pointers_uses_indirect_block() {
        let ctx = ctx(4096);
        let sector = ctx.free_map.allocate().unwrap();
        create(&ctx, sector, 0, false).unwrap();
        let offset = (DIRECT_POINTERS + 2) * SECTOR_SIZE;
        let data = [0xAB; 16];
        write_at(&ctx, sector, &data, offset).unwrap();
        let mut out = [0u8; 16];
        assert_eq!(read_at(&ctx, sector, &mut out, offset), 16);
        assert_eq!(out, data);
    }

    #[test]
    fn gap_before_write_reads_back_as_zero() {
        let ctx = ctx(4096);
        let sector = ctx.free_map.allocate().unwrap();
        create(&ctx, sector, 0, false).unwrap();
        write_at(&ctx, sector, b"tail", SECTOR_SIZE * 3).unwrap();
        let mut out = [0xFFu8; SECTOR_SIZE];
        assert_eq!(read_at(&ctx, sector, &mut out, 0), SECTOR_SIZE);
        assert!(out.iter().all(|&b| b == 0));
    }

    #[test]
    fn destroy_releases_every_allocated_sector() {
        let ctx = ctx(512);
        let sector = ctx.free_map.allocate().unwrap();
        create(&ctx, sector, 0, false).unwrap();
        write_at(&ctx, sector, &[1u8; 16], (DIRECT_POINTERS + 5) * SECTOR_SIZE).unwrap();
        let free_before = ctx.free_map.num_free();
        destroy(&ctx, sector);
        assert!(ctx.free_map.num_free() > free_before);
    }

    #[test]
    fn concurrent_growing_writes_to_one_inode_do_not_corrupt_its_block_list() {
        let ctx = ctx(8192);
        let sector = ctx.free_map.allocate().unwrap();
        create(&ctx, sector, 0, false).unwrap();

        let threads: Vec<_> = (0..8usize)
            .map(|i| {
                let ctx = std::sync::Arc::clone(&ctx);
                std::thread::spawn(move || {
                    write_at(&ctx, sector, &[i as u8; 4], i * SECTOR_SIZE).unwrap();
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        for i in 0..8usize {
            let mut out = [0u8; 4];
            assert_eq!(read_at(&ctx, sector, &mut out, i * SECTOR_SIZE), 4);
            assert_eq!(out, [i as u8; 4]);
        }
    }
}
