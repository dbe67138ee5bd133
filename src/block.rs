//! The block device boundary.
//!
//! The device driver itself (the thing that actually reads and writes a
//! whole sector to spinning rust, flash, or a file) is an external
//! collaborator. The core only depends on the [`BlockDevice`] trait;
//! [`MemBlockDevice`] and [`FileBlockDevice`] are reference
//! implementations used by tests and by the `mkfs` tool, the way the
//! teacher's `block_io` crate tests against a `MockDevice` and its
//! `mkfs` binary drives a real file.

use std::{
    fs::File,
    io::{self, Read, Seek, SeekFrom, Write},
    path::Path,
    sync::{
        Mutex,
        atomic::{AtomicU64, Ordering},
    },
};

use crate::param::SECTOR_SIZE;

/// A synchronous, reliable, whole-sector block device.
///
/// Implementations must never perform a partial read or write: either the
/// full `SECTOR_SIZE` bytes are transferred, or an error is returned.
pub trait BlockDevice {
    type Error: std::error::Error + 'static;

    fn read(&self, sector: u32, buf: &mut [u8; SECTOR_SIZE]) -> Result<(), Self::Error>;
    fn write(&self, sector: u32, buf: &[u8; SECTOR_SIZE]) -> Result<(), Self::Error>;

    /// Total number of addressable sectors on the device.
    ///
    /// The device is flat and fixed-size (spec §1), so this never changes
    /// for the lifetime of a mounted filesystem.
    fn num_sectors(&self) -> u64;

    /// Monotonically increasing count of sectors written, exposed for
    /// tests (`block_write_count` in the spec).
    fn write_count(&self) -> u64;
}

/// An in-memory block device, sized at construction time.
///
/// Used by unit and integration tests in place of a real disk.
pub struct MemBlockDevice {
    sectors: Mutex<Vec<[u8; SECTOR_SIZE]>>,
    num_sectors: u64,
    write_count: AtomicU64,
    read_count: AtomicU64,
}

#[derive(Debug, thiserror::Error)]
#[error("sector {0} is out of range")]
pub struct OutOfRange(pub u32);

impl MemBlockDevice {
    #[must_use]
    pub fn new(num_sectors: usize) -> Self {
        Self {
            sectors: Mutex::new(vec![[0u8; SECTOR_SIZE]; num_sectors]),
            num_sectors: num_sectors as u64,
            write_count: AtomicU64::new(0),
            read_count: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn read_count(&self) -> u64 {
        self.read_count.load(Ordering::Relaxed)
    }
}

impl BlockDevice for MemBlockDevice {
    type Error = OutOfRange;

    fn read(&self, sector: u32, buf: &mut [u8; SECTOR_SIZE]) -> Result<(), Self::Error> {
        let sectors = self.sectors.lock().unwrap();
        let data = sectors.get(sector as usize).ok_or(OutOfRange(sector))?;
        buf.copy_from_slice(data);
        self.read_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn write(&self, sector: u32, buf: &[u8; SECTOR_SIZE]) -> Result<(), Self::Error> {
        let mut sectors = self.sectors.lock().unwrap();
        let data = sectors
            .get_mut(sector as usize)
            .ok_or(OutOfRange(sector))?;
        data.copy_from_slice(buf);
        self.write_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn write_count(&self) -> u64 {
        self.write_count.load(Ordering::Relaxed)
    }

    fn num_sectors(&self) -> u64 {
        self.num_sectors
    }
}

/// A block device backed by a regular file, used to hold a persistent
/// disk image on the host filesystem (e.g. for the `mkfs` tool).
pub struct FileBlockDevice {
    file: Mutex<File>,
    num_sectors: u64,
    write_count: AtomicU64,
}

impl FileBlockDevice {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::options().read(true).write(true).open(path)?;
        let len = file.metadata()?.len();
        Ok(Self {
            file: Mutex::new(file),
            num_sectors: len / SECTOR_SIZE as u64,
            write_count: AtomicU64::new(0),
        })
    }

    /// Creates a new image file of `num_sectors` zero-filled sectors.
    pub fn create(path: impl AsRef<Path>, num_sectors: u64) -> io::Result<Self> {
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(num_sectors * SECTOR_SIZE as u64)?;
        Ok(Self {
            file: Mutex::new(file),
            num_sectors,
            write_count: AtomicU64::new(0),
        })
    }
}

impl BlockDevice for FileBlockDevice {
    type Error = io::Error;

    fn read(&self, sector: u32, buf: &mut [u8; SECTOR_SIZE]) -> Result<(), Self::Error> {
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start(u64::from(sector) * SECTOR_SIZE as u64))?;
        file.read_exact(buf)
    }

    fn write(&self, sector: u32, buf: &[u8; SECTOR_SIZE]) -> Result<(), Self::Error> {
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start(u64::from(sector) * SECTOR_SIZE as u64))?;
        file.write_all(buf)?;
        self.write_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn write_count(&self) -> u64 {
        self.write_count.load(Ordering::Relaxed)
    }

    fn num_sectors(&self) -> u64 {
        self.num_sectors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mem_device_round_trip() {
        let dev = MemBlockDevice::new(4);
        let mut buf = [7u8; SECTOR_SIZE];
        dev.write(2, &buf).unwrap();
        buf = [0u8; SECTOR_SIZE];
        dev.read(2, &mut buf).unwrap();
        assert_eq!(buf, [7u8; SECTOR_SIZE]);
        assert_eq!(dev.write_count(), 1);
        assert_eq!(dev.read_count(), 1);
    }

    #[test]
    fn mem_device_out_of_range() {
        let dev = MemBlockDevice::new(1);
        let mut buf = [0u8; SECTOR_SIZE];
        assert!(dev.read(5, &mut buf).is_err());
    }
}
