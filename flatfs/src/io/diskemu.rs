use crate::geometry::DiskGeometry;
use crate::io::{BlockNumber, BlockStorage};
use std::fs::{File, OpenOptions};
use std::io::prelude::*;
use std::io::{BufWriter, ErrorKind, SeekFrom};
use std::path::Path;

/// Emulates block disk storage in userspace using a single fixed-size file.
pub struct FileBlockEmulator {
    /// The file must be exactly `block_count * block_size` bytes long.
    fd: File,
    block_size: usize,
    /// The total number of blocks available in the file store.
    block_count: usize,
}

impl FileBlockEmulator {
    /// Returns ownership of the underlying file descriptor to the caller.
    pub fn into_file(self) -> File {
        self.fd
    }

    fn check_range(&self, blocknr: BlockNumber) -> std::io::Result<()> {
        if blocknr >= self.block_count {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                format!("block {} out of range", blocknr),
            ));
        }
        Ok(())
    }
}

impl BlockStorage for FileBlockEmulator {
    fn open_disk<P: AsRef<Path>>(dest: P, geometry: DiskGeometry) -> std::io::Result<Self>
    where
        Self: std::marker::Sized,
    {
        // Return error if the file does not exist rather than create one.
        let file = OpenOptions::new().read(true).write(true).open(dest)?;
        let len = file.metadata()?.len();
        if len != geometry.disk_size() {
            return Err(std::io::Error::new(
                ErrorKind::InvalidData,
                format!(
                    "disk is {} bytes, expected {} bytes",
                    len,
                    geometry.disk_size()
                ),
            ));
        }
        Ok(FileBlockEmulator {
            fd: file,
            block_size: geometry.block_size(),
            block_count: geometry.total_blocks(),
        })
    }

    fn block_size(&self) -> usize {
        self.block_size
    }

    fn read_block(&mut self, blocknr: BlockNumber, buf: &mut [u8]) -> std::io::Result<()> {
        self.check_range(blocknr)?;
        if buf.len() < self.block_size {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                "buffer does not contain enough space to read block",
            ));
        }
        self.fd
            .seek(SeekFrom::Start((blocknr * self.block_size) as u64))?;
        self.fd.read_exact(&mut buf[0..self.block_size])
    }

    /// This method truncates writes that exceed the total block size.
    fn write_block(&mut self, blocknr: BlockNumber, buf: &[u8]) -> std::io::Result<()> {
        self.check_range(blocknr)?;
        self.fd
            .seek(SeekFrom::Start((blocknr * self.block_size) as u64))?;

        let max = std::cmp::min(self.block_size, buf.len());
        self.fd.write_all(&buf[0..max])
    }

    fn sync_disk(&mut self) -> std::io::Result<()> {
        self.fd.sync_all()
    }
}

pub struct FileBlockEmulatorBuilder {
    fd: File,
    geometry: DiskGeometry,
    clear_medium: bool,
}

impl From<File> for FileBlockEmulatorBuilder {
    fn from(fd: File) -> Self {
        FileBlockEmulatorBuilder {
            fd,
            geometry: DiskGeometry::default(),
            clear_medium: true,
        }
    }
}

impl FileBlockEmulatorBuilder {
    /// Sets the block size and number of blocks of the device.
    pub fn with_geometry(mut self, geometry: DiskGeometry) -> Self {
        self.geometry = geometry;
        self
    }

    /// Whether `build` zero fills the file. Defaults to true, pass false to
    /// reattach to a disk that already holds a file system.
    pub fn clear_medium(mut self, clear: bool) -> Self {
        self.clear_medium = clear;
        self
    }

    /// This builder assumes ownership of the file descriptor used and does
    /// destructive things to prepare the file for use. Additionally, ownership
    /// of the file is transfered to the emulator meaning this builder can only
    /// be used to create one emulator.
    pub fn build(mut self) -> std::io::Result<FileBlockEmulator> {
        if self.clear_medium {
            self.zero_blocks()?;
        }
        Ok(FileBlockEmulator {
            fd: self.fd,
            block_size: self.geometry.block_size(),
            block_count: self.geometry.total_blocks(),
        })
    }

    fn zero_blocks(&mut self) -> std::io::Result<()> {
        self.fd.set_len(self.geometry.disk_size())?;
        self.fd.seek(SeekFrom::Start(0))?;
        let zeroes = vec![0x00; self.geometry.block_size()];
        let mut bfd = BufWriter::new(&self.fd);
        // Zero out every block, buffering each write to prevent excessive syscalls.
        for _ in 0..self.geometry.total_blocks() {
            bfd.write_all(&zeroes)?;
        }
        bfd.flush()
    }
}
