use std::path::Path;

use crate::geometry::DiskGeometry;

/// The block number to access ranging from 0 (the first block) to n - 1 (the last
/// block) where n is number of blocks available.
pub type BlockNumber = usize;

/// Block addressed access to the backing store.
///
/// Both the metadata zone and the data zone are addressed with absolute block
/// numbers, the zones are only a convention of the file system on top.
pub trait BlockStorage {
    /// Opens a disk at the specified path. The file must already exist and be
    /// exactly as large as the geometry requires, the contents are not validated.
    fn open_disk<P: AsRef<Path>>(path: P, geometry: DiskGeometry) -> std::io::Result<Self>
    where
        Self: std::marker::Sized;
    /// Size in bytes of every block on this device.
    fn block_size(&self) -> usize;
    /// Reads disk block number into provided buffer.
    ///
    /// # Errors
    ///
    /// Attempting to read a block out of range will return an error.
    fn read_block(&mut self, blocknr: BlockNumber, buf: &mut [u8]) -> std::io::Result<()>;
    /// Writes provided buffer into the specified block number. Buffers longer
    /// than a block are truncated.
    ///
    /// # Errors
    ///
    /// Attempting to write a block out of range will return an error.
    fn write_block(&mut self, blocknr: BlockNumber, buf: &[u8]) -> std::io::Result<()>;
    /// Flush any buffered disk IO from memory. This is useful if it must guaranteed
    /// the disk writes actually occurred, for instance, if being re-read from
    /// disk.
    fn sync_disk(&mut self) -> std::io::Result<()>;

    /// Reads `count` consecutive blocks starting at `start` into one buffer.
    fn read_zone(&mut self, start: BlockNumber, count: usize) -> std::io::Result<Vec<u8>> {
        let block_size = self.block_size();
        let mut zone = vec![0; count * block_size];
        for (i, chunk) in zone.chunks_mut(block_size).enumerate() {
            self.read_block(start + i, chunk)?;
        }
        Ok(zone)
    }

    /// Writes `bytes` over consecutive blocks starting at `start`. A trailing
    /// partial block only overwrites the bytes given.
    fn write_zone(&mut self, start: BlockNumber, bytes: &[u8]) -> std::io::Result<()> {
        let block_size = self.block_size();
        for (i, chunk) in bytes.chunks(block_size).enumerate() {
            self.write_block(start + i, chunk)?;
        }
        Ok(())
    }
}
