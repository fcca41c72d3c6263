use crate::entry::ENTRY_SIZE;
use crate::fs::FsError;

/// Reference disk: 1MiB broken into 512 byte blocks.
pub const BLOCK_SIZE: usize = 512;
pub const TOTAL_BLOCKS: usize = 2048;
/// Upper bound on live files and directories, root included.
pub const MAX_ENTRIES: usize = 128;

/// The shape of a backing file. Changing any of these values invalidates
/// disks created with another geometry.
///
/// # Layout
/// ==========================================================
/// | Metadata zone (max_entries * 64B) | Data zone (blocks) |
/// ==========================================================
///
/// The metadata zone is rounded up to a block boundary, block indices are
/// absolute so the first data block is `metadata_blocks()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskGeometry {
    block_size: usize,
    total_blocks: usize,
    max_entries: usize,
}

impl Default for DiskGeometry {
    fn default() -> Self {
        Self {
            block_size: BLOCK_SIZE,
            total_blocks: TOTAL_BLOCKS,
            max_entries: MAX_ENTRIES,
        }
    }
}

impl DiskGeometry {
    pub fn new(
        block_size: usize,
        total_blocks: usize,
        max_entries: usize,
    ) -> Result<Self, FsError> {
        if block_size == 0 || total_blocks == 0 || max_entries == 0 {
            return Err(FsError::InvalidGeometry(
                "block size, block count and entry count must be non-zero".to_string(),
            ));
        }
        if block_size < ENTRY_SIZE {
            return Err(FsError::InvalidGeometry(format!(
                "block size {} is smaller than a {} byte entry",
                block_size, ENTRY_SIZE
            )));
        }
        let geometry = Self {
            block_size,
            total_blocks,
            max_entries,
        };
        if geometry.metadata_blocks() >= total_blocks {
            return Err(FsError::InvalidGeometry(format!(
                "{} entries need {} blocks, leaving no data blocks out of {}",
                max_entries,
                geometry.metadata_blocks(),
                total_blocks
            )));
        }
        Ok(geometry)
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn total_blocks(&self) -> usize {
        self.total_blocks
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn metadata_bytes(&self) -> usize {
        self.max_entries * ENTRY_SIZE
    }

    pub fn metadata_blocks(&self) -> usize {
        (self.metadata_bytes() + self.block_size - 1) / self.block_size
    }

    /// Index of the first block available for file content.
    pub fn data_start(&self) -> usize {
        self.metadata_blocks()
    }

    pub fn data_blocks(&self) -> usize {
        self.total_blocks - self.data_start()
    }

    pub fn disk_size(&self) -> u64 {
        (self.total_blocks * self.block_size) as u64
    }

    pub fn is_data_block(&self, blocknr: usize) -> bool {
        blocknr >= self.data_start() && blocknr < self.total_blocks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_geometry_matches_reference_disk() {
        let geo = DiskGeometry::default();
        assert_eq!(geo.disk_size(), 1024 * 1024);
        assert_eq!(geo.metadata_bytes(), 128 * 64);
        assert_eq!(geo.metadata_blocks(), 16);
        assert_eq!(geo.data_start(), 16);
        assert_eq!(geo.data_blocks(), 2048 - 16);
    }

    #[test]
    fn metadata_zone_rounds_up_to_block_boundary() {
        let geo = DiskGeometry::new(512, 32, 9).unwrap();
        assert_eq!(geo.metadata_blocks(), 2);
        assert!(!geo.is_data_block(1));
        assert!(geo.is_data_block(2));
        assert!(geo.is_data_block(31));
        assert!(!geo.is_data_block(32));
    }

    #[test]
    fn geometry_without_data_blocks_is_rejected() {
        match DiskGeometry::new(512, 16, 128) {
            Err(FsError::InvalidGeometry(_)) => (),
            other => panic!("expected invalid geometry, got {:?}", other),
        }
    }

    #[test]
    fn blocks_smaller_than_an_entry_are_rejected() {
        assert!(DiskGeometry::new(32, 64, 4).is_err());
        assert!(DiskGeometry::new(0, 64, 4).is_err());
    }
}
