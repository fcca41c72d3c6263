use crate::geometry::DiskGeometry;

#[derive(Debug, PartialEq)]
pub enum State {
    Free,
    Used,
}

/// One bit per block of the disk, packed into u64 words.
#[derive(Debug, Clone, PartialEq)]
pub struct Bitmap {
    bitmap: Vec<u64>,
    len: usize,
}

impl Bitmap {
    pub fn new(len: usize) -> Self {
        Self {
            bitmap: vec![0; (len + 63) / 64],
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn get(&self, blocknr: usize) -> State {
        assert!(blocknr < self.len, "bitmap index {} out of range", blocknr);
        // Grab the u64 containing the significant bit.
        let word = self.bitmap[blocknr / 64];
        let inner_offset = blocknr % 64;
        match (word >> inner_offset) & 0b01 {
            0 => State::Free,
            _ => State::Used,
        }
    }

    pub fn set_reserved(&mut self, blocknr: usize) {
        assert!(blocknr < self.len, "bitmap index {} out of range", blocknr);
        self.bitmap[blocknr / 64] |= 0b01_u64 << (blocknr % 64);
    }

    pub fn set_free(&mut self, blocknr: usize) {
        assert!(blocknr < self.len, "bitmap index {} out of range", blocknr);
        self.bitmap[blocknr / 64] &= !(0b01_u64 << (blocknr % 64));
    }

    pub fn clear(&mut self) {
        self.bitmap.iter_mut().for_each(|word| *word = 0);
    }
}

/// Hands out data blocks one at a time. The policy is first fit: every
/// allocation scans upward from the first data block, so a freed block is
/// reused before any block after it.
///
/// Metadata blocks are never handed out. The map lives in memory only and is
/// rebuilt from the directory table whenever a disk is opened.
pub struct BlockAllocator {
    bitmap: Bitmap,
    /// First allocatable block, everything before it is the metadata zone.
    start: usize,
}

impl BlockAllocator {
    pub fn new(geometry: &DiskGeometry) -> Self {
        Self {
            bitmap: Bitmap::new(geometry.total_blocks()),
            start: geometry.data_start(),
        }
    }

    /// Reserves the lowest free data block, `None` when the data zone is full.
    pub fn allocate(&mut self) -> Option<usize> {
        let block = (self.start..self.bitmap.len()).find(|&i| self.bitmap.get(i) == State::Free)?;
        self.bitmap.set_reserved(block);
        Some(block)
    }

    /// Marks a block known to be in use, e.g. while loading a disk. Returns
    /// false if the block was already reserved or lies outside the data zone.
    pub fn reserve(&mut self, blocknr: usize) -> bool {
        if !self.is_data_block(blocknr) || self.bitmap.get(blocknr) == State::Used {
            return false;
        }
        self.bitmap.set_reserved(blocknr);
        true
    }

    /// Releases a block. Blocks outside the data zone are ignored.
    pub fn free(&mut self, blocknr: usize) {
        if self.is_data_block(blocknr) {
            self.bitmap.set_free(blocknr);
        }
    }

    pub fn is_reserved(&self, blocknr: usize) -> bool {
        self.is_data_block(blocknr) && self.bitmap.get(blocknr) == State::Used
    }

    pub fn free_count(&self) -> usize {
        (self.start..self.bitmap.len())
            .filter(|&i| self.bitmap.get(i) == State::Free)
            .count()
    }

    pub fn reset(&mut self) {
        self.bitmap.clear();
    }

    fn is_data_block(&self, blocknr: usize) -> bool {
        blocknr >= self.start && blocknr < self.bitmap.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_allocator() -> BlockAllocator {
        // One metadata block followed by three data blocks.
        BlockAllocator::new(&DiskGeometry::new(512, 4, 8).unwrap())
    }

    #[test]
    fn can_read_and_write_values_to_bitmap() {
        let mut bmp = Bitmap::new(128);

        bmp.set_reserved(2);

        assert_eq!(bmp.get(0), State::Free);
        assert_eq!(bmp.get(2), State::Used);
    }

    #[test]
    fn can_set_values_at_ends_of_bitmap() {
        let mut bmp = Bitmap::new(130);

        bmp.set_reserved(0);
        bmp.set_reserved(63);
        bmp.set_reserved(64);
        bmp.set_reserved(129);

        assert_eq!(bmp.get(0), State::Used);
        assert_eq!(bmp.get(63), State::Used);
        assert_eq!(bmp.get(64), State::Used);
        assert_eq!(bmp.get(129), State::Used);
        assert_eq!(bmp.get(128), State::Free);
    }

    #[test]
    fn can_toggle_block_between_free_and_used() {
        let mut bmp = Bitmap::new(64);

        bmp.set_reserved(10);
        bmp.set_reserved(11);
        assert_eq!(bmp.get(10), State::Used);

        bmp.set_free(10);
        assert_eq!(bmp.get(10), State::Free);
        // Neighbours are untouched.
        assert_eq!(bmp.get(11), State::Used);
    }

    #[test]
    #[should_panic]
    fn bitmap_access_out_of_range_panics() {
        Bitmap::new(10).get(10);
    }

    #[test]
    fn allocation_skips_metadata_zone_and_reports_full() {
        let mut alloc = tiny_allocator();

        assert_eq!(alloc.allocate(), Some(1));
        assert_eq!(alloc.allocate(), Some(2));
        assert_eq!(alloc.allocate(), Some(3));
        assert_eq!(alloc.allocate(), None);
        assert_eq!(alloc.free_count(), 0);
    }

    #[test]
    fn freed_blocks_are_reused_first() {
        let mut alloc = tiny_allocator();
        alloc.allocate();
        alloc.allocate();
        alloc.allocate();

        alloc.free(2);
        assert!(!alloc.is_reserved(2));
        assert_eq!(alloc.allocate(), Some(2));
    }

    #[test]
    fn reserve_rejects_duplicates_and_metadata_blocks() {
        let mut alloc = tiny_allocator();

        assert!(alloc.reserve(3));
        assert!(!alloc.reserve(3));
        assert!(!alloc.reserve(0));
        assert!(!alloc.reserve(4));
        assert_eq!(alloc.allocate(), Some(1));
    }

    #[test]
    fn freeing_outside_data_zone_is_ignored() {
        let mut alloc = tiny_allocator();
        alloc.free(0);
        alloc.free(99);
        assert_eq!(alloc.free_count(), 3);
    }
}
