use log::warn;
use zerocopy::{AsBytes, FromBytes, FromZeroes};

use crate::entry::{DirEntry, ENTRY_SIZE, ROOT_SLOT};
use crate::fs::FsError;
use crate::geometry::DiskGeometry;
use crate::io::BlockStorage;

/// The directory table: a fixed number of slots, slot 0 is the root. Free
/// slots are zeroed records and get reused lowest index first, so listing
/// order is slot order and not creation order.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataTable {
    entries: Vec<DirEntry>,
}

impl MetadataTable {
    /// A table holding only the root directory.
    pub fn new(capacity: usize) -> Self {
        let mut entries = vec![DirEntry::new_zeroed(); capacity];
        entries[ROOT_SLOT] = DirEntry::root();
        Self { entries }
    }

    /// Decodes a table from the raw metadata zone. Bytes past the last whole
    /// record are ignored.
    pub fn parse(buf: &[u8], capacity: usize) -> Result<Self, FsError> {
        if buf.len() < capacity * ENTRY_SIZE {
            return Err(FsError::InvalidDisk(format!(
                "metadata zone holds {} bytes, {} entries need {}",
                buf.len(),
                capacity,
                capacity * ENTRY_SIZE
            )));
        }
        let entries = buf
            .chunks_exact(ENTRY_SIZE)
            .take(capacity)
            .map(|chunk| {
                DirEntry::read_from(chunk)
                    .ok_or_else(|| FsError::InvalidDisk("short directory record".to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { entries })
    }

    pub fn serialize(&self) -> &[u8] {
        self.entries.as_slice().as_bytes()
    }

    /// Writes the whole table over the metadata zone.
    pub fn persist<T: BlockStorage>(
        &self,
        dev: &mut T,
        geometry: &DiskGeometry,
    ) -> Result<(), FsError> {
        let mut zone = vec![0; geometry.metadata_blocks() * geometry.block_size()];
        let bytes = self.serialize();
        zone[0..bytes.len()].copy_from_slice(bytes);
        dev.write_zone(0, &zone)?;
        Ok(())
    }

    /// Loads the table from the metadata zone.
    pub fn reload<T: BlockStorage>(dev: &mut T, geometry: &DiskGeometry) -> Result<Self, FsError> {
        let zone = dev.read_zone(0, geometry.metadata_blocks())?;
        Self::parse(&zone, geometry.max_entries())
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// A live entry, `None` for free or out of range slots.
    pub fn get(&self, slot: usize) -> Option<&DirEntry> {
        self.entries.get(slot).filter(|entry| entry.in_use())
    }

    pub fn get_mut(&mut self, slot: usize) -> Option<&mut DirEntry> {
        self.entries.get_mut(slot).filter(|entry| entry.in_use())
    }

    pub fn find_child(&self, parent: usize, name: &str) -> Option<usize> {
        self.children(parent)
            .find(|&slot| self.entries[slot].has_name(name))
    }

    pub fn first_free_slot(&self) -> Option<usize> {
        self.entries.iter().position(|entry| !entry.in_use())
    }

    /// Live entries directly under `parent` in ascending slot order.
    pub fn children(&self, parent: usize) -> impl Iterator<Item = usize> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter(move |(_, entry)| entry.in_use() && entry.parent() == Some(parent))
            .map(|(slot, _)| slot)
    }

    pub fn has_children(&self, parent: usize) -> bool {
        self.children(parent).next().is_some()
    }

    pub fn insert(&mut self, slot: usize, entry: DirEntry) {
        self.entries[slot] = entry;
    }

    /// Returns the slot to the free pool.
    pub fn clear(&mut self, slot: usize) {
        self.entries[slot] = DirEntry::new_zeroed();
    }

    pub fn live_count(&self) -> usize {
        self.entries.iter().filter(|entry| entry.in_use()).count()
    }

    /// Live slots paired with their entries.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &DirEntry)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.in_use())
    }

    /// Slots from `slot` up to, but excluding, the root.
    pub fn ancestry(&self, slot: usize) -> Result<Vec<usize>, FsError> {
        let mut chain = Vec::new();
        let mut current = slot;
        while current != ROOT_SLOT {
            if chain.len() >= self.capacity() {
                return Err(FsError::InvalidDisk(format!(
                    "slot {} has a cyclic parent chain",
                    slot
                )));
            }
            let entry = self.get(current).ok_or_else(|| {
                FsError::InvalidDisk(format!("slot {} hangs off free slot {}", slot, current))
            })?;
            chain.push(current);
            current = entry.parent().ok_or_else(|| {
                FsError::InvalidDisk(format!("slot {} claims to be a second root", current))
            })?;
        }
        Ok(chain)
    }

    /// Checks the structural invariants: a single live root directory, every
    /// parent chain ends at the root, parents are directories and sibling
    /// names are unique.
    pub fn verify(&self) -> Result<(), FsError> {
        match self.get(ROOT_SLOT) {
            Some(root) if root.is_dir() && root.parent().is_none() => (),
            _ => return Err(FsError::InvalidDisk("slot 0 is not the root directory".to_string())),
        }
        for (slot, entry) in self.iter().filter(|(slot, _)| *slot != ROOT_SLOT) {
            self.ancestry(slot)?;
            let parent = entry.parent().unwrap_or(ROOT_SLOT);
            if !self.entries[parent].is_dir() {
                return Err(FsError::InvalidDisk(format!(
                    "slot {} has a file as its parent",
                    slot
                )));
            }
            if self.find_child(parent, &entry.name()) != Some(slot) {
                warn!("duplicate name {:?} under slot {}", entry.name(), parent);
                return Err(FsError::InvalidDisk(format!(
                    "slot {} duplicates a sibling name",
                    slot
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::EntryKind;
    use crate::io::FileBlockEmulatorBuilder;

    fn file(name: &str, parent: usize) -> DirEntry {
        DirEntry::new(name, EntryKind::File, parent, 0).unwrap()
    }

    fn dir(name: &str, parent: usize) -> DirEntry {
        DirEntry::new(name, EntryKind::Directory, parent, 0).unwrap()
    }

    #[test]
    fn new_table_holds_only_root() {
        let table = MetadataTable::new(8);
        assert_eq!(table.capacity(), 8);
        assert_eq!(table.live_count(), 1);
        assert_eq!(table.first_free_slot(), Some(1));
        assert_eq!(table.children(ROOT_SLOT).count(), 0);
        table.verify().unwrap();
    }

    #[test]
    fn children_follow_slot_order_after_reuse() {
        let mut table = MetadataTable::new(8);
        table.insert(1, file("a", 0));
        table.insert(2, file("b", 0));
        table.insert(3, file("c", 0));
        table.clear(1);

        assert_eq!(table.first_free_slot(), Some(1));
        table.insert(1, file("d", 0));
        let names: Vec<String> = table
            .children(0)
            .map(|slot| table.get(slot).unwrap().name().into_owned())
            .collect();
        assert_eq!(names, vec!["d", "b", "c"]);
    }

    #[test]
    fn find_child_only_looks_at_direct_children() {
        let mut table = MetadataTable::new(8);
        table.insert(1, dir("docs", 0));
        table.insert(2, file("a.txt", 1));

        assert_eq!(table.find_child(0, "docs"), Some(1));
        assert_eq!(table.find_child(1, "a.txt"), Some(2));
        assert_eq!(table.find_child(0, "a.txt"), None);
        assert!(table.has_children(1));
        assert!(!table.has_children(2));
    }

    #[test]
    fn full_table_has_no_free_slot() {
        let mut table = MetadataTable::new(3);
        table.insert(1, file("a", 0));
        table.insert(2, file("b", 0));
        assert_eq!(table.first_free_slot(), None);
    }

    #[test]
    fn ancestry_walks_to_root() {
        let mut table = MetadataTable::new(8);
        table.insert(1, dir("a", 0));
        table.insert(2, dir("b", 1));
        table.insert(3, file("c", 2));

        assert_eq!(table.ancestry(3).unwrap(), vec![3, 2, 1]);
        assert_eq!(table.ancestry(0).unwrap(), Vec::<usize>::new());
    }

    #[test]
    fn verify_rejects_cycles_and_orphans() {
        let mut table = MetadataTable::new(8);
        table.insert(1, dir("a", 2));
        table.insert(2, dir("b", 1));
        assert!(table.verify().is_err());

        let mut table = MetadataTable::new(8);
        table.insert(1, file("orphan", 5));
        assert!(table.verify().is_err());

        let mut table = MetadataTable::new(8);
        table.insert(1, file("a", 0));
        table.insert(2, file("a", 0));
        assert!(table.verify().is_err());
    }

    #[test]
    fn can_persist_and_reload_table() {
        let geometry = DiskGeometry::new(512, 8, 16).unwrap();
        let mut dev = FileBlockEmulatorBuilder::from(tempfile::tempfile().unwrap())
            .with_geometry(geometry)
            .build()
            .unwrap();

        let mut table = MetadataTable::new(16);
        table.insert(1, dir("docs", 0));
        let mut note = file("note", 1);
        note.set_content(5, 11);
        table.insert(9, note);
        table.persist(&mut dev, &geometry).unwrap();

        let loaded = MetadataTable::reload(&mut dev, &geometry).unwrap();
        assert_eq!(loaded, table);
        assert_eq!(loaded.get(9).unwrap().data_block(), Some(5));
    }

    #[test]
    fn zeroed_zone_has_no_root() {
        let table = MetadataTable::parse(&vec![0; 512], 8).unwrap();
        assert_eq!(table.live_count(), 0);
        assert!(table.verify().is_err());
    }
}
