use std::borrow::Cow;
use std::fmt;

use zerocopy::byteorder::{LittleEndian, I32, U32};
use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};

use crate::fs::FsError;
use crate::perm::{Permissions, DEFAULT_DIR_PERMISSIONS, DEFAULT_FILE_PERMISSIONS};

/// Bytes occupied by one record in the metadata zone.
pub const ENTRY_SIZE: usize = 64;
/// Longest name a record can hold, the name buffer keeps one byte for a NUL.
pub const NAME_MAX: usize = 31;
pub const ROOT_NAME: &str = "/";
/// Slot of the root directory.
pub const ROOT_SLOT: usize = 0;

/// Marks a missing parent or data block on disk.
const NONE: i32 = -1;
const KIND_DIRECTORY: u8 = 0;
const KIND_FILE: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// One slot of the directory table as it is laid out on disk. The array
/// position of the record is its identity.
///
/// This structure __must stay exactly 64 bytes.__ All multi-byte fields are
/// little endian so disks move between hosts.
#[repr(C)]
#[derive(AsBytes, FromBytes, FromZeroes, Unaligned, Debug, Clone, Copy, PartialEq)]
pub struct DirEntry {
    /// NUL padded name.
    name: [u8; 32],
    kind: u8,
    in_use: u8,
    _pad: [u8; 2],
    /// Length of the file content in bytes, always 0 for directories.
    size: U32<LittleEndian>,
    /// The single block holding file content or -1.
    data_block: I32<LittleEndian>,
    /// Slot of the parent directory, -1 for the root only.
    parent: I32<LittleEndian>,
    owner_id: U32<LittleEndian>,
    permissions: U32<LittleEndian>,
    /// Reserved for future attributes up to the 64 byte limit.
    reserved: [u8; 8],
}

const _: () = assert!(std::mem::size_of::<DirEntry>() == ENTRY_SIZE);

/// Rejects names the table cannot store or that would shadow path syntax.
pub fn validate_name(name: &str) -> Result<(), FsError> {
    if name.is_empty()
        || name.len() > NAME_MAX
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\0')
    {
        return Err(FsError::InvalidName(name.to_string()));
    }
    Ok(())
}

impl DirEntry {
    pub fn root() -> Self {
        let mut root = Self::new_zeroed();
        root.name[0..ROOT_NAME.len()].copy_from_slice(ROOT_NAME.as_bytes());
        root.kind = KIND_DIRECTORY;
        root.in_use = 1;
        root.data_block = I32::new(NONE);
        root.parent = I32::new(NONE);
        root.permissions = U32::new(DEFAULT_DIR_PERMISSIONS.raw());
        root
    }

    /// A live entry under `parent` with the default permissions for its kind.
    pub fn new(name: &str, kind: EntryKind, parent: usize, owner_id: u32) -> Result<Self, FsError> {
        validate_name(name)?;
        let mut entry = Self::new_zeroed();
        entry.name[0..name.len()].copy_from_slice(name.as_bytes());
        entry.in_use = 1;
        entry.data_block = I32::new(NONE);
        entry.parent = I32::new(parent as i32);
        entry.owner_id = U32::new(owner_id);
        let permissions = match kind {
            EntryKind::Directory => {
                entry.kind = KIND_DIRECTORY;
                DEFAULT_DIR_PERMISSIONS
            }
            EntryKind::File => {
                entry.kind = KIND_FILE;
                DEFAULT_FILE_PERMISSIONS
            }
        };
        entry.permissions = U32::new(permissions.raw());
        Ok(entry)
    }

    /// Stored name without the NUL padding.
    fn name_bytes(&self) -> &[u8] {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(self.name.len());
        &self.name[0..end]
    }

    pub fn name(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.name_bytes())
    }

    pub fn has_name(&self, name: &str) -> bool {
        self.name_bytes() == name.as_bytes()
    }

    pub fn kind(&self) -> EntryKind {
        match self.kind {
            KIND_FILE => EntryKind::File,
            _ => EntryKind::Directory,
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind() == EntryKind::File
    }

    pub fn is_dir(&self) -> bool {
        self.kind() == EntryKind::Directory
    }

    pub fn in_use(&self) -> bool {
        self.in_use != 0
    }

    pub fn size(&self) -> usize {
        self.size.get() as usize
    }

    pub fn data_block(&self) -> Option<usize> {
        match self.data_block.get() {
            n if n < 0 => None,
            n => Some(n as usize),
        }
    }

    pub fn parent(&self) -> Option<usize> {
        match self.parent.get() {
            n if n < 0 => None,
            n => Some(n as usize),
        }
    }

    pub fn owner_id(&self) -> u32 {
        self.owner_id.get()
    }

    pub fn permissions(&self) -> Permissions {
        Permissions::new(self.permissions.get())
    }

    /// Points the entry at a freshly written block.
    pub fn set_content(&mut self, block: usize, size: usize) {
        self.data_block = I32::new(block as i32);
        self.size = U32::new(size as u32);
    }

    pub fn clear_content(&mut self) {
        self.data_block = I32::new(-1);
        self.size = U32::new(0);
    }
}

/// Snapshot of a live entry handed out by queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub slot: usize,
    pub name: String,
    pub kind: EntryKind,
    pub size: usize,
    pub owner_id: u32,
    pub permissions: Permissions,
}

impl EntryInfo {
    pub(crate) fn from_entry(slot: usize, entry: &DirEntry) -> Self {
        Self {
            slot,
            name: entry.name().into_owned(),
            kind: entry.kind(),
            size: entry.size(),
            owner_id: entry.owner_id(),
            permissions: entry.permissions(),
        }
    }
}

impl fmt::Display for EntryInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            EntryKind::File => write!(f, "[FILE] {}", self.name),
            EntryKind::Directory => write!(f, "[DIR] {}", self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_record_has_no_parent_or_block() {
        let root = DirEntry::root();
        assert!(root.in_use());
        assert!(root.is_dir());
        assert!(root.has_name("/"));
        assert_eq!(root.parent(), None);
        assert_eq!(root.data_block(), None);
        assert_eq!(root.permissions().raw(), 755);
    }

    #[test]
    fn new_entries_get_default_permissions_per_kind() {
        let dir = DirEntry::new("docs", EntryKind::Directory, 0, 7).unwrap();
        let file = DirEntry::new("a.txt", EntryKind::File, 3, 7).unwrap();

        assert_eq!(dir.permissions().raw(), 755);
        assert_eq!(file.permissions().raw(), 644);
        assert_eq!(file.parent(), Some(3));
        assert_eq!(file.owner_id(), 7);
        assert_eq!(file.size(), 0);
        assert_eq!(file.data_block(), None);
    }

    #[test]
    fn names_are_compared_without_padding() {
        let entry = DirEntry::new("abc", EntryKind::File, 0, 0).unwrap();
        assert!(entry.has_name("abc"));
        assert!(!entry.has_name("ab"));
        assert!(!entry.has_name("abc\0"));
        assert_eq!(entry.name(), "abc");
    }

    #[test]
    fn longest_name_fills_buffer_but_keeps_terminator() {
        let name = "n".repeat(NAME_MAX);
        let entry = DirEntry::new(&name, EntryKind::File, 0, 0).unwrap();
        assert_eq!(entry.name(), name.as_str());
        assert_eq!(entry.as_bytes()[NAME_MAX], 0);
    }

    #[test]
    fn invalid_names_are_rejected() {
        let long = "x".repeat(NAME_MAX + 1);
        for name in ["", ".", "..", "a/b", "nul\0", long.as_str()].iter() {
            match DirEntry::new(name, EntryKind::File, 0, 0) {
                Err(FsError::InvalidName(_)) => (),
                other => panic!("expected invalid name for {:?}, got {:?}", name, other),
            }
        }
    }

    #[test]
    fn record_layout_is_stable() {
        let mut entry = DirEntry::new("f", EntryKind::File, 2, 0x0102).unwrap();
        entry.set_content(17, 5);
        let bytes = entry.as_bytes();

        assert_eq!(bytes.len(), ENTRY_SIZE);
        assert_eq!(bytes[0], b'f');
        assert_eq!(bytes[32], KIND_FILE);
        assert_eq!(bytes[33], 1);
        assert_eq!(&bytes[36..40], &5u32.to_le_bytes());
        assert_eq!(&bytes[40..44], &17i32.to_le_bytes());
        assert_eq!(&bytes[44..48], &2i32.to_le_bytes());
        assert_eq!(&bytes[48..52], &0x0102u32.to_le_bytes());
        assert_eq!(&bytes[52..56], &644u32.to_le_bytes());
        assert_eq!(DirEntry::read_from(bytes), Some(entry));
    }

    #[test]
    fn zeroed_record_is_a_free_slot() {
        let entry = DirEntry::new_zeroed();
        assert!(!entry.in_use());
        assert_eq!(entry.name(), "");
    }
}
