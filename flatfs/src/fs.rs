use std::fmt;
use std::fs::OpenOptions;
use std::path::Path;

use log::{debug, info, warn};
use thiserror::Error;

use crate::alloc::BlockAllocator;
use crate::entry::{DirEntry, EntryInfo, EntryKind};
use crate::geometry::DiskGeometry;
use crate::io::{BlockStorage, FileBlockEmulator, FileBlockEmulatorBuilder};
use crate::perm::Access;
use crate::session::Session;
use crate::table::MetadataTable;

pub type Result<T> = std::result::Result<T, FsError>;

#[derive(Error, Debug)]
pub enum FsError {
    #[error("File or directory already exists")]
    AlreadyExists,
    #[error("File or directory not found")]
    NotFound,
    #[error("{0} is not a directory")]
    NotADirectory(String),
    #[error("Directory not empty")]
    NotEmpty,
    #[error("No space for more files or directories")]
    TableFull,
    #[error("Disk full")]
    DiskFull,
    #[error("Permission denied")]
    PermissionDenied,
    #[error("block {0} is outside the data region")]
    OutOfRange(usize),
    #[error("content of {len} bytes does not fit in a {max} byte block")]
    FileTooLarge { len: usize, max: usize },
    #[error("invalid name: {0:?}")]
    InvalidName(String),
    #[error("invalid disk geometry: {0}")]
    InvalidGeometry(String),
    #[error("invalid disk: {0}")]
    InvalidDisk(String),
    #[error("disk I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// One row of a `tree` listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeLine {
    pub depth: usize,
    pub kind: EntryKind,
    pub name: String,
}

impl fmt::Display for TreeLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = match self.kind {
            EntryKind::Directory => "+",
            EntryKind::File => "-",
        };
        write!(f, "{:indent$}{} {}", "", marker, self.name, indent = self.depth * 2)
    }
}

/// A single user file system on a fixed size block device.
///
/// The directory table is held in memory and written back in full after
/// every change, file content lives in exactly one data block per file.
pub struct FlatFs<T: BlockStorage> {
    dev: T,
    geometry: DiskGeometry,
    table: MetadataTable,
    blocks: BlockAllocator,
    session: Session,
}

impl FlatFs<FileBlockEmulator> {
    /// Opens the disk file at `path`, creating and formatting it first if it
    /// does not exist yet.
    pub fn open_or_create<P: AsRef<Path>>(path: P, geometry: DiskGeometry) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            info!("Opening virtual disk {}", path.display());
            let dev = FileBlockEmulator::open_disk(path, geometry)?;
            return FlatFs::open(dev, geometry);
        }

        info!("Creating virtual disk {}", path.display());
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;
        let dev = FileBlockEmulatorBuilder::from(file)
            .with_geometry(geometry)
            .build()?;
        FlatFs::create(dev, geometry)
    }
}

impl<T: BlockStorage> FlatFs<T> {
    /// Initializes an empty file system, only the root directory, onto owned
    /// block storage.
    pub fn create(dev: T, geometry: DiskGeometry) -> Result<Self> {
        Self::check_device(&dev, &geometry)?;
        let fs = FlatFs {
            dev,
            geometry,
            table: MetadataTable::new(geometry.max_entries()),
            blocks: BlockAllocator::new(&geometry),
            session: Session::default(),
        };
        fs.persist_into()
    }

    /// Mounts a disk previously initialized with `create`.
    ///
    /// Block allocations are not stored on disk, they are recovered from the
    /// files in the table. A file whose block is already claimed by a lower
    /// slot is detached from it and reads as empty.
    pub fn open(mut dev: T, geometry: DiskGeometry) -> Result<Self> {
        Self::check_device(&dev, &geometry)?;
        let mut table = MetadataTable::reload(&mut dev, &geometry)?;
        table.verify()?;

        let mut blocks = BlockAllocator::new(&geometry);
        let mut detached = Vec::new();
        for (slot, entry) in table.iter() {
            let block = match entry.data_block() {
                Some(block) => block,
                None => continue,
            };
            if !geometry.is_data_block(block) {
                warn!("slot {} points at block {} outside the data zone", slot, block);
            } else if !blocks.reserve(block) {
                warn!("slot {} shares block {} with a lower slot, detaching", slot, block);
                detached.push(slot);
            }
        }
        for slot in detached {
            if let Some(entry) = table.get_mut(slot) {
                entry.clear_content();
            }
        }
        info!(
            "Mounted disk with {} entries and {} free blocks",
            table.live_count(),
            blocks.free_count()
        );

        Ok(FlatFs {
            dev,
            geometry,
            table,
            blocks,
            session: Session::default(),
        })
    }

    fn check_device(dev: &T, geometry: &DiskGeometry) -> Result<()> {
        if dev.block_size() != geometry.block_size() {
            return Err(FsError::InvalidGeometry(format!(
                "device blocks are {} bytes, geometry expects {}",
                dev.block_size(),
                geometry.block_size()
            )));
        }
        Ok(())
    }

    fn persist_into(mut self) -> Result<Self> {
        self.persist()?;
        Ok(self)
    }

    /// Flushes the whole directory table to disk.
    fn persist(&mut self) -> Result<()> {
        self.table.persist(&mut self.dev, &self.geometry)?;
        self.dev.sync_disk()?;
        Ok(())
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn geometry(&self) -> &DiskGeometry {
        &self.geometry
    }

    pub fn entry(&self, slot: usize) -> Option<EntryInfo> {
        self.table
            .get(slot)
            .map(|entry| EntryInfo::from_entry(slot, entry))
    }

    pub fn free_blocks(&self) -> usize {
        self.blocks.free_count()
    }

    pub fn is_block_reserved(&self, blocknr: usize) -> bool {
        self.blocks.is_reserved(blocknr)
    }

    /// Hands back the block device, e.g. to reopen it.
    pub fn into_device(self) -> T {
        self.dev
    }

    pub fn make_directory(&mut self, name: &str) -> Result<usize> {
        self.create_entry(name, EntryKind::Directory)
    }

    pub fn make_file(&mut self, name: &str) -> Result<usize> {
        self.create_entry(name, EntryKind::File)
    }

    fn create_entry(&mut self, name: &str, kind: EntryKind) -> Result<usize> {
        let cwd = self.session.cwd();
        let entry = DirEntry::new(name, kind, cwd, self.session.user_id())?;
        if self.table.find_child(cwd, name).is_some() {
            return Err(FsError::AlreadyExists);
        }
        let slot = self.table.first_free_slot().ok_or(FsError::TableFull)?;

        self.table.insert(slot, entry);
        self.persist()?;
        debug!("created {:?} {:?} in slot {} under slot {}", kind, name, slot, cwd);
        Ok(slot)
    }

    /// Entries of the current directory in slot order.
    pub fn list(&self) -> Vec<EntryInfo> {
        self.table
            .children(self.session.cwd())
            .filter_map(|slot| self.entry(slot))
            .collect()
    }

    pub fn change_directory(&mut self, name: &str) -> Result<()> {
        let cwd = self.session.cwd();
        if name == ".." {
            if let Some(parent) = self.table.get(cwd).and_then(DirEntry::parent) {
                self.session.set_cwd(parent);
            }
            return Ok(());
        }

        let slot = self.table.find_child(cwd, name).ok_or(FsError::NotFound)?;
        if self.table.get(slot).map_or(true, DirEntry::is_file) {
            return Err(FsError::NotADirectory(name.to_string()));
        }
        self.session.set_cwd(slot);
        Ok(())
    }

    /// Finds a file in the current directory. Directories of the same name
    /// do not count.
    fn find_file(&self, name: &str) -> Result<usize> {
        self.table
            .find_child(self.session.cwd(), name)
            .filter(|&slot| self.table.get(slot).map_or(false, DirEntry::is_file))
            .ok_or(FsError::NotFound)
    }

    fn check_access(&self, slot: usize, access: Access) -> Result<()> {
        let entry = self.table.get(slot).ok_or(FsError::NotFound)?;
        let role = self.session.role_for(entry);
        if !entry.permissions().allows(role, access) {
            return Err(FsError::PermissionDenied);
        }
        Ok(())
    }

    pub fn read_file(&mut self, name: &str) -> Result<String> {
        let slot = self.find_file(name)?;
        self.check_access(slot, Access::Read)?;

        let entry = self.table.get(slot).ok_or(FsError::NotFound)?;
        let block = match entry.data_block() {
            Some(block) => block,
            None => return Ok(String::new()),
        };
        if !self.geometry.is_data_block(block) {
            return Err(FsError::OutOfRange(block));
        }
        let size = std::cmp::min(entry.size(), self.geometry.block_size());

        let mut buf = vec![0; self.geometry.block_size()];
        self.dev.read_block(block, &mut buf)?;
        Ok(String::from_utf8_lossy(&buf[0..size]).into_owned())
    }

    /// Replaces the content of a file. The content is written to a newly
    /// allocated block and the previous block is released afterwards.
    pub fn write_file(&mut self, name: &str, content: &str) -> Result<()> {
        let slot = self.find_file(name)?;
        self.check_access(slot, Access::Write)?;
        let max = self.geometry.block_size();
        if content.len() > max {
            return Err(FsError::FileTooLarge {
                len: content.len(),
                max,
            });
        }

        let block = self.blocks.allocate().ok_or(FsError::DiskFull)?;
        let mut buf = vec![0; max];
        buf[0..content.len()].copy_from_slice(content.as_bytes());
        if let Err(e) = self.dev.write_block(block, &buf) {
            self.blocks.free(block);
            return Err(e.into());
        }

        let entry = self.table.get_mut(slot).ok_or(FsError::NotFound)?;
        let previous = entry.data_block();
        entry.set_content(block, content.len());
        self.persist()?;
        if let Some(previous) = previous {
            self.blocks.free(previous);
        }
        debug!("wrote {} bytes of slot {} to block {}", content.len(), slot, block);
        Ok(())
    }

    /// Deletes a file or an empty directory from the current directory.
    pub fn remove(&mut self, name: &str) -> Result<()> {
        let slot = self
            .table
            .find_child(self.session.cwd(), name)
            .ok_or(FsError::NotFound)?;
        let entry = *self.table.get(slot).ok_or(FsError::NotFound)?;
        if entry.is_dir() && self.table.has_children(slot) {
            return Err(FsError::NotEmpty);
        }

        self.table.clear(slot);
        self.persist()?;
        if let Some(block) = entry.data_block() {
            self.blocks.free(block);
        }
        debug!("removed {:?} from slot {}", name, slot);
        Ok(())
    }

    /// Absolute path of the current directory, `/` at the root.
    pub fn print_working_path(&self) -> Result<String> {
        let chain = self.table.ancestry(self.session.cwd())?;
        if chain.is_empty() {
            return Ok("/".to_string());
        }
        let mut path = String::new();
        for slot in chain.into_iter().rev() {
            path.push('/');
            if let Some(entry) = self.table.get(slot) {
                path.push_str(&entry.name());
            }
        }
        Ok(path)
    }

    /// Pre-order listing of everything below `index`, entries directly under
    /// it are at `depth`.
    pub fn tree(&self, index: usize, depth: usize) -> Vec<TreeLine> {
        let mut lines = Vec::new();
        self.collect_tree(index, depth, &mut lines);
        lines
    }

    fn collect_tree(&self, index: usize, depth: usize, lines: &mut Vec<TreeLine>) {
        // A sound table never nests deeper than it has slots.
        if depth >= self.table.capacity() {
            return;
        }
        for slot in self.table.children(index) {
            let entry = match self.table.get(slot) {
                Some(entry) => entry,
                None => continue,
            };
            lines.push(TreeLine {
                depth,
                kind: entry.kind(),
                name: entry.name().into_owned(),
            });
            if entry.is_dir() {
                self.collect_tree(slot, depth + 1, lines);
            }
        }
    }

    /// Every entry named `name` below the current directory, as paths
    /// relative to it.
    pub fn search(&self, name: &str) -> Vec<String> {
        let mut found = Vec::new();
        self.search_from(self.session.cwd(), name, "", 0, &mut found);
        found
    }

    fn search_from(
        &self,
        index: usize,
        target: &str,
        path: &str,
        depth: usize,
        found: &mut Vec<String>,
    ) {
        if depth >= self.table.capacity() {
            return;
        }
        for slot in self.table.children(index) {
            let entry = match self.table.get(slot) {
                Some(entry) => entry,
                None => continue,
            };
            let current = format!("{}/{}", path, entry.name());
            if entry.has_name(target) {
                found.push(current.clone());
            }
            if entry.is_dir() {
                self.search_from(slot, target, &current, depth + 1, found);
            }
        }
    }

    /// Acts as `username` from now on and returns the derived uid.
    pub fn login(&mut self, username: &str) -> Result<u32> {
        let uid = self.session.login(username)?;
        info!("logged in as {} (uid {})", username, uid);
        Ok(uid)
    }

    pub fn logout(&mut self) {
        self.session.logout();
    }

    /// Wipes the disk and starts over with an empty root directory.
    pub fn format(&mut self) -> Result<()> {
        let zeroes = vec![0; self.geometry.block_size()];
        for blocknr in 0..self.geometry.total_blocks() {
            self.dev.write_block(blocknr, &zeroes)?;
        }
        self.table = MetadataTable::new(self.geometry.max_entries());
        self.blocks.reset();
        self.session = Session::default();
        self.persist()?;
        info!("Formatted disk of {} blocks", self.geometry.total_blocks());
        Ok(())
    }
}
