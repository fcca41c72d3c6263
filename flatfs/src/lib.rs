//! A single user file system emulated inside one fixed size file.
//!
//! The disk starts with a flat table of 64 byte directory records (slot 0 is
//! the root) followed by the data region. Every file owns at most one data
//! block, allocated from an in-memory bitmap.

mod alloc;
pub mod entry;
mod fs;
pub mod geometry;
pub mod io;
pub mod perm;
pub mod session;
mod table;

pub use crate::entry::{EntryInfo, EntryKind, NAME_MAX, ROOT_SLOT};
pub use crate::fs::{FlatFs, FsError, Result, TreeLine};
pub use crate::geometry::DiskGeometry;
pub use crate::perm::{Access, Permissions, Role};
pub use crate::session::Session;
