use crate::entry::{DirEntry, ROOT_SLOT};
use crate::fs::FsError;
use crate::perm::Role;

pub const ROOT_USER: &str = "root";
pub const ROOT_UID: u32 = 0;
/// User ids derived from names fall in `0..UID_RANGE`.
pub const UID_RANGE: u32 = 10_000;

/// Who is acting and where. Consulted by every namespace operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    cwd: usize,
    user_id: u32,
    username: String,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            cwd: ROOT_SLOT,
            user_id: ROOT_UID,
            username: ROOT_USER.to_string(),
        }
    }
}

impl Session {
    /// Slot of the current working directory.
    pub fn cwd(&self) -> usize {
        self.cwd
    }

    pub(crate) fn set_cwd(&mut self, slot: usize) {
        self.cwd = slot;
    }

    pub fn user_id(&self) -> u32 {
        self.user_id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Switches identity. Existing files are untouched, only the role used by
    /// later permission checks changes.
    pub fn login(&mut self, username: &str) -> Result<u32, FsError> {
        if username.is_empty() || username.contains(char::is_whitespace) {
            return Err(FsError::InvalidName(username.to_string()));
        }
        self.user_id = user_id_for(username);
        self.username = username.to_string();
        Ok(self.user_id)
    }

    pub fn logout(&mut self) {
        self.user_id = ROOT_UID;
        self.username = ROOT_USER.to_string();
    }

    pub fn role_for(&self, entry: &DirEntry) -> Role {
        if entry.owner_id() == self.user_id {
            Role::Owner
        } else {
            Role::Other
        }
    }
}

/// Maps a user name onto a uid with 32-bit FNV-1a, which stays the same
/// across runs and toolchains.
pub fn user_id_for(username: &str) -> u32 {
    let hash = username.bytes().fold(0x811c_9dc5_u32, |hash, b| {
        (hash ^ b as u32).wrapping_mul(0x0100_0193)
    });
    hash % UID_RANGE
}
