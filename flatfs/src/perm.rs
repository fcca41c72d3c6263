use std::fmt;

/// drwxr-xr-x
pub const DEFAULT_DIR_PERMISSIONS: Permissions = Permissions(755);
/// -rw-r--r--
pub const DEFAULT_FILE_PERMISSIONS: Permissions = Permissions(644);

/// Whose digit of the permission value applies to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Owner,
    /// Anyone but the owner. Checked against the middle digit, there is no
    /// separate group.
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read = 4,
    Write = 2,
    Execute = 1,
}

/// Permissions written the way they are typed, e.g. `755` is the decimal
/// number seven hundred fifty-five rather than an octal mode. Digits are
/// picked out with division and the access bit is tested with division and
/// remainder on that digit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permissions(u32);

impl Permissions {
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u32 {
        self.0
    }

    pub fn digit(&self, role: Role) -> u32 {
        match role {
            Role::Owner => self.0 / 100,
            Role::Other => (self.0 / 10) % 10,
        }
    }

    pub fn allows(&self, role: Role, access: Access) -> bool {
        (self.digit(role) / access as u32) % 2 == 1
    }
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}", self.0)
    }
}
