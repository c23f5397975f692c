//! Core value types shared by the engine wrapper.

use std::fmt;

/// Separator used inside the virtual namespace, independent of the host OS.
pub const VIRTUAL_SEPARATOR: char = '/';

/// Version triple reported by the linked engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Version {
    /// Major version.
    pub major: u8,
    /// Minor version.
    pub minor: u8,
    /// Patch level.
    pub patch: u8,
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Description of an archive format the engine can mount.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ArchiveInfo {
    /// File extension, without the dot (e.g. `"ZIP"`).
    pub extension: String,
    /// Human-readable description.
    pub description: String,
    /// Who wrote the archiver.
    pub author: String,
    /// Where to find more about it.
    pub url: String,
    /// Whether the format can store symbolic links.
    pub supports_symlinks: bool,
}

/// How a file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OpenMode {
    /// Read from the first source in the search path that has the file.
    Read,
    /// Create or truncate the file in the write directory.
    Write,
    /// Create the file in the write directory, or append to it.
    Append,
}

impl OpenMode {
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            OpenMode::Read => "read",
            OpenMode::Write => "write",
            OpenMode::Append => "append",
        }
    }
}

/// One mounted source together with where it appears in the namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MountEntry {
    /// The directory or archive, exactly as it was passed to `mount`.
    pub source: String,
    /// Normalized mount point; always ends with [`VIRTUAL_SEPARATOR`].
    pub mount_point: String,
}

/// Appends the virtual separator if `mount_point` does not already end with it.
pub(crate) fn normalize_mount_point(mut mount_point: String) -> String {
    if !mount_point.ends_with(VIRTUAL_SEPARATOR) {
        mount_point.push(VIRTUAL_SEPARATOR);
    }
    mount_point
}
