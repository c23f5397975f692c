//! # Extension Traits
//!
//! Whole-file convenience methods on top of the stream API.
//!
//! ## Overview
//!
//! [`FsExt`] covers the common "read it all / write it all" cases so callers
//! don't have to juggle [`FsStream`](crate::FsStream)s for small files.
//!
//! ## Available Methods
//!
//! | Method | Description |
//! |--------|-------------|
//! | [`read_all`](FsExt::read_all) | Read a whole file into bytes |
//! | [`read_to_string`](FsExt::read_to_string) | Read a whole file as UTF-8 |
//! | [`write_all`](FsExt::write_all) | Create or replace a file in the write dir |
//! | [`append_all`](FsExt::append_all) | Append to a file in the write dir |
//! | [`is_file`](FsExt::is_file) | Check if a path exists and is not a directory |
//!
//! ## JSON Support (Feature-Gated)
//!
//! With the `serde` feature enabled, additional methods are available:
//!
//! | Method | Description |
//! |--------|-------------|
//! | `read_json` | Read and deserialize JSON file |
//! | `write_json` | Serialize and write JSON file |
//!
//! Enable with:
//! ```toml
//! [dependencies]
//! mountvfs = { version = "0.1", features = ["serde"] }
//! ```

use std::io::{Read, Write};

use crate::engine::Engine;
use crate::{FsError, MountFs};

/// Whole-file helpers.
///
/// # Example
///
/// ```rust
/// use mountvfs::{FsExt, HostEngine, MountFs};
///
/// let dir = tempfile::tempdir()?;
/// let root = dir.path().to_string_lossy().into_owned();
/// let fs = MountFs::with_engine(HostEngine::new(), None)?;
/// fs.set_write_dir(&root)?;
/// fs.mount(&root, None, true)?;
///
/// fs.write_all("settings.ini", b"volume=7")?;
/// assert!(fs.is_file("settings.ini")?);
/// assert_eq!(fs.read_to_string("settings.ini")?, "volume=7");
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub trait FsExt {
    /// Read the whole file at `path`.
    fn read_all(&self, path: &str) -> Result<Vec<u8>, FsError>;

    /// Read the whole file at `path` as UTF-8 text.
    ///
    /// # Errors
    ///
    /// [`FsError::InvalidData`] if the contents are not UTF-8.
    fn read_to_string(&self, path: &str) -> Result<String, FsError> {
        let bytes = self.read_all(path)?;
        String::from_utf8(bytes).map_err(|e| FsError::InvalidData {
            path: path.to_owned(),
            details: e.to_string(),
        })
    }

    /// Create or truncate `path` in the write directory and fill it with
    /// `data`.
    fn write_all(&self, path: &str, data: &[u8]) -> Result<(), FsError>;

    /// Append `data` to `path` in the write directory.
    fn append_all(&self, path: &str, data: &[u8]) -> Result<(), FsError>;

    /// Check if `path` exists and is not a directory.
    ///
    /// Returns `Ok(false)` if the path doesn't exist (not an error).
    fn is_file(&self, path: &str) -> Result<bool, FsError>;
}

/// Recover the structured error a stream wrapped into `io::Error`.
fn io_to_fs(operation: &'static str, error: std::io::Error) -> FsError {
    let message = error.to_string();
    match error.into_inner().map(|inner| inner.downcast::<FsError>()) {
        Some(Ok(fs_error)) => *fs_error,
        _ => FsError::Io { operation, message },
    }
}

impl<E: Engine> FsExt for MountFs<E> {
    fn read_all(&self, path: &str) -> Result<Vec<u8>, FsError> {
        let mut stream = self.open_read(path)?;
        // Length is only a hint; some sources cannot report it.
        let capacity = stream
            .length()
            .map_or(0, |n| usize::try_from(n).unwrap_or(0));
        let mut data = Vec::with_capacity(capacity);
        stream
            .read_to_end(&mut data)
            .map_err(|e| io_to_fs("read", e))?;
        stream.close()?;
        Ok(data)
    }

    fn write_all(&self, path: &str, data: &[u8]) -> Result<(), FsError> {
        let mut stream = self.open_write(path)?;
        Write::write_all(&mut stream, data).map_err(|e| io_to_fs("write", e))?;
        stream.close()
    }

    fn append_all(&self, path: &str, data: &[u8]) -> Result<(), FsError> {
        let mut stream = self.open_append(path)?;
        Write::write_all(&mut stream, data).map_err(|e| io_to_fs("write", e))?;
        stream.close()
    }

    fn is_file(&self, path: &str) -> Result<bool, FsError> {
        Ok(self.exists(path)? && !self.is_directory(path)?)
    }
}

// =============================================================================
// JSON Support (Feature-Gated)
// =============================================================================

#[cfg(feature = "serde")]
mod json {
    use super::*;
    use serde::{Serialize, de::DeserializeOwned};

    /// JSON serialization extension methods.
    ///
    /// Available when the `serde` feature is enabled.
    pub trait FsExtJson: FsExt {
        /// Read a file and deserialize it as JSON.
        ///
        /// # Errors
        ///
        /// - [`FsError::Io`]: the file cannot be opened or read
        /// - [`FsError::InvalidData`]: the file isn't valid UTF-8
        /// - [`FsError::Deserialization`]: JSON parsing failed
        fn read_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, FsError> {
            let data = self.read_to_string(path)?;
            serde_json::from_str(&data).map_err(|e| FsError::Deserialization(e.to_string()))
        }

        /// Serialize a value and write it as JSON.
        ///
        /// Uses pretty-printing with 2-space indentation.
        fn write_json<T: Serialize>(&self, path: &str, value: &T) -> Result<(), FsError> {
            let json = serde_json::to_string_pretty(value)
                .map_err(|e| FsError::Serialization(e.to_string()))?;
            self.write_all(path, json.as_bytes())
        }
    }

    // Blanket implementation
    impl<B: FsExt + ?Sized> FsExtJson for B {}
}

#[cfg(feature = "serde")]
pub use json::FsExtJson;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HostEngine;

    fn fixture() -> (MountFs<HostEngine>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_string_lossy().into_owned();
        let fs = MountFs::with_engine(HostEngine::new(), None).unwrap();
        fs.set_write_dir(&root).unwrap();
        fs.mount(&root, None, true).unwrap();
        (fs, dir)
    }

    #[test]
    fn write_then_read_all() {
        let (fs, _dir) = fixture();
        fs.write_all("blob.bin", &[1, 2, 3]).unwrap();
        assert_eq!(fs.read_all("blob.bin").unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn append_all_extends() {
        let (fs, _dir) = fixture();
        fs.write_all("log.txt", b"a").unwrap();
        fs.append_all("log.txt", b"b").unwrap();
        assert_eq!(fs.read_to_string("log.txt").unwrap(), "ab");
    }

    #[test]
    fn read_to_string_rejects_invalid_utf8() {
        let (fs, _dir) = fixture();
        fs.write_all("bad.txt", &[0xff, 0xfe]).unwrap();
        let err = fs.read_to_string("bad.txt").unwrap_err();
        assert!(matches!(err, FsError::InvalidData { ref path, .. } if path == "bad.txt"));
    }

    #[test]
    fn is_file_distinguishes_directories() {
        let (fs, _dir) = fixture();
        fs.write_all("file.txt", b"x").unwrap();
        fs.create_directory("folder").unwrap();
        assert!(fs.is_file("file.txt").unwrap());
        assert!(!fs.is_file("folder").unwrap());
        assert!(!fs.is_file("missing").unwrap());
    }

    #[test]
    fn read_missing_is_open_error() {
        let (fs, _dir) = fixture();
        let err = fs.read_all("nope").unwrap_err();
        assert!(matches!(err, FsError::Io { operation: "open", .. }));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn json_round_trip() {
        let (fs, _dir) = fixture();
        let value = serde_json::json!({ "level": 3, "name": "cave" });
        fs.write_json("save.json", &value).unwrap();
        let back: serde_json::Value = fs.read_json("save.json").unwrap();
        assert_eq!(back, value);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn json_parse_failure_is_deserialization() {
        let (fs, _dir) = fixture();
        fs.write_all("broken.json", b"{ nope").unwrap();
        let err = fs.read_json::<serde_json::Value>("broken.json").unwrap_err();
        assert!(matches!(err, FsError::Deserialization(_)));
    }
}
