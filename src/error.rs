//! Error types for the mountable virtual filesystem wrapper.

/// Message used when the engine reports a failure but has no last-error text.
pub(crate) const GENERIC_FAILURE: &str = "operation failed";

/// Structured failure returned by every fallible operation.
///
/// Engine sentinels (zero status, null pointer, negative count) never cross the
/// public boundary: they are translated into one of these variants at the point
/// of failure, carrying the engine's last-error message where one exists.
///
/// # Examples
///
/// ```rust
/// use mountvfs::FsError;
///
/// let err = FsError::NotMounted { source_path: "assets.zip".into() };
/// assert_eq!(err.to_string(), "not mounted: assets.zip");
/// ```
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum FsError {
    // Lifecycle Errors
    /// The native engine could not be located, loaded or brought up.
    #[error("engine unavailable: {reason}")]
    EngineUnavailable {
        /// Why the engine is unusable.
        reason: String,
    },

    /// The engine is already live; it must be released before re-acquiring.
    #[error("engine already initialized")]
    AlreadyInitialized,

    /// The engine handle was released; no engine-level operation is possible.
    #[error("engine not initialized")]
    NotInitialized,

    /// A stream was used after it was closed or after its engine was released.
    #[error("invalid handle")]
    HandleInvalid,

    // Mount Table Errors
    /// The engine rejected a mount.
    #[error("mount failed for {source_path}: {reason}")]
    MountFailed {
        /// The source (directory or archive) that was being mounted.
        source_path: String,
        /// The engine's message.
        reason: String,
    },

    /// The source is not part of the search path.
    #[error("not mounted: {source_path}")]
    NotMounted {
        /// The source that was looked up.
        source_path: String,
    },

    // Stream Errors
    /// A stream operation failed.
    #[error("{operation} failed: {message}")]
    Io {
        /// The stream operation that failed.
        operation: &'static str,
        /// The engine's message.
        message: String,
    },

    // Engine Errors
    /// Any other engine call failed.
    #[error("{operation} failed: {message}")]
    Engine {
        /// The engine operation that failed.
        operation: &'static str,
        /// The engine's message.
        message: String,
    },

    /// A path or name cannot be handed to the engine (interior NUL byte).
    #[error("invalid path: {path:?}")]
    InvalidPath {
        /// The rejected text.
        path: String,
    },

    // Data Errors
    /// File contents are not what the caller asked for.
    #[error("invalid data: {path} ({details})")]
    InvalidData {
        /// The virtual path that was read.
        path: String,
        /// Details about the invalid data.
        details: String,
    },

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),
}

impl FsError {
    /// Returns `true` for lifetime bugs: use after release or after close.
    pub fn is_lifetime_error(&self) -> bool {
        matches!(self, FsError::HandleInvalid | FsError::NotInitialized)
    }
}

impl From<FsError> for std::io::Error {
    fn from(error: FsError) -> Self {
        let kind = match &error {
            FsError::NotMounted { .. } => std::io::ErrorKind::NotFound,
            FsError::HandleInvalid | FsError::NotInitialized => std::io::ErrorKind::BrokenPipe,
            FsError::InvalidPath { .. } => std::io::ErrorKind::InvalidInput,
            FsError::InvalidData { .. } => std::io::ErrorKind::InvalidData,
            _ => std::io::ErrorKind::Other,
        };
        std::io::Error::new(kind, error)
    }
}
