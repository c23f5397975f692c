//! # mountvfs
//!
//! A safe, owned handle over a PhysFS-style **mountable virtual filesystem**
//! engine.
//!
//! Host directories and archives are *mounted* into one unified, read-only
//! namespace. A virtual path resolves to the first mounted source, in search
//! order, that provides it. Writes go to a single configurable *write
//! directory*.
//!
//! ---
//!
//! ## Quick Start
//!
//! ```rust
//! use mountvfs::{FsExt, HostEngine, MountFs};
//!
//! let dir = tempfile::tempdir()?;
//! let root = dir.path().to_string_lossy().into_owned();
//!
//! let fs = MountFs::with_engine(HostEngine::new(), None)?;
//! fs.set_write_dir(&root)?;
//! fs.mount(&root, None, true)?;
//!
//! fs.write_all("scores.txt", b"42")?;
//! for name in fs.enumerate_files("/")? {
//!     println!("{name}");
//! }
//! assert_eq!(fs.read_to_string("scores.txt")?, "42");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! With the native library installed, use [`MountFs::new`] (or
//! [`PhysfsEngine::load`]) instead of [`HostEngine`] to get archive support.
//!
//! ---
//!
//! ## Core Types
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`MountFs`] | Owned, live engine: mounts, queries, opening streams |
//! | [`FsStream`] | One open file; `Read + Write + Seek` |
//! | [`MountFsBuilder`] | Allocator + config, rolled back on failure |
//! | [`FsError`] | Structured failure carrying the engine's message |
//! | [`Engine`] | The raw C-shaped binding the safe layer drives |
//! | [`Allocator`] | Allocation strategy the engine can be told to use |
//!
//! ---
//!
//! ## Engines
//!
//! | Engine | Backing |
//! |--------|---------|
//! | [`PhysfsEngine`] | The native `physfs` library, loaded at runtime |
//! | [`HostEngine`] | Host directories only, no native dependency |
//!
//! ---
//!
//! ## Lifetimes
//!
//! ```text
//! MountFs::with_engine ──> live ──> deinit() / drop ──> released
//!                           │
//!                           └─ open_*() ──> FsStream ──> close() / drop
//! ```
//!
//! Releasing the engine closes every stream it opened. Afterwards engine-level
//! calls fail with [`FsError::NotInitialized`] and stream calls with
//! [`FsError::HandleInvalid`].
//!
//! ---
//!
//! ## Error Handling
//!
//! All operations return `Result<T, FsError>`. No zero status, null pointer or
//! negative count from the engine crosses the public API:
//!
//! ```rust
//! use mountvfs::FsError;
//!
//! let err = FsError::MountFailed {
//!     source_path: "music.zip".into(),
//!     reason: "not found".into(),
//! };
//! assert_eq!(err.to_string(), "mount failed for music.zip: not found");
//! ```
//!
//! ---
//!
//! ## Thread Safety
//!
//! [`MountFs`] is `Send + Sync`; every engine call and the error query that
//! follows it run under one lock. [`FsStream`] is `Send` only. Enumeration
//! callbacks run after that lock is released, so they may call back into the
//! handle.
//!
//! ---
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `serde` | Serialization for config and value types, `MountFsConfig::from_json`, `FsExtJson` |

// Private modules
mod allocator;
mod config;
mod context;
mod error;
mod ext;
mod fs;
mod marshal;
mod mount;
mod stream;
mod types;

// Public modules
pub mod engine;

// Public re-exports - error types
pub use error::FsError;

// Public re-exports - core types
pub use types::{ArchiveInfo, MountEntry, OpenMode, Version, VIRTUAL_SEPARATOR};

// Public re-exports - handle and streams
pub use fs::MountFs;
pub use stream::FsStream;

// Public re-exports - engines
pub use engine::{Engine, HostEngine, HostEngineBuilder, PhysfsEngine};

// Public re-exports - infrastructure
pub use allocator::{Allocator, CountingAllocator, SystemAllocator};
pub use config::{MountFsBuilder, MountFsConfig, MountSpec, SaneConfig};
pub use ext::FsExt;

// Conditional re-exports
#[cfg(feature = "serde")]
pub use ext::FsExtJson;
