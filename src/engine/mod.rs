//! # Engine Binding
//!
//! The raw, C-shaped surface of the underlying archive/filesystem engine.
//!
//! ## Overview
//!
//! Everything in this module speaks the engine's native conventions:
//!
//! - status results are `c_int`, nonzero meaning success
//! - counts and offsets are `i64`, negative meaning failure
//! - strings are `*const c_char`, null meaning failure (or "none")
//! - lists are null-terminated `*mut *mut c_char` arrays that must be handed
//!   back to [`Engine::free_list`]
//! - open files are opaque `*mut RawFile` pointers
//!
//! After any failure the message is available from [`Engine::last_error`]
//! until the next engine call. The safe layer in this crate ([`MountFs`],
//! [`FsStream`]) is what turns these sentinels into [`FsError`]s; nothing here
//! should be used directly by applications.
//!
//! ## Implementations
//!
//! | Engine | Backing |
//! |--------|---------|
//! | [`PhysfsEngine`] | The native `physfs` shared library, loaded at runtime |
//! | [`HostEngine`] | Host directories only, implemented in Rust |
//!
//! [`MountFs`]: crate::MountFs
//! [`FsStream`]: crate::FsStream
//! [`FsError`]: crate::FsError

use std::ffi::{c_char, c_int, c_void};
use std::sync::Arc;

use crate::Allocator;

pub mod host;
pub mod physfs;

pub use host::{HostEngine, HostEngineBuilder};
pub use physfs::PhysfsEngine;

/// Callback receiving one string per invocation.
///
/// The string is only valid for the duration of the call.
pub type StringCallback = unsafe extern "C" fn(data: *mut c_void, s: *const c_char);

/// Callback receiving one directory entry per invocation.
///
/// `origdir` is the directory being enumerated, `fname` the entry name. Both
/// are only valid for the duration of the call.
pub type EnumFilesCallback =
    unsafe extern "C" fn(data: *mut c_void, origdir: *const c_char, fname: *const c_char);

/// Opaque open-file object owned by the engine.
#[repr(C)]
pub struct RawFile {
    _opaque: [u8; 0],
}

/// Version triple as laid out by the engine.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawVersion {
    /// Major version.
    pub major: u8,
    /// Minor version.
    pub minor: u8,
    /// Patch level.
    pub patch: u8,
}

/// Archive descriptor as laid out by the engine.
#[repr(C)]
#[derive(Debug)]
pub struct RawArchiveInfo {
    /// File extension.
    pub extension: *const c_char,
    /// Human-readable description.
    pub description: *const c_char,
    /// Archiver author.
    pub author: *const c_char,
    /// Archiver URL.
    pub url: *const c_char,
    /// Nonzero if the format stores symbolic links.
    pub supports_symlinks: c_int,
}

/// The engine binding.
///
/// Methods mirror the engine's C entry points one to one. Pointer arguments
/// are NUL-terminated strings unless documented otherwise.
///
/// # Safety
///
/// Implementors must honor the native contract described in the
/// [module documentation](self): returned lists are null-terminated and
/// releasable with [`free_list`](Engine::free_list) exactly once; returned
/// strings stay valid at least until the next engine call on any thread;
/// callbacks are invoked synchronously, before the enumerating call returns.
/// Deinitializing the engine closes every file it opened.
///
/// # Thread Safety
///
/// The engine's last-error slot is shared mutable state. Callers serialize
/// "call + error query" sequences; the safe layer does this with one lock per
/// engine handle.
pub unsafe trait Engine: Send + Sync + 'static {
    // Lifecycle

    /// Version of the engine actually linked.
    fn linked_version(&self) -> RawVersion;

    /// Initialize the engine.
    ///
    /// # Safety
    ///
    /// `argv0` must be null or a valid C string.
    unsafe fn init(&self, argv0: *const c_char) -> c_int;

    /// Deinitialize the engine, closing every open file and dropping all mounts.
    fn deinit(&self) -> c_int;

    /// Nonzero while the engine is initialized.
    fn is_init(&self) -> c_int;

    /// Install (or, with `None`, remove) an allocation strategy. Only valid
    /// while the engine is not initialized.
    fn set_allocator(&self, allocator: Option<Arc<dyn Allocator>>) -> c_int;

    /// Message for the most recent failure, or null. Reading it clears it.
    fn last_error(&self) -> *const c_char;

    // Environment

    /// Platform directory separator.
    fn dir_separator(&self) -> *const c_char;

    /// Allow or forbid following symbolic links.
    fn permit_symbolic_links(&self, permit: c_int);

    /// Nonzero if symbolic links are followed.
    fn symbolic_links_permitted(&self) -> c_int;

    /// Null-terminated array of archive descriptors. Owned by the engine;
    /// never passed to `free_list`.
    fn supported_archive_types(&self) -> *const *const RawArchiveInfo;

    /// Release a list returned by the engine.
    ///
    /// # Safety
    ///
    /// `list` must come from this engine and must not be used afterwards.
    unsafe fn free_list(&self, list: *mut c_void);

    /// CD-ROM mount directories as a list.
    fn cd_rom_dirs(&self) -> *mut *mut c_char;

    /// CD-ROM mount directories via callback.
    ///
    /// # Safety
    ///
    /// `callback` must be safe to call with `data`.
    unsafe fn cd_rom_dirs_callback(&self, callback: StringCallback, data: *mut c_void);

    /// Directory of the running application.
    fn base_dir(&self) -> *const c_char;

    /// Home directory of the current user.
    fn user_dir(&self) -> *const c_char;

    /// Current write directory, or null if none is set.
    fn write_dir(&self) -> *const c_char;

    /// Set the write directory; null clears it.
    ///
    /// # Safety
    ///
    /// `dir` must be null or a valid C string.
    unsafe fn set_write_dir(&self, dir: *const c_char) -> c_int;

    /// Configure a conventional write directory and search path.
    ///
    /// # Safety
    ///
    /// `organization` and `app_name` must be valid C strings; `archive_ext`
    /// may be null.
    unsafe fn set_sane_config(
        &self,
        organization: *const c_char,
        app_name: *const c_char,
        archive_ext: *const c_char,
        include_cd_roms: c_int,
        archives_first: c_int,
    ) -> c_int;

    // Search path

    /// Add `source` to the search path at `mount_point` (null means root).
    ///
    /// # Safety
    ///
    /// `source` must be a valid C string; `mount_point` null or valid.
    unsafe fn mount(&self, source: *const c_char, mount_point: *const c_char, append: c_int)
    -> c_int;

    /// Remove `source` from the search path.
    ///
    /// # Safety
    ///
    /// `source` must be a valid C string.
    unsafe fn unmount(&self, source: *const c_char) -> c_int;

    /// Search path as a list.
    fn search_path(&self) -> *mut *mut c_char;

    /// Search path via callback.
    ///
    /// # Safety
    ///
    /// `callback` must be safe to call with `data`.
    unsafe fn search_path_callback(&self, callback: StringCallback, data: *mut c_void);

    /// Mount point of `source`, or null if it is not mounted.
    ///
    /// # Safety
    ///
    /// `source` must be a valid C string.
    unsafe fn mount_point(&self, source: *const c_char) -> *const c_char;

    // Namespace

    /// Create a directory (and its parents) in the write directory.
    ///
    /// # Safety
    ///
    /// `dir` must be a valid C string.
    unsafe fn mkdir(&self, dir: *const c_char) -> c_int;

    /// Delete a file or empty directory from the write directory.
    ///
    /// # Safety
    ///
    /// `path` must be a valid C string.
    unsafe fn delete(&self, path: *const c_char) -> c_int;

    /// Source that provides `path`, or null.
    ///
    /// # Safety
    ///
    /// `path` must be a valid C string.
    unsafe fn real_dir(&self, path: *const c_char) -> *const c_char;

    /// Entries of `dir` across the whole search path as a list.
    ///
    /// # Safety
    ///
    /// `dir` must be a valid C string.
    unsafe fn enumerate_files(&self, dir: *const c_char) -> *mut *mut c_char;

    /// Entries of `dir` via callback.
    ///
    /// # Safety
    ///
    /// `dir` must be a valid C string; `callback` must be safe to call with
    /// `data`.
    unsafe fn enumerate_files_callback(
        &self,
        dir: *const c_char,
        callback: EnumFilesCallback,
        data: *mut c_void,
    );

    /// Nonzero if `path` exists anywhere in the search path.
    ///
    /// # Safety
    ///
    /// `path` must be a valid C string.
    unsafe fn exists(&self, path: *const c_char) -> c_int;

    /// Nonzero if `path` is a directory.
    ///
    /// # Safety
    ///
    /// `path` must be a valid C string.
    unsafe fn is_directory(&self, path: *const c_char) -> c_int;

    /// Nonzero if `path` is a symbolic link.
    ///
    /// # Safety
    ///
    /// `path` must be a valid C string.
    unsafe fn is_symbolic_link(&self, path: *const c_char) -> c_int;

    /// Modification time in seconds since the epoch, or -1.
    ///
    /// # Safety
    ///
    /// `path` must be a valid C string.
    unsafe fn last_mod_time(&self, path: *const c_char) -> i64;

    // Files

    /// Open for reading, or null.
    ///
    /// # Safety
    ///
    /// `path` must be a valid C string.
    unsafe fn open_read(&self, path: *const c_char) -> *mut RawFile;

    /// Open for writing (create/truncate), or null.
    ///
    /// # Safety
    ///
    /// `path` must be a valid C string.
    unsafe fn open_write(&self, path: *const c_char) -> *mut RawFile;

    /// Open for appending, or null.
    ///
    /// # Safety
    ///
    /// `path` must be a valid C string.
    unsafe fn open_append(&self, path: *const c_char) -> *mut RawFile;

    /// Close a file. On success the pointer is dead.
    ///
    /// # Safety
    ///
    /// `file` must be a live file from this engine.
    unsafe fn close(&self, file: *mut RawFile) -> c_int;

    /// Read up to `count` objects of `size` bytes. Returns objects read or -1.
    ///
    /// # Safety
    ///
    /// `file` must be live; `buffer` must hold `size * count` bytes.
    unsafe fn read(&self, file: *mut RawFile, buffer: *mut c_void, size: u32, count: u32) -> i64;

    /// Write `count` objects of `size` bytes. Returns objects written or -1.
    ///
    /// # Safety
    ///
    /// `file` must be live; `buffer` must hold `size * count` bytes.
    unsafe fn write(&self, file: *mut RawFile, buffer: *const c_void, size: u32, count: u32)
    -> i64;

    /// Nonzero at end of file.
    ///
    /// # Safety
    ///
    /// `file` must be live.
    unsafe fn eof(&self, file: *mut RawFile) -> c_int;

    /// Current offset, or -1.
    ///
    /// # Safety
    ///
    /// `file` must be live.
    unsafe fn tell(&self, file: *mut RawFile) -> i64;

    /// Seek to an absolute offset.
    ///
    /// # Safety
    ///
    /// `file` must be live.
    unsafe fn seek(&self, file: *mut RawFile, position: u64) -> c_int;

    /// Total length, or -1 if it cannot be determined.
    ///
    /// # Safety
    ///
    /// `file` must be live.
    unsafe fn file_length(&self, file: *mut RawFile) -> i64;

    /// Set the engine-side buffer size for `file`.
    ///
    /// # Safety
    ///
    /// `file` must be live.
    unsafe fn set_buffer(&self, file: *mut RawFile, size: u64) -> c_int;

    /// Flush the engine-side buffer of `file`.
    ///
    /// # Safety
    ///
    /// `file` must be live.
    unsafe fn flush(&self, file: *mut RawFile) -> c_int;
}
