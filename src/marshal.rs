//! # Marshaling
//!
//! Copies engine-owned strings and string lists into owned Rust values.
//!
//! | Source | Helper | Ownership |
//! |--------|--------|-----------|
//! | single string | [`copy_str`] | engine keeps it |
//! | null-terminated list | [`take_string_list`] | released with `free_list` exactly once |
//! | callback enumeration | [`collect_strings`], [`collect_file_entries`] | each string dies with its callback |
//! | archive descriptor array | [`archive_infos`] | engine keeps it |
//!
//! Text is decoded as UTF-8; invalid sequences are replaced, never rejected.
//! No pointer obtained from the engine outlives the helper that read it.

use std::ffi::{CStr, CString, c_char, c_void};
use std::panic::{AssertUnwindSafe, catch_unwind};

use crate::engine::{EnumFilesCallback, Engine, RawArchiveInfo, StringCallback};
use crate::{ArchiveInfo, FsError};

/// Copy one engine-owned string. Null yields `None`.
pub(crate) fn copy_str(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    // SAFETY: the engine hands out valid NUL-terminated strings.
    Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
}

/// Convert caller text into something the engine accepts.
pub(crate) fn to_cstring(text: &str) -> Result<CString, FsError> {
    CString::new(text).map_err(|_| FsError::InvalidPath {
        path: text.to_owned(),
    })
}

/// Releases a list on drop, so it is freed even if copying unwinds.
struct ListGuard<'a, E: Engine> {
    engine: &'a E,
    list: *mut *mut c_char,
}

impl<E: Engine> Drop for ListGuard<'_, E> {
    fn drop(&mut self) {
        // SAFETY: `list` came from `engine` and is released only here.
        unsafe { self.engine.free_list(self.list.cast()) }
    }
}

/// Copy a null-terminated list and hand it back to the engine.
///
/// A null list is an empty result.
pub(crate) fn take_string_list<E: Engine>(engine: &E, list: *mut *mut c_char) -> Vec<String> {
    if list.is_null() {
        return Vec::new();
    }
    let guard = ListGuard { engine, list };

    let mut out = Vec::new();
    let mut cursor = guard.list;
    // SAFETY: walk the array up to its terminator; entries are valid C strings.
    unsafe {
        while !(*cursor).is_null() {
            out.push(CStr::from_ptr(*cursor).to_string_lossy().into_owned());
            cursor = cursor.add(1);
        }
    }
    tracing::trace!(entries = out.len(), "copied engine list");
    out
}

unsafe extern "C" fn push_string(data: *mut c_void, s: *const c_char) {
    if data.is_null() || s.is_null() {
        return;
    }
    // Unwinding into native code is undefined; drop the entry instead.
    let _ = catch_unwind(AssertUnwindSafe(|| {
        // SAFETY: `data` is the `Vec<String>` owned by `collect_strings`.
        let out = unsafe { &mut *data.cast::<Vec<String>>() };
        // SAFETY: the engine passes a valid string for the duration of the call.
        out.push(unsafe { CStr::from_ptr(s) }.to_string_lossy().into_owned());
    }));
}

unsafe extern "C" fn push_file_entry(
    data: *mut c_void,
    origdir: *const c_char,
    fname: *const c_char,
) {
    if data.is_null() || fname.is_null() {
        return;
    }
    let _ = catch_unwind(AssertUnwindSafe(|| {
        // SAFETY: `data` is the `Vec<(String, String)>` owned by `collect_file_entries`.
        let out = unsafe { &mut *data.cast::<Vec<(String, String)>>() };
        let dir = copy_str(origdir).unwrap_or_default();
        // SAFETY: valid for the duration of the call.
        let name = unsafe { CStr::from_ptr(fname) }.to_string_lossy().into_owned();
        out.push((dir, name));
    }));
}

/// Run a callback-style enumeration and collect every delivered string.
///
/// `enumerate` receives the trampoline and its user-data pointer and must
/// drive the engine call synchronously.
pub(crate) fn collect_strings(enumerate: impl FnOnce(StringCallback, *mut c_void)) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    enumerate(push_string, (&raw mut out).cast());
    tracing::trace!(entries = out.len(), "collected callback strings");
    out
}

/// Like [`collect_strings`], for `(origdir, name)` directory entries.
pub(crate) fn collect_file_entries(
    enumerate: impl FnOnce(EnumFilesCallback, *mut c_void),
) -> Vec<(String, String)> {
    let mut out: Vec<(String, String)> = Vec::new();
    enumerate(push_file_entry, (&raw mut out).cast());
    tracing::trace!(entries = out.len(), "collected callback entries");
    out
}

/// Copy the engine's archive descriptor table. Null yields an empty list.
pub(crate) fn archive_infos(list: *const *const RawArchiveInfo) -> Vec<ArchiveInfo> {
    let mut out = Vec::new();
    if list.is_null() {
        return out;
    }
    let mut cursor = list;
    // SAFETY: null-terminated array of valid descriptors owned by the engine.
    unsafe {
        while !(*cursor).is_null() {
            let raw = &**cursor;
            out.push(ArchiveInfo {
                extension: copy_str(raw.extension).unwrap_or_default(),
                description: copy_str(raw.description).unwrap_or_default(),
                author: copy_str(raw.author).unwrap_or_default(),
                url: copy_str(raw.url).unwrap_or_default(),
                supports_symlinks: raw.supports_symlinks != 0,
            });
            cursor = cursor.add(1);
        }
    }
    out
}
