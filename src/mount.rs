//! # Mounting and Enumeration
//!
//! The search path is an ordered list of sources. A virtual path resolves to
//! the first source, in that order, that provides it.
//!
//! | `append` | Effect on search order |
//! |----------|------------------------|
//! | `true` | searched after everything mounted before |
//! | `false` | searched before everything mounted before |
//!
//! Every mutation holds the engine lock for the native call and its error
//! query, so readers never observe a half-applied change. Callback
//! enumeration copies each string inside the callback and only hands the
//! collected values to caller code after the lock is released.

use std::ffi::{CStr, c_char, c_int};

use crate::engine::Engine;
use crate::marshal::{collect_file_entries, collect_strings, copy_str, take_string_list, to_cstring};
use crate::types::normalize_mount_point;
use crate::{FsError, MountEntry, MountFs};

impl<E: Engine> MountFs<E> {
    /// Add `source` (a host directory or archive) to the search path.
    ///
    /// `mount_point` is where its contents appear; `None` means the root.
    ///
    /// # Errors
    ///
    /// [`FsError::MountFailed`] with the engine's reason if the source cannot
    /// be mounted.
    ///
    /// # Example
    ///
    /// ```rust
    /// use mountvfs::{HostEngine, MountFs};
    ///
    /// let dir = std::env::temp_dir().to_string_lossy().into_owned();
    /// let fs = MountFs::with_engine(HostEngine::new(), None)?;
    /// fs.mount(&dir, Some("/tmp"), true)?;
    /// assert_eq!(fs.mount_point(&dir)?, "tmp/");
    /// # Ok::<(), mountvfs::FsError>(())
    /// ```
    pub fn mount(
        &self,
        source: &str,
        mount_point: Option<&str>,
        append: bool,
    ) -> Result<(), FsError> {
        let source_c = to_cstring(source)?;
        let point_c = mount_point.map(to_cstring).transpose()?;

        let guard = self.ctx.lock()?;
        let point_ptr = point_c.as_ref().map_or(std::ptr::null(), |p| p.as_ptr());
        // SAFETY: both strings outlive the call.
        let status = unsafe {
            guard
                .engine()
                .mount(source_c.as_ptr(), point_ptr, c_int::from(append))
        };
        if status == 0 {
            return Err(FsError::MountFailed {
                source_path: source.to_owned(),
                reason: guard.failure(),
            });
        }
        tracing::debug!(source, mount_point = mount_point.unwrap_or("/"), append, "mounted");
        Ok(())
    }

    /// Remove `source` from the search path.
    ///
    /// # Errors
    ///
    /// - [`FsError::NotMounted`] if `source` is not in the search path
    /// - [`FsError::Engine`] if the engine refuses for another reason (files
    ///   from the source still open, for example)
    pub fn unmount(&self, source: &str) -> Result<(), FsError> {
        let source_c = to_cstring(source)?;
        let guard = self.ctx.lock()?;
        // SAFETY: `source_c` outlives the call.
        if unsafe { guard.engine().unmount(source_c.as_ptr()) } != 0 {
            tracing::debug!(source, "unmounted");
            return Ok(());
        }

        // The message has to be taken before the search path query below.
        let message = guard.failure();
        let list = guard.engine().search_path();
        let mounted = take_string_list(guard.engine(), list)
            .iter()
            .any(|s| s == source);
        if mounted {
            Err(FsError::Engine {
                operation: "unmount",
                message,
            })
        } else {
            Err(FsError::NotMounted {
                source_path: source.to_owned(),
            })
        }
    }

    /// Mounted sources, in search order.
    pub fn search_path(&self) -> Result<Vec<String>, FsError> {
        let guard = self.ctx.lock()?;
        let list = guard.engine().search_path();
        Ok(take_string_list(guard.engine(), list))
    }

    /// Callback flavour of [`search_path`](Self::search_path).
    ///
    /// `visit` runs once per source, in search order, after the engine lock is
    /// released.
    pub fn visit_search_path(&self, mut visit: impl FnMut(&str)) -> Result<(), FsError> {
        let sources = {
            let guard = self.ctx.lock()?;
            // SAFETY: the trampoline matches the callback ABI and `data` outlives the call.
            collect_strings(|cb, data| unsafe { guard.engine().search_path_callback(cb, data) })
        };
        sources.iter().for_each(|s| visit(s));
        Ok(())
    }

    /// Where `source` appears in the namespace. Always ends with `/`.
    ///
    /// # Errors
    ///
    /// [`FsError::NotMounted`] if `source` is not in the search path.
    pub fn mount_point(&self, source: &str) -> Result<String, FsError> {
        let source_c = to_cstring(source)?;
        let guard = self.ctx.lock()?;
        Self::mount_point_locked(guard.engine(), &source_c)
            .inspect_err(|_| guard.clear_error())
            .map_err(|()| FsError::NotMounted {
                source_path: source.to_owned(),
            })
    }

    fn mount_point_locked(engine: &E, source: &CStr) -> Result<String, ()> {
        // SAFETY: `source` outlives the call.
        let point: *const c_char = unsafe { engine.mount_point(source.as_ptr()) };
        copy_str(point).map(normalize_mount_point).ok_or(())
    }

    /// Every mount with its mount point, in search order.
    ///
    /// Taken in one locked section, so the result is a consistent snapshot.
    pub fn mounts(&self) -> Result<Vec<MountEntry>, FsError> {
        let guard = self.ctx.lock()?;
        let list = guard.engine().search_path();
        let sources = take_string_list(guard.engine(), list);

        let mut entries = Vec::with_capacity(sources.len());
        for source in sources {
            let source_c = to_cstring(&source)?;
            let mount_point = Self::mount_point_locked(guard.engine(), &source_c)
                .map_err(|()| guard.engine_error("mount_point"))?;
            entries.push(MountEntry {
                source,
                mount_point,
            });
        }
        Ok(entries)
    }

    /// Names directly inside virtual directory `dir`, merged across the whole
    /// search path.
    ///
    /// Names are bare (no separators) and appear once even when several
    /// sources provide them. A directory no source provides is empty.
    pub fn enumerate_files(&self, dir: &str) -> Result<Vec<String>, FsError> {
        let dir_c = to_cstring(dir)?;
        let guard = self.ctx.lock()?;
        // SAFETY: `dir_c` outlives the call.
        let list = unsafe { guard.engine().enumerate_files(dir_c.as_ptr()) };
        if list.is_null() {
            guard.clear_error();
        }
        Ok(take_string_list(guard.engine(), list))
    }

    /// Callback flavour of [`enumerate_files`](Self::enumerate_files).
    ///
    /// `visit` receives `(dir, name)` for each entry after the engine lock is
    /// released.
    pub fn visit_files(&self, dir: &str, mut visit: impl FnMut(&str, &str)) -> Result<(), FsError> {
        let dir_c = to_cstring(dir)?;
        let entries = {
            let guard = self.ctx.lock()?;
            // SAFETY: `dir_c` and the collector outlive the call.
            collect_file_entries(|cb, data| unsafe {
                guard.engine().enumerate_files_callback(dir_c.as_ptr(), cb, data)
            })
        };
        entries.iter().for_each(|(d, name)| visit(d, name));
        Ok(())
    }
}
