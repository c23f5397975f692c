//! # Engine Handle
//!
//! [`MountFs`] owns one initialized engine. Creating it initializes the
//! engine, [`deinit`](MountFs::deinit) (or dropping it) releases it.
//!
//! ```text
//! Uninitialized --with_engine--> Live --deinit/drop--> Released
//! ```
//!
//! Once released, engine-level calls fail with [`FsError::NotInitialized`] and
//! streams opened from the handle fail with [`FsError::HandleInvalid`].
//!
//! Mounting and enumeration are implemented next to the mount table, opening
//! streams next to [`FsStream`](crate::FsStream). This module covers lifecycle,
//! environment queries and namespace operations.

use std::ffi::{c_char, c_int};
use std::sync::Arc;

use crate::context::{Context, failure_message};
use crate::engine::{Engine, PhysfsEngine};
use crate::marshal::{archive_infos, collect_strings, copy_str, take_string_list, to_cstring};
use crate::{Allocator, ArchiveInfo, FsError, SaneConfig, Version};

/// A live engine instance and the unified namespace it exposes.
///
/// All methods take `&self`; calls are serialized internally, so a `MountFs`
/// can be shared across threads.
///
/// # Example
///
/// ```rust
/// use mountvfs::{HostEngine, MountFs};
///
/// let dir = std::env::temp_dir();
/// let fs = MountFs::with_engine(HostEngine::new(), None)?;
/// fs.mount(&dir.to_string_lossy(), None, true)?;
/// assert_eq!(fs.search_path()?.len(), 1);
/// fs.deinit()?;
/// # Ok::<(), mountvfs::FsError>(())
/// ```
pub struct MountFs<E: Engine> {
    pub(crate) ctx: Arc<Context<E>>,
}

impl<E: Engine> std::fmt::Debug for MountFs<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountFs")
            .field("live", &self.ctx.is_live())
            .finish_non_exhaustive()
    }
}

impl MountFs<PhysfsEngine> {
    /// Load the native engine and initialize it.
    ///
    /// # Errors
    ///
    /// - [`FsError::EngineUnavailable`] if the library cannot be loaded or
    ///   refuses to initialize
    /// - [`FsError::AlreadyInitialized`] if the process already has it live
    pub fn new(argv0: Option<&str>) -> Result<Self, FsError> {
        Self::with_engine(PhysfsEngine::load()?, argv0)
    }
}

impl<E: Engine> MountFs<E> {
    /// Initialize `engine` and take ownership of it.
    ///
    /// # Errors
    ///
    /// - [`FsError::AlreadyInitialized`] if the engine is already live
    /// - [`FsError::EngineUnavailable`] if initialization fails
    /// - [`FsError::InvalidPath`] if `argv0` contains a NUL byte
    pub fn with_engine(engine: E, argv0: Option<&str>) -> Result<Self, FsError> {
        Self::acquire(engine, argv0, None)
    }

    pub(crate) fn acquire(
        engine: E,
        argv0: Option<&str>,
        allocator: Option<Arc<dyn Allocator>>,
    ) -> Result<Self, FsError> {
        if engine.is_init() != 0 {
            return Err(FsError::AlreadyInitialized);
        }
        let argv0 = argv0.map(to_cstring).transpose()?;

        let custom = allocator.is_some();
        if engine.set_allocator(allocator) == 0 {
            return Err(FsError::Engine {
                operation: "set_allocator",
                message: failure_message(&engine),
            });
        }

        let argv0_ptr = argv0.as_ref().map_or(std::ptr::null(), |s| s.as_ptr());
        // SAFETY: `argv0_ptr` is null or points into `argv0`, alive for the call.
        if unsafe { engine.init(argv0_ptr) } == 0 {
            let reason = failure_message(&engine);
            if engine.is_init() != 0 {
                return Err(FsError::AlreadyInitialized);
            }
            if custom {
                engine.set_allocator(None);
            }
            return Err(FsError::EngineUnavailable { reason });
        }

        let version = Version::from(engine.linked_version());
        tracing::debug!(%version, custom_allocator = custom, "engine initialized");
        Ok(Self {
            ctx: Arc::new(Context::new(engine)),
        })
    }

    /// Release the engine, closing every stream opened from this handle.
    ///
    /// # Errors
    ///
    /// - [`FsError::NotInitialized`] if already released
    /// - [`FsError::Engine`] if the engine refuses to shut down
    pub fn deinit(&self) -> Result<(), FsError> {
        self.ctx.release()
    }

    /// `true` while this handle's engine is live.
    pub fn is_init(&self) -> bool {
        self.ctx.is_live() && self.ctx.engine().is_init() != 0
    }

    /// Version of the engine actually linked.
    pub fn linked_version(&self) -> Version {
        Version::from(self.ctx.engine().linked_version())
    }

    /// Archive formats the engine can mount.
    pub fn supported_archive_types(&self) -> Result<Vec<ArchiveInfo>, FsError> {
        let guard = self.ctx.lock()?;
        let table = guard.engine().supported_archive_types();
        if table.is_null() {
            return Err(guard.engine_error("supported_archive_types"));
        }
        Ok(archive_infos(table))
    }

    /// Message of the most recent engine failure, consuming it.
    ///
    /// Every failing call of this crate already reports its message through
    /// [`FsError`], so this is normally `None`.
    pub fn last_error(&self) -> Result<Option<String>, FsError> {
        let guard = self.ctx.lock()?;
        Ok(copy_str(guard.engine().last_error()))
    }

    /// Separator the host uses between directory components.
    pub fn dir_separator(&self) -> Result<String, FsError> {
        let guard = self.ctx.lock()?;
        copy_str(guard.engine().dir_separator()).ok_or_else(|| guard.engine_error("dir_separator"))
    }

    /// Allow or forbid following symbolic links. Forbidden by default.
    pub fn permit_symbolic_links(&self, permit: bool) -> Result<(), FsError> {
        let guard = self.ctx.lock()?;
        guard.engine().permit_symbolic_links(c_int::from(permit));
        Ok(())
    }

    /// Whether symbolic links are followed.
    pub fn symbolic_links_permitted(&self) -> Result<bool, FsError> {
        let guard = self.ctx.lock()?;
        Ok(guard.engine().symbolic_links_permitted() != 0)
    }

    /// Directory the application was started from.
    pub fn base_dir(&self) -> Result<String, FsError> {
        let guard = self.ctx.lock()?;
        copy_str(guard.engine().base_dir()).ok_or_else(|| guard.engine_error("base_dir"))
    }

    /// Home directory of the current user.
    pub fn user_dir(&self) -> Result<String, FsError> {
        let guard = self.ctx.lock()?;
        copy_str(guard.engine().user_dir()).ok_or_else(|| guard.engine_error("user_dir"))
    }

    /// Current write directory, if one is set.
    pub fn write_dir(&self) -> Result<Option<String>, FsError> {
        let guard = self.ctx.lock()?;
        Ok(copy_str(guard.engine().write_dir()))
    }

    /// Direct every write, `create_directory` and `delete` into `dir`.
    ///
    /// # Errors
    ///
    /// [`FsError::Engine`] if the directory does not exist or files are still
    /// open for writing.
    pub fn set_write_dir(&self, dir: &str) -> Result<(), FsError> {
        let dir_c = to_cstring(dir)?;
        let guard = self.ctx.lock()?;
        // SAFETY: `dir_c` outlives the call.
        let status = unsafe { guard.engine().set_write_dir(dir_c.as_ptr()) };
        guard.check(status, "set_write_dir")?;
        tracing::debug!(dir, "write directory set");
        Ok(())
    }

    /// Unset the write directory. Writing is impossible afterwards.
    pub fn clear_write_dir(&self) -> Result<(), FsError> {
        let guard = self.ctx.lock()?;
        // SAFETY: null is the documented "clear" argument.
        let status = unsafe { guard.engine().set_write_dir(std::ptr::null()) };
        guard.check(status, "set_write_dir")
    }

    /// Directories of mounted CD-ROM drives.
    pub fn cd_rom_dirs(&self) -> Result<Vec<String>, FsError> {
        let guard = self.ctx.lock()?;
        let list = guard.engine().cd_rom_dirs();
        Ok(take_string_list(guard.engine(), list))
    }

    /// Callback flavour of [`cd_rom_dirs`](Self::cd_rom_dirs).
    ///
    /// `visit` runs after the engine call has returned and the engine lock is
    /// released, so it may call back into this handle.
    pub fn visit_cd_rom_dirs(&self, mut visit: impl FnMut(&str)) -> Result<(), FsError> {
        let dirs = {
            let guard = self.ctx.lock()?;
            // SAFETY: the trampoline matches the callback ABI and `data` outlives the call.
            collect_strings(|cb, data| unsafe { guard.engine().cd_rom_dirs_callback(cb, data) })
        };
        dirs.iter().for_each(|d| visit(d));
        Ok(())
    }

    /// Set up the conventional layout for an application.
    ///
    /// The write directory becomes a per-user directory for
    /// `organization`/`app_name`, which is mounted ahead of the base directory.
    /// Archives with `archive_ext` found in the search path root are mounted
    /// too.
    pub fn set_sane_config(&self, config: &SaneConfig) -> Result<(), FsError> {
        let organization = to_cstring(&config.organization)?;
        let app_name = to_cstring(&config.app_name)?;
        let archive_ext = config.archive_ext.as_deref().map(to_cstring).transpose()?;

        let guard = self.ctx.lock()?;
        // SAFETY: every pointer outlives the call; a null extension is allowed.
        let status = unsafe {
            guard.engine().set_sane_config(
                organization.as_ptr(),
                app_name.as_ptr(),
                archive_ext.as_ref().map_or(std::ptr::null(), |s| s.as_ptr()),
                c_int::from(config.include_cd_roms),
                c_int::from(config.archives_first),
            )
        };
        guard.check(status, "set_sane_config")?;
        tracing::debug!(
            organization = %config.organization,
            app = %config.app_name,
            "sane config applied"
        );
        Ok(())
    }

    /// Create `path` (and any missing parents) in the write directory.
    pub fn create_directory(&self, path: &str) -> Result<(), FsError> {
        let path_c = to_cstring(path)?;
        let guard = self.ctx.lock()?;
        // SAFETY: `path_c` outlives the call.
        let status = unsafe { guard.engine().mkdir(path_c.as_ptr()) };
        guard.check(status, "mkdir")
    }

    /// Delete a file or an empty directory from the write directory.
    pub fn delete(&self, path: &str) -> Result<(), FsError> {
        let path_c = to_cstring(path)?;
        let guard = self.ctx.lock()?;
        // SAFETY: `path_c` outlives the call.
        let status = unsafe { guard.engine().delete(path_c.as_ptr()) };
        guard.check(status, "delete")
    }

    fn query(
        &self,
        path: &str,
        call: unsafe fn(&E, *const c_char) -> c_int,
    ) -> Result<bool, FsError> {
        let path_c = to_cstring(path)?;
        let guard = self.ctx.lock()?;
        // SAFETY: `path_c` outlives the call.
        let answer = unsafe { call(guard.engine(), path_c.as_ptr()) } != 0;
        if !answer {
            // "No" is an answer, not a failure.
            guard.clear_error();
        }
        Ok(answer)
    }

    /// Whether `path` exists anywhere in the search path.
    pub fn exists(&self, path: &str) -> Result<bool, FsError> {
        self.query(path, E::exists)
    }

    /// Whether `path` is a directory.
    pub fn is_directory(&self, path: &str) -> Result<bool, FsError> {
        self.query(path, E::is_directory)
    }

    /// Whether `path` is a symbolic link.
    pub fn is_symbolic_link(&self, path: &str) -> Result<bool, FsError> {
        self.query(path, E::is_symbolic_link)
    }

    /// Modification time of `path` in seconds since the Unix epoch.
    pub fn last_mod_time(&self, path: &str) -> Result<i64, FsError> {
        let path_c = to_cstring(path)?;
        let guard = self.ctx.lock()?;
        // SAFETY: `path_c` outlives the call.
        let time = unsafe { guard.engine().last_mod_time(path_c.as_ptr()) };
        if time < 0 {
            return Err(guard.engine_error("last_mod_time"));
        }
        Ok(time)
    }

    /// The mounted source that provides `path`, or `None` if no source does.
    pub fn real_dir(&self, path: &str) -> Result<Option<String>, FsError> {
        let path_c = to_cstring(path)?;
        let guard = self.ctx.lock()?;
        // SAFETY: `path_c` outlives the call.
        let dir = copy_str(unsafe { guard.engine().real_dir(path_c.as_ptr()) });
        if dir.is_none() {
            guard.clear_error();
        }
        Ok(dir)
    }
}

impl<E: Engine> Drop for MountFs<E> {
    fn drop(&mut self) {
        if !self.ctx.is_live() {
            return;
        }
        if let Err(error) = self.ctx.release() {
            tracing::warn!(%error, "failed to release engine on drop");
        }
    }
}

impl From<crate::engine::RawVersion> for Version {
    fn from(raw: crate::engine::RawVersion) -> Self {
        Version {
            major: raw.major,
            minor: raw.minor,
            patch: raw.patch,
        }
    }
}
