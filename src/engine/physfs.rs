//! Binding to the native `physfs` shared library.
//!
//! The library is opened at runtime with `libloading`, so a missing or
//! incomplete installation surfaces as [`FsError::EngineUnavailable`] instead
//! of a link failure. Every entry point is resolved up front; the handle keeps
//! the library mapped for as long as any copy of the engine exists.
//!
//! The native engine keeps its state in process-wide globals. Two
//! `PhysfsEngine` values therefore observe the same initialization state and
//! search path.

use std::ffi::{OsString, c_char, c_int, c_void};
use std::path::Path;
use std::sync::Arc;

use libloading::Library;
use parking_lot::RwLock;

use super::{EnumFilesCallback, Engine, RawArchiveInfo, RawFile, RawVersion, StringCallback};
use crate::{Allocator, FsError};

/// Environment variable naming an explicit library to load.
pub const LIBRARY_ENV: &str = "PHYSFS_LIBRARY";

/// Allocation hooks as laid out by the native engine.
#[repr(C)]
struct RawAllocator {
    init: Option<unsafe extern "C" fn() -> c_int>,
    deinit: Option<unsafe extern "C" fn()>,
    malloc: Option<unsafe extern "C" fn(u64) -> *mut c_void>,
    realloc: Option<unsafe extern "C" fn(*mut c_void, u64) -> *mut c_void>,
    free: Option<unsafe extern "C" fn(*mut c_void)>,
}

/// Allocator the trampolines forward to. The native engine has one allocator
/// per process, so this slot is process-wide as well.
static ACTIVE_ALLOCATOR: RwLock<Option<Arc<dyn Allocator>>> = parking_lot::const_rwlock(None);

unsafe extern "C" fn allocator_init() -> c_int {
    ACTIVE_ALLOCATOR
        .read()
        .as_ref()
        .map_or(0, |a| c_int::from(a.init()))
}

unsafe extern "C" fn allocator_deinit() {
    if let Some(allocator) = ACTIVE_ALLOCATOR.read().as_ref() {
        allocator.deinit();
    }
}

unsafe extern "C" fn allocator_malloc(size: u64) -> *mut c_void {
    ACTIVE_ALLOCATOR
        .read()
        .as_ref()
        .map_or(std::ptr::null_mut(), |a| a.malloc(size))
}

unsafe extern "C" fn allocator_realloc(ptr: *mut c_void, size: u64) -> *mut c_void {
    match ACTIVE_ALLOCATOR.read().as_ref() {
        // SAFETY: the engine only reallocates blocks it obtained from this allocator.
        Some(allocator) => unsafe { allocator.realloc(ptr, size) },
        None => std::ptr::null_mut(),
    }
}

unsafe extern "C" fn allocator_free(ptr: *mut c_void) {
    if let Some(allocator) = ACTIVE_ALLOCATOR.read().as_ref() {
        // SAFETY: the engine only frees blocks it obtained from this allocator.
        unsafe { allocator.free(ptr) }
    }
}

/// # Safety
///
/// `T` must be the exact function pointer type of the exported symbol.
unsafe fn symbol<T: Copy>(library: &Library, name: &str) -> Result<T, FsError> {
    // SAFETY: forwarded caller contract on `T`.
    unsafe { library.get::<T>(name.as_bytes()) }
        .map(|sym| *sym)
        .map_err(|e| FsError::EngineUnavailable {
            reason: format!("missing symbol {name}: {e}"),
        })
}

macro_rules! native_api {
    ($( $field:ident = $name:literal : fn($($arg:ty),*) $(-> $ret:ty)? ;)*) => {
        struct Api {
            $( $field: unsafe extern "C" fn($($arg),*) $(-> $ret)?, )*
        }

        impl Api {
            /// # Safety
            ///
            /// `library` must be a build of the native engine.
            unsafe fn resolve(library: &Library) -> Result<Self, FsError> {
                Ok(Self {
                    // SAFETY: signatures mirror the engine's public header.
                    $( $field: unsafe { symbol(library, $name)? }, )*
                })
            }
        }
    };
}

native_api! {
    get_linked_version = "PHYSFS_getLinkedVersion": fn(*mut RawVersion);
    init = "PHYSFS_init": fn(*const c_char) -> c_int;
    deinit = "PHYSFS_deinit": fn() -> c_int;
    is_init = "PHYSFS_isInit": fn() -> c_int;
    set_allocator = "PHYSFS_setAllocator": fn(*const RawAllocator) -> c_int;
    get_last_error = "PHYSFS_getLastError": fn() -> *const c_char;
    get_dir_separator = "PHYSFS_getDirSeparator": fn() -> *const c_char;
    permit_symbolic_links = "PHYSFS_permitSymbolicLinks": fn(c_int);
    symbolic_links_permitted = "PHYSFS_symbolicLinksPermitted": fn() -> c_int;
    supported_archive_types = "PHYSFS_supportedArchiveTypes": fn() -> *const *const RawArchiveInfo;
    free_list = "PHYSFS_freeList": fn(*mut c_void);
    get_cd_rom_dirs = "PHYSFS_getCdRomDirs": fn() -> *mut *mut c_char;
    get_cd_rom_dirs_callback = "PHYSFS_getCdRomDirsCallback": fn(StringCallback, *mut c_void);
    get_base_dir = "PHYSFS_getBaseDir": fn() -> *const c_char;
    get_user_dir = "PHYSFS_getUserDir": fn() -> *const c_char;
    get_write_dir = "PHYSFS_getWriteDir": fn() -> *const c_char;
    set_write_dir = "PHYSFS_setWriteDir": fn(*const c_char) -> c_int;
    set_sane_config = "PHYSFS_setSaneConfig": fn(*const c_char, *const c_char, *const c_char, c_int, c_int) -> c_int;
    mount = "PHYSFS_mount": fn(*const c_char, *const c_char, c_int) -> c_int;
    unmount = "PHYSFS_unmount": fn(*const c_char) -> c_int;
    get_search_path = "PHYSFS_getSearchPath": fn() -> *mut *mut c_char;
    get_search_path_callback = "PHYSFS_getSearchPathCallback": fn(StringCallback, *mut c_void);
    get_mount_point = "PHYSFS_getMountPoint": fn(*const c_char) -> *const c_char;
    mkdir = "PHYSFS_mkdir": fn(*const c_char) -> c_int;
    delete = "PHYSFS_delete": fn(*const c_char) -> c_int;
    get_real_dir = "PHYSFS_getRealDir": fn(*const c_char) -> *const c_char;
    enumerate_files = "PHYSFS_enumerateFiles": fn(*const c_char) -> *mut *mut c_char;
    enumerate_files_callback = "PHYSFS_enumerateFilesCallback": fn(*const c_char, EnumFilesCallback, *mut c_void);
    exists = "PHYSFS_exists": fn(*const c_char) -> c_int;
    is_directory = "PHYSFS_isDirectory": fn(*const c_char) -> c_int;
    is_symbolic_link = "PHYSFS_isSymbolicLink": fn(*const c_char) -> c_int;
    get_last_mod_time = "PHYSFS_getLastModTime": fn(*const c_char) -> i64;
    open_read = "PHYSFS_openRead": fn(*const c_char) -> *mut RawFile;
    open_write = "PHYSFS_openWrite": fn(*const c_char) -> *mut RawFile;
    open_append = "PHYSFS_openAppend": fn(*const c_char) -> *mut RawFile;
    close = "PHYSFS_close": fn(*mut RawFile) -> c_int;
    read = "PHYSFS_read": fn(*mut RawFile, *mut c_void, u32, u32) -> i64;
    write = "PHYSFS_write": fn(*mut RawFile, *const c_void, u32, u32) -> i64;
    eof = "PHYSFS_eof": fn(*mut RawFile) -> c_int;
    tell = "PHYSFS_tell": fn(*mut RawFile) -> i64;
    seek = "PHYSFS_seek": fn(*mut RawFile, u64) -> c_int;
    file_length = "PHYSFS_fileLength": fn(*mut RawFile) -> i64;
    set_buffer = "PHYSFS_setBuffer": fn(*mut RawFile, u64) -> c_int;
    flush = "PHYSFS_flush": fn(*mut RawFile) -> c_int;
}

struct Loaded {
    api: Api,
    // Keeps every resolved pointer in `api` valid.
    _library: Library,
}

/// The native engine, loaded from a shared library.
///
/// # Example
///
/// ```rust,no_run
/// use mountvfs::{MountFs, PhysfsEngine};
///
/// let engine = PhysfsEngine::load()?;
/// let fs = MountFs::with_engine(engine, None)?;
/// println!("engine {}", fs.linked_version());
/// # Ok::<(), mountvfs::FsError>(())
/// ```
#[derive(Clone)]
pub struct PhysfsEngine {
    loaded: Arc<Loaded>,
}

impl std::fmt::Debug for PhysfsEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysfsEngine")
            .field("version", &self.linked_version())
            .finish()
    }
}

impl PhysfsEngine {
    /// Library names tried by [`load`](Self::load), in order.
    pub fn candidates() -> Vec<OsString> {
        let mut names = Vec::new();
        if let Some(explicit) = std::env::var_os(LIBRARY_ENV) {
            names.push(explicit);
        }
        names.push(libloading::library_filename("physfs"));
        names.extend(
            ["libphysfs.so.1", "libphysfs.so.3", "libphysfs.1.dylib"]
                .into_iter()
                .map(OsString::from),
        );
        names
    }

    /// Load the library from the platform's usual search locations.
    ///
    /// # Errors
    ///
    /// [`FsError::EngineUnavailable`] if no candidate could be loaded.
    pub fn load() -> Result<Self, FsError> {
        let mut reasons = Vec::new();
        for name in Self::candidates() {
            match Self::load_from(&name) {
                Ok(engine) => return Ok(engine),
                Err(e) => reasons.push(e.to_string()),
            }
        }
        Err(FsError::EngineUnavailable {
            reason: reasons.join("; "),
        })
    }

    /// Load the library from an explicit path or file name.
    ///
    /// # Errors
    ///
    /// [`FsError::EngineUnavailable`] if the library cannot be opened or lacks
    /// an entry point.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, FsError> {
        let path = path.as_ref();
        // SAFETY: loading runs the library's initializers; physfs has none with
        // side effects beyond its own globals.
        let library = unsafe { Library::new(path) }.map_err(|e| FsError::EngineUnavailable {
            reason: format!("{}: {e}", path.display()),
        })?;
        // SAFETY: the library is a physfs build; symbol types match its header.
        let api = unsafe { Api::resolve(&library) }?;
        tracing::debug!(library = %path.display(), "loaded native engine");
        Ok(Self {
            loaded: Arc::new(Loaded {
                api,
                _library: library,
            }),
        })
    }

    fn api(&self) -> &Api {
        &self.loaded.api
    }
}

unsafe impl Engine for PhysfsEngine {
    fn linked_version(&self) -> RawVersion {
        let mut version = RawVersion::default();
        // SAFETY: writes three bytes into `version`.
        unsafe { (self.api().get_linked_version)(&mut version) };
        version
    }

    unsafe fn init(&self, argv0: *const c_char) -> c_int {
        // SAFETY: forwarded caller contract.
        unsafe { (self.api().init)(argv0) }
    }

    fn deinit(&self) -> c_int {
        // SAFETY: no arguments.
        unsafe { (self.api().deinit)() }
    }

    fn is_init(&self) -> c_int {
        // SAFETY: no arguments.
        unsafe { (self.api().is_init)() }
    }

    fn set_allocator(&self, allocator: Option<Arc<dyn Allocator>>) -> c_int {
        // SAFETY: no arguments.
        if unsafe { (self.api().is_init)() } != 0 {
            // The slot must not change under a live engine; let it report the error.
            // SAFETY: null restores the default hooks and is rejected while live.
            return unsafe { (self.api().set_allocator)(std::ptr::null()) };
        }
        let hooks = allocator.is_some().then(|| RawAllocator {
            init: Some(allocator_init),
            deinit: Some(allocator_deinit),
            malloc: Some(allocator_malloc),
            realloc: Some(allocator_realloc),
            free: Some(allocator_free),
        });
        *ACTIVE_ALLOCATOR.write() = allocator;
        let raw = hooks
            .as_ref()
            .map_or(std::ptr::null(), |h| h as *const RawAllocator);
        // SAFETY: the engine copies the hook table before returning.
        unsafe { (self.api().set_allocator)(raw) }
    }

    fn last_error(&self) -> *const c_char {
        // SAFETY: no arguments.
        unsafe { (self.api().get_last_error)() }
    }

    fn dir_separator(&self) -> *const c_char {
        // SAFETY: no arguments.
        unsafe { (self.api().get_dir_separator)() }
    }

    fn permit_symbolic_links(&self, permit: c_int) {
        // SAFETY: plain integer argument.
        unsafe { (self.api().permit_symbolic_links)(permit) }
    }

    fn symbolic_links_permitted(&self) -> c_int {
        // SAFETY: no arguments.
        unsafe { (self.api().symbolic_links_permitted)() }
    }

    fn supported_archive_types(&self) -> *const *const RawArchiveInfo {
        // SAFETY: no arguments.
        unsafe { (self.api().supported_archive_types)() }
    }

    unsafe fn free_list(&self, list: *mut c_void) {
        // SAFETY: forwarded caller contract.
        unsafe { (self.api().free_list)(list) }
    }

    fn cd_rom_dirs(&self) -> *mut *mut c_char {
        // SAFETY: no arguments.
        unsafe { (self.api().get_cd_rom_dirs)() }
    }

    unsafe fn cd_rom_dirs_callback(&self, callback: StringCallback, data: *mut c_void) {
        // SAFETY: forwarded caller contract.
        unsafe { (self.api().get_cd_rom_dirs_callback)(callback, data) }
    }

    fn base_dir(&self) -> *const c_char {
        // SAFETY: no arguments.
        unsafe { (self.api().get_base_dir)() }
    }

    fn user_dir(&self) -> *const c_char {
        // SAFETY: no arguments.
        unsafe { (self.api().get_user_dir)() }
    }

    fn write_dir(&self) -> *const c_char {
        // SAFETY: no arguments.
        unsafe { (self.api().get_write_dir)() }
    }

    unsafe fn set_write_dir(&self, dir: *const c_char) -> c_int {
        // SAFETY: forwarded caller contract.
        unsafe { (self.api().set_write_dir)(dir) }
    }

    unsafe fn set_sane_config(
        &self,
        organization: *const c_char,
        app_name: *const c_char,
        archive_ext: *const c_char,
        include_cd_roms: c_int,
        archives_first: c_int,
    ) -> c_int {
        // SAFETY: forwarded caller contract.
        unsafe {
            (self.api().set_sane_config)(
                organization,
                app_name,
                archive_ext,
                include_cd_roms,
                archives_first,
            )
        }
    }

    unsafe fn mount(
        &self,
        source: *const c_char,
        mount_point: *const c_char,
        append: c_int,
    ) -> c_int {
        // SAFETY: forwarded caller contract.
        unsafe { (self.api().mount)(source, mount_point, append) }
    }

    unsafe fn unmount(&self, source: *const c_char) -> c_int {
        // SAFETY: forwarded caller contract.
        unsafe { (self.api().unmount)(source) }
    }

    fn search_path(&self) -> *mut *mut c_char {
        // SAFETY: no arguments.
        unsafe { (self.api().get_search_path)() }
    }

    unsafe fn search_path_callback(&self, callback: StringCallback, data: *mut c_void) {
        // SAFETY: forwarded caller contract.
        unsafe { (self.api().get_search_path_callback)(callback, data) }
    }

    unsafe fn mount_point(&self, source: *const c_char) -> *const c_char {
        // SAFETY: forwarded caller contract.
        unsafe { (self.api().get_mount_point)(source) }
    }

    unsafe fn mkdir(&self, dir: *const c_char) -> c_int {
        // SAFETY: forwarded caller contract.
        unsafe { (self.api().mkdir)(dir) }
    }

    unsafe fn delete(&self, path: *const c_char) -> c_int {
        // SAFETY: forwarded caller contract.
        unsafe { (self.api().delete)(path) }
    }

    unsafe fn real_dir(&self, path: *const c_char) -> *const c_char {
        // SAFETY: forwarded caller contract.
        unsafe { (self.api().get_real_dir)(path) }
    }

    unsafe fn enumerate_files(&self, dir: *const c_char) -> *mut *mut c_char {
        // SAFETY: forwarded caller contract.
        unsafe { (self.api().enumerate_files)(dir) }
    }

    unsafe fn enumerate_files_callback(
        &self,
        dir: *const c_char,
        callback: EnumFilesCallback,
        data: *mut c_void,
    ) {
        // SAFETY: forwarded caller contract.
        unsafe { (self.api().enumerate_files_callback)(dir, callback, data) }
    }

    unsafe fn exists(&self, path: *const c_char) -> c_int {
        // SAFETY: forwarded caller contract.
        unsafe { (self.api().exists)(path) }
    }

    unsafe fn is_directory(&self, path: *const c_char) -> c_int {
        // SAFETY: forwarded caller contract.
        unsafe { (self.api().is_directory)(path) }
    }

    unsafe fn is_symbolic_link(&self, path: *const c_char) -> c_int {
        // SAFETY: forwarded caller contract.
        unsafe { (self.api().is_symbolic_link)(path) }
    }

    unsafe fn last_mod_time(&self, path: *const c_char) -> i64 {
        // SAFETY: forwarded caller contract.
        unsafe { (self.api().get_last_mod_time)(path) }
    }

    unsafe fn open_read(&self, path: *const c_char) -> *mut RawFile {
        // SAFETY: forwarded caller contract.
        unsafe { (self.api().open_read)(path) }
    }

    unsafe fn open_write(&self, path: *const c_char) -> *mut RawFile {
        // SAFETY: forwarded caller contract.
        unsafe { (self.api().open_write)(path) }
    }

    unsafe fn open_append(&self, path: *const c_char) -> *mut RawFile {
        // SAFETY: forwarded caller contract.
        unsafe { (self.api().open_append)(path) }
    }

    unsafe fn close(&self, file: *mut RawFile) -> c_int {
        // SAFETY: forwarded caller contract.
        unsafe { (self.api().close)(file) }
    }

    unsafe fn read(&self, file: *mut RawFile, buffer: *mut c_void, size: u32, count: u32) -> i64 {
        // SAFETY: forwarded caller contract.
        unsafe { (self.api().read)(file, buffer, size, count) }
    }

    unsafe fn write(
        &self,
        file: *mut RawFile,
        buffer: *const c_void,
        size: u32,
        count: u32,
    ) -> i64 {
        // SAFETY: forwarded caller contract.
        unsafe { (self.api().write)(file, buffer, size, count) }
    }

    unsafe fn eof(&self, file: *mut RawFile) -> c_int {
        // SAFETY: forwarded caller contract.
        unsafe { (self.api().eof)(file) }
    }

    unsafe fn tell(&self, file: *mut RawFile) -> i64 {
        // SAFETY: forwarded caller contract.
        unsafe { (self.api().tell)(file) }
    }

    unsafe fn seek(&self, file: *mut RawFile, position: u64) -> c_int {
        // SAFETY: forwarded caller contract.
        unsafe { (self.api().seek)(file, position) }
    }

    unsafe fn file_length(&self, file: *mut RawFile) -> i64 {
        // SAFETY: forwarded caller contract.
        unsafe { (self.api().file_length)(file) }
    }

    unsafe fn set_buffer(&self, file: *mut RawFile, size: u64) -> c_int {
        // SAFETY: forwarded caller contract.
        unsafe { (self.api().set_buffer)(file, size) }
    }

    unsafe fn flush(&self, file: *mut RawFile) -> c_int {
        // SAFETY: forwarded caller contract.
        unsafe { (self.api().flush)(file) }
    }
}
