//! Engine backed by plain host directories.
//!
//! [`HostEngine`] speaks exactly the same C-shaped contract as the native
//! library: lists are allocated through the active [`Allocator`] and must be
//! returned with [`Engine::free_list`], strings delivered to callbacks die when
//! the callback returns, failures leave a message in the last-error slot, and
//! deinitialization closes every open file. It only understands directories;
//! mounting anything else fails with "unsupported archive type".
//!
//! Open files are handed out as opaque tokens, not real pointers, so a stale or
//! forged handle is rejected instead of dereferenced.

use std::collections::{BTreeSet, HashMap};
use std::ffi::{CStr, CString, c_char, c_int, c_void};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{MAIN_SEPARATOR_STR, Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::{Mutex, RwLock};

use super::{EnumFilesCallback, Engine, RawArchiveInfo, RawFile, RawVersion, StringCallback};
use crate::{Allocator, SystemAllocator};

/// Engine API level this implementation follows.
pub const HOST_ENGINE_VERSION: RawVersion = RawVersion {
    major: 3,
    minor: 0,
    patch: 2,
};

mod msg {
    use std::ffi::CStr;

    pub const NOT_INITIALIZED: &CStr = c"not initialized";
    pub const IS_INITIALIZED: &CStr = c"already initialized";
    pub const ALLOCATOR_INIT: &CStr = c"allocator initialization failed";
    pub const INVALID_ARGUMENT: &CStr = c"invalid argument";
    pub const BAD_FILENAME: &CStr = c"bad filename";
    pub const NOT_FOUND: &CStr = c"not found";
    pub const NOT_MOUNTED: &CStr = c"not mounted";
    pub const UNSUPPORTED: &CStr = c"unsupported archive type";
    pub const NO_WRITE_DIR: &CStr = c"write directory is not set";
    pub const NOT_A_DIRECTORY: &CStr = c"not a directory";
    pub const NOT_A_FILE: &CStr = c"not a file";
    pub const FILES_STILL_OPEN: &CStr = c"files still open";
    pub const OPEN_FOR_READING: &CStr = c"file open for reading";
    pub const OPEN_FOR_WRITING: &CStr = c"file open for writing";
    pub const PAST_EOF: &CStr = c"past end of file";
    pub const SYMLINK_FORBIDDEN: &CStr = c"symlinks are forbidden";
    pub const DIR_NOT_EMPTY: &CStr = c"directory isn't empty";
    pub const DUPLICATE: &CStr = c"file already exists";
    pub const PERMISSION: &CStr = c"permission denied";
    pub const OUT_OF_MEMORY: &CStr = c"out of memory";
    pub const IO: &CStr = c"i/o error";
}

type HostResult<T> = Result<T, &'static CStr>;

fn io_message(error: &std::io::Error) -> &'static CStr {
    use std::io::ErrorKind;
    match error.kind() {
        ErrorKind::NotFound => msg::NOT_FOUND,
        ErrorKind::PermissionDenied => msg::PERMISSION,
        ErrorKind::AlreadyExists => msg::DUPLICATE,
        ErrorKind::DirectoryNotEmpty => msg::DIR_NOT_EMPTY,
        ErrorKind::NotADirectory => msg::NOT_A_DIRECTORY,
        ErrorKind::OutOfMemory => msg::OUT_OF_MEMORY,
        _ => msg::IO,
    }
}

struct ArchiveList([*const RawArchiveInfo; 1]);

// SAFETY: the list only ever holds the null terminator.
unsafe impl Sync for ArchiveList {}

static NO_ARCHIVES: ArchiveList = ArchiveList([std::ptr::null()]);

/// Builder for [`HostEngine`].
///
/// # Example
///
/// ```rust
/// use mountvfs::HostEngine;
///
/// let engine = HostEngine::builder()
///     .user_dir(std::env::temp_dir())
///     .build();
/// # let _ = engine;
/// ```
#[derive(Debug, Default)]
pub struct HostEngineBuilder {
    base_dir: Option<PathBuf>,
    user_dir: Option<PathBuf>,
    cd_rom_dirs: Vec<PathBuf>,
}

impl HostEngineBuilder {
    /// Directory reported as the application's base directory.
    ///
    /// Defaults to the directory containing the running executable.
    pub fn base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    /// Directory reported as the user's home directory.
    ///
    /// Defaults to `$HOME` (or `%USERPROFILE%`), falling back to the base dir.
    pub fn user_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.user_dir = Some(dir.into());
        self
    }

    /// Add a directory reported as a CD-ROM mount.
    pub fn cd_rom_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cd_rom_dirs.push(dir.into());
        self
    }

    /// Build the engine. It starts uninitialized.
    pub fn build(self) -> HostEngine {
        let base_dir = self.base_dir.unwrap_or_else(default_base_dir);
        let user_dir = self
            .user_dir
            .or_else(|| {
                std::env::var_os("HOME")
                    .or_else(|| std::env::var_os("USERPROFILE"))
                    .map(PathBuf::from)
            })
            .unwrap_or_else(|| base_dir.clone());

        HostEngine {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                last_error: Mutex::new(None),
                allocator: RwLock::new(Arc::new(SystemAllocator)),
                base_dir: dir_string(&base_dir),
                user_dir: dir_string(&user_dir),
                cd_rom_dirs: self.cd_rom_dirs.iter().map(|d| dir_string(d)).collect(),
                separator: CString::new(MAIN_SEPARATOR_STR).unwrap_or_default(),
            }),
        }
    }
}

fn default_base_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn dir_string(dir: &Path) -> CString {
    let mut text = dir.to_string_lossy().into_owned();
    if !text.ends_with(MAIN_SEPARATOR_STR) {
        text.push_str(MAIN_SEPARATOR_STR);
    }
    CString::new(text).unwrap_or_default()
}

/// Engine over host directories.
///
/// Cloning yields another handle to the same engine instance, which is how
/// the "one live instance" rule can be observed.
#[derive(Clone)]
pub struct HostEngine {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for HostEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("HostEngine")
            .field("initialized", &state.initialized)
            .field("mounts", &state.search_path.len())
            .field("open_files", &state.open_files.len())
            .finish()
    }
}

impl Default for HostEngine {
    fn default() -> Self {
        Self::new()
    }
}

struct Inner {
    state: Mutex<State>,
    last_error: Mutex<Option<&'static CStr>>,
    allocator: RwLock<Arc<dyn Allocator>>,
    base_dir: CString,
    user_dir: CString,
    cd_rom_dirs: Vec<CString>,
    separator: CString,
}

#[derive(Default)]
struct State {
    initialized: bool,
    permit_symlinks: bool,
    search_path: Vec<HostMount>,
    write_dir: Option<WriteDir>,
    open_files: HashMap<usize, HostFile>,
    next_file: usize,
}

struct HostMount {
    source: CString,
    dir: PathBuf,
    point: Vec<String>,
    point_text: CString,
}

impl HostMount {
    /// Portion of `path` inside this mount, if the path is under its mount point.
    fn relative<'a>(&self, path: &'a [String]) -> Option<&'a [String]> {
        path.strip_prefix(self.point.as_slice())
    }

    /// `true` if `path` is a proper prefix of the mount point.
    fn is_ancestor(&self, path: &[String]) -> bool {
        self.point.len() > path.len() && self.point.starts_with(path)
    }
}

struct WriteDir {
    dir: PathBuf,
    text: CString,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum FileKind {
    Read,
    Write,
}

struct HostFile {
    file: File,
    kind: FileKind,
    origin: Option<Vec<u8>>,
}

/// Split a virtual path into components, rejecting anything that could escape
/// a mount.
fn sanitize(path: &str) -> HostResult<Vec<String>> {
    let mut parts = Vec::new();
    for part in path.split('/').filter(|p| !p.is_empty()) {
        if part == "." || part == ".." || part.contains('\\') || part.contains(':') {
            return Err(msg::BAD_FILENAME);
        }
        parts.push(part.to_owned());
    }
    Ok(parts)
}

/// # Safety
///
/// `ptr` must be null or a valid C string that outlives `'a`.
unsafe fn arg<'a>(ptr: *const c_char) -> HostResult<&'a str> {
    if ptr.is_null() {
        return Err(msg::INVALID_ARGUMENT);
    }
    // SAFETY: non-null and valid per caller contract.
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .map_err(|_| msg::BAD_FILENAME)
}

/// # Safety
///
/// `list` must be a null-terminated array whose entries and storage were all
/// allocated by `allocator`.
unsafe fn release_list(allocator: &dyn Allocator, list: *mut *mut c_char) {
    let mut cursor = list;
    // SAFETY: walk up to and including the terminator, freeing each entry once.
    unsafe {
        while !(*cursor).is_null() {
            allocator.free((*cursor).cast());
            cursor = cursor.add(1);
        }
        allocator.free(list.cast());
    }
}

/// Seconds since the Unix epoch. Negative is the failure sentinel, so earlier
/// times clamp to zero.
fn epoch_seconds(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
}

fn file_token(id: usize) -> *mut RawFile {
    std::ptr::without_provenance_mut(id)
}

impl HostEngine {
    /// Engine with default directories and no CD-ROM drives.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Start configuring an engine.
    pub fn builder() -> HostEngineBuilder {
        HostEngineBuilder::default()
    }

    fn set_error(&self, message: &'static CStr) {
        *self.inner.last_error.lock() = Some(message);
    }

    fn status(&self, result: HostResult<()>) -> c_int {
        match result {
            Ok(()) => 1,
            Err(message) => {
                self.set_error(message);
                0
            }
        }
    }

    fn count(&self, result: HostResult<i64>) -> i64 {
        result.unwrap_or_else(|message| {
            self.set_error(message);
            -1
        })
    }

    fn pointer<T>(&self, result: HostResult<*const T>) -> *const T {
        result.unwrap_or_else(|message| {
            self.set_error(message);
            std::ptr::null()
        })
    }

    fn list(&self, result: HostResult<Vec<Vec<u8>>>) -> *mut *mut c_char {
        match result.and_then(|items| self.alloc_list(&items)) {
            Ok(list) => list,
            Err(message) => {
                self.set_error(message);
                std::ptr::null_mut()
            }
        }
    }

    fn live(&self) -> HostResult<parking_lot::MutexGuard<'_, State>> {
        let state = self.inner.state.lock();
        if state.initialized {
            Ok(state)
        } else {
            Err(msg::NOT_INITIALIZED)
        }
    }

    /// Copy `items` into a null-terminated list allocated by the active allocator.
    fn alloc_list(&self, items: &[Vec<u8>]) -> HostResult<*mut *mut c_char> {
        let allocator = Arc::clone(&*self.inner.allocator.read());
        let slots = items.len() + 1;
        let bytes = (slots * std::mem::size_of::<*mut c_char>()) as u64;
        let list: *mut *mut c_char = allocator.malloc(bytes).cast();
        if list.is_null() {
            return Err(msg::OUT_OF_MEMORY);
        }

        for (index, item) in items.iter().enumerate() {
            let entry: *mut c_char = allocator.malloc(item.len() as u64 + 1).cast();
            if entry.is_null() {
                // SAFETY: slots before `index` are filled, terminate and release.
                unsafe {
                    *list.add(index) = std::ptr::null_mut();
                    release_list(&*allocator, list);
                }
                return Err(msg::OUT_OF_MEMORY);
            }
            // SAFETY: `entry` holds `item.len() + 1` bytes and `list` has `slots` slots.
            unsafe {
                std::ptr::copy_nonoverlapping(item.as_ptr(), entry.cast::<u8>(), item.len());
                *entry.add(item.len()) = 0;
                *list.add(index) = entry;
            }
        }

        // SAFETY: the last slot is the terminator.
        unsafe { *list.add(items.len()) = std::ptr::null_mut() };
        Ok(list)
    }

    /// Walk `rel` below `mount.dir`, refusing symlinks unless `follow` is set.
    fn locate(mount: &HostMount, rel: &[String], follow: bool) -> HostResult<PathBuf> {
        let mut path = mount.dir.clone();
        for part in rel {
            path.push(part);
            let meta = std::fs::symlink_metadata(&path).map_err(|e| io_message(&e))?;
            if meta.file_type().is_symlink() && !follow {
                return Err(msg::SYMLINK_FORBIDDEN);
            }
        }
        Ok(path)
    }

    /// First host path providing `parts`, in search order.
    fn resolve(state: &State, parts: &[String], follow: bool) -> HostResult<(usize, PathBuf)> {
        let mut error = msg::NOT_FOUND;
        for (index, mount) in state.search_path.iter().enumerate() {
            if let Some(rel) = mount.relative(parts) {
                match Self::locate(mount, rel, follow) {
                    Ok(path) => return Ok((index, path)),
                    Err(e) if e == msg::SYMLINK_FORBIDDEN => error = e,
                    Err(_) => {}
                }
            }
        }
        Err(error)
    }

    fn names_in(state: &State, parts: &[String]) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        for mount in &state.search_path {
            if mount.is_ancestor(parts) {
                names.insert(mount.point[parts.len()].clone());
                continue;
            }
            let Some(rel) = mount.relative(parts) else {
                continue;
            };
            let Ok(dir) = Self::locate(mount, rel, state.permit_symlinks) else {
                continue;
            };
            let Ok(entries) = std::fs::read_dir(&dir) else {
                continue;
            };
            for entry in entries.flatten() {
                let is_link = entry.file_type().map(|t| t.is_symlink()).unwrap_or(false);
                if is_link && !state.permit_symlinks {
                    continue;
                }
                names.insert(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names
    }

    fn write_target(state: &State, path: &str) -> HostResult<PathBuf> {
        let write_dir = state.write_dir.as_ref().ok_or(msg::NO_WRITE_DIR)?;
        let parts = sanitize(path)?;
        if parts.is_empty() {
            return Err(msg::BAD_FILENAME);
        }
        let mut target = write_dir.dir.clone();
        target.extend(parts);
        Ok(target)
    }

    fn register(state: &mut State, file: HostFile) -> *mut RawFile {
        state.next_file += 1;
        let id = state.next_file;
        state.open_files.insert(id, file);
        file_token(id)
    }

    fn with_file<T>(
        &self,
        file: *mut RawFile,
        op: impl FnOnce(&mut HostFile) -> HostResult<T>,
    ) -> HostResult<T> {
        let mut state = self.live()?;
        let handle = state
            .open_files
            .get_mut(&file.addr())
            .ok_or(msg::INVALID_ARGUMENT)?;
        op(handle)
    }

    fn do_mount(&self, source: &str, mount_point: Option<&str>, append: bool) -> HostResult<()> {
        let mut state = self.live()?;
        if state
            .search_path
            .iter()
            .any(|m| m.source.as_bytes() == source.as_bytes())
        {
            return Ok(());
        }

        let dir = PathBuf::from(source);
        let meta = std::fs::metadata(&dir).map_err(|e| io_message(&e))?;
        if !meta.is_dir() {
            return Err(msg::UNSUPPORTED);
        }

        let point = sanitize(mount_point.unwrap_or("/"))?;
        let point_text = if point.is_empty() {
            "/".to_owned()
        } else {
            format!("{}/", point.join("/"))
        };
        let mount = HostMount {
            source: CString::new(source).map_err(|_| msg::BAD_FILENAME)?,
            dir,
            point,
            point_text: CString::new(point_text).map_err(|_| msg::BAD_FILENAME)?,
        };

        if append {
            state.search_path.push(mount);
        } else {
            state.search_path.insert(0, mount);
        }
        Ok(())
    }

    fn do_set_write_dir(state: &mut State, dir: Option<&str>) -> HostResult<()> {
        if state
            .open_files
            .values()
            .any(|f| f.kind == FileKind::Write)
        {
            return Err(msg::FILES_STILL_OPEN);
        }
        let Some(dir) = dir else {
            state.write_dir = None;
            return Ok(());
        };
        let path = PathBuf::from(dir);
        let meta = std::fs::metadata(&path).map_err(|e| io_message(&e))?;
        if !meta.is_dir() {
            return Err(msg::NOT_A_DIRECTORY);
        }
        state.write_dir = Some(WriteDir {
            dir: path,
            text: CString::new(dir).map_err(|_| msg::BAD_FILENAME)?,
        });
        Ok(())
    }

    fn open(&self, path: &str, kind: OpenKindRequest) -> HostResult<*mut RawFile> {
        let mut state = self.live()?;
        let file = match kind {
            OpenKindRequest::Read => {
                let parts = sanitize(path)?;
                let (index, host_path) = Self::resolve(&state, &parts, state.permit_symlinks)?;
                let meta = std::fs::metadata(&host_path).map_err(|e| io_message(&e))?;
                if meta.is_dir() {
                    return Err(msg::NOT_A_FILE);
                }
                HostFile {
                    file: File::open(&host_path).map_err(|e| io_message(&e))?,
                    kind: FileKind::Read,
                    origin: Some(state.search_path[index].source.as_bytes().to_vec()),
                }
            }
            OpenKindRequest::Write | OpenKindRequest::Append => {
                let target = Self::write_target(&state, path)?;
                let mut options = OpenOptions::new();
                if kind == OpenKindRequest::Append {
                    options.append(true).create(true);
                } else {
                    options.write(true).create(true).truncate(true);
                }
                HostFile {
                    file: options.open(&target).map_err(|e| io_message(&e))?,
                    kind: FileKind::Write,
                    origin: None,
                }
            }
        };
        Ok(Self::register(&mut state, file))
    }

    fn sane_config(
        &self,
        organization: &str,
        app_name: &str,
        archive_ext: Option<&str>,
        include_cd_roms: bool,
        archives_first: bool,
    ) -> HostResult<()> {
        {
            let mut state = self.live()?;
            let user_dir = self.inner.user_dir.to_string_lossy().into_owned();
            let pref = PathBuf::from(user_dir)
                .join(format!(".{organization}"))
                .join(app_name);
            std::fs::create_dir_all(&pref).map_err(|e| io_message(&e))?;
            let pref_text = dir_string(&pref);
            Self::do_set_write_dir(&mut state, Some(&pref_text.to_string_lossy()))?;
        }

        let write_dir = self.inner.state.lock().write_dir.as_ref().map(|w| w.text.clone());
        if let Some(write_dir) = write_dir {
            self.do_mount(&write_dir.to_string_lossy(), None, false)?;
        }
        // Failures past this point leave the config usable, as the native engine does.
        let _ = self.do_mount(&self.inner.base_dir.to_string_lossy(), None, true);
        if include_cd_roms {
            for dir in &self.inner.cd_rom_dirs {
                let _ = self.do_mount(&dir.to_string_lossy(), None, true);
            }
        }

        if let Some(ext) = archive_ext {
            let suffix = format!(".{}", ext.to_ascii_lowercase());
            let candidates: Vec<PathBuf> = {
                let state = self.inner.state.lock();
                Self::names_in(&state, &[])
                    .into_iter()
                    .filter(|name| name.to_ascii_lowercase().ends_with(&suffix))
                    .filter_map(|name| {
                        Self::resolve(&state, &[name], state.permit_symlinks)
                            .ok()
                            .map(|(_, path)| path)
                    })
                    .collect()
            };
            for archive in candidates {
                let _ = self.do_mount(&archive.to_string_lossy(), None, !archives_first);
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum OpenKindRequest {
    Read,
    Write,
    Append,
}

unsafe impl Engine for HostEngine {
    fn linked_version(&self) -> RawVersion {
        HOST_ENGINE_VERSION
    }

    unsafe fn init(&self, _argv0: *const c_char) -> c_int {
        let result = (|| {
            let mut state = self.inner.state.lock();
            if state.initialized {
                return Err(msg::IS_INITIALIZED);
            }
            if !self.inner.allocator.read().init() {
                return Err(msg::ALLOCATOR_INIT);
            }
            *state = State {
                initialized: true,
                next_file: state.next_file,
                ..State::default()
            };
            Ok(())
        })();
        self.status(result)
    }

    fn deinit(&self) -> c_int {
        let result = (|| {
            let mut state = self.live()?;
            // Dropping the table closes every file the engine still owns.
            *state = State {
                next_file: state.next_file,
                ..State::default()
            };
            self.inner.allocator.read().deinit();
            Ok(())
        })();
        self.status(result)
    }

    fn is_init(&self) -> c_int {
        c_int::from(self.inner.state.lock().initialized)
    }

    fn set_allocator(&self, allocator: Option<Arc<dyn Allocator>>) -> c_int {
        let result = (|| {
            let state = self.inner.state.lock();
            if state.initialized {
                return Err(msg::IS_INITIALIZED);
            }
            *self.inner.allocator.write() = allocator.unwrap_or_else(|| Arc::new(SystemAllocator));
            Ok(())
        })();
        self.status(result)
    }

    fn last_error(&self) -> *const c_char {
        self.inner
            .last_error
            .lock()
            .take()
            .map_or(std::ptr::null(), CStr::as_ptr)
    }

    fn dir_separator(&self) -> *const c_char {
        self.inner.separator.as_ptr()
    }

    fn permit_symbolic_links(&self, permit: c_int) {
        self.inner.state.lock().permit_symlinks = permit != 0;
    }

    fn symbolic_links_permitted(&self) -> c_int {
        c_int::from(self.inner.state.lock().permit_symlinks)
    }

    fn supported_archive_types(&self) -> *const *const RawArchiveInfo {
        self.pointer(self.live().map(|_| NO_ARCHIVES.0.as_ptr()))
    }

    unsafe fn free_list(&self, list: *mut c_void) {
        if list.is_null() {
            return;
        }
        let allocator = Arc::clone(&*self.inner.allocator.read());
        // SAFETY: caller passes a list produced by `alloc_list`.
        unsafe { release_list(&*allocator, list.cast()) }
    }

    fn cd_rom_dirs(&self) -> *mut *mut c_char {
        self.list(self.live().map(|_| {
            self.inner
                .cd_rom_dirs
                .iter()
                .map(|d| d.as_bytes().to_vec())
                .collect()
        }))
    }

    unsafe fn cd_rom_dirs_callback(&self, callback: StringCallback, data: *mut c_void) {
        if let Err(message) = self.live() {
            self.set_error(message);
            return;
        }
        for dir in &self.inner.cd_rom_dirs {
            let scratch = dir.clone();
            // SAFETY: caller vouches for `callback`/`data`; `scratch` dies after the call.
            unsafe { callback(data, scratch.as_ptr()) };
        }
    }

    fn base_dir(&self) -> *const c_char {
        self.pointer(self.live().map(|_| self.inner.base_dir.as_ptr()))
    }

    fn user_dir(&self) -> *const c_char {
        self.pointer(self.live().map(|_| self.inner.user_dir.as_ptr()))
    }

    fn write_dir(&self) -> *const c_char {
        match self.live() {
            Ok(state) => state
                .write_dir
                .as_ref()
                .map_or(std::ptr::null(), |w| w.text.as_ptr()),
            Err(message) => {
                self.set_error(message);
                std::ptr::null()
            }
        }
    }

    unsafe fn set_write_dir(&self, dir: *const c_char) -> c_int {
        let result = (|| {
            let mut state = self.live()?;
            let dir = if dir.is_null() {
                None
            } else {
                // SAFETY: non-null and valid per caller contract.
                Some(unsafe { arg(dir) }?)
            };
            Self::do_set_write_dir(&mut state, dir)
        })();
        self.status(result)
    }

    unsafe fn set_sane_config(
        &self,
        organization: *const c_char,
        app_name: *const c_char,
        archive_ext: *const c_char,
        include_cd_roms: c_int,
        archives_first: c_int,
    ) -> c_int {
        let result = (|| {
            // SAFETY: caller contract on every pointer argument.
            let organization = unsafe { arg(organization) }?;
            let app_name = unsafe { arg(app_name) }?;
            let archive_ext = if archive_ext.is_null() {
                None
            } else {
                Some(unsafe { arg(archive_ext) }?)
            };
            self.sane_config(
                organization,
                app_name,
                archive_ext,
                include_cd_roms != 0,
                archives_first != 0,
            )
        })();
        self.status(result)
    }

    unsafe fn mount(
        &self,
        source: *const c_char,
        mount_point: *const c_char,
        append: c_int,
    ) -> c_int {
        let result = (|| {
            // SAFETY: caller contract on both pointers.
            let source = unsafe { arg(source) }?;
            let mount_point = if mount_point.is_null() {
                None
            } else {
                Some(unsafe { arg(mount_point) }?)
            };
            self.do_mount(source, mount_point, append != 0)
        })();
        self.status(result)
    }

    unsafe fn unmount(&self, source: *const c_char) -> c_int {
        let result = (|| {
            // SAFETY: caller contract.
            let source = unsafe { arg(source) }?;
            let mut state = self.live()?;
            let index = state
                .search_path
                .iter()
                .position(|m| m.source.as_bytes() == source.as_bytes())
                .ok_or(msg::NOT_MOUNTED)?;
            if state
                .open_files
                .values()
                .any(|f| f.origin.as_deref() == Some(source.as_bytes()))
            {
                return Err(msg::FILES_STILL_OPEN);
            }
            state.search_path.remove(index);
            Ok(())
        })();
        self.status(result)
    }

    fn search_path(&self) -> *mut *mut c_char {
        self.list(self.live().map(|state| {
            state
                .search_path
                .iter()
                .map(|m| m.source.as_bytes().to_vec())
                .collect()
        }))
    }

    unsafe fn search_path_callback(&self, callback: StringCallback, data: *mut c_void) {
        let sources: Vec<CString> = match self.live() {
            Ok(state) => state.search_path.iter().map(|m| m.source.clone()).collect(),
            Err(message) => {
                self.set_error(message);
                return;
            }
        };
        for source in sources {
            // SAFETY: caller vouches for `callback`/`data`; `source` dies after the call.
            unsafe { callback(data, source.as_ptr()) };
        }
    }

    unsafe fn mount_point(&self, source: *const c_char) -> *const c_char {
        let result = (|| {
            // SAFETY: caller contract.
            let source = unsafe { arg(source) }?;
            let state = self.live()?;
            state
                .search_path
                .iter()
                .find(|m| m.source.as_bytes() == source.as_bytes())
                .map(|m| m.point_text.as_ptr())
                .ok_or(msg::NOT_MOUNTED)
        })();
        self.pointer(result)
    }

    unsafe fn mkdir(&self, dir: *const c_char) -> c_int {
        let result = (|| {
            // SAFETY: caller contract.
            let dir = unsafe { arg(dir) }?;
            let state = self.live()?;
            let target = Self::write_target(&state, dir)?;
            std::fs::create_dir_all(target).map_err(|e| io_message(&e))
        })();
        self.status(result)
    }

    unsafe fn delete(&self, path: *const c_char) -> c_int {
        let result = (|| {
            // SAFETY: caller contract.
            let path = unsafe { arg(path) }?;
            let state = self.live()?;
            let target = Self::write_target(&state, path)?;
            let meta = std::fs::symlink_metadata(&target).map_err(|e| io_message(&e))?;
            if meta.is_dir() {
                std::fs::remove_dir(&target)
            } else {
                std::fs::remove_file(&target)
            }
            .map_err(|e| io_message(&e))
        })();
        self.status(result)
    }

    unsafe fn real_dir(&self, path: *const c_char) -> *const c_char {
        let result = (|| {
            // SAFETY: caller contract.
            let path = unsafe { arg(path) }?;
            let parts = sanitize(path)?;
            let state = self.live()?;
            for mount in &state.search_path {
                if mount.is_ancestor(&parts) {
                    return Ok(mount.source.as_ptr());
                }
                if let Some(rel) = mount.relative(&parts) {
                    if Self::locate(mount, rel, state.permit_symlinks).is_ok() {
                        return Ok(mount.source.as_ptr());
                    }
                }
            }
            Err(msg::NOT_FOUND)
        })();
        self.pointer(result)
    }

    unsafe fn enumerate_files(&self, dir: *const c_char) -> *mut *mut c_char {
        let result = (|| {
            // SAFETY: caller contract.
            let dir = unsafe { arg(dir) }?;
            let parts = sanitize(dir)?;
            let state = self.live()?;
            Ok(Self::names_in(&state, &parts)
                .into_iter()
                .map(String::into_bytes)
                .collect())
        })();
        self.list(result)
    }

    unsafe fn enumerate_files_callback(
        &self,
        dir: *const c_char,
        callback: EnumFilesCallback,
        data: *mut c_void,
    ) {
        let result = (|| {
            // SAFETY: caller contract.
            let text = unsafe { arg(dir) }?;
            let parts = sanitize(text)?;
            let state = self.live()?;
            Ok(Self::names_in(&state, &parts))
        })();
        let names = match result {
            Ok(names) => names,
            Err(message) => {
                self.set_error(message);
                return;
            }
        };
        for name in names {
            let Ok(scratch) = CString::new(name) else {
                continue;
            };
            // SAFETY: caller vouches for `callback`/`data`; `scratch` dies after the call.
            unsafe { callback(data, dir, scratch.as_ptr()) };
        }
    }

    unsafe fn exists(&self, path: *const c_char) -> c_int {
        let result = (|| {
            // SAFETY: caller contract.
            let parts = sanitize(unsafe { arg(path) }?)?;
            let state = self.live()?;
            if parts.is_empty() || state.search_path.iter().any(|m| m.is_ancestor(&parts)) {
                return Ok(());
            }
            Self::resolve(&state, &parts, state.permit_symlinks).map(|_| ())
        })();
        self.status(result)
    }

    unsafe fn is_directory(&self, path: *const c_char) -> c_int {
        let result = (|| {
            // SAFETY: caller contract.
            let parts = sanitize(unsafe { arg(path) }?)?;
            let state = self.live()?;
            if parts.is_empty() || state.search_path.iter().any(|m| m.is_ancestor(&parts)) {
                return Ok(());
            }
            let (_, host_path) = Self::resolve(&state, &parts, state.permit_symlinks)?;
            match std::fs::metadata(host_path) {
                Ok(meta) if meta.is_dir() => Ok(()),
                Ok(_) => Err(msg::NOT_A_DIRECTORY),
                Err(e) => Err(io_message(&e)),
            }
        })();
        self.status(result)
    }

    unsafe fn is_symbolic_link(&self, path: *const c_char) -> c_int {
        let result = (|| {
            // SAFETY: caller contract.
            let parts = sanitize(unsafe { arg(path) }?)?;
            let state = self.live()?;
            let (_, host_path) = Self::resolve(&state, &parts, true)?;
            let meta = std::fs::symlink_metadata(host_path).map_err(|e| io_message(&e))?;
            if meta.file_type().is_symlink() {
                Ok(())
            } else {
                Err(msg::NOT_FOUND)
            }
        })();
        self.status(result)
    }

    unsafe fn last_mod_time(&self, path: *const c_char) -> i64 {
        let result = (|| {
            // SAFETY: caller contract.
            let parts = sanitize(unsafe { arg(path) }?)?;
            let state = self.live()?;
            let host_path = match state.search_path.iter().find(|m| m.is_ancestor(&parts)) {
                Some(mount) => mount.dir.clone(),
                None => Self::resolve(&state, &parts, state.permit_symlinks)?.1,
            };
            let modified = std::fs::metadata(host_path)
                .and_then(|m| m.modified())
                .map_err(|e| io_message(&e))?;
            Ok(epoch_seconds(modified))
        })();
        self.count(result)
    }

    unsafe fn open_read(&self, path: *const c_char) -> *mut RawFile {
        // SAFETY: caller contract.
        let result = unsafe { arg(path) }.and_then(|p| self.open(p, OpenKindRequest::Read));
        self.pointer(result.map(|f| f.cast_const())).cast_mut()
    }

    unsafe fn open_write(&self, path: *const c_char) -> *mut RawFile {
        // SAFETY: caller contract.
        let result = unsafe { arg(path) }.and_then(|p| self.open(p, OpenKindRequest::Write));
        self.pointer(result.map(|f| f.cast_const())).cast_mut()
    }

    unsafe fn open_append(&self, path: *const c_char) -> *mut RawFile {
        // SAFETY: caller contract.
        let result = unsafe { arg(path) }.and_then(|p| self.open(p, OpenKindRequest::Append));
        self.pointer(result.map(|f| f.cast_const())).cast_mut()
    }

    unsafe fn close(&self, file: *mut RawFile) -> c_int {
        let result = (|| {
            let mut state = self.live()?;
            let mut handle = state
                .open_files
                .remove(&file.addr())
                .ok_or(msg::INVALID_ARGUMENT)?;
            if handle.kind == FileKind::Write {
                handle.file.flush().map_err(|e| io_message(&e))?;
            }
            Ok(())
        })();
        self.status(result)
    }

    unsafe fn read(&self, file: *mut RawFile, buffer: *mut c_void, size: u32, count: u32) -> i64 {
        let result = self.with_file(file, |handle| {
            if handle.kind != FileKind::Read {
                return Err(msg::OPEN_FOR_WRITING);
            }
            if size == 0 || count == 0 {
                return Ok(0);
            }
            let total = size as usize * count as usize;
            // SAFETY: caller guarantees `buffer` holds `size * count` bytes.
            let buf = unsafe { std::slice::from_raw_parts_mut(buffer.cast::<u8>(), total) };
            let mut filled = 0;
            while filled < total {
                match handle.file.read(&mut buf[filled..]) {
                    Ok(0) => break,
                    Ok(n) => filled += n,
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                    Err(e) if filled == 0 => return Err(io_message(&e)),
                    Err(_) => break,
                }
            }
            Ok((filled / size as usize) as i64)
        });
        self.count(result)
    }

    unsafe fn write(
        &self,
        file: *mut RawFile,
        buffer: *const c_void,
        size: u32,
        count: u32,
    ) -> i64 {
        let result = self.with_file(file, |handle| {
            if handle.kind != FileKind::Write {
                return Err(msg::OPEN_FOR_READING);
            }
            if size == 0 || count == 0 {
                return Ok(0);
            }
            let total = size as usize * count as usize;
            // SAFETY: caller guarantees `buffer` holds `size * count` bytes.
            let buf = unsafe { std::slice::from_raw_parts(buffer.cast::<u8>(), total) };
            handle.file.write_all(buf).map_err(|e| io_message(&e))?;
            Ok(i64::from(count))
        });
        self.count(result)
    }

    unsafe fn eof(&self, file: *mut RawFile) -> c_int {
        let result = self.with_file(file, |handle| {
            // Files opened for writing never report end of file.
            if handle.kind != FileKind::Read {
                return Ok(false);
            }
            let position = handle.file.stream_position().map_err(|e| io_message(&e))?;
            let length = handle.file.metadata().map_err(|e| io_message(&e))?.len();
            Ok(position >= length)
        });
        match result {
            Ok(at_end) => c_int::from(at_end),
            Err(message) => {
                self.set_error(message);
                0
            }
        }
    }

    unsafe fn tell(&self, file: *mut RawFile) -> i64 {
        let result = self.with_file(file, |handle| {
            handle
                .file
                .stream_position()
                .map(|p| p as i64)
                .map_err(|e| io_message(&e))
        });
        self.count(result)
    }

    unsafe fn seek(&self, file: *mut RawFile, position: u64) -> c_int {
        let result = self.with_file(file, |handle| {
            if handle.kind == FileKind::Read {
                let length = handle.file.metadata().map_err(|e| io_message(&e))?.len();
                if position > length {
                    return Err(msg::PAST_EOF);
                }
            }
            handle
                .file
                .seek(SeekFrom::Start(position))
                .map(|_| ())
                .map_err(|e| io_message(&e))
        });
        self.status(result)
    }

    unsafe fn file_length(&self, file: *mut RawFile) -> i64 {
        let result = self.with_file(file, |handle| {
            handle
                .file
                .metadata()
                .map(|m| m.len() as i64)
                .map_err(|e| io_message(&e))
        });
        self.count(result)
    }

    unsafe fn set_buffer(&self, file: *mut RawFile, _size: u64) -> c_int {
        // Host files are unbuffered; only the handle is validated.
        let result = self.with_file(file, |_| Ok(()));
        self.status(result)
    }

    unsafe fn flush(&self, file: *mut RawFile) -> c_int {
        let result = self.with_file(file, |handle| {
            if handle.kind == FileKind::Read {
                return Ok(());
            }
            handle.file.flush().map_err(|e| io_message(&e))
        });
        self.status(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn live_engine() -> HostEngine {
        let engine = HostEngine::new();
        assert_eq!(unsafe { engine.init(std::ptr::null()) }, 1);
        engine
    }

    fn take_error(engine: &HostEngine) -> String {
        let ptr = engine.last_error();
        assert!(!ptr.is_null());
        unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
    }

    #[test]
    fn sanitize_rejects_escapes() {
        assert_eq!(sanitize("/a//b/").unwrap(), vec!["a", "b"]);
        assert!(sanitize("a/../b").is_err());
        assert!(sanitize("./a").is_err());
        assert!(sanitize("c:/x").is_err());
        assert!(sanitize("").unwrap().is_empty());
    }

    #[test]
    fn times_before_epoch_clamp_to_zero() {
        let before = UNIX_EPOCH - std::time::Duration::from_secs(3600);
        assert_eq!(epoch_seconds(before), 0);
        let after = UNIX_EPOCH + std::time::Duration::from_secs(90);
        assert_eq!(epoch_seconds(after), 90);
    }

    #[test]
    fn second_init_fails_and_sets_error() {
        let engine = live_engine();
        let clone = engine.clone();
        assert_eq!(unsafe { clone.init(std::ptr::null()) }, 0);
        assert_eq!(take_error(&engine), "already initialized");
        // Reading the error clears it.
        assert!(engine.last_error().is_null());
    }

    #[test]
    fn calls_before_init_fail() {
        let engine = HostEngine::new();
        assert!(engine.search_path().is_null());
        assert_eq!(take_error(&engine), "not initialized");
    }

    #[test]
    fn set_allocator_rejected_while_live() {
        let engine = live_engine();
        assert_eq!(engine.set_allocator(None), 0);
        assert_eq!(engine.deinit(), 1);
        assert_eq!(engine.set_allocator(None), 1);
    }

    #[test]
    fn mount_file_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("data.zip");
        std::fs::write(&file, b"PK").unwrap();
        let source = CString::new(file.to_string_lossy().into_owned()).unwrap();

        let engine = live_engine();
        assert_eq!(unsafe { engine.mount(source.as_ptr(), std::ptr::null(), 0) }, 0);
        assert_eq!(take_error(&engine), "unsupported archive type");
    }

    #[test]
    fn stale_file_token_is_rejected() {
        let engine = live_engine();
        assert_eq!(unsafe { engine.close(file_token(42)) }, 0);
        assert_eq!(take_error(&engine), "invalid argument");
    }

    #[test]
    fn deinit_closes_open_files() {
        let dir = tempfile::tempdir().unwrap();
        let write_dir = CString::new(dir.path().to_string_lossy().into_owned()).unwrap();
        let engine = live_engine();
        unsafe {
            assert_eq!(engine.set_write_dir(write_dir.as_ptr()), 1);
            let file = engine.open_write(c"out.bin".as_ptr());
            assert!(!file.is_null());
            assert_eq!(engine.deinit(), 1);
            assert_eq!(engine.init(std::ptr::null()), 1);
            // The old token does not survive a re-init.
            assert_eq!(engine.close(file), 0);
        }
    }

    #[test]
    fn unmount_with_open_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"abc").unwrap();
        let source = CString::new(dir.path().to_string_lossy().into_owned()).unwrap();
        let engine = live_engine();
        unsafe {
            assert_eq!(engine.mount(source.as_ptr(), std::ptr::null(), 1), 1);
            let file = engine.open_read(c"a.txt".as_ptr());
            assert!(!file.is_null());
            assert_eq!(engine.unmount(source.as_ptr()), 0);
            assert_eq!(take_error(&engine), "files still open");
            assert_eq!(engine.close(file), 1);
            assert_eq!(engine.unmount(source.as_ptr()), 1);
        }
    }

    #[test]
    fn read_rejected_on_write_handle() {
        let dir = tempfile::tempdir().unwrap();
        let write_dir = CString::new(dir.path().to_string_lossy().into_owned()).unwrap();
        let engine = live_engine();
        unsafe {
            engine.set_write_dir(write_dir.as_ptr());
            let file = engine.open_write(c"x".as_ptr());
            let mut buf = [0u8; 4];
            assert_eq!(engine.read(file, buf.as_mut_ptr().cast(), 1, 4), -1);
            assert_eq!(take_error(&engine), "file open for writing");
            assert_eq!(engine.eof(file), 0);
            engine.close(file);
        }
    }

    #[test]
    fn mount_point_ancestors_are_directories() {
        let dir = tempfile::tempdir().unwrap();
        let source = CString::new(dir.path().to_string_lossy().into_owned()).unwrap();
        let engine = live_engine();
        unsafe {
            assert_eq!(engine.mount(source.as_ptr(), c"a/b".as_ptr(), 0), 1);
            assert_eq!(engine.is_directory(c"/a".as_ptr()), 1);
            assert_eq!(engine.is_directory(c"/a/b".as_ptr()), 1);
            let point = CStr::from_ptr(engine.mount_point(source.as_ptr()));
            assert_eq!(point.to_str().unwrap(), "a/b/");
        }
    }

    #[test]
    fn duplicate_mount_keeps_single_entry() {
        let dir = tempfile::tempdir().unwrap();
        let source = CString::new(dir.path().to_string_lossy().into_owned()).unwrap();
        let engine = live_engine();
        unsafe {
            assert_eq!(engine.mount(source.as_ptr(), std::ptr::null(), 0), 1);
            assert_eq!(engine.mount(source.as_ptr(), std::ptr::null(), 1), 1);
            let list = engine.search_path();
            assert!(!(*list).is_null());
            assert!((*list.add(1)).is_null());
            engine.free_list(list.cast());
        }
    }
}
