//! Integration tests exercising the public API end to end.
//!
//! These tests verify that:
//! 1. Search order follows prepend/append semantics
//! 2. Streams round-trip data and report end of file correctly
//! 3. Enumeration matches the host directories it merges
//! 4. Releasing the engine invalidates the handle and its streams
//! 5. Custom allocators see every list freed exactly once
//! 6. Engine failures reach callers as structured errors

use mountvfs::engine::{EnumFilesCallback, RawArchiveInfo, RawFile, RawVersion, StringCallback};
use mountvfs::*;
use std::collections::BTreeSet;
use std::ffi::{c_char, c_int, c_void};
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

const GREETING: &str = "hello, world! èòàùã こんにちは世界 你好世界";

fn source(dir: &tempfile::TempDir) -> String {
    dir.path().to_string_lossy().into_owned()
}

fn host_fs() -> MountFs<HostEngine> {
    MountFs::with_engine(HostEngine::new(), Some("integration")).unwrap()
}

/// Handle with one scratch directory used as both write dir and root mount.
fn scratch_fs() -> (MountFs<HostEngine>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let fs = host_fs();
    fs.set_write_dir(&source(&dir)).unwrap();
    fs.mount(&source(&dir), None, true).unwrap();
    (fs, dir)
}

// =============================================================================
// Fault-Injecting Engine
// =============================================================================

/// Delegates to a [`HostEngine`] but can be told to misbehave.
#[derive(Clone, Default)]
struct FaultyEngine {
    inner: HostEngine,
    silent_mount_failure: Arc<AtomicBool>,
    refuse_init: Arc<AtomicBool>,
    refuse_allocator: Arc<AtomicBool>,
    unknown_length: Arc<AtomicBool>,
    /// Makes list queries overwrite the last-error slot before answering.
    noisy_search_path: Arc<AtomicBool>,
}

unsafe impl Engine for FaultyEngine {
    fn linked_version(&self) -> RawVersion {
        self.inner.linked_version()
    }

    unsafe fn init(&self, argv0: *const c_char) -> c_int {
        if self.refuse_init.load(Ordering::SeqCst) {
            return 0;
        }
        unsafe { self.inner.init(argv0) }
    }

    fn deinit(&self) -> c_int {
        self.inner.deinit()
    }

    fn is_init(&self) -> c_int {
        self.inner.is_init()
    }

    fn set_allocator(&self, allocator: Option<Arc<dyn Allocator>>) -> c_int {
        if self.refuse_allocator.load(Ordering::SeqCst) {
            return 0;
        }
        self.inner.set_allocator(allocator)
    }

    fn last_error(&self) -> *const c_char {
        self.inner.last_error()
    }

    fn dir_separator(&self) -> *const c_char {
        self.inner.dir_separator()
    }

    fn permit_symbolic_links(&self, permit: c_int) {
        self.inner.permit_symbolic_links(permit)
    }

    fn symbolic_links_permitted(&self) -> c_int {
        self.inner.symbolic_links_permitted()
    }

    fn supported_archive_types(&self) -> *const *const RawArchiveInfo {
        self.inner.supported_archive_types()
    }

    unsafe fn free_list(&self, list: *mut c_void) {
        unsafe { self.inner.free_list(list) }
    }

    fn cd_rom_dirs(&self) -> *mut *mut c_char {
        self.inner.cd_rom_dirs()
    }

    unsafe fn cd_rom_dirs_callback(&self, callback: StringCallback, data: *mut c_void) {
        unsafe { self.inner.cd_rom_dirs_callback(callback, data) }
    }

    fn base_dir(&self) -> *const c_char {
        self.inner.base_dir()
    }

    fn user_dir(&self) -> *const c_char {
        self.inner.user_dir()
    }

    fn write_dir(&self) -> *const c_char {
        self.inner.write_dir()
    }

    unsafe fn set_write_dir(&self, dir: *const c_char) -> c_int {
        unsafe { self.inner.set_write_dir(dir) }
    }

    unsafe fn set_sane_config(
        &self,
        organization: *const c_char,
        app_name: *const c_char,
        archive_ext: *const c_char,
        include_cd_roms: c_int,
        archives_first: c_int,
    ) -> c_int {
        unsafe {
            self.inner.set_sane_config(
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
        if self.silent_mount_failure.load(Ordering::SeqCst) {
            return 0;
        }
        unsafe { self.inner.mount(source, mount_point, append) }
    }

    unsafe fn unmount(&self, source: *const c_char) -> c_int {
        unsafe { self.inner.unmount(source) }
    }

    fn search_path(&self) -> *mut *mut c_char {
        if self.noisy_search_path.load(Ordering::SeqCst) {
            // SAFETY: literal C string.
            unsafe { self.inner.unmount(c"/never/mounted".as_ptr()) };
        }
        self.inner.search_path()
    }

    unsafe fn search_path_callback(&self, callback: StringCallback, data: *mut c_void) {
        unsafe { self.inner.search_path_callback(callback, data) }
    }

    unsafe fn mount_point(&self, source: *const c_char) -> *const c_char {
        unsafe { self.inner.mount_point(source) }
    }

    unsafe fn mkdir(&self, dir: *const c_char) -> c_int {
        unsafe { self.inner.mkdir(dir) }
    }

    unsafe fn delete(&self, path: *const c_char) -> c_int {
        unsafe { self.inner.delete(path) }
    }

    unsafe fn real_dir(&self, path: *const c_char) -> *const c_char {
        unsafe { self.inner.real_dir(path) }
    }

    unsafe fn enumerate_files(&self, dir: *const c_char) -> *mut *mut c_char {
        unsafe { self.inner.enumerate_files(dir) }
    }

    unsafe fn enumerate_files_callback(
        &self,
        dir: *const c_char,
        callback: EnumFilesCallback,
        data: *mut c_void,
    ) {
        unsafe { self.inner.enumerate_files_callback(dir, callback, data) }
    }

    unsafe fn exists(&self, path: *const c_char) -> c_int {
        unsafe { self.inner.exists(path) }
    }

    unsafe fn is_directory(&self, path: *const c_char) -> c_int {
        unsafe { self.inner.is_directory(path) }
    }

    unsafe fn is_symbolic_link(&self, path: *const c_char) -> c_int {
        unsafe { self.inner.is_symbolic_link(path) }
    }

    unsafe fn last_mod_time(&self, path: *const c_char) -> i64 {
        unsafe { self.inner.last_mod_time(path) }
    }

    unsafe fn open_read(&self, path: *const c_char) -> *mut RawFile {
        unsafe { self.inner.open_read(path) }
    }

    unsafe fn open_write(&self, path: *const c_char) -> *mut RawFile {
        unsafe { self.inner.open_write(path) }
    }

    unsafe fn open_append(&self, path: *const c_char) -> *mut RawFile {
        unsafe { self.inner.open_append(path) }
    }

    unsafe fn close(&self, file: *mut RawFile) -> c_int {
        unsafe { self.inner.close(file) }
    }

    unsafe fn read(&self, file: *mut RawFile, buffer: *mut c_void, size: u32, count: u32) -> i64 {
        unsafe { self.inner.read(file, buffer, size, count) }
    }

    unsafe fn write(
        &self,
        file: *mut RawFile,
        buffer: *const c_void,
        size: u32,
        count: u32,
    ) -> i64 {
        unsafe { self.inner.write(file, buffer, size, count) }
    }

    unsafe fn eof(&self, file: *mut RawFile) -> c_int {
        unsafe { self.inner.eof(file) }
    }

    unsafe fn tell(&self, file: *mut RawFile) -> i64 {
        unsafe { self.inner.tell(file) }
    }

    unsafe fn seek(&self, file: *mut RawFile, position: u64) -> c_int {
        unsafe { self.inner.seek(file, position) }
    }

    unsafe fn file_length(&self, file: *mut RawFile) -> i64 {
        if self.unknown_length.load(Ordering::SeqCst) {
            return -1;
        }
        unsafe { self.inner.file_length(file) }
    }

    unsafe fn set_buffer(&self, file: *mut RawFile, size: u64) -> c_int {
        unsafe { self.inner.set_buffer(file, size) }
    }

    unsafe fn flush(&self, file: *mut RawFile) -> c_int {
        unsafe { self.inner.flush(file) }
    }
}

// =============================================================================
// Tests: Search Order
// =============================================================================

#[test]
fn single_mount_is_whole_search_path() {
    let a = tempfile::tempdir().unwrap();
    let fs = host_fs();
    fs.mount(&source(&a), None, false).unwrap();
    assert_eq!(fs.search_path().unwrap(), vec![source(&a)]);
}

#[test]
fn prepend_then_append_order() {
    let (a, b, c) = (
        tempfile::tempdir().unwrap(),
        tempfile::tempdir().unwrap(),
        tempfile::tempdir().unwrap(),
    );
    let fs = host_fs();
    fs.mount(&source(&a), None, false).unwrap();
    fs.mount(&source(&b), None, true).unwrap();
    fs.mount(&source(&c), None, false).unwrap();
    assert_eq!(
        fs.search_path().unwrap(),
        vec![source(&c), source(&a), source(&b)]
    );
}

#[test]
fn first_source_in_search_order_wins() {
    let (low, high) = (tempfile::tempdir().unwrap(), tempfile::tempdir().unwrap());
    std::fs::write(low.path().join("level.dat"), b"low").unwrap();
    std::fs::write(high.path().join("level.dat"), b"high").unwrap();

    let fs = host_fs();
    fs.mount(&source(&low), None, true).unwrap();
    fs.mount(&source(&high), None, false).unwrap();
    assert_eq!(fs.read_to_string("level.dat").unwrap(), "high");

    fs.unmount(&source(&high)).unwrap();
    assert_eq!(fs.read_to_string("level.dat").unwrap(), "low");
}

#[test]
fn unmount_removes_exactly_one_source() {
    let (a, b) = (tempfile::tempdir().unwrap(), tempfile::tempdir().unwrap());
    let fs = host_fs();
    fs.mount(&source(&a), None, true).unwrap();
    fs.mount(&source(&b), None, true).unwrap();

    fs.unmount(&source(&a)).unwrap();
    assert_eq!(fs.search_path().unwrap(), vec![source(&b)]);

    let err = fs.unmount(&source(&a)).unwrap_err();
    assert!(matches!(err, FsError::NotMounted { ref source_path } if *source_path == source(&a)));
}

#[test]
fn mount_point_contains_requested_directory() {
    let dir = tempfile::tempdir().unwrap();
    let fs = host_fs();
    fs.mount(&source(&dir), Some("/foo"), true).unwrap();
    let point = fs.mount_point(&source(&dir)).unwrap();
    assert!(point.ends_with('/'));
    assert!(point.contains("foo"));

    let mounts = fs.mounts().unwrap();
    assert_eq!(mounts, vec![MountEntry {
        source: source(&dir),
        mount_point: point,
    }]);
}

// =============================================================================
// Tests: Streams
// =============================================================================

#[test]
fn file_write_read_append_delete() {
    let (fs, dir) = scratch_fs();

    let mut out = fs.open_write("greeting.txt").unwrap();
    out.write_all(GREETING.as_bytes()).unwrap();
    out.close().unwrap();
    assert!(dir.path().join("greeting.txt").is_file());

    let mut input = fs.open_read("greeting.txt").unwrap();
    let mut text = String::new();
    input.read_to_string(&mut text).unwrap();
    assert_eq!(text, GREETING);
    input.close().unwrap();

    let mut out = fs.open_append("greeting.txt").unwrap();
    out.write_all(GREETING.as_bytes()).unwrap();
    out.close().unwrap();
    assert_eq!(fs.read_to_string("greeting.txt").unwrap(), GREETING.repeat(2));

    fs.delete("greeting.txt").unwrap();
    assert!(!fs.exists("greeting.txt").unwrap());
}

#[test]
fn at_end_only_after_last_byte() {
    let (fs, _dir) = scratch_fs();
    fs.write_all("payload.bin", GREETING.as_bytes()).unwrap();
    let total = GREETING.len();

    for size in [1usize, 2, 7, total - 1, total, total + 1, 4096] {
        let mut input = fs.open_read("payload.bin").unwrap();
        assert!(!input.at_end().unwrap(), "fresh stream, buffer {size}");
        let mut buf = vec![0u8; size];
        let mut seen = 0;
        loop {
            let n = input.read_bytes(&mut buf).unwrap();
            seen += n;
            if seen < total {
                assert!(!input.at_end().unwrap(), "after {seen} bytes, buffer {size}");
            } else {
                break;
            }
        }
        assert_eq!(seen, total);
        assert!(input.at_end().unwrap());
    }
}

#[test]
fn seek_and_position_agree() {
    let (fs, _dir) = scratch_fs();
    fs.write_all("digits.txt", b"0123456789").unwrap();
    let mut input = fs.open_read("digits.txt").unwrap();

    input.seek(SeekFrom::End(-3)).unwrap();
    assert_eq!(input.position().unwrap(), 7);
    let mut rest = String::new();
    input.read_to_string(&mut rest).unwrap();
    assert_eq!(rest, "789");

    input.rewind().unwrap();
    assert!(!input.at_end().unwrap());
    assert_eq!(input.length().unwrap(), 10);
}

#[test]
fn write_outside_write_dir_is_rejected() {
    let (fs, _dir) = scratch_fs();
    let err = fs.open_write("../escape.txt").unwrap_err();
    assert!(matches!(err, FsError::Io { operation: "open", .. }));

    fs.clear_write_dir().unwrap();
    let err = fs.open_write("inside.txt").unwrap_err();
    assert_eq!(err.to_string(), "open failed: write directory is not set");
}

#[test]
fn io_error_keeps_structured_source() {
    let (fs, _dir) = scratch_fs();
    fs.write_all("short.txt", b"abc").unwrap();
    let mut input = fs.open_read("short.txt").unwrap();
    let err = input.seek(SeekFrom::Start(100)).unwrap_err();
    let inner = err.get_ref().and_then(|e| e.downcast_ref::<FsError>()).unwrap();
    assert!(matches!(inner, FsError::Io { operation: "seek", .. }));
}

// =============================================================================
// Tests: Enumeration
// =============================================================================

#[test]
fn enumeration_matches_host_listing() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["a.txt", "b.bin", "c"] {
        std::fs::write(dir.path().join(name), name).unwrap();
    }
    std::fs::create_dir(dir.path().join("nested")).unwrap();
    std::fs::write(dir.path().join("nested").join("deep.txt"), b"x").unwrap();

    let fs = host_fs();
    fs.mount(&source(&dir), Some("/"), false).unwrap();

    let expected: BTreeSet<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    let listed = fs.enumerate_files("/").unwrap();
    let unique: BTreeSet<String> = listed.iter().cloned().collect();

    assert_eq!(unique, expected);
    assert_eq!(unique.len(), listed.len(), "no duplicates");
    assert!(listed.iter().all(|n| !n.contains('/') && !n.contains('\\')));
    assert_eq!(fs.enumerate_files("nested").unwrap(), vec!["deep.txt"]);
}

#[test]
fn list_and_callback_enumeration_agree() {
    let (a, b) = (tempfile::tempdir().unwrap(), tempfile::tempdir().unwrap());
    std::fs::write(a.path().join("shared"), b"a").unwrap();
    std::fs::write(b.path().join("shared"), b"b").unwrap();
    std::fs::write(b.path().join("extra"), b"b").unwrap();

    let fs = host_fs();
    fs.mount(&source(&a), None, true).unwrap();
    fs.mount(&source(&b), None, true).unwrap();

    let listed: BTreeSet<String> = fs.enumerate_files("/").unwrap().into_iter().collect();
    let mut visited = BTreeSet::new();
    fs.visit_files("/", |_, name| {
        visited.insert(name.to_owned());
    })
    .unwrap();
    assert_eq!(listed, visited);

    let mut sources = Vec::new();
    fs.visit_search_path(|s| sources.push(s.to_owned())).unwrap();
    assert_eq!(sources, fs.search_path().unwrap());
}

#[cfg(unix)]
#[test]
fn symlinks_hidden_until_permitted() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("real.txt"), b"target").unwrap();
    std::os::unix::fs::symlink(dir.path().join("real.txt"), dir.path().join("link.txt")).unwrap();

    let fs = host_fs();
    fs.mount(&source(&dir), None, true).unwrap();

    assert!(!fs.symbolic_links_permitted().unwrap());
    assert_eq!(fs.enumerate_files("/").unwrap(), vec!["real.txt"]);
    assert!(fs.open_read("link.txt").is_err());
    assert!(fs.is_symbolic_link("link.txt").unwrap());

    fs.permit_symbolic_links(true).unwrap();
    fs.permit_symbolic_links(true).unwrap();
    assert!(fs.symbolic_links_permitted().unwrap());
    assert_eq!(fs.enumerate_files("/").unwrap(), vec!["link.txt", "real.txt"]);
    assert_eq!(fs.read_to_string("link.txt").unwrap(), "target");
}

// =============================================================================
// Tests: Lifecycle
// =============================================================================

#[test]
fn release_invalidates_handle_and_streams() {
    let (fs, dir) = scratch_fs();
    fs.write_all("kept.txt", b"data").unwrap();
    let mut input = fs.open_read("kept.txt").unwrap();
    let mut output = fs.open_write("other.txt").unwrap();

    fs.deinit().unwrap();

    let err = fs.mount(&source(&dir), None, true).unwrap_err();
    assert!(matches!(err, FsError::NotInitialized));
    assert!(matches!(fs.enumerate_files("/"), Err(FsError::NotInitialized)));
    assert!(matches!(fs.open_read("kept.txt"), Err(FsError::NotInitialized)));

    let mut buf = [0u8; 4];
    assert!(matches!(input.read_bytes(&mut buf), Err(FsError::HandleInvalid)));
    assert!(matches!(input.at_end(), Err(FsError::HandleInvalid)));
    assert!(matches!(output.write_bytes(b"x"), Err(FsError::HandleInvalid)));
    let io_err = output.write(b"x").unwrap_err();
    assert_eq!(io_err.kind(), std::io::ErrorKind::BrokenPipe);

    assert!(matches!(fs.deinit(), Err(FsError::NotInitialized)));
}

#[test]
fn engine_can_only_be_live_once() {
    let engine = HostEngine::new();
    let fs = MountFs::with_engine(engine.clone(), None).unwrap();
    assert!(matches!(
        MountFs::with_engine(engine.clone(), None),
        Err(FsError::AlreadyInitialized)
    ));

    fs.deinit().unwrap();
    let again = MountFs::with_engine(engine, None).unwrap();
    assert!(again.is_init());
    assert_eq!(again.linked_version(), Version {
        major: 3,
        minor: 0,
        patch: 2,
    });
}

#[test]
fn handle_is_shareable_across_threads() {
    let dir = tempfile::tempdir().unwrap();
    let fs = Arc::new(host_fs());
    let root = source(&dir);

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let fs = Arc::clone(&fs);
            let root = root.clone();
            std::thread::spawn(move || {
                for _ in 0..25 {
                    if i % 2 == 0 {
                        let _ = fs.mount(&root, None, true);
                        let _ = fs.unmount(&root);
                    } else {
                        let path = fs.search_path().unwrap();
                        assert!(path.is_empty() || path == vec![root.clone()]);
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
}

// =============================================================================
// Tests: Allocator Strategy
// =============================================================================

#[test]
fn custom_allocator_balances() {
    let alloc = Arc::new(CountingAllocator::new(SystemAllocator));
    let (a, b) = (tempfile::tempdir().unwrap(), tempfile::tempdir().unwrap());
    std::fs::write(a.path().join("one"), b"1").unwrap();

    let fs = MountFsBuilder::new(HostEngine::new())
        .allocator(alloc.clone())
        .mount(MountSpec::new(source(&a)))
        .mount(MountSpec::new(source(&b)).at("b"))
        .build()
        .unwrap();

    for _ in 0..3 {
        fs.search_path().unwrap();
        fs.enumerate_files("/").unwrap();
        fs.mounts().unwrap();
        fs.cd_rom_dirs().unwrap();
    }
    let _ = fs.unmount("/not/mounted");

    assert!(alloc.allocations() > 0);
    assert_eq!(alloc.allocations(), alloc.frees());
    fs.deinit().unwrap();
    assert_eq!(alloc.live(), 0);
}

// =============================================================================
// Tests: Error Translation
// =============================================================================

#[test]
fn failure_without_message_is_generic() {
    let dir = tempfile::tempdir().unwrap();
    let engine = FaultyEngine::default();
    let fs = MountFs::with_engine(engine.clone(), None).unwrap();

    engine.silent_mount_failure.store(true, Ordering::SeqCst);
    let err = fs.mount(&source(&dir), None, true).unwrap_err();
    assert_eq!(
        err.to_string(),
        format!("mount failed for {}: operation failed", source(&dir))
    );

    engine.silent_mount_failure.store(false, Ordering::SeqCst);
    fs.mount(&source(&dir), None, true).unwrap();
}

#[test]
fn refused_init_is_engine_unavailable() {
    let engine = FaultyEngine::default();
    engine.refuse_init.store(true, Ordering::SeqCst);
    let err = MountFs::with_engine(engine.clone(), None).unwrap_err();
    assert!(matches!(err, FsError::EngineUnavailable { .. }));
    assert_eq!(engine.is_init(), 0);
}

#[test]
fn allocator_refusal_without_message_is_generic() {
    let engine = FaultyEngine::default();
    engine.refuse_allocator.store(true, Ordering::SeqCst);
    let err = MountFs::with_engine(engine, None).unwrap_err();
    assert!(matches!(
        err,
        FsError::Engine { operation: "set_allocator", ref message } if message == "operation failed"
    ));
    assert_eq!(err.to_string(), "set_allocator failed: operation failed");
}

#[test]
fn unmount_reports_message_of_the_failed_call() {
    let dir = tempfile::tempdir().unwrap();
    let engine = FaultyEngine::default();
    let fs = MountFs::with_engine(engine.clone(), None).unwrap();
    fs.set_write_dir(&source(&dir)).unwrap();
    fs.mount(&source(&dir), None, true).unwrap();
    fs.write_all("held.txt", b"busy").unwrap();
    let held = fs.open_read("held.txt").unwrap();

    engine.noisy_search_path.store(true, Ordering::SeqCst);
    let err = fs.unmount(&source(&dir)).unwrap_err();
    assert!(matches!(
        err,
        FsError::Engine { operation: "unmount", ref message } if message == "files still open"
    ));

    engine.noisy_search_path.store(false, Ordering::SeqCst);
    held.close().unwrap();
    fs.unmount(&source(&dir)).unwrap();
}

#[test]
fn whole_file_read_without_known_length() {
    let dir = tempfile::tempdir().unwrap();
    let engine = FaultyEngine::default();
    let fs = MountFs::with_engine(engine.clone(), None).unwrap();
    fs.set_write_dir(&source(&dir)).unwrap();
    fs.mount(&source(&dir), None, true).unwrap();
    fs.write_all("data.txt", b"payload").unwrap();

    engine.unknown_length.store(true, Ordering::SeqCst);
    let stream = fs.open_read("data.txt").unwrap();
    assert!(matches!(stream.length(), Err(FsError::Io { operation: "length", .. })));
    drop(stream);
    assert_eq!(fs.read_all("data.txt").unwrap(), b"payload");
    assert_eq!(fs.read_to_string("data.txt").unwrap(), "payload");
}

#[test]
fn builder_rolls_back_on_failed_mount() {
    let engine = FaultyEngine::default();
    engine.silent_mount_failure.store(true, Ordering::SeqCst);
    let dir = tempfile::tempdir().unwrap();

    let err = MountFsBuilder::new(engine.clone())
        .write_dir(source(&dir))
        .mount(MountSpec::new(source(&dir)))
        .build()
        .unwrap_err();
    assert!(matches!(err, FsError::MountFailed { .. }));
    assert_eq!(engine.is_init(), 0, "engine must not stay live");
}

#[test]
fn invalid_text_is_rejected_before_the_engine() {
    let fs = host_fs();
    assert!(matches!(fs.mount("a\0b", None, true), Err(FsError::InvalidPath { .. })));
    assert!(matches!(fs.exists("x\0"), Err(FsError::InvalidPath { .. })));
}

// =============================================================================
// Tests: Native Engine
// =============================================================================

/// Runs against the real library only where it is installed.
#[test]
fn native_engine_round_trip_when_available() {
    let engine = match PhysfsEngine::load() {
        Ok(engine) => engine,
        Err(FsError::EngineUnavailable { .. }) => return,
        Err(other) => panic!("unexpected error: {other}"),
    };
    let (dir, extra) = (tempfile::tempdir().unwrap(), tempfile::tempdir().unwrap());
    let fs = MountFs::with_engine(engine, None).unwrap();
    assert!(fs.linked_version().major >= 2);

    fs.mount(&source(&dir), None, false).unwrap();
    fs.mount(&source(&extra), None, false).unwrap();
    assert_eq!(fs.search_path().unwrap(), vec![source(&extra), source(&dir)]);

    fs.set_write_dir(&source(&dir)).unwrap();
    fs.write_all("native.txt", GREETING.as_bytes()).unwrap();
    assert_eq!(fs.read_to_string("native.txt").unwrap(), GREETING);
    assert!(matches!(fs.unmount("/never/mounted"), Err(FsError::NotMounted { .. })));
    fs.deinit().unwrap();
}
