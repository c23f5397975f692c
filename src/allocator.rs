//! # Allocator Strategy
//!
//! The engine can be told to route every allocation it makes through a
//! caller-supplied allocator. Memory the engine hands out (string lists in
//! particular) then belongs to that allocator and must go back through the
//! engine's `free_list`, never through Rust's global allocator.
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`Allocator`] | Strategy trait: `init`, `deinit`, `malloc`, `realloc`, `free` |
//! | [`SystemAllocator`] | The C runtime heap (`malloc`/`realloc`/`free`) |
//! | [`CountingAllocator`] | Wraps another allocator and tracks live blocks |

use std::ffi::c_void;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Allocation strategy installed into the engine before it is initialized.
///
/// # Safety
///
/// Implementations must behave like the C allocation functions: `malloc` and
/// `realloc` return either null or a block of at least `size` bytes suitably
/// aligned for any C type, and `free` accepts every pointer previously returned
/// by `malloc`/`realloc` (and null).
pub unsafe trait Allocator: Send + Sync + 'static {
    /// Called when the engine initializes. Returning `false` aborts the init.
    fn init(&self) -> bool {
        true
    }

    /// Called when the engine deinitializes.
    fn deinit(&self) {}

    /// Allocate `size` bytes.
    fn malloc(&self, size: u64) -> *mut c_void;

    /// Resize a block obtained from this allocator.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a live block from this allocator.
    unsafe fn realloc(&self, ptr: *mut c_void, size: u64) -> *mut c_void;

    /// Release a block obtained from this allocator.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a live block from this allocator, freed only once.
    unsafe fn free(&self, ptr: *mut c_void);
}

/// The C runtime heap.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemAllocator;

unsafe impl Allocator for SystemAllocator {
    fn malloc(&self, size: u64) -> *mut c_void {
        match usize::try_from(size) {
            // SAFETY: plain libc call, any size is accepted.
            Ok(size) => unsafe { libc::malloc(size) },
            Err(_) => std::ptr::null_mut(),
        }
    }

    unsafe fn realloc(&self, ptr: *mut c_void, size: u64) -> *mut c_void {
        match usize::try_from(size) {
            // SAFETY: caller guarantees `ptr` came from this heap.
            Ok(size) => unsafe { libc::realloc(ptr, size) },
            Err(_) => std::ptr::null_mut(),
        }
    }

    unsafe fn free(&self, ptr: *mut c_void) {
        // SAFETY: caller guarantees `ptr` came from this heap and is live.
        unsafe { libc::free(ptr) }
    }
}

/// Wraps another allocator and counts allocations and frees.
///
/// Useful for checking that every list the engine handed out was released
/// exactly once.
///
/// # Example
///
/// ```rust
/// use mountvfs::{Allocator, CountingAllocator, SystemAllocator};
///
/// let alloc = CountingAllocator::new(SystemAllocator);
/// let block = alloc.malloc(16);
/// assert_eq!(alloc.live(), 1);
/// unsafe { alloc.free(block) };
/// assert_eq!(alloc.live(), 0);
/// ```
#[derive(Debug, Default)]
pub struct CountingAllocator<A> {
    inner: A,
    allocations: AtomicUsize,
    frees: AtomicUsize,
}

impl<A: Allocator> CountingAllocator<A> {
    /// Wrap `inner`.
    pub fn new(inner: A) -> Self {
        Self {
            inner,
            allocations: AtomicUsize::new(0),
            frees: AtomicUsize::new(0),
        }
    }

    /// Number of successful `malloc` calls so far.
    pub fn allocations(&self) -> usize {
        self.allocations.load(Ordering::SeqCst)
    }

    /// Number of `free` calls on non-null pointers so far.
    pub fn frees(&self) -> usize {
        self.frees.load(Ordering::SeqCst)
    }

    /// Blocks allocated and not yet freed.
    pub fn live(&self) -> usize {
        self.allocations().saturating_sub(self.frees())
    }
}

unsafe impl<A: Allocator> Allocator for CountingAllocator<A> {
    fn init(&self) -> bool {
        self.inner.init()
    }

    fn deinit(&self) {
        self.inner.deinit()
    }

    fn malloc(&self, size: u64) -> *mut c_void {
        let ptr = self.inner.malloc(size);
        if !ptr.is_null() {
            self.allocations.fetch_add(1, Ordering::SeqCst);
        }
        ptr
    }

    unsafe fn realloc(&self, ptr: *mut c_void, size: u64) -> *mut c_void {
        // SAFETY: forwarded caller contract.
        let new = unsafe { self.inner.realloc(ptr, size) };
        // realloc(null) behaves like malloc.
        if ptr.is_null() && !new.is_null() {
            self.allocations.fetch_add(1, Ordering::SeqCst);
        }
        new
    }

    unsafe fn free(&self, ptr: *mut c_void) {
        if !ptr.is_null() {
            self.frees.fetch_add(1, Ordering::SeqCst);
        }
        // SAFETY: forwarded caller contract.
        unsafe { self.inner.free(ptr) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_allocator_round_trip() {
        let alloc = SystemAllocator;
        let ptr = alloc.malloc(32);
        assert!(!ptr.is_null());
        let ptr = unsafe { alloc.realloc(ptr, 64) };
        assert!(!ptr.is_null());
        unsafe { alloc.free(ptr) };
    }

    #[test]
    fn counting_allocator_tracks_live_blocks() {
        let alloc = CountingAllocator::new(SystemAllocator);
        let a = alloc.malloc(8);
        let b = alloc.malloc(8);
        assert_eq!(alloc.allocations(), 2);
        assert_eq!(alloc.live(), 2);

        unsafe { alloc.free(a) };
        assert_eq!(alloc.live(), 1);
        unsafe { alloc.free(b) };
        assert_eq!(alloc.live(), 0);
        assert_eq!(alloc.frees(), 2);
    }

    #[test]
    fn counting_allocator_ignores_null_free() {
        let alloc = CountingAllocator::new(SystemAllocator);
        unsafe { alloc.free(std::ptr::null_mut()) };
        assert_eq!(alloc.frees(), 0);
    }

    #[test]
    fn realloc_of_null_counts_as_allocation() {
        let alloc = CountingAllocator::new(SystemAllocator);
        let ptr = unsafe { alloc.realloc(std::ptr::null_mut(), 16) };
        assert_eq!(alloc.allocations(), 1);
        unsafe { alloc.free(ptr) };
        assert_eq!(alloc.live(), 0);
    }

    #[test]
    fn allocator_is_object_safe() {
        let boxed: Box<dyn Allocator> = Box::new(SystemAllocator);
        assert!(boxed.init());
        boxed.deinit();
    }
}
