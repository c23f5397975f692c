//! # Streams
//!
//! [`FsStream`] wraps one open engine file. It implements
//! [`Read`], [`Write`] and [`Seek`], so it plugs into anything that takes
//! `std::io` streams; the inherent methods report [`FsError`] directly.
//!
//! A stream closes exactly once: either through [`FsStream::close`], which
//! reports failures, or on drop, which logs them. When the owning
//! [`MountFs`] is released first, the engine has already closed the file and
//! every further operation fails with [`FsError::HandleInvalid`].

use std::io::{self, Read, Seek, SeekFrom, Write};
use std::ptr::NonNull;
use std::sync::Arc;

use crate::context::{Context, EngineGuard};
use crate::engine::{Engine, RawFile};
use crate::marshal::to_cstring;
use crate::{FsError, MountFs, OpenMode};

/// Largest slice handed to the engine in one call.
const MAX_CHUNK: usize = u32::MAX as usize;

/// An open file in the virtual namespace.
///
/// `FsStream` is `Send` but not `Sync`; the `&mut self` receivers serialize
/// use of a single stream.
///
/// # Example
///
/// ```rust
/// use mountvfs::{HostEngine, MountFs};
/// use std::io::{Read, Write};
///
/// let dir = tempfile::tempdir()?;
/// let root = dir.path().to_string_lossy().into_owned();
/// let fs = MountFs::with_engine(HostEngine::new(), None)?;
/// fs.set_write_dir(&root)?;
/// fs.mount(&root, None, true)?;
///
/// let mut out = fs.open_write("note.txt")?;
/// out.write_all(b"hello")?;
/// out.close()?;
///
/// let mut text = String::new();
/// fs.open_read("note.txt")?.read_to_string(&mut text)?;
/// assert_eq!(text, "hello");
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct FsStream<E: Engine> {
    ctx: Arc<Context<E>>,
    file: Option<NonNull<RawFile>>,
    mode: OpenMode,
    path: String,
}

// SAFETY: the file pointer is only used under the engine lock, and the engine
// itself is `Send + Sync`.
unsafe impl<E: Engine> Send for FsStream<E> {}

impl<E: Engine> std::fmt::Debug for FsStream<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsStream")
            .field("path", &self.path)
            .field("mode", &self.mode)
            .field("open", &self.file.is_some())
            .finish()
    }
}

impl<E: Engine> MountFs<E> {
    /// Open `path` for reading from the first source that provides it.
    ///
    /// # Errors
    ///
    /// [`FsError::Io`] if no source provides the file or it cannot be opened.
    pub fn open_read(&self, path: &str) -> Result<FsStream<E>, FsError> {
        self.open(path, OpenMode::Read)
    }

    /// Create or truncate `path` in the write directory.
    pub fn open_write(&self, path: &str) -> Result<FsStream<E>, FsError> {
        self.open(path, OpenMode::Write)
    }

    /// Open `path` in the write directory for appending, creating it if
    /// needed.
    pub fn open_append(&self, path: &str) -> Result<FsStream<E>, FsError> {
        self.open(path, OpenMode::Append)
    }

    fn open(&self, path: &str, mode: OpenMode) -> Result<FsStream<E>, FsError> {
        let path_c = to_cstring(path)?;
        let guard = self.ctx.lock()?;
        let engine = guard.engine();
        // SAFETY: `path_c` outlives the call.
        let raw = unsafe {
            match mode {
                OpenMode::Read => engine.open_read(path_c.as_ptr()),
                OpenMode::Write => engine.open_write(path_c.as_ptr()),
                OpenMode::Append => engine.open_append(path_c.as_ptr()),
            }
        };
        let file = NonNull::new(raw).ok_or_else(|| guard.io_error("open"))?;
        tracing::debug!(path, mode = mode.as_str(), "opened stream");
        Ok(FsStream {
            ctx: Arc::clone(&self.ctx),
            file: Some(file),
            mode,
            path: path.to_owned(),
        })
    }
}

impl<E: Engine> FsStream<E> {
    /// Virtual path the stream was opened with.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// How the stream was opened.
    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    fn handle(&self) -> Result<(EngineGuard<'_, E>, *mut RawFile), FsError> {
        let file = self.file.ok_or(FsError::HandleInvalid)?;
        let guard = self.ctx.lock_stream()?;
        Ok((guard, file.as_ptr()))
    }

    /// Read into `buf`, returning the number of bytes read.
    ///
    /// Zero means end of file (or an empty `buf`).
    pub fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize, FsError> {
        let (guard, file) = self.handle()?;
        let mut total = 0;
        for chunk in buf.chunks_mut(MAX_CHUNK) {
            let len = chunk.len() as u32;
            // SAFETY: `chunk` holds `len` writable bytes; objects are single bytes.
            let n = unsafe { guard.engine().read(file, chunk.as_mut_ptr().cast(), 1, len) };
            if n < 0 {
                return Err(guard.io_error("read"));
            }
            total += n as usize;
            if (n as u64) < u64::from(len) {
                break;
            }
        }
        Ok(total)
    }

    /// Write `buf`, returning the number of bytes the engine accepted.
    pub fn write_bytes(&mut self, buf: &[u8]) -> Result<usize, FsError> {
        let (guard, file) = self.handle()?;
        let mut total = 0;
        for chunk in buf.chunks(MAX_CHUNK) {
            let len = chunk.len() as u32;
            // SAFETY: `chunk` holds `len` readable bytes.
            let n = unsafe { guard.engine().write(file, chunk.as_ptr().cast(), 1, len) };
            if n < 0 {
                return Err(guard.io_error("write"));
            }
            total += n as usize;
            if (n as u64) < u64::from(len) {
                break;
            }
        }
        Ok(total)
    }

    /// Move to absolute byte `offset`.
    ///
    /// # Errors
    ///
    /// [`FsError::Io`] if the engine rejects the offset (past the end of a
    /// read stream, for example).
    pub fn seek_to(&mut self, offset: u64) -> Result<(), FsError> {
        let (guard, file) = self.handle()?;
        // SAFETY: `file` is live while the guard is held.
        let status = unsafe { guard.engine().seek(file, offset) };
        if status == 0 {
            return Err(guard.io_error("seek"));
        }
        Ok(())
    }

    /// Total length of the file in bytes.
    pub fn length(&self) -> Result<u64, FsError> {
        let (guard, file) = self.handle()?;
        // SAFETY: `file` is live while the guard is held.
        let len = unsafe { guard.engine().file_length(file) };
        u64::try_from(len).map_err(|_| guard.io_error("length"))
    }

    /// Current byte offset.
    pub fn position(&self) -> Result<u64, FsError> {
        let (guard, file) = self.handle()?;
        // SAFETY: `file` is live while the guard is held.
        let pos = unsafe { guard.engine().tell(file) };
        u64::try_from(pos).map_err(|_| guard.io_error("tell"))
    }

    /// Whether every byte has been consumed.
    ///
    /// This is the engine's end-of-file flag; it does not require a read that
    /// returned zero bytes first. Write streams never report end of file.
    pub fn at_end(&self) -> Result<bool, FsError> {
        let (guard, file) = self.handle()?;
        // SAFETY: `file` is live while the guard is held.
        Ok(unsafe { guard.engine().eof(file) } != 0)
    }

    /// Flush the engine-side buffer.
    pub fn flush_buffer(&mut self) -> Result<(), FsError> {
        let (guard, file) = self.handle()?;
        // SAFETY: `file` is live while the guard is held.
        if unsafe { guard.engine().flush(file) } == 0 {
            return Err(guard.io_error("flush"));
        }
        Ok(())
    }

    /// Give the engine a buffer of `size` bytes for this stream; 0 disables it.
    pub fn set_buffer(&mut self, size: u64) -> Result<(), FsError> {
        let (guard, file) = self.handle()?;
        // SAFETY: `file` is live while the guard is held.
        if unsafe { guard.engine().set_buffer(file, size) } == 0 {
            return Err(guard.io_error("set_buffer"));
        }
        Ok(())
    }

    /// Close the stream.
    ///
    /// The stream is gone afterwards whatever the outcome.
    ///
    /// # Errors
    ///
    /// - [`FsError::HandleInvalid`] if the engine was released first
    /// - [`FsError::Io`] if the engine failed to close (buffered data may be
    ///   lost)
    pub fn close(mut self) -> Result<(), FsError> {
        self.close_inner()
    }

    fn close_inner(&mut self) -> Result<(), FsError> {
        let file = self.file.take().ok_or(FsError::HandleInvalid)?;
        let guard = self.ctx.lock_stream()?;
        // SAFETY: `file` is live and is never used again.
        if unsafe { guard.engine().close(file.as_ptr()) } == 0 {
            return Err(guard.io_error("close"));
        }
        tracing::debug!(path = %self.path, "closed stream");
        Ok(())
    }
}

impl<E: Engine> Drop for FsStream<E> {
    fn drop(&mut self) {
        if self.file.is_none() {
            return;
        }
        match self.close_inner() {
            // The engine already closed it when it was released.
            Ok(()) | Err(FsError::HandleInvalid) => {}
            Err(error) => {
                tracing::warn!(path = %self.path, %error, "failed to close stream on drop")
            }
        }
    }
}

impl<E: Engine> Read for FsStream<E> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.read_bytes(buf)?)
    }
}

impl<E: Engine> Write for FsStream<E> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(self.write_bytes(buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(self.flush_buffer()?)
    }
}

impl<E: Engine> Seek for FsStream<E> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::Current(delta) => self.position()?.checked_add_signed(delta),
            SeekFrom::End(delta) => self.length()?.checked_add_signed(delta),
        };
        let target = target.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek to a negative or overflowing offset")
        })?;
        self.seek_to(target)?;
        Ok(target)
    }
}
