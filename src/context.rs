//! Shared engine state: the engine itself, its call lock and its liveness.

use std::ffi::c_int;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, MutexGuard};

use crate::engine::Engine;
use crate::error::GENERIC_FAILURE;
use crate::marshal::copy_str;
use crate::FsError;

/// Take the engine's last-error message. Null or empty reads as the generic
/// failure text.
pub(crate) fn failure_message<E: Engine>(engine: &E) -> String {
    copy_str(engine.last_error())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| GENERIC_FAILURE.to_owned())
}

/// One live engine instance, shared by a [`MountFs`](crate::MountFs) and
/// every stream it opened.
pub(crate) struct Context<E: Engine> {
    engine: E,
    lock: Mutex<()>,
    live: AtomicBool,
}

/// Exclusive access to the engine for one "call + error query" sequence.
pub(crate) struct EngineGuard<'a, E: Engine> {
    engine: &'a E,
    _lock: MutexGuard<'a, ()>,
}

impl<E: Engine> Context<E> {
    /// Wrap an engine that was just initialized.
    pub(crate) fn new(engine: E) -> Self {
        Self {
            engine,
            lock: Mutex::new(()),
            live: AtomicBool::new(true),
        }
    }

    pub(crate) fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    /// Engine access that does not need the lock (pure queries).
    pub(crate) fn engine(&self) -> &E {
        &self.engine
    }

    fn guard(&self, dead: FsError) -> Result<EngineGuard<'_, E>, FsError> {
        let lock = self.lock.lock();
        // Checked under the lock so a concurrent release cannot slip in between.
        if !self.is_live() {
            return Err(dead);
        }
        Ok(EngineGuard {
            engine: &self.engine,
            _lock: lock,
        })
    }

    /// Lock for an engine-level operation.
    ///
    /// # Errors
    ///
    /// [`FsError::NotInitialized`] once the engine has been released.
    pub(crate) fn lock(&self) -> Result<EngineGuard<'_, E>, FsError> {
        self.guard(FsError::NotInitialized)
    }

    /// Lock for a stream operation.
    ///
    /// # Errors
    ///
    /// [`FsError::HandleInvalid`] once the engine has been released.
    pub(crate) fn lock_stream(&self) -> Result<EngineGuard<'_, E>, FsError> {
        self.guard(FsError::HandleInvalid)
    }

    /// Deinitialize the engine. Every open file dies with it.
    pub(crate) fn release(&self) -> Result<(), FsError> {
        let guard = self.lock()?;
        if guard.engine.deinit() == 0 {
            return Err(guard.engine_error("deinit"));
        }
        self.live.store(false, Ordering::Release);
        tracing::debug!("engine released");
        Ok(())
    }
}

impl<E: Engine> EngineGuard<'_, E> {
    pub(crate) fn engine(&self) -> &E {
        self.engine
    }

    /// Message for the failure the engine just reported.
    ///
    /// Must be called right after the failing call, before any other engine
    /// call, while the guard is held.
    pub(crate) fn failure(&self) -> String {
        failure_message(self.engine)
    }

    pub(crate) fn engine_error(&self, operation: &'static str) -> FsError {
        FsError::Engine {
            operation,
            message: self.failure(),
        }
    }

    pub(crate) fn io_error(&self, operation: &'static str) -> FsError {
        FsError::Io {
            operation,
            message: self.failure(),
        }
    }

    /// Map a status return: nonzero is success.
    pub(crate) fn check(&self, status: c_int, operation: &'static str) -> Result<(), FsError> {
        if status != 0 {
            Ok(())
        } else {
            Err(self.engine_error(operation))
        }
    }

    /// Discard whatever the last failure left behind.
    pub(crate) fn clear_error(&self) {
        let _ = self.engine.last_error();
    }
}
