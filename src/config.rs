//! # Configuration
//!
//! [`MountFsConfig`] describes a complete setup: symlink policy, write
//! directory, mounts and an optional conventional layout. [`MountFsBuilder`]
//! turns it into a live [`MountFs`].
//!
//! Setup steps run in this order:
//!
//! | Step | Source |
//! |------|--------|
//! | 1 | allocator (builder only) |
//! | 2 | engine init with `argv0` |
//! | 3 | `permit_symlinks` |
//! | 4 | `sane` layout |
//! | 5 | `write_dir` (overrides the one chosen by `sane`) |
//! | 6 | `mounts`, in order |
//!
//! If any step after init fails, the engine is released again before the
//! error is returned.
//!
//! ## Serde (Feature-Gated)
//!
//! With the `serde` feature every config type is `Serialize + Deserialize`
//! and [`MountFsConfig::from_json`] is available.

use std::sync::Arc;

use crate::engine::Engine;
use crate::{Allocator, FsError, MountFs};

/// One entry of [`MountFsConfig::mounts`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MountSpec {
    /// Host directory or archive.
    pub source: String,
    /// Where it appears; `None` is the root.
    #[cfg_attr(feature = "serde", serde(default))]
    pub mount_point: Option<String>,
    /// Search after (`true`) or before (`false`) earlier mounts.
    #[cfg_attr(feature = "serde", serde(default = "default_append"))]
    pub append: bool,
}

#[cfg(feature = "serde")]
fn default_append() -> bool {
    true
}

impl MountSpec {
    /// Mount `source` at the root, after earlier mounts.
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            mount_point: None,
            append: true,
        }
    }

    /// Mount at `mount_point` instead of the root.
    pub fn at(mut self, mount_point: impl Into<String>) -> Self {
        self.mount_point = Some(mount_point.into());
        self
    }

    /// Search this source before everything mounted earlier.
    pub fn prepend(mut self) -> Self {
        self.append = false;
        self
    }
}

/// Arguments of [`MountFs::set_sane_config`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SaneConfig {
    /// Organization name, part of the per-user write directory.
    pub organization: String,
    /// Application name, part of the per-user write directory.
    pub app_name: String,
    /// Extension (without dot) of archives to mount automatically.
    #[cfg_attr(feature = "serde", serde(default))]
    pub archive_ext: Option<String>,
    /// Also mount CD-ROM drives.
    #[cfg_attr(feature = "serde", serde(default))]
    pub include_cd_roms: bool,
    /// Put automatically mounted archives ahead of directories.
    #[cfg_attr(feature = "serde", serde(default))]
    pub archives_first: bool,
}

/// Complete setup for a [`MountFs`].
///
/// # Example
///
/// ```rust
/// use mountvfs::{HostEngine, MountFsBuilder, MountFsConfig, MountSpec};
///
/// let dir = std::env::temp_dir().to_string_lossy().into_owned();
/// let config = MountFsConfig {
///     mounts: vec![MountSpec::new(dir.clone()).at("tmp")],
///     ..MountFsConfig::default()
/// };
/// let fs = MountFsBuilder::new(HostEngine::new()).config(config).build()?;
/// assert_eq!(fs.mount_point(&dir)?, "tmp/");
/// # Ok::<(), mountvfs::FsError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MountFsConfig {
    /// Program path handed to the engine's init.
    pub argv0: Option<String>,
    /// Follow symbolic links.
    pub permit_symlinks: bool,
    /// Write directory.
    pub write_dir: Option<String>,
    /// Sources to mount, in order.
    pub mounts: Vec<MountSpec>,
    /// Conventional per-application layout.
    pub sane: Option<SaneConfig>,
}

impl MountFsConfig {
    /// Parse a config from JSON.
    ///
    /// Missing fields take their defaults.
    ///
    /// # Example
    ///
    /// ```rust
    /// use mountvfs::MountFsConfig;
    ///
    /// let config = MountFsConfig::from_json(r#"{
    ///     "permit_symlinks": true,
    ///     "mounts": [{ "source": "/srv/assets", "mount_point": "assets" }]
    /// }"#)?;
    /// assert!(config.mounts[0].append);
    /// # Ok::<(), serde_json::Error>(())
    /// ```
    #[cfg(feature = "serde")]
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Builds a live [`MountFs`] from an engine and a [`MountFsConfig`].
pub struct MountFsBuilder<E: Engine> {
    engine: E,
    argv0: Option<String>,
    allocator: Option<Arc<dyn Allocator>>,
    config: MountFsConfig,
}

impl<E: Engine> std::fmt::Debug for MountFsBuilder<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountFsBuilder")
            .field("argv0", &self.argv0)
            .field("custom_allocator", &self.allocator.is_some())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<E: Engine> MountFsBuilder<E> {
    /// Start from `engine` with an empty config.
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            argv0: None,
            allocator: None,
            config: MountFsConfig::default(),
        }
    }

    /// Program path for init. Takes precedence over `config.argv0`.
    pub fn argv0(mut self, argv0: impl Into<String>) -> Self {
        self.argv0 = Some(argv0.into());
        self
    }

    /// Route every engine allocation through `allocator`.
    pub fn allocator(mut self, allocator: Arc<dyn Allocator>) -> Self {
        self.allocator = Some(allocator);
        self
    }

    /// Replace the whole config.
    pub fn config(mut self, config: MountFsConfig) -> Self {
        self.config = config;
        self
    }

    /// Add one mount after those already configured.
    pub fn mount(mut self, spec: MountSpec) -> Self {
        self.config.mounts.push(spec);
        self
    }

    /// Set the write directory.
    pub fn write_dir(mut self, dir: impl Into<String>) -> Self {
        self.config.write_dir = Some(dir.into());
        self
    }

    /// Follow symbolic links.
    pub fn permit_symlinks(mut self, permit: bool) -> Self {
        self.config.permit_symlinks = permit;
        self
    }

    /// Initialize the engine and apply the config.
    ///
    /// # Errors
    ///
    /// Whatever [`MountFs::with_engine`] or the failing setup step reports.
    /// The engine is not left live on error.
    pub fn build(self) -> Result<MountFs<E>, FsError> {
        let argv0 = self.argv0.or_else(|| self.config.argv0.clone());
        let fs = MountFs::acquire(self.engine, argv0.as_deref(), self.allocator)?;
        if let Err(error) = apply(&fs, &self.config) {
            tracing::debug!(%error, "setup failed, releasing engine");
            if let Err(rollback) = fs.deinit() {
                tracing::warn!(error = %rollback, "failed to release engine after setup error");
            }
            return Err(error);
        }
        Ok(fs)
    }
}

fn apply<E: Engine>(fs: &MountFs<E>, config: &MountFsConfig) -> Result<(), FsError> {
    fs.permit_symbolic_links(config.permit_symlinks)?;
    if let Some(sane) = &config.sane {
        fs.set_sane_config(sane)?;
    }
    if let Some(dir) = &config.write_dir {
        fs.set_write_dir(dir)?;
    }
    for spec in &config.mounts {
        fs.mount(&spec.source, spec.mount_point.as_deref(), spec.append)?;
    }
    Ok(())
}
