//! Configuration for the replicator and the client cache.

use std::path::PathBuf;

/// Options fixed when a replicator is built.
#[derive(Debug, Clone)]
pub struct ReplicatorOptions {
    /// Wipe the destination before copying.
    pub cleanup_first: bool,
    /// Write each class with one bulk `create_objects` call; any failure
    /// aborts the run.
    pub strict: bool,
    /// Rename the config server to this id after copying.
    pub new_server_id: Option<String>,
    /// Id of the config server being renamed. Detected when unset.
    pub old_server_id: Option<String>,
}

impl ReplicatorOptions {
    /// Creates the default options: cleanup first, lenient writes, no
    /// rename.
    pub fn new() -> Self {
        Self {
            cleanup_first: true,
            strict: false,
            new_server_id: None,
            old_server_id: None,
        }
    }

    /// Sets whether the destination is wiped first.
    pub fn with_cleanup_first(mut self, cleanup_first: bool) -> Self {
        self.cleanup_first = cleanup_first;
        self
    }

    /// Sets strict (bulk, all-or-nothing) writes.
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Renames the config server to `id` after copying.
    pub fn with_new_server_id(mut self, id: impl Into<String>) -> Self {
        self.new_server_id = Some(id.into().to_lowercase());
        self
    }

    /// Names the config server to rename.
    pub fn with_old_server_id(mut self, id: impl Into<String>) -> Self {
        self.old_server_id = Some(id.into().to_lowercase());
        self
    }
}

impl Default for ReplicatorOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Local files written by the client cache. Every path is optional; an
/// unset path is simply not written.
#[derive(Debug, Clone, Default)]
pub struct CacheConfig {
    /// Licensed-module listing of the master.
    pub modules_file: Option<PathBuf>,
    /// Version string of the master.
    pub version_file: Option<PathBuf>,
    /// Locally stored credentials.
    pub passwd_file: Option<PathBuf>,
    /// Hardware inventory schema, as JSON.
    pub audit_hardware_config_file: Option<PathBuf>,
}

impl CacheConfig {
    /// Creates a configuration writing no files.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the modules file path.
    pub fn with_modules_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.modules_file = Some(path.into());
        self
    }

    /// Sets the version file path.
    pub fn with_version_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.version_file = Some(path.into());
        self
    }

    /// Sets the passwd file path.
    pub fn with_passwd_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.passwd_file = Some(path.into());
        self
    }

    /// Sets the hardware inventory schema file path.
    pub fn with_audit_hardware_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.audit_hardware_config_file = Some(path.into());
        self
    }

    /// Places every file under `dir` with its conventional name.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            modules_file: Some(dir.join("modules")),
            version_file: Some(dir.join("version")),
            passwd_file: Some(dir.join("passwd")),
            audit_hardware_config_file: Some(dir.join("hwaudit.json")),
        }
    }
}
