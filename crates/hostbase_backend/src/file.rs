//! JSON file backend for persistent storage.

use crate::backend::Backend;
use crate::credentials::Credentials;
use crate::error::{BackendError, BackendResult};
use crate::filter::Filter;
use crate::info::BackendInfo;
use crate::memory::InMemoryBackend;
use fs2::FileExt;
use hostbase_object::{Object, ObjectClass};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// On-disk layout of a file backend.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Document {
    #[serde(default)]
    backend_info: BackendInfo,
    #[serde(default)]
    objects: Vec<Object>,
    #[serde(default)]
    passwords: BTreeMap<String, String>,
    #[serde(default)]
    audit_hardware_config: Value,
}

/// A backend persisted as one JSON document.
///
/// Records are served from memory; every mutation rewrites the document
/// through a temporary file and an atomic rename. A sibling `.lock` file
/// is held exclusively while the backend is open.
///
/// # Example
///
/// ```no_run
/// use hostbase_backend::{Backend, FileBackend};
/// use hostbase_object::Object;
/// use std::path::Path;
///
/// let backend = FileBackend::open(Path::new("hosts.json")).unwrap();
/// backend.insert_object(&Object::opsi_client("c1.example.org")).unwrap();
/// ```
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    inner: InMemoryBackend,
    _lock_file: File,
}

impl FileBackend {
    /// Opens the document at `path`, creating an empty one if missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be read or parsed, or if
    /// another process holds the lock (`Locked`).
    pub fn open(path: &Path) -> BackendResult<Self> {
        let lock_path = lock_path_for(path);
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(BackendError::Locked {
                path: path.to_path_buf(),
            });
        }

        let inner = InMemoryBackend::new();
        if path.exists() {
            let text = fs::read_to_string(path)?;
            if !text.trim().is_empty() {
                let document: Document = serde_json::from_str(&text)?;
                inner.load(
                    document.objects,
                    document.backend_info,
                    document.passwords,
                    document.audit_hardware_config,
                );
            }
        }

        let backend = Self {
            path: path.to_path_buf(),
            inner,
            _lock_file: lock_file,
        };
        if !path.exists() {
            backend.persist()?;
        }
        tracing::debug!(path = %path.display(), records = backend.inner.len(), "opened file backend");
        Ok(backend)
    }

    /// Opens the document, creating parent directories if needed.
    pub fn open_with_create_dirs(path: &Path) -> BackendResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Self::open(path)
    }

    /// Returns the path of the document.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns every stored record.
    #[must_use]
    pub fn all_objects(&self) -> Vec<Object> {
        self.inner.all_objects()
    }

    /// Replaces the reported backend info and persists it.
    pub fn set_backend_info(&self, info: BackendInfo) -> BackendResult<()> {
        self.inner.set_backend_info(info);
        self.persist()
    }

    /// Replaces the hardware inventory schema and persists it.
    pub fn set_audit_hardware_config(&self, config: Value) -> BackendResult<()> {
        self.inner.set_audit_hardware_config(config);
        self.persist()
    }

    fn persist(&self) -> BackendResult<()> {
        let document = Document {
            backend_info: self.inner.backend_info()?,
            objects: self.inner.all_objects(),
            passwords: self.inner.passwords(),
            audit_hardware_config: self.inner.audit_hardware_config(),
        };
        let text = serde_json::to_string_pretty(&document)?;

        let temp_path = self.path.with_extension("json.tmp");
        {
            let mut temp = File::create(&temp_path)?;
            temp.write_all(text.as_bytes())?;
            temp.sync_all()?;
        }
        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }

    fn mutate<T>(&self, op: impl FnOnce(&InMemoryBackend) -> BackendResult<T>) -> BackendResult<T> {
        let result = op(&self.inner)?;
        self.persist()?;
        Ok(result)
    }
}

fn lock_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".lock");
    path.with_file_name(name)
}

impl Backend for FileBackend {
    fn backend_info(&self) -> BackendResult<BackendInfo> {
        self.inner.backend_info()
    }

    fn backend_create_base(&self) -> BackendResult<()> {
        self.persist()
    }

    fn backend_delete_base(&self) -> BackendResult<()> {
        self.mutate(|inner| inner.backend_delete_base())
    }

    fn get_objects(&self, class: ObjectClass, filter: &Filter) -> BackendResult<Vec<Object>> {
        self.inner.get_objects(class, filter)
    }

    fn insert_object(&self, object: &Object) -> BackendResult<()> {
        self.mutate(|inner| inner.insert_object(object))
    }

    fn update_object(&self, object: &Object) -> BackendResult<()> {
        self.mutate(|inner| inner.update_object(object))
    }

    fn update_objects(&self, objects: &[Object]) -> BackendResult<()> {
        self.mutate(|inner| inner.update_objects(objects))
    }

    fn create_objects(&self, objects: &[Object]) -> BackendResult<()> {
        self.mutate(|inner| inner.create_objects(objects))
    }

    fn delete_objects(&self, objects: &[Object]) -> BackendResult<()> {
        self.mutate(|inner| inner.delete_objects(objects))
    }

    fn user_get_credentials(&self, username: &str, host_id: &str) -> BackendResult<Credentials> {
        self.inner.user_get_credentials(username, host_id)
    }

    fn user_set_credentials(&self, username: &str, password: &str) -> BackendResult<()> {
        self.mutate(|inner| inner.user_set_credentials(username, password))
    }

    fn audit_hardware_get_config(&self) -> BackendResult<Value> {
        self.inner.audit_hardware_get_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn file_create_new() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("backend.json");

        let backend = FileBackend::open(&path).unwrap();
        assert!(backend.all_objects().is_empty());
        assert!(path.exists());
    }

    #[test]
    fn file_persistence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("backend.json");

        {
            let backend = FileBackend::open(&path).unwrap();
            backend
                .insert_object(&Object::opsi_client("c1.example.org"))
                .unwrap();
            backend
                .insert_object(&Object::host_group("lab").with("parentGroupId", "site"))
                .unwrap();
            backend.user_set_credentials("pcpatch", "pw").unwrap();
            backend
                .set_audit_hardware_config(json!([{"Class": {"Opsi": "CPU"}}]))
                .unwrap();
        }

        {
            let backend = FileBackend::open(&path).unwrap();
            assert_eq!(backend.all_objects().len(), 2);
            let groups = backend.get_objects(ObjectClass::Group, &Filter::new()).unwrap();
            assert_eq!(groups[0].get_str("parentGroupId"), Some("site"));
            assert_eq!(
                backend.audit_hardware_get_config().unwrap(),
                json!([{"Class": {"Opsi": "CPU"}}])
            );
        }
    }

    #[test]
    fn file_is_locked_while_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("backend.json");

        let _first = FileBackend::open(&path).unwrap();
        assert!(matches!(
            FileBackend::open(&path),
            Err(BackendError::Locked { .. })
        ));
    }

    #[test]
    fn file_delete_base_clears_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("backend.json");

        let backend = FileBackend::open(&path).unwrap();
        backend.insert_object(&Object::opsi_client("c")).unwrap();
        backend.backend_delete_base().unwrap();
        drop(backend);

        let backend = FileBackend::open(&path).unwrap();
        assert!(backend.all_objects().is_empty());
    }

    #[test]
    fn file_create_with_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("path").join("backend.json");

        let backend = FileBackend::open_with_create_dirs(&path).unwrap();
        assert_eq!(backend.path(), path);
        assert!(path.exists());
    }

    #[test]
    fn file_rejects_bad_document() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("backend.json");
        fs::write(&path, r#"{"objects": [{"type": "Toaster"}]}"#).unwrap();

        assert!(matches!(FileBackend::open(&path), Err(BackendError::Json(_))));
    }
}
