use std::env;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::biometrics::gallery::EnrollmentRecord;
use crate::biometrics::vector::Modality;
use crate::errors::{AppError, AppResult};

pub const DEFAULT_STORE_DIR: &str = "/var/lib/cedula/gallery";
pub const GALLERY_STORE_ENV: &str = "CEDULA_GALLERY_DIR";

pub trait GalleryStore {
    fn upsert(&self, record: &EnrollmentRecord) -> AppResult<()>;
    fn delete(&self, identity: &str, modality: Modality) -> AppResult<bool>;
    fn scan(&self) -> AppResult<Vec<EnrollmentRecord>>;
}

pub trait StoreDirResolver {
    fn resolve(&self, override_dir: Option<&Path>) -> PathBuf;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EnvStoreDirResolver;

impl StoreDirResolver for EnvStoreDirResolver {
    fn resolve(&self, override_dir: Option<&Path>) -> PathBuf {
        if let Some(dir) = override_dir {
            dir.to_path_buf()
        } else if let Ok(env_value) = env::var(GALLERY_STORE_ENV) {
            PathBuf::from(env_value)
        } else {
            PathBuf::from(DEFAULT_STORE_DIR)
        }
    }
}

// One JSON file per `(identity, modality)` key under a flat directory,
// written atomically.
#[derive(Debug, Clone)]
pub struct FilesystemGalleryStore {
    dir: PathBuf,
}

impl FilesystemGalleryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn record_path(&self, identity: &str, modality: Modality) -> PathBuf {
        self.dir.join(format!("{identity}.{modality}.json"))
    }
}

impl GalleryStore for FilesystemGalleryStore {
    fn upsert(&self, record: &EnrollmentRecord) -> AppResult<()> {
        let path = self.record_path(&record.identity, record.modality);
        write_record(&path, record)?;
        debug!(path = %path.display(), "persisted enrollment record");
        Ok(())
    }

    fn delete(&self, identity: &str, modality: Modality) -> AppResult<bool> {
        let path = self.record_path(identity, modality);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path).map_err(|source| AppError::StoreWrite {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), "deleted enrollment record");
        Ok(true)
    }

    fn scan(&self) -> AppResult<Vec<EnrollmentRecord>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&self.dir).map_err(|source| AppError::StoreRead {
            path: self.dir.clone(),
            source,
        })?;

        let mut records = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| AppError::StoreRead {
                path: self.dir.clone(),
                source,
            })?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            records.push(read_record(&path)?);
        }
        Ok(records)
    }
}

fn read_record(path: &Path) -> AppResult<EnrollmentRecord> {
    let data = fs::read(path).map_err(|source| AppError::StoreRead {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&data).map_err(|err| AppError::InvalidStoreFile {
        path: path.to_path_buf(),
        message: format!("invalid gallery record contents: {err}"),
    })
}

fn write_record(path: &Path, record: &EnrollmentRecord) -> AppResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| AppError::StoreWrite {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(parent).map_err(|source| AppError::StoreWrite {
        path: path.to_path_buf(),
        source,
    })?;

    {
        let file = tmp.as_file_mut();
        {
            let mut writer = BufWriter::new(&mut *file);
            let serialized = serde_json::to_vec_pretty(record)?;
            writer
                .write_all(&serialized)
                .map_err(|source| AppError::StoreWrite {
                    path: path.to_path_buf(),
                    source,
                })?;
            writer.write_all(b"\n").ok();
            writer.flush().map_err(|source| AppError::StoreWrite {
                path: path.to_path_buf(),
                source,
            })?;
        }
        file.sync_all().map_err(|source| AppError::StoreWrite {
            path: path.to_path_buf(),
            source,
        })?;
    }

    let file = tmp.persist(path).map_err(|err| AppError::StoreWrite {
        path: path.to_path_buf(),
        source: err.error,
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = file
            .metadata()
            .map_err(|source| AppError::StoreWrite {
                path: path.to_path_buf(),
                source,
            })?
            .permissions();
        perms.set_mode(0o600);
        file.set_permissions(perms)
            .map_err(|source| AppError::StoreWrite {
                path: path.to_path_buf(),
                source,
            })?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{SecondsFormat, Utc};
    use tempfile::TempDir;

    use crate::biometrics::vector::{FeatureVector, Signature};

    fn sample_record(identity: &str, modality: Modality) -> EnrollmentRecord {
        let vector = FeatureVector::new(vec![0.1; modality.arity()]);
        let signature = Signature::compute(&vector);
        EnrollmentRecord {
            identity: identity.into(),
            modality,
            vector,
            signature,
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }

    #[test]
    fn upsert_then_scan_round_trips() {
        let tmp = TempDir::new().unwrap();
        let store = FilesystemGalleryStore::new(tmp.path());
        let record = sample_record("citizen-1", Modality::Voice);

        store.upsert(&record).unwrap();
        let scanned = store.scan().unwrap();
        assert_eq!(scanned, vec![record]);
    }

    #[test]
    fn upsert_replaces_the_same_key() {
        let tmp = TempDir::new().unwrap();
        let store = FilesystemGalleryStore::new(tmp.path());
        let first = sample_record("citizen-1", Modality::Face);
        let mut second = sample_record("citizen-1", Modality::Face);
        second.vector = FeatureVector::new(vec![0.5; Modality::Face.arity()]);
        second.signature = Signature::compute(&second.vector);

        store.upsert(&first).unwrap();
        store.upsert(&second).unwrap();

        let scanned = store.scan().unwrap();
        assert_eq!(scanned.len(), 1);
        assert_eq!(scanned[0].signature, second.signature);
    }

    #[test]
    fn delete_reports_whether_a_record_existed() {
        let tmp = TempDir::new().unwrap();
        let store = FilesystemGalleryStore::new(tmp.path());
        let record = sample_record("citizen-2", Modality::Voice);

        assert!(!store.delete("citizen-2", Modality::Voice).unwrap());
        store.upsert(&record).unwrap();
        assert!(store.delete("citizen-2", Modality::Voice).unwrap());
        assert!(store.scan().unwrap().is_empty());
    }

    #[test]
    fn scan_of_missing_directory_is_empty() {
        let tmp = TempDir::new().unwrap();
        let store = FilesystemGalleryStore::new(tmp.path().join("absent"));
        assert!(store.scan().unwrap().is_empty());
    }

    #[test]
    fn scan_rejects_foreign_json_in_the_store_dir() {
        let tmp = TempDir::new().unwrap();
        let store = FilesystemGalleryStore::new(tmp.path());
        fs::write(
            tmp.path().join("probe.json"),
            r#"{"modality":"voice","vector":[1.0]}"#,
        )
        .unwrap();

        let err = store.scan().unwrap_err();
        assert!(matches!(err, AppError::InvalidStoreFile { .. }));
    }

    #[test]
    fn resolver_prefers_override_dir() {
        let tmp = TempDir::new().unwrap();
        let resolver = EnvStoreDirResolver;
        let resolved = resolver.resolve(Some(tmp.path()));
        assert_eq!(resolved, tmp.path());
    }
}
