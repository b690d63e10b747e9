use std::sync::{PoisonError, RwLock};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::biometrics::store::GalleryStore;
use crate::biometrics::vector::{
    ensure_valid_vector, validate_identity, FeatureVector, Modality, Signature,
};
use crate::errors::{AppError, AppResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrollmentRecord {
    pub identity: String,
    pub modality: Modality,
    pub vector: FeatureVector,
    pub signature: Signature,
    pub created_at: String,
}

// `all()` returns records in insertion order and a replaced record keeps its
// original slot. A single `RwLock` guards the whole gallery.
pub struct EnrollmentGallery {
    records: RwLock<Vec<EnrollmentRecord>>,
    store: Box<dyn GalleryStore + Send + Sync>,
}

impl EnrollmentGallery {
    // `created_at` order so the insertion-order guarantee survives restarts.
    pub fn load(store: Box<dyn GalleryStore + Send + Sync>) -> AppResult<Self> {
        let mut records = store.scan()?;
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        info!(records = records.len(), "rebuilt enrollment gallery");
        Ok(Self {
            records: RwLock::new(records),
            store,
        })
    }

    pub fn empty(store: Box<dyn GalleryStore + Send + Sync>) -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            store,
        }
    }

    // A store failure after the in-memory update is surfaced as
    // `PartialWrite`, never rolled back silently.
    pub fn enroll(
        &self,
        identity: &str,
        modality: Modality,
        vector: FeatureVector,
    ) -> AppResult<Signature> {
        validate_identity(identity)?;
        ensure_valid_vector(&vector, modality)?;

        let signature = Signature::compute(&vector);
        let record = EnrollmentRecord {
            identity: identity.to_string(),
            modality,
            vector,
            signature: signature.clone(),
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        };

        let persisted = {
            let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
            match records
                .iter_mut()
                .find(|entry| entry.identity == identity && entry.modality == modality)
            {
                // Replacement keeps the original insertion slot.
                Some(slot) => *slot = record.clone(),
                None => records.push(record.clone()),
            }
            self.store.upsert(&record)
        };

        if let Err(err) = persisted {
            return Err(AppError::PartialWrite {
                identity: identity.to_string(),
                modality,
                message: format!("gallery updated but store upsert failed: {err}"),
            });
        }

        debug!(identity, modality = %modality, signature = %signature, "enrolled");
        Ok(signature)
    }

    pub fn lookup(&self, identity: &str, modality: Modality) -> Option<EnrollmentRecord> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|entry| entry.identity == identity && entry.modality == modality)
            .cloned()
    }

    pub fn all(&self, modality: Modality) -> Vec<EnrollmentRecord> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|entry| entry.modality == modality)
            .cloned()
            .collect()
    }

    // `Ok(true)` iff a record existed.
    pub fn remove(&self, identity: &str, modality: Modality) -> AppResult<bool> {
        validate_identity(identity)?;

        let (existed, persisted) = {
            let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
            let before = records.len();
            records.retain(|entry| !(entry.identity == identity && entry.modality == modality));
            let existed = records.len() != before;
            let persisted = if existed {
                self.store.delete(identity, modality).map(|_| ())
            } else {
                Ok(())
            };
            (existed, persisted)
        };

        if let Err(err) = persisted {
            return Err(AppError::PartialWrite {
                identity: identity.to_string(),
                modality,
                message: format!("gallery updated but store delete failed: {err}"),
            });
        }

        if existed {
            debug!(identity, modality = %modality, "removed enrollment");
        }
        Ok(existed)
    }

    pub fn remove_identity(&self, identity: &str) -> AppResult<usize> {
        let mut removed = 0;
        for modality in [Modality::Voice, Modality::Face] {
            if self.remove(identity, modality)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingStore {
        upserts: Mutex<Vec<EnrollmentRecord>>,
        deletes: Mutex<Vec<(String, Modality)>>,
        fail_upsert: bool,
    }

    impl GalleryStore for RecordingStore {
        fn upsert(&self, record: &EnrollmentRecord) -> AppResult<()> {
            if self.fail_upsert {
                return Err(AppError::FrameProcessing("store offline".into()));
            }
            self.upserts.lock().unwrap().push(record.clone());
            Ok(())
        }

        fn delete(&self, identity: &str, modality: Modality) -> AppResult<bool> {
            self.deletes
                .lock()
                .unwrap()
                .push((identity.to_string(), modality));
            Ok(true)
        }

        fn scan(&self) -> AppResult<Vec<EnrollmentRecord>> {
            Ok(self.upserts.lock().unwrap().clone())
        }
    }

    fn voice_vector(seed: f64) -> FeatureVector {
        FeatureVector::new((0..Modality::Voice.arity()).map(|i| seed + i as f64).collect())
    }

    #[test]
    fn enroll_then_lookup_returns_the_same_vector() {
        let gallery = EnrollmentGallery::empty(Box::new(RecordingStore::default()));
        let vector = voice_vector(0.5);

        gallery
            .enroll("citizen-1", Modality::Voice, vector.clone())
            .unwrap();

        let record = gallery.lookup("citizen-1", Modality::Voice).unwrap();
        for (stored, original) in record.vector.values.iter().zip(vector.values.iter()) {
            assert!((stored - original).abs() < 1e-12);
        }
    }

    #[test]
    fn re_enrollment_replaces_in_place_and_keeps_the_slot() {
        let gallery = EnrollmentGallery::empty(Box::new(RecordingStore::default()));

        gallery
            .enroll("citizen-1", Modality::Voice, voice_vector(0.1))
            .unwrap();
        gallery
            .enroll("citizen-2", Modality::Voice, voice_vector(0.2))
            .unwrap();
        let second_signature = gallery
            .enroll("citizen-1", Modality::Voice, voice_vector(0.9))
            .unwrap();

        let all = gallery.all(Modality::Voice);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].identity, "citizen-1");
        assert_eq!(all[0].signature, second_signature);
        assert_eq!(all[1].identity, "citizen-2");
    }

    #[test]
    fn invalid_arity_leaves_the_gallery_unchanged() {
        let gallery = EnrollmentGallery::empty(Box::new(RecordingStore::default()));
        let err = gallery
            .enroll("citizen-1", Modality::Voice, FeatureVector::new(vec![1.0; 5]))
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidVector { .. }));
        assert!(gallery.is_empty());
    }

    #[test]
    fn store_failure_surfaces_as_partial_write() {
        let store = RecordingStore {
            fail_upsert: true,
            ..RecordingStore::default()
        };
        let gallery = EnrollmentGallery::empty(Box::new(store));
        let err = gallery
            .enroll("citizen-1", Modality::Voice, voice_vector(0.1))
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::PartialWrite {
                modality: Modality::Voice,
                ..
            }
        ));
        // The in-memory copy kept the write; the divergence is reported, not
        // rolled back.
        assert_eq!(gallery.len(), 1);
    }

    #[test]
    fn remove_reports_existence_and_remove_identity_clears_all_modalities() {
        let gallery = EnrollmentGallery::empty(Box::new(RecordingStore::default()));
        gallery
            .enroll("citizen-1", Modality::Voice, voice_vector(0.1))
            .unwrap();
        gallery
            .enroll(
                "citizen-1",
                Modality::Face,
                FeatureVector::new(vec![0.3; Modality::Face.arity()]),
            )
            .unwrap();

        assert!(!gallery.remove("citizen-9", Modality::Voice).unwrap());
        assert_eq!(gallery.remove_identity("citizen-1").unwrap(), 2);
        assert!(gallery.is_empty());
    }

    #[test]
    fn load_orders_records_by_enrollment_time() {
        struct SeededStore(Vec<EnrollmentRecord>);
        impl GalleryStore for SeededStore {
            fn upsert(&self, _record: &EnrollmentRecord) -> AppResult<()> {
                Ok(())
            }
            fn delete(&self, _identity: &str, _modality: Modality) -> AppResult<bool> {
                Ok(false)
            }
            fn scan(&self) -> AppResult<Vec<EnrollmentRecord>> {
                Ok(self.0.clone())
            }
        }

        let newer = EnrollmentRecord {
            identity: "citizen-2".into(),
            modality: Modality::Voice,
            vector: voice_vector(0.2),
            signature: Signature::compute(&voice_vector(0.2)),
            created_at: "2026-02-01T00:00:00.000Z".into(),
        };
        let older = EnrollmentRecord {
            identity: "citizen-1".into(),
            modality: Modality::Voice,
            vector: voice_vector(0.1),
            signature: Signature::compute(&voice_vector(0.1)),
            created_at: "2026-01-01T00:00:00.000Z".into(),
        };

        let gallery = EnrollmentGallery::load(Box::new(SeededStore(vec![newer, older]))).unwrap();
        let all = gallery.all(Modality::Voice);
        assert_eq!(all[0].identity, "citizen-1");
        assert_eq!(all[1].identity, "citizen-2");
    }
}
