//! Artifact bundle: vocabulary, label set and model persisted as one unit.
//!
//! Layout of a bundle directory:
//!
//! ```text
//! artifacts/current/
//!   manifest.json     ← bundle id, architecture, counts, part digests
//!   vocabulary.json   ← token → id
//!   labels.json       ← ordered label names
//!   model.mpk         ← burn named MessagePack record (full precision)
//! ```
//!
//! A bundle is written into a sibling staging directory and renamed into
//! place only once every file is on disk, so a crash mid-write never leaves
//! a partial bundle where the predictor looks for one.

use std::fs;
use std::path::{Path, PathBuf};

use burn::{
    module::Module,
    record::{FullPrecisionSettings, NamedMpkFileRecorder},
    tensor::backend::Backend,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{LoadError, TrainError};
use crate::model::{ClassifierConfig, TextClassifier};
use crate::text::{LabelSet, Vocabulary};

/// Bumped when the on-disk layout changes incompatibly.
pub const BUNDLE_FORMAT_VERSION: u32 = 1;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const VOCABULARY_FILE: &str = "vocabulary.json";
pub const LABELS_FILE: &str = "labels.json";
/// Record stem; the recorder appends `.mpk`.
pub const MODEL_STEM: &str = "model";

type BundleRecorder = NamedMpkFileRecorder<FullPrecisionSettings>;

/// Describes a bundle and ties its parts together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleManifest {
    pub format_version: u32,
    pub bundle_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub max_sequence_length: usize,
    pub vocabulary_size: usize,
    pub label_count: usize,
    /// `content_digest` of the vocabulary this bundle was trained with.
    pub vocabulary_sha256: String,
    /// `content_digest` of the label set, order included.
    pub labels_sha256: String,
    pub model: ClassifierConfig,
    pub epochs_trained: usize,
    pub best_validation_loss: Option<f64>,
}

impl BundleManifest {
    /// Check that the manifest agrees with the vocabulary and label set it
    /// was loaded next to.
    pub fn verify(&self, vocabulary: &Vocabulary, labels: &LabelSet) -> Result<(), LoadError> {
        if self.format_version != BUNDLE_FORMAT_VERSION {
            return Err(LoadError::BundleMismatch(format!(
                "format version {} is not supported (expected {BUNDLE_FORMAT_VERSION})",
                self.format_version
            )));
        }
        if self.vocabulary_size != vocabulary.len() || self.model.vocab_size != vocabulary.len() {
            return Err(LoadError::BundleMismatch(format!(
                "vocabulary has {} entries, manifest expects {} (model {})",
                vocabulary.len(),
                self.vocabulary_size,
                self.model.vocab_size
            )));
        }
        if self.label_count != labels.len() || self.model.num_labels != labels.len() {
            return Err(LoadError::BundleMismatch(format!(
                "label set has {} entries, manifest expects {} (model {})",
                labels.len(),
                self.label_count,
                self.model.num_labels
            )));
        }
        if labels.is_empty() || !labels.is_distinct() {
            return Err(LoadError::BundleMismatch(
                "label set is empty or contains duplicates".to_string(),
            ));
        }
        if self.max_sequence_length == 0 {
            return Err(LoadError::BundleMismatch(
                "max_sequence_length must be positive".to_string(),
            ));
        }
        // Same-sized parts from another run pass the count checks above.
        if digest_or_mismatch(vocabulary)? != self.vocabulary_sha256 {
            return Err(LoadError::BundleMismatch(
                "vocabulary does not belong to this bundle".to_string(),
            ));
        }
        if digest_or_mismatch(labels)? != self.labels_sha256 {
            return Err(LoadError::BundleMismatch(
                "label set does not belong to this bundle".to_string(),
            ));
        }
        Ok(())
    }
}

/// Hex SHA-256 of the canonical JSON form of `value`. Vocabulary entries
/// serialize in key order, so equal contents always give equal digests.
pub fn content_digest<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let bytes = serde_json::to_vec(value)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

fn digest_or_mismatch<T: Serialize>(value: &T) -> Result<String, LoadError> {
    content_digest(value).map_err(|e| LoadError::BundleMismatch(e.to_string()))
}

/// A bundle read back from disk.
pub struct LoadedBundle<B: Backend> {
    pub manifest: BundleManifest,
    pub vocabulary: Vocabulary,
    pub labels: LabelSet,
    pub model: TextClassifier<B>,
}

/// Reads and writes the bundle at one directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist all parts of a bundle, replacing any existing bundle.
    pub fn write<B: Backend>(
        &self,
        manifest: &BundleManifest,
        vocabulary: &Vocabulary,
        labels: &LabelSet,
        model: TextClassifier<B>,
    ) -> Result<(), TrainError> {
        manifest
            .verify(vocabulary, labels)
            .map_err(|e| self.artifact_err(&self.dir, e))?;

        let staging = self.sibling("staging", manifest.bundle_id);
        fs::create_dir_all(&staging).map_err(|e| self.artifact_err(&staging, e))?;

        let result = write_parts(&staging, manifest, vocabulary, labels, model)
            .and_then(|()| self.swap_in(&staging, manifest.bundle_id));

        if result.is_err() {
            // Best effort: a leftover staging dir is never read.
            let _ = fs::remove_dir_all(&staging);
        }
        result?;

        tracing::info!(
            dir = %self.dir.display(),
            bundle_id = %manifest.bundle_id,
            "Artifact bundle written"
        );
        Ok(())
    }

    /// Read and cross-check every part of the bundle.
    pub fn load<B: Backend>(&self, device: &B::Device) -> Result<LoadedBundle<B>, LoadError> {
        let manifest: BundleManifest = read_json(&self.dir.join(MANIFEST_FILE))?;
        let vocabulary: Vocabulary = read_json(&self.dir.join(VOCABULARY_FILE))?;
        let labels: LabelSet = read_json(&self.dir.join(LABELS_FILE))?;
        manifest.verify(&vocabulary, &labels)?;

        let model_path = self.dir.join(MODEL_STEM).with_extension("mpk");
        if !model_path.is_file() {
            return Err(LoadError::ArtifactMissing {
                path: model_path,
                reason: "model record not found".to_string(),
            });
        }
        let model: TextClassifier<B> = manifest
            .model
            .init(device)
            .load_file(self.dir.join(MODEL_STEM), &BundleRecorder::new(), device)
            .map_err(|e| LoadError::Corrupt {
                path: model_path.clone(),
                reason: e.to_string(),
            })?;

        tracing::info!(
            dir = %self.dir.display(),
            bundle_id = %manifest.bundle_id,
            vocabulary = vocabulary.len(),
            labels = labels.len(),
            "Artifact bundle loaded"
        );
        Ok(LoadedBundle {
            manifest,
            vocabulary,
            labels,
            model,
        })
    }

    /// Move the staged bundle to `self.dir`. An existing bundle is moved
    /// aside first because a directory cannot be renamed over a non-empty one.
    fn swap_in(&self, staging: &Path, bundle_id: Uuid) -> Result<(), TrainError> {
        let retired = self.sibling("retired", bundle_id);
        let had_previous = self.dir.exists();
        if had_previous {
            fs::rename(&self.dir, &retired).map_err(|e| self.artifact_err(&self.dir, e))?;
        }
        if let Err(e) = fs::rename(staging, &self.dir) {
            if had_previous {
                let _ = fs::rename(&retired, &self.dir);
            }
            return Err(self.artifact_err(&self.dir, e));
        }
        if had_previous {
            if let Err(e) = fs::remove_dir_all(&retired) {
                tracing::warn!(path = %retired.display(), error = %e, "Failed to remove retired bundle");
            }
        }
        Ok(())
    }

    /// `<parent>/.<name>.<kind>-<id>`, next to the bundle so renames stay on
    /// one filesystem.
    fn sibling(&self, kind: &str, id: Uuid) -> PathBuf {
        let name = self
            .dir
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("bundle");
        let parent = self.dir.parent().unwrap_or_else(|| Path::new("."));
        parent.join(format!(".{name}.{kind}-{id}"))
    }

    fn artifact_err(&self, path: &Path, e: impl std::fmt::Display) -> TrainError {
        TrainError::Artifact {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }
    }
}

fn write_parts<B: Backend>(
    dir: &Path,
    manifest: &BundleManifest,
    vocabulary: &Vocabulary,
    labels: &LabelSet,
    model: TextClassifier<B>,
) -> Result<(), TrainError> {
    write_json(&dir.join(VOCABULARY_FILE), vocabulary)?;
    write_json(&dir.join(LABELS_FILE), labels)?;
    model
        .save_file(dir.join(MODEL_STEM), &BundleRecorder::new())
        .map_err(|e| TrainError::Artifact {
            path: dir.join(MODEL_STEM),
            reason: e.to_string(),
        })?;
    // Manifest last: its presence marks a complete staging dir.
    write_json(&dir.join(MANIFEST_FILE), manifest)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), TrainError> {
    let json = serde_json::to_string_pretty(value).map_err(|e| TrainError::Artifact {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    fs::write(path, json).map_err(|e| TrainError::Artifact {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, LoadError> {
    let raw = fs::read_to_string(path).map_err(|e| LoadError::ArtifactMissing {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    serde_json::from_str(&raw).map_err(|e| LoadError::Corrupt {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::InferenceBackend;

    fn parts() -> (BundleManifest, Vocabulary, LabelSet) {
        let vocabulary = Vocabulary::build(["sale today only", "lunch with mom"], 20).unwrap();
        let labels = LabelSet::from_labels(["Promotions", "Personal"]);
        let model = ClassifierConfig::new(vocabulary.len(), labels.len())
            .with_embedding_dim(4)
            .with_lstm_units(3)
            .with_dense_units(3);
        let manifest = BundleManifest {
            format_version: BUNDLE_FORMAT_VERSION,
            bundle_id: Uuid::new_v4(),
            created_at: Utc::now(),
            max_sequence_length: 6,
            vocabulary_size: vocabulary.len(),
            label_count: labels.len(),
            vocabulary_sha256: content_digest(&vocabulary).unwrap(),
            labels_sha256: content_digest(&labels).unwrap(),
            model,
            epochs_trained: 1,
            best_validation_loss: None,
        };
        (manifest, vocabulary, labels)
    }

    fn write_bundle(store: &ArtifactStore) -> BundleManifest {
        let (manifest, vocabulary, labels) = parts();
        let device = Default::default();
        let model: TextClassifier<InferenceBackend> = manifest.model.init(&device);
        store.write(&manifest, &vocabulary, &labels, model).unwrap();
        manifest
    }

    #[test]
    fn write_then_load() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path().join("current"));
        let manifest = write_bundle(&store);

        let device = Default::default();
        let loaded = store.load::<InferenceBackend>(&device).unwrap();
        assert_eq!(loaded.manifest.bundle_id, manifest.bundle_id);
        assert_eq!(loaded.labels.get(0), Some("Promotions"));
        assert_eq!(loaded.vocabulary.len(), manifest.vocabulary_size);
    }

    #[test]
    fn rewrite_replaces_bundle_and_leaves_no_siblings() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path().join("current"));
        write_bundle(&store);
        let second = write_bundle(&store);

        let device = Default::default();
        let loaded = store.load::<InferenceBackend>(&device).unwrap();
        assert_eq!(loaded.manifest.bundle_id, second.bundle_id);

        let entries: Vec<_> = fs::read_dir(tmp.path()).unwrap().collect();
        assert_eq!(entries.len(), 1, "staging/retired dirs should be gone");
    }

    #[test]
    fn missing_directory_is_artifact_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path().join("nope"));
        let device = Default::default();
        let err = store.load::<InferenceBackend>(&device).err().unwrap();
        assert!(matches!(err, LoadError::ArtifactMissing { .. }));
    }

    #[test]
    fn missing_model_record_is_artifact_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path().join("current"));
        write_bundle(&store);
        fs::remove_file(store.dir().join("model.mpk")).unwrap();

        let device = Default::default();
        let err = store.load::<InferenceBackend>(&device).err().unwrap();
        assert!(matches!(err, LoadError::ArtifactMissing { .. }));
    }

    #[test]
    fn mismatched_labels_are_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path().join("current"));
        write_bundle(&store);
        fs::write(store.dir().join(LABELS_FILE), r#"["Promotions","Personal","Work"]"#).unwrap();

        let device = Default::default();
        let err = store.load::<InferenceBackend>(&device).err().unwrap();
        assert!(matches!(err, LoadError::BundleMismatch(_)));
    }

    #[test]
    fn reordered_labels_are_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path().join("current"));
        write_bundle(&store);
        fs::write(store.dir().join(LABELS_FILE), r#"["Personal","Promotions"]"#).unwrap();

        let device = Default::default();
        let err = store.load::<InferenceBackend>(&device).err().unwrap();
        assert!(matches!(err, LoadError::BundleMismatch(_)), "{err}");
    }

    #[test]
    fn same_size_vocabulary_from_another_run_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path().join("current"));
        let manifest = write_bundle(&store);

        let foreign = Vocabulary::build(["winter boots clearance", "call grandpa soon"], 20).unwrap();
        assert_eq!(foreign.len(), manifest.vocabulary_size);
        fs::write(
            store.dir().join(VOCABULARY_FILE),
            serde_json::to_string(&foreign).unwrap(),
        )
        .unwrap();

        let device = Default::default();
        let err = store.load::<InferenceBackend>(&device).err().unwrap();
        assert!(matches!(err, LoadError::BundleMismatch(_)), "{err}");
    }

    #[test]
    fn reformatted_parts_still_load() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path().join("current"));
        write_bundle(&store);
        let path = store.dir().join(LABELS_FILE);
        let labels: LabelSet = read_json(&path).unwrap();
        fs::write(&path, serde_json::to_string(&labels).unwrap()).unwrap();

        let device = Default::default();
        assert!(store.load::<InferenceBackend>(&device).is_ok());
    }

    #[test]
    fn write_refuses_manifest_for_other_parts() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path().join("current"));
        let (mut manifest, vocabulary, labels) = parts();
        manifest.labels_sha256 = content_digest(&LabelSet::from_labels(["Personal", "Promotions"])).unwrap();

        let device = Default::default();
        let model: TextClassifier<InferenceBackend> = manifest.model.init(&device);
        let err = store.write(&manifest, &vocabulary, &labels, model).unwrap_err();
        assert!(matches!(err, TrainError::Artifact { .. }));
        assert!(!store.dir().exists());
    }

    #[test]
    fn corrupt_vocabulary_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path().join("current"));
        write_bundle(&store);
        fs::write(store.dir().join(VOCABULARY_FILE), "{not json").unwrap();

        let device = Default::default();
        let err = store.load::<InferenceBackend>(&device).err().unwrap();
        assert!(matches!(err, LoadError::Corrupt { .. }));
    }

    #[test]
    fn manifest_verify_rejects_unknown_format() {
        let (mut manifest, vocabulary, labels) = parts();
        manifest.format_version = BUNDLE_FORMAT_VERSION + 1;
        assert!(manifest.verify(&vocabulary, &labels).is_err());
    }
}
