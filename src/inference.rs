//! Online classification against a loaded artifact bundle.
//!
//! `Predictor` owns the load step. Only a successful load yields a `Ready`
//! handle, and only `Ready` can run the model, so "predict before load" is
//! an error value rather than a panic.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use burn::tensor::backend::Backend;
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::artifacts::{ArtifactStore, LoadedBundle};
use crate::error::{LoadError, PredictError};
use crate::model::{InferenceBackend, TextClassifier, argmax, ids_tensor};
use crate::text::{LabelSet, Vocabulary, encode, tokenize};

type Device = <InferenceBackend as Backend>::Device;

/// Anything that can turn a document text into a category name.
///
/// `Ok(None)` means the model could not produce an answer for this input
/// (internal computation failure). It never means "low confidence".
pub trait Classifier: Send + Sync {
    fn predict(&self, text: &str) -> Result<Option<String>, PredictError>;
}

/// Winning label plus the distribution it was picked from.
#[derive(Debug, Clone, Serialize)]
pub struct Prediction {
    pub label: String,
    /// Probability of `label`.
    pub confidence: f32,
    /// `(label, probability)` in label-set order.
    pub distribution: Vec<(String, f32)>,
}

/// A loaded bundle, ready to classify. Shared read-only across dispatches.
pub struct Ready {
    bundle_id: Uuid,
    vocabulary: Vocabulary,
    labels: LabelSet,
    max_sequence_length: usize,
    // burn parameters are not `Sync`, so concurrent dispatches take turns
    // here for the forward pass. See "Sharing the model" in DESIGN.md.
    model: Mutex<TextClassifier<InferenceBackend>>,
    device: Device,
}

impl Ready {
    pub fn from_bundle(bundle: LoadedBundle<InferenceBackend>, device: Device) -> Self {
        Self {
            bundle_id: bundle.manifest.bundle_id,
            max_sequence_length: bundle.manifest.max_sequence_length,
            vocabulary: bundle.vocabulary,
            labels: bundle.labels,
            model: Mutex::new(bundle.model),
            device,
        }
    }

    pub fn bundle_id(&self) -> Uuid {
        self.bundle_id
    }

    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    /// Run one forward pass and pick the most probable label; ties go to
    /// the label listed first.
    pub fn classify(&self, text: &str) -> Result<Option<Prediction>, PredictError> {
        if tokenize(text).is_empty() {
            return Err(PredictError::EmptyContent);
        }

        let ids = encode(text, &self.vocabulary, self.max_sequence_length);
        let input = ids_tensor::<InferenceBackend>(&ids, 1, self.max_sequence_length, &self.device);

        let probabilities = {
            let Ok(model) = self.model.lock() else {
                error!(bundle_id = %self.bundle_id, "Model lock poisoned");
                return Ok(None);
            };
            model.forward_probabilities(input).into_data().to_vec::<f32>()
        };
        let probabilities = match probabilities {
            Ok(p) => p,
            Err(e) => {
                error!(bundle_id = %self.bundle_id, error = ?e, "Failed to read model output");
                return Ok(None);
            }
        };

        let Some(index) = argmax(&probabilities) else {
            warn!(bundle_id = %self.bundle_id, "Model output had no usable maximum");
            return Ok(None);
        };
        let Some(label) = self.labels.get(index) else {
            error!(
                bundle_id = %self.bundle_id,
                index,
                labels = self.labels.len(),
                "Model output wider than label set"
            );
            return Ok(None);
        };

        let distribution = self
            .labels
            .iter()
            .map(str::to_string)
            .zip(probabilities.iter().copied())
            .collect();
        Ok(Some(Prediction {
            label: label.to_string(),
            confidence: probabilities[index],
            distribution,
        }))
    }
}

impl Classifier for Ready {
    fn predict(&self, text: &str) -> Result<Option<String>, PredictError> {
        let prediction = self.classify(text)?;
        if let Some(p) = &prediction {
            debug!(label = %p.label, confidence = p.confidence, "Classified document");
        }
        Ok(prediction.map(|p| p.label))
    }
}

enum PredictorState {
    Unloaded,
    Failed(String),
    Ready(Arc<Ready>),
}

/// Loads the bundle at an artifact directory and hands out `Ready`.
pub struct Predictor {
    store: ArtifactStore,
    state: PredictorState,
}

impl Predictor {
    pub fn new(artifact_dir: impl Into<PathBuf>) -> Self {
        Self {
            store: ArtifactStore::new(artifact_dir),
            state: PredictorState::Unloaded,
        }
    }

    /// Load and verify every part of the bundle. On failure the predictor
    /// stays unusable and keeps the reason.
    pub fn load(&mut self) -> Result<Arc<Ready>, LoadError> {
        let device = Device::default();
        match self.store.load::<InferenceBackend>(&device) {
            Ok(bundle) => {
                let ready = Arc::new(Ready::from_bundle(bundle, device));
                info!(
                    bundle_id = %ready.bundle_id(),
                    labels = ready.labels().len(),
                    "Predictor ready"
                );
                self.state = PredictorState::Ready(Arc::clone(&ready));
                Ok(ready)
            }
            Err(e) => {
                error!(dir = %self.store.dir().display(), error = %e, "Failed to load bundle");
                self.state = PredictorState::Failed(e.to_string());
                Err(e)
            }
        }
    }

    pub fn ready(&self) -> Option<Arc<Ready>> {
        match &self.state {
            PredictorState::Ready(ready) => Some(Arc::clone(ready)),
            _ => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, PredictorState::Ready(_))
    }

    /// Why the last load failed, if it did.
    pub fn load_failure(&self) -> Option<&str> {
        match &self.state {
            PredictorState::Failed(reason) => Some(reason),
            _ => None,
        }
    }
}

impl Classifier for Predictor {
    fn predict(&self, text: &str) -> Result<Option<String>, PredictError> {
        match &self.state {
            PredictorState::Ready(ready) => ready.predict(text),
            PredictorState::Unloaded | PredictorState::Failed(_) => Err(PredictError::NotReady),
        }
    }
}
