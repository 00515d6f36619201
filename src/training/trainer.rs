//! Fit loop with early stopping, followed by an atomic bundle write.

use burn::{
    module::AutodiffModule,
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
};
use chrono::Utc;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use super::dataset::{EncodedCorpus, Sample};
use super::split::split_train_val;
use crate::artifacts::{ArtifactStore, BUNDLE_FORMAT_VERSION, BundleManifest, content_digest};
use crate::config::TrainConfig;
use crate::document::Document;
use crate::error::TrainError;
use crate::model::{
    ClassifierConfig, InferenceBackend, TextClassifier, TrainingBackend, argmax,
    categorical_cross_entropy, ids_tensor, rows_tensor,
};

/// Summary of a completed training run.
#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    pub bundle_id: Uuid,
    pub epochs_run: usize,
    /// Epoch whose weights were persisted.
    pub best_epoch: usize,
    /// Loss the early-stopping monitor saw at `best_epoch`; validation loss
    /// unless the validation split was empty.
    pub best_loss: f64,
    pub validation_accuracy: Option<f64>,
    pub vocabulary_size: usize,
    pub labels: Vec<String>,
    pub train_samples: usize,
    pub validation_samples: usize,
    pub skipped_documents: usize,
}

/// Loss and accuracy over a held-out set.
#[derive(Debug, Clone, Copy)]
struct Evaluation {
    loss: f64,
    accuracy: f64,
}

/// Result of the epoch loop: the best weights seen and where they came from.
struct FitOutcome {
    model: TextClassifier<InferenceBackend>,
    epochs_run: usize,
    best_epoch: usize,
    best_loss: f64,
    validation_accuracy: Option<f64>,
}

/// Trains a classifier and writes the bundle.
pub struct Trainer {
    config: TrainConfig,
    store: ArtifactStore,
}

impl Trainer {
    pub fn new(config: TrainConfig) -> Self {
        let store = ArtifactStore::new(config.artifact_dir.clone());
        Self { config, store }
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    /// Run the whole pipeline. Nothing is written unless every step
    /// succeeds.
    pub fn train(&self, documents: &[Document]) -> Result<TrainingReport, TrainError> {
        let cfg = &self.config;
        cfg.validate()
            .map_err(|e| TrainError::InvalidConfig(e.to_string()))?;

        info!(documents = documents.len(), "Preparing training corpus");
        let mut corpus = EncodedCorpus::build(documents, cfg.vocab_size, cfg.max_sequence_length)?;
        info!(
            samples = corpus.samples.len(),
            skipped = corpus.skipped,
            vocabulary = corpus.vocabulary.len(),
            labels = corpus.labels.len(),
            "Corpus encoded"
        );

        let mut rng = StdRng::seed_from_u64(cfg.seed);
        let samples = std::mem::take(&mut corpus.samples);
        let (train, validation) = split_train_val(samples, cfg.validation_fraction, &mut rng);

        let model_config =
            ClassifierConfig::from_params(corpus.vocabulary.len(), corpus.labels.len(), &cfg.model);
        let outcome = self.fit(&model_config, &train, &validation, corpus.labels.len(), &mut rng)?;

        let manifest = BundleManifest {
            format_version: BUNDLE_FORMAT_VERSION,
            bundle_id: Uuid::new_v4(),
            created_at: Utc::now(),
            max_sequence_length: cfg.max_sequence_length,
            vocabulary_size: corpus.vocabulary.len(),
            label_count: corpus.labels.len(),
            vocabulary_sha256: digest(&corpus.vocabulary)?,
            labels_sha256: digest(&corpus.labels)?,
            model: model_config,
            epochs_trained: outcome.epochs_run,
            best_validation_loss: (!validation.is_empty()).then_some(outcome.best_loss),
        };
        self.store
            .write(&manifest, &corpus.vocabulary, &corpus.labels, outcome.model)?;

        let report = TrainingReport {
            bundle_id: manifest.bundle_id,
            epochs_run: outcome.epochs_run,
            best_epoch: outcome.best_epoch,
            best_loss: outcome.best_loss,
            validation_accuracy: outcome.validation_accuracy,
            vocabulary_size: corpus.vocabulary.len(),
            labels: corpus.labels.iter().map(str::to_string).collect(),
            train_samples: train.len(),
            validation_samples: validation.len(),
            skipped_documents: corpus.skipped,
        };

        // Encoded copies of the corpus can be large next to the model on
        // small hosts; release them before handing back the report.
        drop(train);
        drop(validation);
        drop(corpus);

        info!(
            bundle_id = %report.bundle_id,
            epochs = report.epochs_run,
            best_epoch = report.best_epoch,
            "Training complete"
        );
        Ok(report)
    }

    fn fit(
        &self,
        model_config: &ClassifierConfig,
        train: &[Sample],
        validation: &[Sample],
        num_labels: usize,
        rng: &mut StdRng,
    ) -> Result<FitOutcome, TrainError> {
        let cfg = &self.config;
        let device = <TrainingBackend as Backend>::Device::default();
        <TrainingBackend as Backend>::seed(&device, cfg.seed);

        let mut model: TextClassifier<TrainingBackend> = model_config.init(&device);
        let mut optim = AdamConfig::new().init();

        let mut best: Option<(f64, usize, TextClassifier<InferenceBackend>, Option<f64>)> = None;
        let mut epochs_without_improvement = 0usize;
        let mut epochs_run = 0usize;

        for epoch in 1..=cfg.epochs {
            epochs_run = epoch;

            // ── Training pass ───────────────────────────────────────────
            let mut order: Vec<usize> = (0..train.len()).collect();
            order.shuffle(rng);

            let mut loss_sum = 0.0f64;
            let mut batches = 0usize;
            for chunk in order.chunks(cfg.batch_size) {
                let (inputs, targets) = batch_tensors::<TrainingBackend>(
                    train,
                    chunk,
                    cfg.max_sequence_length,
                    num_labels,
                    &device,
                );
                let loss = model.forward_loss(inputs, targets);
                loss_sum += loss.clone().into_scalar().elem::<f64>();
                batches += 1;

                let grads = GradientsParams::from_grads(loss.backward(), &model);
                model = optim.step(cfg.learning_rate, model, grads);
            }
            let train_loss = loss_sum / batches.max(1) as f64;

            // ── Validation pass (no autodiff, dropout off) ──────────────
            let snapshot = model.valid();
            let evaluation = if validation.is_empty() {
                None
            } else {
                Some(evaluate(&snapshot, validation, cfg, num_labels)?)
            };
            let monitored = evaluation.map_or(train_loss, |e| e.loss);

            info!(
                epoch,
                train_loss,
                val_loss = evaluation.map(|e| e.loss),
                val_accuracy = evaluation.map(|e| e.accuracy),
                "Epoch complete"
            );

            if best.as_ref().is_none_or(|(loss, ..)| monitored < *loss) {
                best = Some((monitored, epoch, snapshot, evaluation.map(|e| e.accuracy)));
                epochs_without_improvement = 0;
            } else {
                epochs_without_improvement += 1;
                debug!(epoch, epochs_without_improvement, "No improvement");
                if epochs_without_improvement >= cfg.patience {
                    info!(
                        epoch,
                        patience = cfg.patience,
                        "Early stopping: monitored loss stopped improving"
                    );
                    break;
                }
            }
        }

        let (best_loss, best_epoch, model, validation_accuracy) = best.ok_or_else(|| {
            TrainError::InvalidConfig("epochs must be at least 1".to_string())
        })?;
        Ok(FitOutcome {
            model,
            epochs_run,
            best_epoch,
            best_loss,
            validation_accuracy,
        })
    }
}

fn digest<T: Serialize>(value: &T) -> Result<String, TrainError> {
    content_digest(value).map_err(|e| TrainError::Computation(e.to_string()))
}

/// Mean loss and accuracy of `model` over `samples`.
fn evaluate(
    model: &TextClassifier<InferenceBackend>,
    samples: &[Sample],
    cfg: &TrainConfig,
    num_labels: usize,
) -> Result<Evaluation, TrainError> {
    let device = <InferenceBackend as Backend>::Device::default();
    let indices: Vec<usize> = (0..samples.len()).collect();

    let mut loss_sum = 0.0f64;
    let mut correct = 0usize;
    for chunk in indices.chunks(cfg.batch_size) {
        let (inputs, targets) = batch_tensors::<InferenceBackend>(
            samples,
            chunk,
            cfg.max_sequence_length,
            num_labels,
            &device,
        );
        let logits = model.forward(inputs);
        let batch_loss: f64 = categorical_cross_entropy(logits.clone(), targets)
            .into_scalar()
            .elem::<f64>();
        loss_sum += batch_loss * chunk.len() as f64;

        let values = logits
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| TrainError::Computation(format!("{e:?}")))?;
        correct += values
            .chunks(num_labels)
            .zip(chunk)
            .filter(|(row, i)| argmax(row) == Some(samples[**i].label))
            .count();
    }

    let total = samples.len().max(1) as f64;
    Ok(Evaluation {
        loss: loss_sum / total,
        accuracy: correct as f64 / total,
    })
}

/// Stack the selected samples into `[batch, seq_len]` ids and
/// `[batch, num_labels]` one-hot targets.
fn batch_tensors<B: Backend>(
    samples: &[Sample],
    indices: &[usize],
    seq_len: usize,
    num_labels: usize,
    device: &B::Device,
) -> (Tensor<B, 2, Int>, Tensor<B, 2>) {
    let mut ids = Vec::with_capacity(indices.len() * seq_len);
    let mut targets = Vec::with_capacity(indices.len() * num_labels);
    for &i in indices {
        ids.extend_from_slice(&samples[i].ids);
        targets.extend_from_slice(&samples[i].target);
    }
    (
        ids_tensor(&ids, indices.len(), seq_len, device),
        rows_tensor(&targets, indices.len(), num_labels, device),
    )
}
