//! Encoded training corpus.

use crate::document::Document;
use crate::error::TrainError;
use crate::text::{LabelSet, Vocabulary, encode, tokenize};

/// One encoded, labelled document.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Exactly `max_sequence_length` ids.
    pub ids: Vec<u32>,
    /// Index into the label set.
    pub label: usize,
    /// One-hot target sized to the label set.
    pub target: Vec<f32>,
}

/// Everything the fit loop needs, derived from one document collection.
#[derive(Debug, Clone)]
pub struct EncodedCorpus {
    pub vocabulary: Vocabulary,
    pub labels: LabelSet,
    pub samples: Vec<Sample>,
    pub max_sequence_length: usize,
    /// Documents dropped for a missing label or empty content.
    pub skipped: usize,
}

impl EncodedCorpus {
    /// Drop unusable documents, build the vocabulary and label set, and
    /// encode what is left.
    pub fn build(
        documents: &[Document],
        vocab_size: usize,
        max_sequence_length: usize,
    ) -> Result<Self, TrainError> {
        let mut usable: Vec<(&str, &str)> = Vec::with_capacity(documents.len());
        let mut skipped = 0usize;
        for (index, doc) in documents.iter().enumerate() {
            let Some(label) = doc.label.as_deref().filter(|l| !l.trim().is_empty()) else {
                tracing::warn!(index, "Skipping training document without a label");
                skipped += 1;
                continue;
            };
            if tokenize(&doc.text).is_empty() {
                tracing::warn!(index, label, "Skipping training document with empty content");
                skipped += 1;
                continue;
            }
            usable.push((doc.text.as_str(), label));
        }

        if usable.is_empty() {
            return Err(TrainError::NoTrainingData(format!(
                "none of {} documents had a label and non-empty content",
                documents.len()
            )));
        }

        let vocabulary = Vocabulary::build(usable.iter().map(|(text, _)| *text), vocab_size)?;
        let labels = LabelSet::from_labels(usable.iter().map(|(_, label)| *label));

        let samples = usable
            .iter()
            .map(|(text, label)| {
                // Every label came from `usable`, so the lookup cannot miss.
                let label = labels.index_of(label).unwrap_or_default();
                Sample {
                    ids: encode(text, &vocabulary, max_sequence_length),
                    label,
                    target: labels.one_hot(label),
                }
            })
            .collect();

        Ok(Self {
            vocabulary,
            labels,
            samples,
            max_sequence_length,
            skipped,
        })
    }
}
