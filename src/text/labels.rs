//! Ordered label set.

use serde::{Deserialize, Serialize};

/// Category names in first-occurrence order. Position `i` is the model's
/// output unit `i`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelSet {
    labels: Vec<String>,
}

impl LabelSet {
    /// Collect distinct labels, keeping the order in which they first appear.
    pub fn from_labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::default();
        for label in labels {
            let label = label.as_ref();
            if !set.labels.iter().any(|l| l == label) {
                set.labels.push(label.to_string());
            }
        }
        set
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn contains(&self, label: &str) -> bool {
        self.index_of(label).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }

    /// One-hot row for the label at `index`.
    pub fn one_hot(&self, index: usize) -> Vec<f32> {
        let mut row = vec![0.0; self.labels.len()];
        if let Some(slot) = row.get_mut(index) {
            *slot = 1.0;
        }
        row
    }

    /// True when no label is repeated. Checked when loading a bundle.
    pub fn is_distinct(&self) -> bool {
        self.labels
            .iter()
            .enumerate()
            .all(|(i, l)| !self.labels[..i].contains(l))
    }
}
