//! Recurrent text classifier.
//!
//! Embedding → bidirectional LSTM (final forward and backward hidden states
//! concatenated) → dropout → dense + ReLU → dense over the label set.
//!
//! All burn code for the network lives here. Training and inference only
//! see `ClassifierConfig`, `TextClassifier` and the backend aliases.

use burn::{
    nn::{
        BiLstm, BiLstmConfig, Dropout, DropoutConfig, Embedding, EmbeddingConfig, Linear,
        LinearConfig,
    },
    prelude::*,
    tensor::activation::{log_softmax, relu, softmax},
};

use crate::config::ModelParams;

/// CPU backend used for serving and for validation passes.
pub type InferenceBackend = burn::backend::NdArray;
/// `InferenceBackend` with gradient tracking, used while fitting.
pub type TrainingBackend = burn::backend::Autodiff<InferenceBackend>;

/// Architecture of the classifier. Persisted in the bundle manifest so the
/// exact network can be rebuilt before loading weights.
// `#[derive(Config)]` already provides Clone and serde impls.
#[derive(Config, Debug)]
pub struct ClassifierConfig {
    /// Vocabulary size, reserved ids included.
    pub vocab_size: usize,
    /// Number of output units, one per label.
    pub num_labels: usize,
    #[config(default = 64)]
    pub embedding_dim: usize,
    /// Hidden size of each LSTM direction.
    #[config(default = 64)]
    pub lstm_units: usize,
    #[config(default = 64)]
    pub dense_units: usize,
    #[config(default = 0.5)]
    pub dropout: f64,
}

impl ClassifierConfig {
    /// Config for a vocabulary/label set pair with the given layer sizes.
    pub fn from_params(vocab_size: usize, num_labels: usize, params: &ModelParams) -> Self {
        Self::new(vocab_size, num_labels)
            .with_embedding_dim(params.embedding_dim)
            .with_lstm_units(params.lstm_units)
            .with_dense_units(params.dense_units)
            .with_dropout(params.dropout)
    }

    /// Build a freshly initialized network. Seed the backend first for
    /// reproducible weights.
    pub fn init<B: Backend>(&self, device: &B::Device) -> TextClassifier<B> {
        TextClassifier {
            embedding: EmbeddingConfig::new(self.vocab_size, self.embedding_dim).init(device),
            encoder: BiLstmConfig::new(self.embedding_dim, self.lstm_units, true).init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
            hidden: LinearConfig::new(2 * self.lstm_units, self.dense_units).init(device),
            output: LinearConfig::new(self.dense_units, self.num_labels).init(device),
        }
    }
}

#[derive(Module, Debug)]
pub struct TextClassifier<B: Backend> {
    embedding: Embedding<B>,
    encoder: BiLstm<B>,
    dropout: Dropout,
    hidden: Linear<B>,
    output: Linear<B>,
}

impl<B: Backend> TextClassifier<B> {
    /// input_ids: [batch, seq_len] → logits: [batch, num_labels]
    pub fn forward(&self, input_ids: Tensor<B, 2, Int>) -> Tensor<B, 2> {
        let [batch_size, _] = input_ids.dims();

        let embedded = self.embedding.forward(input_ids); // [batch, seq_len, embedding_dim]

        // Final hidden state per direction: [2, batch, lstm_units].
        let (_, state) = self.encoder.forward(embedded, None);
        let [_, _, units] = state.hidden.dims();
        let features = state
            .hidden
            .swap_dims(0, 1)
            .reshape([batch_size, 2 * units]); // [forward | backward]

        let x = self.dropout.forward(features);
        let x = relu(self.hidden.forward(x));
        self.output.forward(x)
    }

    /// Probability distribution over labels: [batch, num_labels].
    pub fn forward_probabilities(&self, input_ids: Tensor<B, 2, Int>) -> Tensor<B, 2> {
        softmax(self.forward(input_ids), 1)
    }

    /// Mean categorical cross-entropy against one-hot targets.
    pub fn forward_loss(&self, input_ids: Tensor<B, 2, Int>, targets: Tensor<B, 2>) -> Tensor<B, 1> {
        categorical_cross_entropy(self.forward(input_ids), targets)
    }
}

/// `-mean(sum(one_hot * log_softmax(logits)))` over the batch.
pub fn categorical_cross_entropy<B: Backend>(
    logits: Tensor<B, 2>,
    one_hot: Tensor<B, 2>,
) -> Tensor<B, 1> {
    (log_softmax(logits, 1) * one_hot).sum_dim(1).mean().neg()
}

/// Build an id tensor of shape [rows, seq_len] from row-major ids.
pub fn ids_tensor<B: Backend>(
    ids: &[u32],
    rows: usize,
    seq_len: usize,
    device: &B::Device,
) -> Tensor<B, 2, Int> {
    let flat: Vec<i32> = ids.iter().map(|&id| id as i32).collect();
    Tensor::<B, 1, Int>::from_ints(flat.as_slice(), device).reshape([rows, seq_len])
}

/// Build a float tensor of shape [rows, cols] from row-major values.
pub fn rows_tensor<B: Backend>(
    values: &[f32],
    rows: usize,
    cols: usize,
    device: &B::Device,
) -> Tensor<B, 2> {
    Tensor::<B, 1>::from_floats(values, device).reshape([rows, cols])
}

/// Index of the largest value; ties go to the lowest index. `None` for an
/// empty slice or when any value is NaN.
pub fn argmax(values: &[f32]) -> Option<usize> {
    if values.iter().any(|v| v.is_nan()) {
        return None;
    }
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in values.iter().enumerate() {
        if best.is_none_or(|(_, b)| v > b) {
            best = Some((i, v));
        }
    }
    best.map(|(i, _)| i)
}
