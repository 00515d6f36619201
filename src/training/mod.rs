//! Offline training: corpus → vocabulary/labels → fitted model → bundle.
//!
//! Strictly sequential. Run it to completion before starting the server
//! against the same artifact directory.

pub mod corpus;
pub mod dataset;
pub mod split;
pub mod trainer;

pub use corpus::{collect_from_source, load_jsonl};
pub use dataset::{EncodedCorpus, Sample};
pub use split::split_train_val;
pub use trainer::{Trainer, TrainingReport};
