//! Text handling shared by training and inference.
//!
//! Both sides must tokenize identically, so everything that turns raw text
//! into ids lives here:
//! - `normalize`: lowercase, strip punctuation, split on whitespace
//! - `vocabulary`: bounded token → id table with reserved pad/OOV ids
//! - `encoder`: fixed-length id sequences
//! - `labels`: ordered label set backing the model's output layer

pub mod encoder;
pub mod labels;
pub mod normalize;
pub mod vocabulary;

pub use encoder::encode;
pub use labels::LabelSet;
pub use normalize::{normalize, tokenize};
pub use vocabulary::{OOV_ID, PAD_ID, Vocabulary};
