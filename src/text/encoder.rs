//! Text → fixed-length id sequence.

use super::normalize::tokenize;
use super::vocabulary::{PAD_ID, Vocabulary};

/// Encode `text` into exactly `max_len` ids.
///
/// Tokens beyond `max_len` are cut from the end; short sequences are padded
/// on the right with [`PAD_ID`]. Unknown tokens become the OOV id.
pub fn encode(text: &str, vocabulary: &Vocabulary, max_len: usize) -> Vec<u32> {
    let mut ids: Vec<u32> = tokenize(text)
        .iter()
        .take(max_len)
        .map(|token| vocabulary.id_of(token))
        .collect();
    ids.resize(max_len, PAD_ID);
    ids
}
