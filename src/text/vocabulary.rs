//! Bounded token → id table.
//!
//! Ids `0` and `1` are reserved for padding and out-of-vocabulary tokens.
//! Learned tokens get ids `2..` in rank order: descending corpus frequency,
//! ties broken by ascending token string so the same corpus always yields
//! the same table.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use super::normalize::tokenize;
use crate::error::TrainError;

/// Padding id. Never assigned to a learned token.
pub const PAD_ID: u32 = 0;
/// Id for any token missing from the vocabulary.
pub const OOV_ID: u32 = 1;

/// Placeholder names for the reserved ids. Normalization strips `<` and
/// `>`, so no corpus token can collide with them.
pub const PAD_TOKEN: &str = "<pad>";
pub const OOV_TOKEN: &str = "<oov>";

const RESERVED: usize = 2;

/// Immutable vocabulary built once per training run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, u32>", into = "BTreeMap<String, u32>")]
pub struct Vocabulary {
    /// Token for each id, indexed by id.
    tokens: Vec<String>,
    index: HashMap<String, u32>,
}

impl Vocabulary {
    /// Build a vocabulary of at most `max_size` entries (reserved ids
    /// included) from a corpus of raw texts.
    pub fn build<I, S>(texts: I, max_size: usize) -> Result<Self, TrainError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if max_size <= RESERVED {
            return Err(TrainError::InvalidConfig(format!(
                "vocabulary size must exceed {RESERVED}, got {max_size}"
            )));
        }

        let mut counts: HashMap<String, usize> = HashMap::new();
        let mut documents = 0usize;
        for text in texts {
            documents += 1;
            for token in tokenize(text.as_ref()) {
                *counts.entry(token).or_insert(0) += 1;
            }
        }
        if documents == 0 {
            return Err(TrainError::NoTrainingData(
                "cannot build a vocabulary from an empty corpus".to_string(),
            ));
        }

        let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
        ranked.sort_by(|(a_tok, a_n), (b_tok, b_n)| b_n.cmp(a_n).then_with(|| a_tok.cmp(b_tok)));
        ranked.truncate(max_size - RESERVED);

        let mut tokens = Vec::with_capacity(ranked.len() + RESERVED);
        tokens.push(PAD_TOKEN.to_string());
        tokens.push(OOV_TOKEN.to_string());
        tokens.extend(ranked.into_iter().map(|(token, _)| token));

        tracing::debug!(
            documents,
            size = tokens.len(),
            max_size,
            "Built vocabulary"
        );
        Ok(Self::from_tokens(tokens))
    }

    fn from_tokens(tokens: Vec<String>) -> Self {
        let index = tokens
            .iter()
            .enumerate()
            .map(|(id, token)| (token.clone(), id as u32))
            .collect();
        Self { tokens, index }
    }

    /// Number of ids, reserved ones included.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// `build` and deserialization both insert the pad and OOV entries, so
    /// a vocabulary obtained through them is never empty.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Id for `token`, or [`OOV_ID`] when unknown. Expects a normalized token.
    pub fn id_of(&self, token: &str) -> u32 {
        match self.index.get(token) {
            Some(&id) if id > OOV_ID => id,
            _ => OOV_ID,
        }
    }

    pub fn token(&self, id: u32) -> Option<&str> {
        self.tokens.get(id as usize).map(String::as_str)
    }

    /// Learned tokens in id order (reserved entries skipped).
    pub fn learned_tokens(&self) -> impl Iterator<Item = &str> {
        self.tokens[RESERVED..].iter().map(String::as_str)
    }
}

impl From<Vocabulary> for BTreeMap<String, u32> {
    fn from(vocab: Vocabulary) -> Self {
        vocab.index.into_iter().collect()
    }
}

impl TryFrom<BTreeMap<String, u32>> for Vocabulary {
    type Error = String;

    /// Accept a persisted token → id map only if ids are exactly `0..n` and
    /// the reserved ids carry their placeholder names.
    fn try_from(map: BTreeMap<String, u32>) -> Result<Self, Self::Error> {
        let mut tokens: Vec<Option<String>> = vec![None; map.len()];
        for (token, id) in map {
            let slot = tokens
                .get_mut(id as usize)
                .ok_or_else(|| format!("id {id} for {token:?} is out of range"))?;
            if slot.is_some() {
                return Err(format!("id {id} assigned twice"));
            }
            *slot = Some(token);
        }
        let tokens: Vec<String> = tokens
            .into_iter()
            .collect::<Option<_>>()
            .ok_or_else(|| "ids are not contiguous".to_string())?;

        if tokens.get(PAD_ID as usize).map(String::as_str) != Some(PAD_TOKEN)
            || tokens.get(OOV_ID as usize).map(String::as_str) != Some(OOV_TOKEN)
        {
            return Err("reserved ids 0 and 1 must be <pad> and <oov>".to_string());
        }
        Ok(Self::from_tokens(tokens))
    }
}
