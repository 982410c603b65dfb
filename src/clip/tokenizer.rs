//! Vocabulary tokenizer for the CLIP text encoder.
//!
//! Uses the vocabulary from the model's `tokenizer.json`. Words found whole
//! (`word</w>`) map to one token; other words are split greedily into the
//! longest known pieces. This matches BPE output for the short prompts the
//! detectors use.

use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;

/// Maximum sequence length of the text encoder.
pub const CONTEXT_LEN: usize = 77;
const START_TOKEN: i64 = 49406;
const END_TOKEN: i64 = 49407;
const END_OF_WORD: &str = "</w>";

pub struct Tokenizer {
    vocab: HashMap<String, i64>,
}

impl Tokenizer {
    pub fn new(vocab: HashMap<String, i64>) -> Self {
        Self { vocab }
    }

    /// Read the vocabulary of a Hugging Face `tokenizer.json`.
    pub fn from_json(content: &str) -> Result<Self> {
        let json: serde_json::Value = serde_json::from_str(content).context("Invalid tokenizer JSON")?;
        let entries = json
            .pointer("/model/vocab")
            .and_then(|v| v.as_object())
            .ok_or_else(|| anyhow!("tokenizer.json has no model.vocab"))?;

        let vocab: HashMap<String, i64> = entries
            .iter()
            .filter_map(|(token, id)| id.as_i64().map(|id| (token.clone(), id)))
            .collect();
        if vocab.is_empty() {
            return Err(anyhow!("tokenizer vocabulary is empty"));
        }
        Ok(Self::new(vocab))
    }

    /// Token ids framed by start/end tokens and zero-padded to
    /// [`CONTEXT_LEN`].
    pub fn encode(&self, text: &str) -> Vec<i64> {
        let mut ids = Vec::with_capacity(CONTEXT_LEN);
        ids.push(START_TOKEN);

        for word in split_words(&text.to_lowercase()) {
            self.encode_word(word, &mut ids);
        }

        ids.truncate(CONTEXT_LEN - 1);
        ids.push(END_TOKEN);
        ids.resize(CONTEXT_LEN, 0);
        ids
    }

    fn encode_word(&self, word: &str, ids: &mut Vec<i64>) {
        if let Some(id) = self.vocab.get(&format!("{}{}", word, END_OF_WORD)) {
            ids.push(*id);
            return;
        }

        let boundaries: Vec<usize> = word.char_indices().map(|(i, _)| i).chain([word.len()]).collect();
        let mut start = 0;
        while start < boundaries.len() - 1 {
            let found = (start + 1..boundaries.len()).rev().find_map(|end| {
                let piece = &word[boundaries[start]..boundaries[end]];
                let key = if end == boundaries.len() - 1 {
                    format!("{}{}", piece, END_OF_WORD)
                } else {
                    piece.to_string()
                };
                self.vocab.get(&key).map(|id| (end, *id))
            });

            match found {
                Some((end, id)) => {
                    ids.push(id);
                    start = end;
                }
                // Unknown character
                None => start += 1,
            }
        }
    }
}

/// Split into runs of letters/digits and single punctuation characters.
fn split_words(text: &str) -> Vec<&str> {
    let mut words = Vec::new();
    let mut word_start = None;

    for (i, c) in text.char_indices() {
        if c.is_alphanumeric() {
            word_start.get_or_insert(i);
            continue;
        }
        if let Some(start) = word_start.take() {
            words.push(&text[start..i]);
        }
        if !c.is_whitespace() {
            words.push(&text[i..i + c.len_utf8()]);
        }
    }
    if let Some(start) = word_start {
        words.push(&text[start..]);
    }
    words
}
