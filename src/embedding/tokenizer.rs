// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query tokenization for the text encoder.
//!
//! [`ClipTokenizer`] loads the model's BPE vocabulary from a HuggingFace
//! `tokenizer.json`. [`ByteTokenizer`] needs no vocabulary and only suits
//! encoders that do not read CLIP ids, such as the dummy encoder.

use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};
use tokenizers::{
    PaddingDirection, PaddingParams, PaddingStrategy, TruncationDirection, TruncationParams,
    TruncationStrategy,
};
use tracing::{debug, info};

use crate::errors::TokenizeError;

/// Fixed-length token id sequence fed to the text encoder.
pub type TokenIds = Vec<u32>;

/// CLIP text context length.
pub const CONTEXT_LENGTH: usize = 77;

/// CLIP start-of-text token.
pub const START_TOKEN: u32 = 49406;

/// CLIP end-of-text token.
pub const END_TOKEN: u32 = 49407;

/// Trait for text tokenizers.
pub trait Tokenizer: Send + Sync {
    /// Converts `text` into token ids of the encoder's context length.
    fn tokenize(&self, text: &str) -> Result<TokenIds, TokenizeError>;
}

/// CLIP BPE tokenizer backed by a `tokenizer.json` file.
///
/// The file is read on first use, so indexing never needs it. Output is
/// truncated and zero-padded to the context length.
pub struct ClipTokenizer {
    path: PathBuf,
    context_length: usize,
    inner: OnceCell<tokenizers::Tokenizer>,
}

impl ClipTokenizer {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            context_length: CONTEXT_LENGTH,
            inner: OnceCell::new(),
        }
    }

    pub fn with_context_length(mut self, context_length: usize) -> Self {
        self.context_length = context_length.max(2);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tokenizer(&self) -> Result<&tokenizers::Tokenizer, TokenizeError> {
        self.inner.get_or_try_init(|| {
            debug!(path = %self.path.display(), "loading CLIP tokenizer");
            let mut tokenizer = tokenizers::Tokenizer::from_file(&self.path).map_err(|e| {
                TokenizeError(format!("failed to load {}: {}", self.path.display(), e))
            })?;

            tokenizer.with_padding(Some(PaddingParams {
                strategy: PaddingStrategy::Fixed(self.context_length),
                direction: PaddingDirection::Right,
                pad_to_multiple_of: None,
                pad_id: 0,
                pad_type_id: 0,
                pad_token: "[PAD]".to_string(),
            }));
            tokenizer
                .with_truncation(Some(TruncationParams {
                    max_length: self.context_length,
                    strategy: TruncationStrategy::LongestFirst,
                    stride: 0,
                    direction: TruncationDirection::Right,
                }))
                .map_err(|e| TokenizeError(format!("invalid truncation config: {}", e)))?;

            info!(path = %self.path.display(), "CLIP tokenizer loaded");
            Ok(tokenizer)
        })
    }
}

impl Tokenizer for ClipTokenizer {
    fn tokenize(&self, text: &str) -> Result<TokenIds, TokenizeError> {
        let encoding = self
            .tokenizer()?
            .encode(text, true)
            .map_err(|e| TokenizeError(e.to_string()))?;
        Ok(encoding.get_ids().to_vec())
    }
}

/// Byte-level tokenizer producing CLIP-shaped sequences.
///
/// Text is lowercased and whitespace-collapsed, every UTF-8 byte becomes one
/// id, and the sequence is wrapped in start/end tokens then zero-padded.
/// Truncation never splits a character. The ids are not CLIP vocabulary.
#[derive(Debug, Clone)]
pub struct ByteTokenizer {
    context_length: usize,
}

impl ByteTokenizer {
    pub fn new(context_length: usize) -> Self {
        Self {
            context_length: context_length.max(2),
        }
    }
}

impl Default for ByteTokenizer {
    fn default() -> Self {
        Self::new(CONTEXT_LENGTH)
    }
}

impl Tokenizer for ByteTokenizer {
    fn tokenize(&self, text: &str) -> Result<TokenIds, TokenizeError> {
        let cleaned = text
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();

        let body_len = self.context_length - 2;
        let mut end = 0;
        for (idx, ch) in cleaned.char_indices() {
            if idx + ch.len_utf8() > body_len {
                break;
            }
            end = idx + ch.len_utf8();
        }

        let mut ids = Vec::with_capacity(self.context_length);
        ids.push(START_TOKEN);
        ids.extend(cleaned[..end].bytes().map(u32::from));
        ids.push(END_TOKEN);
        ids.resize(self.context_length, 0);
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    /// Word-level vocabulary wrapped in CLIP start/end tokens.
    const TOKENIZER_JSON: &str = r#"{
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [],
        "normalizer": { "type": "Lowercase" },
        "pre_tokenizer": { "type": "WhitespaceSplit" },
        "post_processor": {
            "type": "TemplateProcessing",
            "single": [
                { "SpecialToken": { "id": "<|startoftext|>", "type_id": 0 } },
                { "Sequence": { "id": "A", "type_id": 0 } },
                { "SpecialToken": { "id": "<|endoftext|>", "type_id": 0 } }
            ],
            "pair": [
                { "Sequence": { "id": "A", "type_id": 0 } },
                { "Sequence": { "id": "B", "type_id": 1 } }
            ],
            "special_tokens": {
                "<|startoftext|>": { "id": "<|startoftext|>", "ids": [49406], "tokens": ["<|startoftext|>"] },
                "<|endoftext|>": { "id": "<|endoftext|>", "ids": [49407], "tokens": ["<|endoftext|>"] }
            }
        },
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": { "<unk>": 0, "a": 320, "dog": 1929, "red": 736, "apple": 3055 },
            "unk_token": "<unk>"
        }
    }"#;

    fn tokenizer_file(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("tokenizer.json");
        fs::write(&path, TOKENIZER_JSON).unwrap();
        path
    }

    #[test]
    fn test_clip_tokenizer_uses_vocabulary_ids() {
        let dir = TempDir::new().unwrap();
        let tokenizer = ClipTokenizer::new(tokenizer_file(&dir));

        let ids = tokenizer.tokenize("A Dog").unwrap();

        assert_eq!(ids.len(), CONTEXT_LENGTH);
        assert_eq!(&ids[..4], &[START_TOKEN, 320, 1929, END_TOKEN]);
        assert!(ids[4..].iter().all(|&id| id == 0));
    }

    #[test]
    fn test_clip_tokenizer_truncates_to_context() {
        let dir = TempDir::new().unwrap();
        let tokenizer = ClipTokenizer::new(tokenizer_file(&dir)).with_context_length(4);

        let ids = tokenizer.tokenize("red apple red apple red apple").unwrap();

        assert_eq!(ids.len(), 4);
        assert_eq!(ids[0], START_TOKEN);
    }

    #[test]
    fn test_clip_tokenizer_missing_file() {
        let dir = TempDir::new().unwrap();
        let tokenizer = ClipTokenizer::new(dir.path().join("missing.json"));
        assert!(tokenizer.tokenize("a dog").is_err());
    }

    #[test]
    fn test_byte_tokenizer_shape() {
        let ids = ByteTokenizer::default().tokenize("a dog").unwrap();
        assert_eq!(ids.len(), CONTEXT_LENGTH);
        assert_eq!(ids[0], START_TOKEN);
        assert_eq!(ids[6], END_TOKEN);
        assert!(ids[7..].iter().all(|&id| id == 0));
    }

    #[test]
    fn test_byte_tokenizer_normalizes_case_and_spacing() {
        let tokenizer = ByteTokenizer::default();
        assert_eq!(
            tokenizer.tokenize("  A   Dog\n").unwrap(),
            tokenizer.tokenize("a dog").unwrap()
        );
    }

    #[test]
    fn test_byte_tokenizer_keeps_characters_whole() {
        // Each Hangul syllable is three bytes; only one fits in four.
        let tokenizer = ByteTokenizer::new(6);
        let ids = tokenizer.tokenize("안녕").unwrap();

        let body: Vec<u8> = ids[1..]
            .iter()
            .take_while(|&&id| id != END_TOKEN)
            .map(|&id| id as u8)
            .collect();
        assert_eq!(String::from_utf8(body).unwrap(), "안");
        assert_eq!(ids.len(), 6);
    }
}
