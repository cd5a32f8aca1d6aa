// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration file support for photogrep
//!
//! Loads configuration from .photogreprc.toml in the library root or current
//! directory, or ~/.config/photogrep/config.toml

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::embedding::{
    ByteTokenizer, ClipTokenizer, CommandEncoder, DummyEncoder, Encoder, Tokenizer,
    DEFAULT_EMBEDDING_DIM, DEFAULT_IMAGE_SIZE, DEFAULT_MODEL,
};
use crate::indexer::{IndexOptions, DEFAULT_EXTENSIONS};
use crate::translate::{CommandTranslator, Translator};

const CONFIG_FILE_NAME: &str = ".photogreprc.toml";

/// Encoder provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncoderProviderType {
    #[default]
    Command,
    Dummy,
}

/// Encoder configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Provider type (command, dummy)
    pub provider: Option<EncoderProviderType>,
    /// Model identifier stored alongside every embedding
    pub model: Option<String>,
    /// Command to execute for the command provider
    pub command: Option<String>,
    /// Square edge length the image path expects
    pub image_size: Option<u32>,
    /// Vector dimension for the dummy provider
    pub dimension: Option<usize>,
    /// HuggingFace tokenizer.json matching the text encoder
    pub tokenizer: Option<String>,
}

impl EncoderConfig {
    /// Get provider type (defaults to Command)
    pub fn provider(&self) -> EncoderProviderType {
        self.provider.unwrap_or_default()
    }

    /// Get model identifier (defaults to "MobileCLIP-S2")
    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    /// Get command (defaults to "clip-encoder")
    pub fn command(&self) -> &str {
        self.command.as_deref().unwrap_or("clip-encoder")
    }

    /// Get image size (defaults to 256)
    pub fn image_size(&self) -> u32 {
        self.image_size.unwrap_or(DEFAULT_IMAGE_SIZE)
    }

    /// Get dummy dimension (defaults to 512)
    pub fn dimension(&self) -> usize {
        self.dimension.unwrap_or(DEFAULT_EMBEDDING_DIM)
    }

    /// Get tokenizer path
    ///
    /// Defaults to ~/.config/photogrep/<model>_tokenizer.json
    pub fn tokenizer_path(&self) -> PathBuf {
        if let Some(path) = &self.tokenizer {
            return PathBuf::from(path);
        }
        let file_name = format!("{}_tokenizer.json", self.model());
        match dirs::home_dir() {
            Some(home) => home.join(".config").join("photogrep").join(file_name),
            None => PathBuf::from(file_name),
        }
    }

    /// Build the query tokenizer matching the configured encoder
    ///
    /// The dummy encoder does not read CLIP vocabulary, so it gets byte ids.
    pub fn build_tokenizer(&self) -> Arc<dyn Tokenizer> {
        match self.provider() {
            EncoderProviderType::Command => Arc::new(ClipTokenizer::new(self.tokenizer_path())),
            EncoderProviderType::Dummy => Arc::new(ByteTokenizer::default()),
        }
    }

    /// Build the configured encoder
    pub fn build(&self) -> Arc<dyn Encoder> {
        match self.provider() {
            EncoderProviderType::Command => Arc::new(
                CommandEncoder::new(self.command().to_string(), self.model().to_string())
                    .with_image_size(self.image_size()),
            ),
            EncoderProviderType::Dummy => Arc::new(
                DummyEncoder::new(self.dimension())
                    .with_model(self.model())
                    .with_image_size(self.image_size()),
            ),
        }
    }
}

/// Indexing configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// File extensions treated as photos
    pub extensions: Option<Vec<String>>,
    /// Drop embeddings whose photo left the library
    pub evict_missing: Option<bool>,
    /// Encoding worker threads
    pub threads: Option<usize>,
}

impl IndexConfig {
    /// Get extensions (defaults to common image formats)
    pub fn extensions(&self) -> Vec<String> {
        match &self.extensions {
            Some(exts) => exts.clone(),
            None => DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Get evict_missing (defaults to true)
    pub fn evict_missing(&self) -> bool {
        self.evict_missing.unwrap_or(true)
    }

    pub fn options(&self) -> IndexOptions {
        IndexOptions {
            evict_missing: self.evict_missing(),
            threads: self.threads.filter(|&n| n > 0),
        }
    }
}

/// Search configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Maximum number of results to print
    pub max_results: Option<usize>,
}

impl SearchConfig {
    /// Get max results (defaults to 20)
    pub fn max_results(&self) -> usize {
        self.max_results.unwrap_or(20)
    }
}

/// Query translation configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TranslatorConfig {
    /// Command that reads a query on stdin and prints its translation
    pub command: Option<String>,
}

impl TranslatorConfig {
    /// Build the configured translator, if any
    pub fn build(&self) -> Option<Arc<dyn Translator>> {
        let command = self.command.as_deref()?.trim();
        if command.is_empty() {
            return None;
        }
        Some(Arc::new(CommandTranslator::new(command)))
    }
}

/// Configuration loaded from .photogreprc.toml or ~/.config/photogrep/config.toml
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Encoder configuration
    pub encoder: EncoderConfig,

    /// Index configuration
    pub index: IndexConfig,

    /// Search configuration
    pub search: SearchConfig,

    /// Translator configuration
    pub translator: TranslatorConfig,
}

impl Config {
    /// Load configuration for the current directory
    pub fn load() -> Self {
        Self::load_for_dir(Path::new("."))
    }

    /// Load configuration for a photo library
    ///
    /// Precedence (highest to lowest):
    /// 1. .photogreprc.toml in the library root
    /// 2. .photogreprc.toml in current directory
    /// 3. ~/.config/photogrep/config.toml
    pub fn load_for_dir(root: &Path) -> Self {
        let mut candidates = vec![root.join(CONFIG_FILE_NAME), PathBuf::from(CONFIG_FILE_NAME)];
        if let Some(home) = dirs::home_dir() {
            candidates.push(home.join(".config").join("photogrep").join("config.toml"));
        }

        candidates
            .iter()
            .find_map(|path| Self::load_from_path(path))
            .unwrap_or_default()
    }

    fn load_from_path(path: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        match toml::from_str(&content) {
            Ok(config) => Some(config),
            Err(e) => {
                eprintln!("Warning: Failed to parse {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Merge CLI limit with config (CLI wins)
    pub fn merge_max_results(&self, cli_value: Option<usize>) -> usize {
        cli_value.unwrap_or_else(|| self.search.max_results())
    }

    /// Get the encoder configuration
    pub fn encoder(&self) -> &EncoderConfig {
        &self.encoder
    }

    /// Get the index configuration
    pub fn index(&self) -> &IndexConfig {
        &self.index
    }

    /// Get the search configuration
    pub fn search(&self) -> &SearchConfig {
        &self.search
    }

    /// Get the translator configuration
    pub fn translator(&self) -> &TranslatorConfig {
        &self.translator
    }
}
