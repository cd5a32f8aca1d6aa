// SPDX-License-Identifier: MIT OR Apache-2.0

//! Semantic photo search by brute-force cosine similarity.
//!
//! The query is translated (best effort), tokenized, encoded and normalized,
//! then scored against every stored vector of the same model.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::embedding::{
    cosine_similarity, l2_normalize, AssetId, ClipEncoder, EmbeddingStore, Tokenizer,
};
use crate::errors::SearchError;
use crate::translate::Translator;

/// A ranked photo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Identifier of the photo in the source library
    pub asset_id: AssetId,
    /// Cosine similarity to the query (-1.0 to 1.0); 0.0 means unranked
    pub score: f32,
}

/// Ranks indexed photos against text queries.
pub struct SearchEngine {
    encoder: Arc<ClipEncoder>,
    tokenizer: Arc<dyn Tokenizer>,
    translator: Option<Arc<dyn Translator>>,
    store: Arc<dyn EmbeddingStore>,
}

impl SearchEngine {
    pub fn new(
        encoder: Arc<ClipEncoder>,
        tokenizer: Arc<dyn Tokenizer>,
        store: Arc<dyn EmbeddingStore>,
    ) -> Self {
        Self {
            encoder,
            tokenizer,
            translator: None,
            store,
        }
    }

    /// Sets the translator applied to queries before encoding.
    pub fn with_translator(mut self, translator: Arc<dyn Translator>) -> Self {
        self.translator = Some(translator);
        self
    }

    /// Returns every indexed photo for `model_name`, most similar first.
    ///
    /// An empty (or all-whitespace) query lists every indexed photo with
    /// score 0 in store order. Equal scores keep store order.
    pub fn search(&self, query: &str, model_name: &str) -> Result<Vec<SearchResult>, SearchError> {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return Ok(self.list_unranked(model_name));
        }

        if model_name != self.encoder.model_name() {
            return Err(SearchError::ModelMismatch {
                requested: model_name.to_string(),
                loaded: self.encoder.model_name().to_string(),
            });
        }

        self.encoder.ensure_loaded()?;

        let text = self.prepare_query(trimmed);
        let tokens = self.tokenizer.tokenize(&text)?;
        let mut query_vector = self.encoder.encode_text(&tokens)?;
        l2_normalize(&mut query_vector);

        let snapshot = self.store.snapshot(model_name);
        let mut results = snapshot
            .iter()
            .map(|record| -> Result<SearchResult, SearchError> {
                Ok(SearchResult {
                    asset_id: record.asset_id.clone(),
                    score: cosine_similarity(&query_vector, &record.vector)?,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        // Stable sort: ties keep store enumeration order.
        results.sort_by(|a, b| b.score.total_cmp(&a.score));

        debug!(query = %text, model = model_name, results = results.len(), "search finished");
        Ok(results)
    }

    fn list_unranked(&self, model_name: &str) -> Vec<SearchResult> {
        self.store
            .snapshot(model_name)
            .iter()
            .map(|record| SearchResult {
                asset_id: record.asset_id.clone(),
                score: 0.0,
            })
            .collect()
    }

    /// Translates the query, falling back to the original text on failure.
    fn prepare_query(&self, query: &str) -> String {
        let Some(translator) = &self.translator else {
            return query.to_string();
        };
        match translator.translate(query) {
            Ok(translated) => {
                debug!(original = query, translated = %translated, "translated query");
                translated
            }
            Err(err) => {
                warn!(error = %err, "translation failed, searching with original text");
                query.to_string()
            }
        }
    }
}
