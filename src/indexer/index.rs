// SPDX-License-Identifier: MIT OR Apache-2.0

//! Incremental indexing: reconcile the photo library against the embedding store
//!
//! Only assets without a stored vector for the target model are fetched and
//! encoded, so re-running against an unchanged library costs no encoder work.

use indicatif::{ParallelProgressIterator, ProgressBar};
use once_cell::sync::OnceCell;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::embedding::vector::l2_norm;
use crate::embedding::{l2_normalize, AssetId, ClipEncoder, EmbeddingStore, PhotoEmbedding};
use crate::errors::{EncodeError, IndexError};
use crate::indexer::scanner::PhotoSource;

/// Options for an indexing pass
#[derive(Debug, Clone)]
pub struct IndexOptions {
    /// Remove stored embeddings whose asset no longer exists in the library
    pub evict_missing: bool,
    /// Worker threads for encoding (None = rayon default)
    pub threads: Option<usize>,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            evict_missing: true,
            threads: None,
        }
    }
}

/// Summary of one indexing pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    /// Model the pass indexed for
    pub model: String,
    /// Distinct assets visible in the library
    pub total_assets: usize,
    /// Assets skipped because they already had an embedding
    pub already_indexed: usize,
    /// Assets encoded and stored during this pass
    pub indexed: usize,
    /// Assets whose pixels could not be fetched
    pub unavailable: usize,
    /// Assets whose encoding failed (retried on the next pass)
    pub failed: usize,
    /// Stale embeddings removed because their asset disappeared
    pub evicted: usize,
    /// Library entries that could not be read; eviction is skipped when non-zero
    pub scan_errors: usize,
}

enum AssetOutcome {
    Indexed,
    Unavailable,
    Failed,
}

/// Brings an embedding store up to date with a photo source for one encoder.
pub struct IndexingPipeline {
    source: Arc<dyn PhotoSource>,
    encoder: Arc<ClipEncoder>,
    store: Arc<dyn EmbeddingStore>,
    options: IndexOptions,
    pass_lock: Mutex<()>,
}

impl IndexingPipeline {
    pub fn new(
        source: Arc<dyn PhotoSource>,
        encoder: Arc<ClipEncoder>,
        store: Arc<dyn EmbeddingStore>,
        options: IndexOptions,
    ) -> Self {
        Self {
            source,
            encoder,
            store,
            options,
            pass_lock: Mutex::new(()),
        }
    }

    pub fn options(&self) -> &IndexOptions {
        &self.options
    }

    /// Runs one pass for `model_name` without progress output.
    pub fn run(&self, model_name: &str) -> Result<IndexReport, IndexError> {
        self.run_with_progress(model_name, &ProgressBar::hidden())
    }

    /// Runs one pass, advancing `progress` once per pending asset.
    ///
    /// Passes are serialized: a pass started while another is running waits
    /// and then only sees what the first pass left unindexed.
    pub fn run_with_progress(
        &self,
        model_name: &str,
        progress: &ProgressBar,
    ) -> Result<IndexReport, IndexError> {
        if model_name != self.encoder.model_name() {
            return Err(IndexError::ModelMismatch {
                requested: model_name.to_string(),
                loaded: self.encoder.model_name().to_string(),
            });
        }

        let _pass = self.pass_lock.lock().unwrap_or_else(|e| e.into_inner());

        self.encoder.ensure_loaded()?;

        let listing = self.source.list_assets()?;
        let scan_errors = listing.errors;
        let assets = dedup_assets(listing.assets);
        let pending: Vec<&AssetId> = assets
            .iter()
            .filter(|id| !self.store.contains(id, model_name))
            .collect();

        let mut report = IndexReport {
            model: model_name.to_string(),
            total_assets: assets.len(),
            already_indexed: assets.len() - pending.len(),
            scan_errors,
            ..Default::default()
        };

        info!(
            model = model_name,
            total = report.total_assets,
            pending = pending.len(),
            "starting indexing pass"
        );

        progress.set_length(pending.len() as u64);
        let outcomes = self.encode_pending(&pending, model_name, progress)?;
        progress.finish_and_clear();

        for outcome in outcomes {
            match outcome {
                AssetOutcome::Indexed => report.indexed += 1,
                AssetOutcome::Unavailable => report.unavailable += 1,
                AssetOutcome::Failed => report.failed += 1,
            }
        }

        if self.options.evict_missing {
            if scan_errors == 0 {
                report.evicted = self.evict_missing(&assets, model_name);
            } else {
                warn!(
                    model = model_name,
                    scan_errors = scan_errors,
                    "library listing incomplete, keeping stored embeddings"
                );
            }
        }

        info!(
            model = model_name,
            indexed = report.indexed,
            unavailable = report.unavailable,
            failed = report.failed,
            evicted = report.evicted,
            "indexing pass finished"
        );

        Ok(report)
    }

    fn encode_pending(
        &self,
        pending: &[&AssetId],
        model_name: &str,
        progress: &ProgressBar,
    ) -> Result<Vec<AssetOutcome>, IndexError> {
        let dimension = OnceCell::new();
        if let Some(record) = self.store.snapshot(model_name).iter().next() {
            let _ = dimension.set(record.vector.len());
        }

        let work = || -> Vec<AssetOutcome> {
            pending
                .par_iter()
                .progress_with(progress.clone())
                .map(|id| self.index_asset(id, model_name, &dimension))
                .collect()
        };

        match self.options.threads {
            Some(threads) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build()
                    .map_err(|e| IndexError::ThreadPool(e.to_string()))?;
                Ok(pool.install(work))
            }
            None => Ok(work()),
        }
    }

    /// Encodes and stores one asset. `dimension` holds the vector length
    /// committed for the model, set by the first vector stored.
    fn index_asset(
        &self,
        asset_id: &str,
        model_name: &str,
        dimension: &OnceCell<usize>,
    ) -> AssetOutcome {
        let Some(pixels) = self
            .source
            .fetch_pixels(asset_id, self.encoder.target_image_size())
        else {
            debug!(asset = asset_id, "pixels unavailable, skipping");
            return AssetOutcome::Unavailable;
        };

        let vector = self
            .encoder
            .encode_image(&pixels)
            .and_then(|vector| unit_vector(vector, dimension));
        match vector {
            Ok(vector) => {
                self.store
                    .upsert(PhotoEmbedding::new(asset_id, model_name, vector));
                debug!(asset = asset_id, "indexed");
                AssetOutcome::Indexed
            }
            Err(err) => {
                log_encode_failure(asset_id, &err);
                AssetOutcome::Failed
            }
        }
    }

    fn evict_missing(&self, assets: &[AssetId], model_name: &str) -> usize {
        let visible: HashSet<&str> = assets.iter().map(String::as_str).collect();
        let stale: Vec<AssetId> = self
            .store
            .asset_ids(model_name)
            .into_iter()
            .filter(|id| !visible.contains(id.as_str()))
            .collect();
        if stale.is_empty() {
            return 0;
        }
        debug!(model = model_name, stale = stale.len(), "evicting stale embeddings");
        self.store.remove_many(&stale, model_name)
    }
}

fn log_encode_failure(asset_id: &str, err: &EncodeError) {
    warn!(asset = asset_id, error = %err, "failed to encode photo, will retry on next pass");
}

/// Normalizes a raw encoder output and checks it can be stored.
///
/// The result must be finite, unit length and match the model's dimension.
fn unit_vector(
    mut vector: Vec<f32>,
    dimension: &OnceCell<usize>,
) -> Result<Vec<f32>, EncodeError> {
    if vector.iter().any(|v| !v.is_finite()) {
        return Err(EncodeError::InvalidOutput(
            "embedding has non-finite values".to_string(),
        ));
    }

    l2_normalize(&mut vector);
    let norm = l2_norm(&vector);
    if !norm.is_finite() || (norm - 1.0).abs() > 1e-3 {
        return Err(EncodeError::InvalidOutput(format!(
            "embedding cannot be normalized (norm {})",
            norm
        )));
    }

    let expected = *dimension.get_or_init(|| vector.len());
    if vector.len() != expected {
        return Err(EncodeError::InvalidOutput(format!(
            "embedding has {} dimensions, model uses {}",
            vector.len(),
            expected
        )));
    }
    Ok(vector)
}

/// Drops repeated ids, keeping the first occurrence.
fn dedup_assets(assets: Vec<AssetId>) -> Vec<AssetId> {
    let mut seen = HashSet::with_capacity(assets.len());
    assets
        .into_iter()
        .filter(|id| seen.insert(id.clone()))
        .collect()
}
