// SPDX-License-Identifier: MIT OR Apache-2.0

//! Presentation-facing facade over indexing and search.
//!
//! Owns one encoder, one store and one photo source. Indexing and search may
//! run concurrently; search always sees the store's committed state.

use indicatif::ProgressBar;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::embedding::{ClipEncoder, EmbeddingStore, Tokenizer};
use crate::errors::{IndexError, SearchError};
use crate::indexer::{IndexOptions, IndexReport, IndexingPipeline, PhotoSource};
use crate::publish::{RankedResults, ResultPublisher};
use crate::search::SearchEngine;
use crate::translate::Translator;

/// Coarse indexing status for progress display
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum IndexStatus {
    Idle,
    LoadingModel,
    Indexing,
    Ready,
    Failed(String),
}

impl std::fmt::Display for IndexStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexStatus::Idle => write!(f, "idle"),
            IndexStatus::LoadingModel => write!(f, "loading model"),
            IndexStatus::Indexing => write!(f, "indexing"),
            IndexStatus::Ready => write!(f, "ready"),
            IndexStatus::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Builder for [`PhotoSearch`]
pub struct PhotoSearchBuilder {
    source: Arc<dyn PhotoSource>,
    encoder: Arc<ClipEncoder>,
    store: Arc<dyn EmbeddingStore>,
    tokenizer: Arc<dyn Tokenizer>,
    translator: Option<Arc<dyn Translator>>,
    options: IndexOptions,
}

impl PhotoSearchBuilder {
    pub fn with_translator(mut self, translator: Arc<dyn Translator>) -> Self {
        self.translator = Some(translator);
        self
    }

    pub fn with_index_options(mut self, options: IndexOptions) -> Self {
        self.options = options;
        self
    }

    pub fn build(self) -> PhotoSearch {
        let pipeline = IndexingPipeline::new(
            Arc::clone(&self.source),
            Arc::clone(&self.encoder),
            Arc::clone(&self.store),
            self.options,
        );

        let mut engine = SearchEngine::new(
            Arc::clone(&self.encoder),
            self.tokenizer,
            Arc::clone(&self.store),
        );
        if let Some(translator) = self.translator {
            engine = engine.with_translator(translator);
        }

        let (status, _) = watch::channel(IndexStatus::Idle);

        PhotoSearch {
            encoder: self.encoder,
            store: self.store,
            pipeline,
            engine,
            publisher: ResultPublisher::new(),
            next_seq: AtomicU64::new(1),
            status,
            active_passes: Mutex::new(0),
            last_report: Mutex::new(None),
        }
    }
}

/// Photo search service: indexing, ranked search and progress reporting.
pub struct PhotoSearch {
    encoder: Arc<ClipEncoder>,
    store: Arc<dyn EmbeddingStore>,
    pipeline: IndexingPipeline,
    engine: SearchEngine,
    publisher: ResultPublisher,
    next_seq: AtomicU64,
    status: watch::Sender<IndexStatus>,
    /// Passes started and not yet finished. Guards every status change made
    /// when a pass ends.
    active_passes: Mutex<usize>,
    last_report: Mutex<Option<IndexReport>>,
}

impl PhotoSearch {
    pub fn builder(
        source: Arc<dyn PhotoSource>,
        encoder: Arc<ClipEncoder>,
        store: Arc<dyn EmbeddingStore>,
        tokenizer: Arc<dyn Tokenizer>,
    ) -> PhotoSearchBuilder {
        PhotoSearchBuilder {
            source,
            encoder,
            store,
            tokenizer,
            translator: None,
            options: IndexOptions::default(),
        }
    }

    /// Model the service encodes with.
    pub fn model_name(&self) -> &str {
        self.encoder.model_name()
    }

    /// Runs one indexing pass for `model_name`.
    pub fn trigger_indexing(&self, model_name: &str) -> Result<IndexReport, IndexError> {
        self.trigger_indexing_with_progress(model_name, &ProgressBar::hidden())
    }

    /// Runs one indexing pass, reporting per-asset progress on `progress`.
    ///
    /// Status only turns `Ready` when no other pass is still running.
    pub fn trigger_indexing_with_progress(
        &self,
        model_name: &str,
        progress: &ProgressBar,
    ) -> Result<IndexReport, IndexError> {
        *self.lock_passes() += 1;
        let result = self.run_pass(model_name, progress);

        let mut active = self.lock_passes();
        *active -= 1;
        match &result {
            Ok(report) => {
                *self.lock_report() = Some(report.clone());
                if *active == 0 {
                    self.set_status(IndexStatus::Ready);
                } else {
                    debug!(active = *active, "pass finished while another is running");
                }
            }
            Err(err) => self.set_status(IndexStatus::Failed(err.to_string())),
        }
        result
    }

    fn run_pass(
        &self,
        model_name: &str,
        progress: &ProgressBar,
    ) -> Result<IndexReport, IndexError> {
        if !self.encoder.is_ready() {
            self.set_status(IndexStatus::LoadingModel);
            self.encoder.ensure_loaded()?;
        }

        self.set_status(IndexStatus::Indexing);
        self.pipeline.run_with_progress(model_name, progress)
    }

    /// Searches and publishes the ranking.
    ///
    /// A failed search publishes nothing, so subscribers keep the last good
    /// result set. A search overtaken by a later one returns its results but
    /// does not replace the later set.
    pub fn search(&self, query: &str, model_name: &str) -> Result<RankedResults, SearchError> {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let results = match self.engine.search(query, model_name) {
            Ok(results) => results,
            Err(err) => {
                warn!(seq, error = %err, "search failed, keeping previous results");
                return Err(err);
            }
        };

        let ranked = RankedResults {
            seq,
            query: query.to_string(),
            results,
        };
        if !self.publisher.publish(ranked.clone()) {
            debug!(seq, "discarded stale search completion");
        }
        Ok(ranked)
    }

    /// Number of indexed photos for `model_name`.
    pub fn indexed_count(&self, model_name: &str) -> usize {
        self.store.count(model_name)
    }

    pub fn status(&self) -> IndexStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<IndexStatus> {
        self.status.subscribe()
    }

    /// Report of the most recent successful pass.
    pub fn last_report(&self) -> Option<IndexReport> {
        self.lock_report().clone()
    }

    /// Latest published result set.
    pub fn latest(&self) -> RankedResults {
        self.publisher.latest()
    }

    pub fn subscribe(&self) -> watch::Receiver<RankedResults> {
        self.publisher.subscribe()
    }

    fn set_status(&self, status: IndexStatus) {
        self.status.send_replace(status);
    }

    fn lock_passes(&self) -> MutexGuard<'_, usize> {
        self.active_passes.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_report(&self) -> MutexGuard<'_, Option<IndexReport>> {
        self.last_report.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{
        ByteTokenizer, DummyEncoder, Encoder, InMemoryEmbeddingStore, PixelBuffer, TokenIds,
    };
    use crate::errors::{EncodeError, LoadError, SourceError};
    use crate::indexer::AssetListing;
    use crate::search::SearchResult;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    const MODEL: &str = "MobileCLIP-S2";

    struct StaticLibrary(Mutex<Vec<String>>);

    impl StaticLibrary {
        fn new(ids: &[&str]) -> Self {
            Self(Mutex::new(ids.iter().map(|s| s.to_string()).collect()))
        }

        fn set_assets(&self, ids: &[&str]) {
            *self.0.lock().unwrap() = ids.iter().map(|s| s.to_string()).collect();
        }
    }

    impl PhotoSource for StaticLibrary {
        fn list_assets(&self) -> Result<AssetListing, SourceError> {
            Ok(self.0.lock().unwrap().clone().into())
        }

        fn fetch_pixels(&self, asset_id: &str, target_size: u32) -> Option<PixelBuffer> {
            Some(PixelBuffer::new(target_size, 1, asset_id.as_bytes().to_vec()))
        }
    }

    /// Text path fails for queries containing the byte of '!'.
    struct PickyEncoder(DummyEncoder);

    impl Encoder for PickyEncoder {
        fn model_name(&self) -> &str {
            self.0.model_name()
        }

        fn load(&self) -> Result<(), LoadError> {
            self.0.load()
        }

        fn encode_image(&self, pixels: &PixelBuffer) -> Result<Vec<f32>, EncodeError> {
            self.0.encode_image(pixels)
        }

        fn encode_text(&self, tokens: &TokenIds) -> Result<Vec<f32>, EncodeError> {
            if tokens.contains(&u32::from(b'!')) {
                return Err(EncodeError::Failed("rejected".to_string()));
            }
            self.0.encode_text(tokens)
        }
    }

    /// Image path announces each asset, then blocks until given a permit.
    struct GatedEncoder {
        entered: Mutex<mpsc::Sender<String>>,
        permits: Mutex<mpsc::Receiver<()>>,
    }

    impl Encoder for GatedEncoder {
        fn model_name(&self) -> &str {
            MODEL
        }

        fn load(&self) -> Result<(), LoadError> {
            Ok(())
        }

        fn encode_image(&self, pixels: &PixelBuffer) -> Result<Vec<f32>, EncodeError> {
            let id = String::from_utf8_lossy(&pixels.data).into_owned();
            let _ = self.entered.lock().unwrap().send(id);
            self.permits
                .lock()
                .unwrap()
                .recv()
                .map_err(|_| EncodeError::Failed("gate closed".to_string()))?;
            Ok(vec![1.0, 0.0])
        }

        fn encode_text(&self, _tokens: &TokenIds) -> Result<Vec<f32>, EncodeError> {
            Ok(vec![1.0, 0.0])
        }
    }

    fn service() -> PhotoSearch {
        let library = Arc::new(StaticLibrary::new(&["apple.jpg", "banana.jpg", "otter.jpg"]));
        let encoder = PickyEncoder(DummyEncoder::new(32).with_model(MODEL));
        PhotoSearch::builder(
            library,
            Arc::new(ClipEncoder::new(Arc::new(encoder))),
            Arc::new(InMemoryEmbeddingStore::new()),
            Arc::new(ByteTokenizer::default()),
        )
        .build()
    }

    #[test]
    fn test_indexing_updates_status_and_count() {
        let service = service();
        assert_eq!(service.status(), IndexStatus::Idle);
        assert_eq!(service.indexed_count(MODEL), 0);

        let report = service.trigger_indexing(MODEL).unwrap();

        assert_eq!(report.indexed, 3);
        assert_eq!(service.status(), IndexStatus::Ready);
        assert_eq!(service.indexed_count(MODEL), 3);
        assert_eq!(service.last_report(), Some(report));
    }

    #[test]
    fn test_failed_index_sets_failed_status() {
        let service = service();
        let err = service.trigger_indexing("other-model").unwrap_err();
        assert!(matches!(err, IndexError::ModelMismatch { .. }));
        assert!(matches!(service.status(), IndexStatus::Failed(_)));
    }

    #[test]
    fn test_search_publishes_with_increasing_sequence() {
        let service = service();
        service.trigger_indexing(MODEL).unwrap();

        let first = service.search("red fruit", MODEL).unwrap();
        let second = service.search("", MODEL).unwrap();

        assert!(second.seq > first.seq);
        assert_eq!(first.results.len(), 3);
        assert_eq!(second.results.len(), service.indexed_count(MODEL));
        assert!(second.results.iter().all(|r: &SearchResult| r.score == 0.0));
        assert_eq!(service.latest(), second);
    }

    #[test]
    fn test_failed_search_keeps_previous_results() {
        let service = service();
        service.trigger_indexing(MODEL).unwrap();

        let good = service.search("otter", MODEL).unwrap();
        assert!(service.search("otter!", MODEL).is_err());

        assert_eq!(service.latest(), good);
    }

    #[test]
    fn test_search_before_indexing_is_empty() {
        let service = service();
        let ranked = service.search("otter", MODEL).unwrap();
        assert!(ranked.results.is_empty());
    }

    #[test]
    fn test_status_stays_indexing_while_a_pass_is_running() {
        let library = Arc::new(StaticLibrary::new(&["a.jpg"]));
        let (entered_tx, entered) = mpsc::channel();
        let (permit, permits) = mpsc::channel();
        let encoder = GatedEncoder {
            entered: Mutex::new(entered_tx),
            permits: Mutex::new(permits),
        };
        let service = PhotoSearch::builder(
            library.clone(),
            Arc::new(ClipEncoder::new(Arc::new(encoder))),
            Arc::new(InMemoryEmbeddingStore::new()),
            Arc::new(ByteTokenizer::default()),
        )
        .build();

        thread::scope(|scope| {
            let first = scope.spawn(|| service.trigger_indexing(MODEL));
            assert_eq!(entered.recv().unwrap(), "a.jpg");

            library.set_assets(&["a.jpg", "b.jpg"]);
            let second = scope.spawn(|| service.trigger_indexing(MODEL));
            while *service.lock_passes() < 2 {
                thread::sleep(Duration::from_millis(5));
            }

            permit.send(()).unwrap();
            assert_eq!(first.join().unwrap().unwrap().indexed, 1);
            assert_eq!(service.status(), IndexStatus::Indexing);

            assert_eq!(entered.recv().unwrap(), "b.jpg");
            permit.send(()).unwrap();
            assert_eq!(second.join().unwrap().unwrap().indexed, 1);
        });

        assert_eq!(service.status(), IndexStatus::Ready);
        assert_eq!(service.indexed_count(MODEL), 2);
    }
}
