// SPDX-License-Identifier: MIT OR Apache-2.0

//! Single-writer publication of the latest ranked result set.
//!
//! Searches may complete out of order. Each carries the sequence number it
//! was issued with, and a completion older than what is already published is
//! dropped.

use serde::Serialize;
use tokio::sync::watch;

use crate::search::SearchResult;

/// A ranked result set tagged with the query that produced it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RankedResults {
    /// Sequence number of the query (0 = nothing published yet)
    pub seq: u64,
    /// Query text as issued
    pub query: String,
    /// Ranked photos, most similar first
    pub results: Vec<SearchResult>,
}

/// Publishes result sets to any number of subscribers.
#[derive(Debug)]
pub struct ResultPublisher {
    tx: watch::Sender<RankedResults>,
}

impl Default for ResultPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultPublisher {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(RankedResults::default());
        Self { tx }
    }

    /// Publishes `ranked` unless a newer sequence number is already out.
    ///
    /// Returns true if the value was published.
    pub fn publish(&self, ranked: RankedResults) -> bool {
        self.tx.send_if_modified(|current| {
            if ranked.seq > current.seq {
                *current = ranked;
                true
            } else {
                false
            }
        })
    }

    /// Latest published result set.
    pub fn latest(&self) -> RankedResults {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RankedResults> {
        self.tx.subscribe()
    }
}
