// SPDX-License-Identifier: MIT OR Apache-2.0

//! photogrep - Local semantic photo search library
//!
//! Embeds every photo of a library once with a CLIP-style encoder and ranks
//! them against free-text queries by cosine similarity.

pub mod config;
pub mod embedding;
pub mod errors;
pub mod indexer;
pub mod output;
pub mod publish;
pub mod search;
pub mod service;
pub mod translate;

pub use publish::RankedResults;
pub use search::SearchResult;
pub use service::{IndexStatus, PhotoSearch};
