// SPDX-License-Identifier: MIT OR Apache-2.0

//! Indexing module - photo library scanning and incremental embedding passes

pub mod index;
pub mod scanner;

pub use index::{IndexOptions, IndexReport, IndexingPipeline};
pub use scanner::{AssetListing, DirectoryPhotoSource, PhotoSource, DEFAULT_EXTENSIONS};
