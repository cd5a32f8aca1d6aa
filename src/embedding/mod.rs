// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding module - vector math, encoders and embedding storage
//!
//! This module provides the primitives the index and search layers build on:
//! unit-vector math, the encoder seam, query tokenization and the keyed
//! store that holds one vector per photo and model.

pub mod encoder;
pub mod storage;
pub mod tokenizer;
pub mod vector;

pub use encoder::{
    ClipEncoder, CommandEncoder, DummyEncoder, Encoder, LoadState, PixelBuffer,
    DEFAULT_EMBEDDING_DIM, DEFAULT_IMAGE_SIZE, DEFAULT_MODEL,
};
pub use storage::{
    AssetId, EmbeddingSnapshot, EmbeddingStore, InMemoryEmbeddingStore, PhotoEmbedding,
};
pub use tokenizer::{ByteTokenizer, ClipTokenizer, TokenIds, Tokenizer};
pub use vector::{cosine_similarity, l2_normalize, normalize};
