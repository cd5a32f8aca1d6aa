// SPDX-License-Identifier: MIT OR Apache-2.0

//! Image/text encoder interface and implementations.
//!
//! The neural forward pass lives outside this crate. [`CommandEncoder`] talks
//! to it over a JSON pipe; [`DummyEncoder`] stands in for it in tests.

use serde_json::Value;
use std::fmt;
use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use tracing::{debug, info};

use crate::embedding::tokenizer::TokenIds;
use crate::errors::{EncodeError, LoadError};

/// Model used when nothing else is configured.
pub const DEFAULT_MODEL: &str = "MobileCLIP-S2";

/// Square input resolution of MobileCLIP-S2.
pub const DEFAULT_IMAGE_SIZE: u32 = 256;

/// Output dimension of MobileCLIP-S2.
pub const DEFAULT_EMBEDDING_DIM: usize = 512;

/// Decoded RGB8 pixels, rows packed without padding.
#[derive(Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl PixelBuffer {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            data,
        }
    }
}

impl fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Trait for CLIP-style encoders.
///
/// Implementations must not mutate per call once loaded; a single instance is
/// shared across indexing and search threads.
pub trait Encoder: Send + Sync {
    /// Returns the model identifier.
    fn model_name(&self) -> &str;

    /// Square edge length the image path expects.
    fn target_image_size(&self) -> u32 {
        DEFAULT_IMAGE_SIZE
    }

    /// Prepares the model. Called once before any encode call.
    fn load(&self) -> Result<(), LoadError>;

    /// Encodes an image into a raw (unnormalized) vector.
    fn encode_image(&self, pixels: &PixelBuffer) -> Result<Vec<f32>, EncodeError>;

    /// Encodes tokenized text into a raw (unnormalized) vector.
    fn encode_text(&self, tokens: &TokenIds) -> Result<Vec<f32>, EncodeError>;
}

/// Load progress of a [`ClipEncoder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    NotLoaded,
    Loading,
    Ready,
    Failed(String),
}

/// Shared handle that loads an encoder once and gates encode calls on it.
///
/// Callers racing on [`ClipEncoder::ensure_loaded`] block until the first
/// load finishes. A failed load may be retried later.
pub struct ClipEncoder {
    inner: Arc<dyn Encoder>,
    state: Mutex<LoadState>,
    ready: AtomicBool,
}

impl ClipEncoder {
    pub fn new(inner: Arc<dyn Encoder>) -> Self {
        Self {
            inner,
            state: Mutex::new(LoadState::NotLoaded),
            ready: AtomicBool::new(false),
        }
    }

    pub fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    pub fn target_image_size(&self) -> u32 {
        self.inner.target_image_size()
    }

    fn lock(&self) -> MutexGuard<'_, LoadState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Current state. Reports `Loading` while another caller holds the load.
    pub fn state(&self) -> LoadState {
        if self.is_ready() {
            return LoadState::Ready;
        }
        match self.state.try_lock() {
            Ok(state) => state.clone(),
            Err(TryLockError::Poisoned(e)) => e.into_inner().clone(),
            Err(TryLockError::WouldBlock) => LoadState::Loading,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Loads the encoder unless it already is.
    pub fn ensure_loaded(&self) -> Result<(), LoadError> {
        if self.is_ready() {
            return Ok(());
        }

        let mut state = self.lock();
        if *state == LoadState::Ready {
            return Ok(());
        }

        info!(model = self.model_name(), "loading encoder");
        match self.inner.load() {
            Ok(()) => {
                *state = LoadState::Ready;
                self.ready.store(true, Ordering::Release);
                Ok(())
            }
            Err(err) => {
                *state = LoadState::Failed(err.reason.clone());
                Err(err)
            }
        }
    }

    fn require_ready(&self) -> Result<(), EncodeError> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(EncodeError::NotLoaded(self.model_name().to_string()))
        }
    }

    pub fn encode_image(&self, pixels: &PixelBuffer) -> Result<Vec<f32>, EncodeError> {
        self.require_ready()?;
        self.inner.encode_image(pixels)
    }

    pub fn encode_text(&self, tokens: &TokenIds) -> Result<Vec<f32>, EncodeError> {
        self.require_ready()?;
        self.inner.encode_text(tokens)
    }
}

impl fmt::Debug for ClipEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClipEncoder")
            .field("model", &self.model_name())
            .field("state", &self.state())
            .finish()
    }
}

/// Encoder that shells out to an external process.
///
/// Each call writes one JSON request to the command's stdin:
/// `{"op": "load" | "image" | "text", "model": ..., ...}` and reads a JSON
/// vector (or `{"embedding": [...]}`-style object) from stdout.
pub struct CommandEncoder {
    command: String,
    model: String,
    image_size: u32,
}

impl CommandEncoder {
    pub fn new(command: String, model: String) -> Self {
        Self {
            command,
            model,
            image_size: DEFAULT_IMAGE_SIZE,
        }
    }

    pub fn with_image_size(mut self, image_size: u32) -> Self {
        self.image_size = image_size;
        self
    }

    fn run_command(&self, payload: &Value) -> Result<String, String> {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| format!("failed to spawn encoder command '{}': {}", self.command, e))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(payload.to_string().as_bytes())
                .map_err(|e| format!("failed to write encoder payload: {}", e))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| format!("failed to read encoder output: {}", e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!(
                "encoder command failed (status {}): {}",
                output.status,
                stderr.trim()
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn encode(&self, payload: Value) -> Result<Vec<f32>, EncodeError> {
        let stdout = self.run_command(&payload).map_err(EncodeError::Failed)?;
        parse_vector_output(stdout.trim())
    }
}

impl Encoder for CommandEncoder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn target_image_size(&self) -> u32 {
        self.image_size
    }

    fn load(&self) -> Result<(), LoadError> {
        let payload = serde_json::json!({ "op": "load", "model": self.model });
        self.run_command(&payload).map(|_| ()).map_err(|reason| LoadError {
            model: self.model.clone(),
            reason,
        })
    }

    fn encode_image(&self, pixels: &PixelBuffer) -> Result<Vec<f32>, EncodeError> {
        self.encode(serde_json::json!({
            "op": "image",
            "model": self.model,
            "width": pixels.width,
            "height": pixels.height,
            "pixels": pixels.data,
        }))
    }

    fn encode_text(&self, tokens: &TokenIds) -> Result<Vec<f32>, EncodeError> {
        self.encode(serde_json::json!({
            "op": "text",
            "model": self.model,
            "tokens": tokens,
        }))
    }
}

/// Parses encoder stdout into a single vector.
///
/// Accepts a bare array, a one-row array of arrays, or an object carrying the
/// vector under `embedding`, `embeddings`, `vectors` or `data`.
fn parse_vector_output(stdout: &str) -> Result<Vec<f32>, EncodeError> {
    let parsed: Value = serde_json::from_str(stdout)
        .map_err(|e| EncodeError::InvalidOutput(format!("not JSON: {}", e)))?;

    let value = match parsed {
        Value::Array(arr) => Value::Array(arr),
        Value::Object(ref obj) => ["embedding", "embeddings", "vectors", "data"]
            .iter()
            .find_map(|key| obj.get(*key).cloned())
            .ok_or_else(|| {
                EncodeError::InvalidOutput("output missing 'embedding' field".to_string())
            })?,
        _ => {
            return Err(EncodeError::InvalidOutput(
                "output must be a JSON array or object".to_string(),
            ))
        }
    };

    let row = match value {
        Value::Array(mut rows) if rows.first().is_some_and(Value::is_array) => {
            if rows.len() != 1 {
                return Err(EncodeError::InvalidOutput(format!(
                    "expected one embedding, got {}",
                    rows.len()
                )));
            }
            rows.remove(0)
        }
        other => other,
    };

    let vector = row
        .as_array()
        .ok_or_else(|| EncodeError::InvalidOutput("embedding must be an array".to_string()))?
        .iter()
        .map(|value| {
            value
                .as_f64()
                .map(|v| v as f32)
                .ok_or_else(|| {
                    EncodeError::InvalidOutput("embedding value must be a number".to_string())
                })
        })
        .collect::<Result<Vec<f32>, EncodeError>>()?;

    if vector.is_empty() {
        return Err(EncodeError::InvalidOutput("empty embedding".to_string()));
    }

    debug!(dim = vector.len(), "parsed encoder output");
    Ok(vector)
}

/// Dummy encoder producing deterministic pseudo-embeddings (for testing/offline use).
///
/// Vectors are derived from a blake3 digest of the input, so identical
/// inputs always map to identical vectors.
pub struct DummyEncoder {
    model: String,
    dimension: usize,
    image_size: u32,
}

impl DummyEncoder {
    /// Creates a new dummy encoder with specified dimension.
    pub fn new(dimension: usize) -> Self {
        Self {
            model: "dummy".to_string(),
            dimension,
            image_size: DEFAULT_IMAGE_SIZE,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_image_size(mut self, image_size: u32) -> Self {
        self.image_size = image_size;
        self
    }

    fn digest_vector(&self, domain: &str, bytes: &[u8]) -> Vec<f32> {
        let mut hasher = blake3::Hasher::new();
        hasher.update(domain.as_bytes());
        hasher.update(bytes);
        let mut reader = hasher.finalize_xof();

        let mut raw = vec![0u8; self.dimension * 2];
        reader.fill(&mut raw);
        raw.chunks_exact(2)
            .map(|b| (u16::from_le_bytes([b[0], b[1]]) as f32 / u16::MAX as f32) * 2.0 - 1.0)
            .collect()
    }
}

impl Encoder for DummyEncoder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn target_image_size(&self) -> u32 {
        self.image_size
    }

    fn load(&self) -> Result<(), LoadError> {
        Ok(())
    }

    fn encode_image(&self, pixels: &PixelBuffer) -> Result<Vec<f32>, EncodeError> {
        Ok(self.digest_vector("image", &pixels.data))
    }

    fn encode_text(&self, tokens: &TokenIds) -> Result<Vec<f32>, EncodeError> {
        let bytes: Vec<u8> = tokens.iter().flat_map(|t| t.to_le_bytes()).collect();
        Ok(self.digest_vector("text", &bytes))
    }
}
