//! Embedding providers for semantic recall.
//!
//! This module provides the [`Embedder`] trait and the providers the memory
//! store can be configured with. Every provider has a fixed output dimension
//! that is known once the provider is loaded and never changes afterwards.
//!
//! # Implementations
//!
//! - [`HashingEmbedder`]: Offline feature-hashing of word tokens
//! - [`MockEmbedder`]: Deterministic pseudo-random vectors for testing
//! - [`OpenAiEmbedder`]: OpenAI-compatible embeddings API
//! - [`LocalEmbedder`](local::LocalEmbedder): ONNX Runtime inference (requires `local-embeddings` feature)

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::{EmbedError, Result};

/// Dimensions of all-MiniLM-L6-v2, the default local model.
pub const DEFAULT_DIMENSIONS: usize = 384;

// ─────────────────────────────────────────────────────────────────────────────
// Embedder Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Trait for generating text embeddings.
///
/// Implementations must be deterministic for a fixed model: the same text
/// always maps to the same vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate an embedding for a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts in one call.
    ///
    /// Default implementation calls `embed` for each text sequentially.
    /// The returned vector has exactly one embedding per input, in order.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Dimensionality of the vectors produced by this embedder.
    fn dimensions(&self) -> usize;

    /// Short provider name used in logs and stats.
    fn name(&self) -> &str;
}

/// A shared embedder that can be used across threads.
pub type SharedEmbedder = Arc<dyn Embedder>;

// ─────────────────────────────────────────────────────────────────────────────
// Hashing Embedder
// ─────────────────────────────────────────────────────────────────────────────

/// Offline embedder based on signed feature hashing of word tokens.
///
/// Each lowercase alphanumeric token is hashed into one of `dimensions`
/// buckets with a hash-derived sign, and the bag is L2-normalised. Texts that
/// share vocabulary end up close in L2 distance, which is enough for rule and
/// memory recall when no neural model is installed.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    /// Create a hashing embedder with the given output dimensions.
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSIONS)
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut embedding = vec![0.0f32; self.dimensions];
        let lowered = text.to_lowercase();
        for token in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let hash = simple_hash(token);
            let bucket = (hash % self.dimensions as u64) as usize;
            let sign = if (hash >> 63) & 1 == 0 { 1.0 } else { -1.0 };
            embedding[bucket] += sign;
        }
        normalize(&mut embedding);
        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "hashing"
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Mock Embedder
// ─────────────────────────────────────────────────────────────────────────────

/// A mock embedder for testing purposes.
///
/// Generates deterministic unit vectors seeded from a hash of the whole text.
/// Identical texts embed identically; different texts are unrelated.
#[derive(Debug, Clone)]
pub struct MockEmbedder {
    dimensions: usize,
}

impl MockEmbedder {
    /// Create a new mock embedder with the specified dimensions.
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSIONS)
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut state = simple_hash(text);
        let mut embedding = vec![0.0f32; self.dimensions];
        for value in embedding.iter_mut() {
            state = state.wrapping_mul(1103515245).wrapping_add(12345);
            *value = ((state >> 16) as u16 as f32 / 32768.0) - 1.0;
        }
        normalize(&mut embedding);
        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// djb2 string hash.
fn simple_hash(s: &str) -> u64 {
    let mut hash: u64 = 5381;
    for byte in s.bytes() {
        hash = hash.wrapping_mul(33).wrapping_add(byte as u64);
    }
    // Final avalanche so that short tokens spread across buckets and signs.
    hash ^= hash >> 33;
    hash = hash.wrapping_mul(0xff51afd7ed558ccd);
    hash ^= hash >> 33;
    hash
}

fn normalize(embedding: &mut [f32]) {
    let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in embedding.iter_mut() {
            *x /= norm;
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// OpenAI Embedder
// ─────────────────────────────────────────────────────────────────────────────

use reqwest::Client;
use std::time::Duration;

/// Configuration for OpenAI embeddings.
#[derive(Debug, Clone)]
pub struct OpenAiEmbedderConfig {
    /// API key for authentication.
    pub api_key: String,
    /// Base URL for the API.
    pub base_url: String,
    /// Model to use for embeddings.
    pub model: String,
    /// Reduced output dimensions (text-embedding-3 models only).
    pub dimensions: Option<usize>,
    /// Request timeout.
    pub timeout: Duration,
}

impl OpenAiEmbedderConfig {
    /// Create a new config with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "text-embedding-3-small".to_string(),
            dimensions: None,
            timeout: Duration::from_secs(60),
        }
    }

    /// Set a custom base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the model to use.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Request reduced output dimensions.
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = Some(dimensions);
        self
    }
}

/// OpenAI embeddings API client.
pub struct OpenAiEmbedder {
    client: Client,
    config: OpenAiEmbedderConfig,
    dimensions: usize,
}

impl OpenAiEmbedder {
    /// Create a new OpenAI embedder.
    pub fn new(config: OpenAiEmbedderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| EmbedError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        let dimensions = config.dimensions.unwrap_or(match config.model.as_str() {
            "text-embedding-3-large" => 3072,
            _ => 1536,
        });

        Ok(Self {
            client,
            config,
            dimensions,
        })
    }

    fn embeddings_url(&self) -> String {
        format!("{}/embeddings", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed_batch(&[text]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::Internal("No embedding returned".to_string()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbeddingRequest {
            model: self.config.model.clone(),
            input: texts.iter().map(|s| s.to_string()).collect(),
            dimensions: self.config.dimensions,
        };

        let response = self
            .client
            .post(self.embeddings_url())
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbedError::Backend(format!(
                "Embedding request failed: HTTP {} - {}",
                status, body
            )));
        }

        let result: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbedError::Serialization(format!("Failed to parse response: {}", e)))?;

        if result.data.len() != texts.len() {
            return Err(EmbedError::Backend(format!(
                "Expected {} embeddings, got {}",
                texts.len(),
                result.data.len()
            )));
        }

        // The API may answer out of order.
        let mut embeddings = result.data;
        embeddings.sort_by_key(|e| e.index);

        Ok(embeddings.into_iter().map(|e| e.embedding).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "openai"
    }
}

#[derive(Debug, serde::Serialize)]
struct EmbeddingRequest {
    model: String,
    input: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, serde::Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, serde::Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Local Embedder (ONNX Runtime)
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(feature = "local-embeddings")]
pub mod local {
    //! Local embeddings using ONNX Runtime.
    //!
    //! This module requires the `local-embeddings` feature to be enabled.

    use super::*;
    use ndarray::Array2;
    use ort::session::{Session, builder::GraphOptimizationLevel};
    use std::path::Path;
    use std::sync::Mutex;
    use tokenizers::Tokenizer;

    /// Sequences longer than this are truncated before inference.
    const MAX_SEQUENCE_LENGTH: usize = 256;

    /// Inputs are processed in chunks of this many texts.
    const CHUNK_SIZE: usize = 32;

    /// Local embedder running a sentence-transformer ONNX export.
    pub struct LocalEmbedder {
        // `Session::run` takes `&mut self`.
        session: Mutex<Session>,
        tokenizer: Tokenizer,
        dimensions: usize,
    }

    impl LocalEmbedder {
        /// Load a local embedder from model files.
        pub fn load(
            model_path: impl AsRef<Path>,
            tokenizer_path: impl AsRef<Path>,
            dimensions: usize,
        ) -> Result<Self> {
            let session = Session::builder()
                .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
                .and_then(|b| b.commit_from_file(model_path.as_ref()))
                .map_err(|e| {
                    EmbedError::Unavailable(format!(
                        "Failed to load ONNX model from {:?}: {}",
                        model_path.as_ref(),
                        e
                    ))
                })?;

            let tokenizer = Tokenizer::from_file(tokenizer_path.as_ref()).map_err(|e| {
                EmbedError::Unavailable(format!(
                    "Failed to load tokenizer from {:?}: {}",
                    tokenizer_path.as_ref(),
                    e
                ))
            })?;

            Ok(Self {
                session: Mutex::new(session),
                tokenizer,
                dimensions,
            })
        }

        fn run_batch(&self, encodings: &[tokenizers::Encoding]) -> Result<Vec<Vec<f32>>> {
            let batch_size = encodings.len();
            let max_len = encodings
                .iter()
                .map(|e| e.get_ids().len().min(MAX_SEQUENCE_LENGTH))
                .max()
                .unwrap_or(0);

            let mut input_ids = vec![0i64; batch_size * max_len];
            let mut attention_mask = vec![0i64; batch_size * max_len];
            let mut token_type_ids = vec![0i64; batch_size * max_len];

            for (i, enc) in encodings.iter().enumerate() {
                let offset = i * max_len;
                let ids = enc.get_ids();
                let mask = enc.get_attention_mask();
                let types = enc.get_type_ids();
                for j in 0..ids.len().min(max_len) {
                    input_ids[offset + j] = ids[j] as i64;
                    attention_mask[offset + j] = mask[j] as i64;
                    token_type_ids[offset + j] = types[j] as i64;
                }
            }

            let shape = (batch_size, max_len);
            let array_err = |e: ndarray::ShapeError| EmbedError::Internal(format!("Array error: {}", e));
            let ids_array = Array2::from_shape_vec(shape, input_ids).map_err(array_err)?;
            let mask_array =
                Array2::from_shape_vec(shape, attention_mask.clone()).map_err(array_err)?;
            let types_array = Array2::from_shape_vec(shape, token_type_ids).map_err(array_err)?;

            let tensor_err = |e: ort::Error| EmbedError::Internal(format!("Input error: {}", e));
            let inputs = ort::inputs![
                "input_ids" => ort::value::Tensor::from_array(ids_array).map_err(tensor_err)?,
                "attention_mask" => ort::value::Tensor::from_array(mask_array).map_err(tensor_err)?,
                "token_type_ids" => ort::value::Tensor::from_array(types_array).map_err(tensor_err)?,
            ];

            let mut session = self
                .session
                .lock()
                .map_err(|_| EmbedError::Internal("ONNX session lock poisoned".to_string()))?;
            let outputs = session
                .run(inputs)
                .map_err(|e| EmbedError::Internal(format!("ONNX inference failed: {}", e)))?;

            let (out_shape, data) = outputs[0]
                .try_extract_tensor::<f32>()
                .map_err(|e| EmbedError::Internal(format!("Output extraction failed: {}", e)))?;

            // (batch, seq_len, hidden)
            let seq_len = out_shape[1] as usize;
            let hidden = out_shape[2] as usize;

            let mut results = Vec::with_capacity(batch_size);
            for i in 0..batch_size {
                let mut pooled = vec![0.0f32; hidden];
                let mut count = 0.0f32;
                for j in 0..seq_len.min(max_len) {
                    if attention_mask[i * max_len + j] == 0 {
                        continue;
                    }
                    let row = &data[(i * seq_len + j) * hidden..(i * seq_len + j + 1) * hidden];
                    for (acc, v) in pooled.iter_mut().zip(row) {
                        *acc += v;
                    }
                    count += 1.0;
                }
                if count > 0.0 {
                    for v in pooled.iter_mut() {
                        *v /= count;
                    }
                }
                normalize(&mut pooled);
                results.push(pooled);
            }

            Ok(results)
        }
    }

    #[async_trait]
    impl Embedder for LocalEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let results = self.embed_batch(&[text]).await?;
            results
                .into_iter()
                .next()
                .ok_or_else(|| EmbedError::Internal("No embedding returned".to_string()))
        }

        async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            if texts.is_empty() {
                return Ok(Vec::new());
            }

            let encodings = texts
                .iter()
                .map(|text| {
                    self.tokenizer
                        .encode(*text, true)
                        .map_err(|e| EmbedError::Internal(format!("Tokenization failed: {}", e)))
                })
                .collect::<Result<Vec<_>>>()?;

            let mut all = Vec::with_capacity(texts.len());
            for chunk in encodings.chunks(CHUNK_SIZE) {
                all.extend(self.run_batch(chunk)?);
            }
            Ok(all)
        }

        fn dimensions(&self) -> usize {
            self.dimensions
        }

        fn name(&self) -> &str {
            "local"
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Embedder Factory
// ─────────────────────────────────────────────────────────────────────────────

/// Provider-agnostic description of the embedder to build.
///
/// The binary fills this in from the `[embedding]` config section, which
/// keeps this crate free of a dependency on the config crate.
#[derive(Debug, Clone, Default)]
pub struct EmbedderSpec {
    /// Provider name: "local", "openai", "hashing", or "mock".
    pub provider: String,
    /// OpenAI API key (required for "openai").
    pub openai_api_key: Option<String>,
    /// OpenAI model name.
    pub openai_model: Option<String>,
    /// OpenAI base URL override.
    pub openai_base_url: Option<String>,
    /// Local ONNX model path.
    pub local_model_path: Option<std::path::PathBuf>,
    /// Local tokenizer.json path.
    pub local_tokenizer_path: Option<std::path::PathBuf>,
    /// Requested output dimensions.
    pub dimensions: Option<usize>,
}

/// Build a [`SharedEmbedder`] from a spec.
///
/// Returns [`EmbedError::Unavailable`] when the requested provider cannot be
/// loaded. The caller decides whether to run without semantic recall.
pub fn build_embedder(spec: &EmbedderSpec) -> Result<SharedEmbedder> {
    match spec.provider.as_str() {
        "openai" => {
            let api_key = spec.openai_api_key.as_deref().ok_or_else(|| {
                EmbedError::Unavailable(
                    "OpenAI embedding provider requires an API key. \
                     Set OPENAI_API_KEY or configure [embedding.openai] api_key."
                        .to_string(),
                )
            })?;
            let mut config = OpenAiEmbedderConfig::new(api_key);
            if let Some(ref model) = spec.openai_model {
                config = config.with_model(model);
            }
            if let Some(ref base_url) = spec.openai_base_url {
                config = config.with_base_url(base_url);
            }
            if let Some(dims) = spec.dimensions {
                config = config.with_dimensions(dims);
            }
            Ok(Arc::new(OpenAiEmbedder::new(config)?))
        }
        #[cfg(feature = "local-embeddings")]
        "local" => {
            let dims = spec.dimensions.unwrap_or(DEFAULT_DIMENSIONS);
            let (model_path, tokenizer_path) =
                match (&spec.local_model_path, &spec.local_tokenizer_path) {
                    (Some(m), Some(t)) => (m.clone(), t.clone()),
                    _ => {
                        let dir = default_local_model_dir().ok_or_else(|| {
                            EmbedError::Unavailable("No data directory for local model".to_string())
                        })?;
                        (dir.join("model.onnx"), dir.join("tokenizer.json"))
                    }
                };
            if !model_path.exists() || !tokenizer_path.exists() {
                return Err(EmbedError::Unavailable(format!(
                    "Local embedding model not found at {}. Download the all-MiniLM-L6-v2 \
                     ONNX export and tokenizer.json there.",
                    model_path.display()
                )));
            }
            let embedder = local::LocalEmbedder::load(&model_path, &tokenizer_path, dims)?;
            tracing::info!(path = %model_path.display(), dims, "Loaded local embedding model");
            Ok(Arc::new(embedder))
        }
        #[cfg(not(feature = "local-embeddings"))]
        "local" => Err(EmbedError::Unavailable(
            "Local embeddings requested but the 'local-embeddings' feature is not enabled"
                .to_string(),
        )),
        "hashing" => Ok(Arc::new(HashingEmbedder::new(
            spec.dimensions.unwrap_or(DEFAULT_DIMENSIONS),
        ))),
        "mock" => Ok(Arc::new(MockEmbedder::new(
            spec.dimensions.unwrap_or(DEFAULT_DIMENSIONS),
        ))),
        other => Err(EmbedError::Config(format!(
            "Unknown embedding provider '{}'. Valid: local, openai, hashing, mock",
            other
        ))),
    }
}

/// Default directory for local embedding model files.
pub fn default_local_model_dir() -> Option<std::path::PathBuf> {
    dirs::data_dir().map(|d| d.join("ilearn").join("models").join("embeddings"))
}

// ─────────────────────────────────────────────────────────────────────────────
// Utility Functions
// ─────────────────────────────────────────────────────────────────────────────

/// Calculate cosine similarity between two embeddings.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a > 0.0 && norm_b > 0.0 {
        dot / (norm_a * norm_b)
    } else {
        0.0
    }
}

/// Squared Euclidean distance, the metric of a flat L2 index.
///
/// Returns `f32::MAX` when the dimensions differ.
pub fn squared_l2_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return f32::MAX;
    }

    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
