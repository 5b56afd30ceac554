//! Text embedding providers for the ilearn memory store.
//!
//! The store only depends on the [`Embedder`] trait: text in, fixed-length
//! vector out. Which provider backs it is a configuration choice.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  Embedder trait                         │
//! │  - embed(text) -> Vec<f32>              │
//! │  - embed_batch(texts) -> Vec<Vec<f32>>  │
//! └─────────────────────────────────────────┘
//!                    │
//!     ┌──────────┬───┴──────┬──────────┐
//!     ▼          ▼          ▼          ▼
//! ┌───────┐ ┌────────┐ ┌─────────┐ ┌──────┐
//! │ local │ │ openai │ │ hashing │ │ mock │
//! └───────┘ └────────┘ └─────────┘ └──────┘
//! ```

pub mod embeddings;
pub mod error;

pub use embeddings::{
    DEFAULT_DIMENSIONS, Embedder, EmbedderSpec, HashingEmbedder, MockEmbedder, OpenAiEmbedder,
    OpenAiEmbedderConfig, SharedEmbedder, build_embedder, cosine_similarity,
    default_local_model_dir, squared_l2_distance,
};
pub use error::{EmbedError, Result};

// Re-export local embeddings when feature is enabled
#[cfg(feature = "local-embeddings")]
pub use embeddings::local::LocalEmbedder;
