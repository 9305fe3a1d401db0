//! # Vector Index
//!
//! Stores paper chunks for semantic retrieval by the writer step.
//!
//! The bundled [`InMemoryVectorIndex`] embeds text with hashed term
//! frequencies (FNV-1a, stable across builds) and ranks by cosine distance.
//! Anything that implements [`VectorIndex`] can replace it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::VectorIndexError;

/// Dimensionality of the hashed embedding space
const EMBEDDING_DIMS: usize = 512;

/// Metadata supplied by the caller for every chunk of one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub source_url: String,
    pub title: String,
}

/// Metadata stored alongside each chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source_url: String,
    pub title: String,
    pub doc_id: String,
    pub chunk_index: usize,
}

/// A chunk returned from a similarity query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMatch {
    pub text: String,
    pub metadata: ChunkMetadata,
    /// Cosine distance, lower is more similar
    pub distance: f32,
}

/// Vector index collaborator.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Add chunks for `doc_id`. A document that already has chunks is left
    /// untouched and `Ok(0)` is returned. An empty `doc_id` is rejected.
    async fn upsert(
        &self,
        chunks: &[String],
        metadata: &DocumentMetadata,
        doc_id: &str,
    ) -> Result<usize, VectorIndexError>;

    /// Top `top_k` chunks for `text`. Never fails: an empty index or a
    /// backend failure yields an empty list.
    async fn query(&self, text: &str, top_k: usize) -> Vec<ChunkMatch>;

    /// Total number of stored chunks.
    async fn count(&self) -> usize;
}

struct StoredChunk {
    id: String,
    text: String,
    metadata: ChunkMetadata,
    embedding: Vec<f32>,
}

/// Process-local vector index.
#[derive(Default)]
pub struct InMemoryVectorIndex {
    chunks: RwLock<Vec<StoredChunk>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn upsert(
        &self,
        chunks: &[String],
        metadata: &DocumentMetadata,
        doc_id: &str,
    ) -> Result<usize, VectorIndexError> {
        if doc_id.trim().is_empty() {
            return Err(VectorIndexError::InvalidDocument(format!(
                "missing doc_id for \"{}\"",
                metadata.title
            )));
        }
        if chunks.is_empty() {
            warn!(doc_id = %doc_id, "No chunks to add");
            return Ok(0);
        }

        let mut stored = self.chunks.write().await;
        if stored.iter().any(|c| c.metadata.doc_id == doc_id) {
            info!(doc_id = %doc_id, "Document already indexed, skipping");
            return Ok(0);
        }

        stored.extend(chunks.iter().enumerate().map(|(i, text)| StoredChunk {
            id: format!("{}_chunk_{}", doc_id, i),
            text: text.clone(),
            metadata: ChunkMetadata {
                source_url: metadata.source_url.clone(),
                title: metadata.title.clone(),
                doc_id: doc_id.to_string(),
                chunk_index: i,
            },
            embedding: embed(text),
        }));

        info!(doc_id = %doc_id, count = chunks.len(), "Indexed document chunks");
        Ok(chunks.len())
    }

    async fn query(&self, text: &str, top_k: usize) -> Vec<ChunkMatch> {
        let stored = self.chunks.read().await;
        if stored.is_empty() || top_k == 0 {
            debug!("Vector index is empty, returning no results");
            return Vec::new();
        }

        let query = embed(text);
        let mut ranked: Vec<(f32, &StoredChunk)> = stored
            .iter()
            .map(|chunk| (cosine_distance(&query, &chunk.embedding), chunk))
            .collect();
        ranked.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.id.cmp(&b.1.id)));

        let matches: Vec<ChunkMatch> = ranked
            .into_iter()
            .take(top_k)
            .map(|(distance, chunk)| ChunkMatch {
                text: chunk.text.clone(),
                metadata: chunk.metadata.clone(),
                distance,
            })
            .collect();

        debug!(count = matches.len(), "Vector query completed");
        matches
    }

    async fn count(&self) -> usize {
        self.chunks.read().await.len()
    }
}

// =============================================================================
// EMBEDDING
// =============================================================================
/// L2-normalized hashed term-frequency vector.
fn embed(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0f32; EMBEDDING_DIMS];

    for token in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 1)
    {
        let token = token.to_lowercase();
        let bucket = (stable_hash(token.as_bytes()) % EMBEDDING_DIMS as u64) as usize;
        vector[bucket] += 1.0;
    }

    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|v| *v /= norm);
    }
    vector
}

/// FNV-1a
fn stable_hash(bytes: &[u8]) -> u64 {
    let mut hash = 0xcbf29ce484222325_u64;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x100000001b3_u64);
    }
    hash
}

/// `1 - cosine similarity` for normalized vectors; 1.0 when either is zero.
fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    1.0 - dot
}

#[cfg(test)]
impl InMemoryVectorIndex {
    /// All chunks stored for a document, in chunk order.
    pub(crate) async fn document_chunks(&self, doc_id: &str) -> Vec<(String, ChunkMetadata)> {
        let chunks = self.chunks.read().await;
        let mut found: Vec<_> = chunks
            .iter()
            .filter(|c| c.metadata.doc_id == doc_id)
            .map(|c| (c.text.clone(), c.metadata.clone()))
            .collect();
        found.sort_by_key(|(_, meta)| meta.chunk_index);
        found
    }
}
