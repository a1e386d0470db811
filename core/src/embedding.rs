//! Embedding index collaborator seam
//!
//! Semantic text/image search is provided by an external collaborator; the
//! core only consumes this trait when a query directory is created under
//! one of the dedicated search roots. No model code lives in this crate.

use crate::store::FileId;

use async_trait::async_trait;

/// Which search root a query came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchKind {
	Text,
	Image,
}

/// External vector index over file contents.
#[async_trait]
pub trait EmbeddingIndex: Send + Sync {
	/// Embed a query string into the index's vector space.
	async fn embed(&self, content: &str) -> Vec<f32>;

	/// The `k` nearest indexed files to `vector`, best first, with scores.
	async fn nearest(&self, vector: &[f32], k: usize) -> Vec<(FileId, f32)>;
}

/// Convenience: embed a query and return its `top_k` nearest files.
pub async fn search(
	index: &dyn EmbeddingIndex,
	query: &str,
	top_k: usize,
) -> Vec<(FileId, f32)> {
	let vector = index.embed(query).await;
	index.nearest(&vector, top_k).await
}
