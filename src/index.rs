use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::ChunkConfig;
use crate::ingest::build_chunks;
use crate::models::{Document, IndexedPoint, PointPayload};
use crate::retrieval::Retriever;
use crate::traits::{Embedder, VectorStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexStats {
    pub documents: usize,
    pub chunks: usize,
}

/// Handle on an embedded chunk collection held by the vector store.
#[derive(Clone)]
pub struct VectorIndex {
    store: Arc<dyn VectorStore>,
    points: u64,
}

impl VectorIndex {
    /// Chunks and embeds `documents`, writes them to a staging collection and
    /// publishes it. Nothing in the store is touched until every chunk has
    /// been embedded, and the live collection only changes on success.
    pub async fn from_documents(
        documents: &[Document],
        chunking: &ChunkConfig,
        dimension: usize,
        embedder: &dyn Embedder,
        store: Arc<dyn VectorStore>,
    ) -> Result<(Self, IndexStats)> {
        let chunks = build_chunks(documents, chunking.chunk_size, chunking.chunk_overlap);
        if chunks.is_empty() {
            anyhow::bail!("no chunks generated from {} document(s)", documents.len());
        }

        let mut points = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            let vector = embedder
                .embed(&chunk.text)
                .await
                .with_context(|| format!("failed embedding for chunk {}", chunk.id))?;

            if vector.len() != dimension {
                anyhow::bail!(
                    "embedding model {} returned {} dimensions, expected {}",
                    embedder.model(),
                    vector.len(),
                    dimension
                );
            }

            points.push(IndexedPoint {
                id: chunk.id.clone(),
                vector,
                payload: PointPayload {
                    chunk_id: chunk.id.clone(),
                    document_id: chunk.document_id.clone(),
                    text: chunk.text.clone(),
                    file_name: chunk.file_name.clone(),
                    file_path: chunk.file_path.clone(),
                    page_label: chunk.page_label.clone(),
                    chunk_index: chunk.chunk_index,
                },
            });
        }

        let staging = store.create_staging(dimension).await?;
        if let Err(err) = write_staging(store.as_ref(), &staging, &points).await {
            if let Err(drop_err) = store.drop_collection(&staging).await {
                tracing::warn!(
                    collection = %staging,
                    error = %format!("{drop_err:#}"),
                    "failed to drop staging collection"
                );
            }
            return Err(err);
        }

        let stats = IndexStats {
            documents: documents.len(),
            chunks: chunks.len(),
        };
        tracing::info!(
            documents = stats.documents,
            chunks = stats.chunks,
            "built vector index"
        );

        Ok((
            Self {
                store,
                points: points.len() as u64,
            },
            stats,
        ))
    }

    /// Opens an index previously written to the store.
    pub async fn from_vector_store(store: Arc<dyn VectorStore>, dimension: usize) -> Result<Self> {
        let info = store
            .collection_info()
            .await
            .context("Index not found, build a new index")?
            .ok_or_else(|| {
                anyhow::anyhow!("Index not found, build a new index: collection does not exist")
            })?;

        if info.points_count == 0 {
            anyhow::bail!("Index not found, build a new index: collection is empty");
        }

        if let Some(size) = info.vector_size {
            if size != dimension {
                anyhow::bail!(
                    "Index not found, build a new index: collection vector size {size} \
                     does not match embedding dimension {dimension}"
                );
            }
        }

        Ok(Self {
            store,
            points: info.points_count,
        })
    }

    pub fn points(&self) -> u64 {
        self.points
    }

    pub fn as_retriever(&self, embedder: Arc<dyn Embedder>, top_k: usize) -> Retriever {
        Retriever::new(self.store.clone(), embedder, top_k)
    }
}

async fn write_staging(store: &dyn VectorStore, staging: &str, points: &[IndexedPoint]) -> Result<()> {
    store.upsert_points(staging, points).await?;
    store.publish(staging).await
}
