use std::collections::HashSet;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReinitializeResponse {
    pub status: String,
    pub message: String,
}

/// A unit of extracted PDF text: one page, or a whole file when per-page
/// extraction is unavailable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub text: String,
    pub file_name: String,
    pub file_path: String,
    pub page_label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextChunk {
    pub id: String,
    pub document_id: String,
    pub text: String,
    pub file_name: String,
    pub file_path: String,
    pub page_label: Option<String>,
    pub chunk_index: usize,
    pub word_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub chunk_id: String,
    pub text: String,
    pub file_name: Option<String>,
    pub page_label: Option<String>,
    pub score: f32,
}

/// An embedded chunk as written to the vector store.
#[derive(Debug, Clone, Serialize)]
pub struct IndexedPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: PointPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointPayload {
    pub chunk_id: String,
    pub document_id: String,
    pub text: String,
    pub file_name: String,
    pub file_path: String,
    pub page_label: Option<String>,
    pub chunk_index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionInfo {
    pub points_count: u64,
    pub vector_size: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct QueryResponse {
    pub response: String,
    pub source_nodes: Vec<RetrievedChunk>,
}

impl QueryResponse {
    /// File names of the source nodes, in retrieval order, without repeats.
    pub fn source_files(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.source_nodes
            .iter()
            .filter_map(|node| node.file_name.as_deref())
            .filter(|name| seen.insert(*name))
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct ChatAnswer {
    pub response: String,
    pub sources: Option<Vec<String>>,
}

impl From<ChatAnswer> for ChatResponse {
    fn from(answer: ChatAnswer) -> Self {
        Self {
            response: answer.response,
            sources: answer.sources,
        }
    }
}
