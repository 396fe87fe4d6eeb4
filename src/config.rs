use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Result;

use crate::synthesizer::{PromptTemplate, DEFAULT_QA_TEMPLATE};

#[derive(Clone, Debug)]
pub struct ModelConfig {
    pub embedding_model: String,
    pub embedding_dimension: usize,
    pub chat_model: String,
    pub temperature: f32,
    pub max_output_tokens: usize,
}

#[derive(Clone, Debug)]
pub struct ChunkConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub bind_addr: String,
    pub data_dir: PathBuf,
    pub qdrant_url: String,
    pub qdrant_api_key: Option<String>,
    pub collection_name: String,
    pub ollama_base_url: String,
    pub gemini_base_url: String,
    pub google_api_key: Option<String>,
    pub models: ModelConfig,
    pub chunking: ChunkConfig,
    pub similarity_top_k: usize,
    pub context_window_chars: usize,
    pub prompt_template: String,
    pub allowed_origins: Vec<String>,
    pub rebuild_index_if_missing: bool,
}

impl Settings {
    /// Reads settings from the process environment, after merging a `.env`
    /// file from the working directory when one exists.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        Self {
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".to_string()),
            data_dir: env::var("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data")),
            qdrant_url: env::var("QDRANT_URL")
                .unwrap_or_else(|_| "http://localhost:6333".to_string()),
            qdrant_api_key: non_empty_var("QDRANT_API_KEY"),
            collection_name: env::var("COLLECTION_NAME")
                .unwrap_or_else(|_| "customer_service-chatbot".to_string()),
            ollama_base_url: env::var("OLLAMA_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:11434".to_string()),
            gemini_base_url: env::var("GEMINI_BASE_URL")
                .unwrap_or_else(|_| "https://generativelanguage.googleapis.com".to_string()),
            google_api_key: non_empty_var("GOOGLE_API_KEY"),
            models: ModelConfig {
                embedding_model: env::var("EMBEDDING_MODEL")
                    .unwrap_or_else(|_| "all-minilm".to_string()),
                embedding_dimension: parsed_var("EMBEDDING_DIMENSION", 384),
                chat_model: env::var("CHAT_MODEL")
                    .unwrap_or_else(|_| "gemini-1.5-flash".to_string()),
                temperature: parsed_var("TEMPERATURE", 0.2),
                max_output_tokens: parsed_var("MAX_OUTPUT_TOKENS", 1024),
            },
            chunking: ChunkConfig {
                chunk_size: parsed_var("CHUNK_SIZE", 500),
                chunk_overlap: parsed_var("CHUNK_OVERLAP", 20),
            },
            similarity_top_k: parsed_var("SIMILARITY_TOP_K", 3),
            context_window_chars: parsed_var("CONTEXT_WINDOW_CHARS", 12_000),
            prompt_template: env::var("PROMPT_TEMPLATE")
                .unwrap_or_else(|_| DEFAULT_QA_TEMPLATE.to_string()),
            allowed_origins: env::var("ALLOWED_ORIGINS")
                .map(|raw| split_origins(&raw))
                .unwrap_or_else(|_| {
                    vec![
                        "http://localhost:5173".to_string(),
                        "http://localhost:3000".to_string(),
                    ]
                }),
            rebuild_index_if_missing: parsed_var("REBUILD_INDEX_IF_MISSING", true),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            anyhow::bail!("CHUNK_SIZE must be greater than zero");
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            anyhow::bail!(
                "CHUNK_OVERLAP ({}) must be smaller than CHUNK_SIZE ({})",
                self.chunking.chunk_overlap,
                self.chunking.chunk_size
            );
        }
        if self.similarity_top_k == 0 {
            anyhow::bail!("SIMILARITY_TOP_K must be greater than zero");
        }
        if self.models.embedding_dimension == 0 {
            anyhow::bail!("EMBEDDING_DIMENSION must be greater than zero");
        }
        PromptTemplate::new(&self.prompt_template)?;
        Ok(())
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parsed_var<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn split_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
pub(crate) fn test_settings(data_dir: impl Into<PathBuf>) -> Settings {
    Settings {
        bind_addr: "127.0.0.1:0".to_string(),
        data_dir: data_dir.into(),
        qdrant_url: "http://localhost:6333".to_string(),
        qdrant_api_key: None,
        collection_name: "test-collection".to_string(),
        ollama_base_url: "http://localhost:11434".to_string(),
        gemini_base_url: "http://localhost:9".to_string(),
        google_api_key: Some("test-key".to_string()),
        models: ModelConfig {
            embedding_model: "hash".to_string(),
            embedding_dimension: 64,
            chat_model: "scripted".to_string(),
            temperature: 0.0,
            max_output_tokens: 256,
        },
        chunking: ChunkConfig {
            chunk_size: 40,
            chunk_overlap: 5,
        },
        similarity_top_k: 3,
        context_window_chars: 4_000,
        prompt_template: DEFAULT_QA_TEMPLATE.to_string(),
        allowed_origins: vec!["http://localhost:5173".to_string()],
        rebuild_index_if_missing: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origins_are_split_and_trimmed() {
        let origins = split_origins(" http://a.example , ,http://b.example");
        assert_eq!(origins, vec!["http://a.example", "http://b.example"]);
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk_size() {
        let mut settings = test_settings("data");
        settings.chunking.chunk_overlap = settings.chunking.chunk_size;
        assert!(settings.validate().is_err());

        settings.chunking.chunk_overlap = 1;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn prompt_template_needs_placeholders() {
        let mut settings = test_settings("data");
        settings.prompt_template = "Answer: {query_str}".to_string();
        assert!(settings.validate().is_err());
    }
}
