use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::traits::Embedder;

/// Embedding provider backed by a local Ollama server.
#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }

    async fn embed_with_endpoint_fallback(&self, text: &str) -> Result<Vec<f32>> {
        // /api/embed on current Ollama releases, /api/embeddings on older ones.
        match self.embed_modern(text).await {
            Ok(vector) => Ok(vector),
            Err(modern_err) => match self.embed_legacy(text).await {
                Ok(vector) => Ok(vector),
                Err(legacy_err) => Err(anyhow::anyhow!(
                    "ollama embedding failed via /api/embed and /api/embeddings. \
                     modern error: {modern_err}; legacy error: {legacy_err}; \
                     ensure the embedding model is pulled (e.g. `ollama pull {}`)",
                    self.model
                )),
            },
        }
    }

    async fn embed_modern(&self, text: &str) -> Result<Vec<f32>> {
        #[derive(Serialize)]
        struct EmbedReq<'a> {
            model: &'a str,
            input: &'a str,
        }

        #[derive(Deserialize)]
        struct EmbedResp {
            embeddings: Vec<Vec<f32>>,
        }

        let url = format!("{}/api/embed", self.base_url);
        let response = self
            .client
            .post(url)
            .json(&EmbedReq {
                model: &self.model,
                input: text,
            })
            .send()
            .await
            .context("failed to call ollama embed endpoint")?;

        if response.status() != StatusCode::OK {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "ollama /api/embed returned {status}: {}",
                normalize_err_body(&body)
            );
        }

        let response = response
            .json::<EmbedResp>()
            .await
            .context("failed to decode ollama /api/embed response")?;

        response
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("ollama /api/embed returned empty embeddings array"))
    }

    async fn embed_legacy(&self, text: &str) -> Result<Vec<f32>> {
        #[derive(Serialize)]
        struct EmbeddingReq<'a> {
            model: &'a str,
            prompt: &'a str,
        }

        #[derive(Deserialize)]
        struct EmbeddingResp {
            embedding: Vec<f32>,
        }

        let url = format!("{}/api/embeddings", self.base_url);
        let response = self
            .client
            .post(url)
            .json(&EmbeddingReq {
                model: &self.model,
                prompt: text,
            })
            .send()
            .await
            .context("failed to call ollama embeddings endpoint")?;

        if response.status() != StatusCode::OK {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "ollama /api/embeddings returned {status}: {}",
                normalize_err_body(&body)
            );
        }

        let response = response
            .json::<EmbeddingResp>()
            .await
            .context("failed to decode ollama embeddings response")?;

        Ok(response.embedding)
    }
}

#[async_trait]
impl Embedder for OllamaClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let input = text.trim();
        if input.is_empty() {
            anyhow::bail!("cannot embed empty text input");
        }

        match self.embed_with_endpoint_fallback(input).await {
            Ok(vector) => Ok(vector),
            Err(err) => {
                if !is_context_length_error(&err) {
                    return Err(err);
                }

                let word_count = input.split_whitespace().count();
                let mut last_err = err;
                for max_words in [400usize, 300, 200, 120] {
                    if word_count <= max_words {
                        continue;
                    }

                    let truncated = truncate_to_word_limit(input, max_words);
                    match self.embed_with_endpoint_fallback(&truncated).await {
                        Ok(vector) => {
                            tracing::warn!(
                                word_count,
                                max_words,
                                "embedding input truncated to fit model context"
                            );
                            return Ok(vector);
                        }
                        Err(next_err) => {
                            if !is_context_length_error(&next_err) {
                                return Err(next_err);
                            }
                            last_err = next_err;
                        }
                    }
                }

                Err(anyhow::anyhow!(
                    "ollama embedding exceeded context length even after adaptive truncation \
                     (original_words={word_count}). last error: {last_err}"
                ))
            }
        }
    }
}

pub(crate) fn normalize_err_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty body>".to_string();
    }

    if let Ok(json) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if let Some(err) = json.get("error").and_then(|v| v.as_str()) {
            return err.to_string();
        }
        if let Some(message) = json.pointer("/error/message").and_then(|v| v.as_str()) {
            return message.to_string();
        }
    }

    trimmed.to_string()
}

fn is_context_length_error(err: &anyhow::Error) -> bool {
    let msg = err.to_string().to_ascii_lowercase();
    msg.contains("input length exceeds the context length")
        || (msg.contains("context length") && msg.contains("input length"))
}

fn truncate_to_word_limit(text: &str, max_words: usize) -> String {
    text.split_whitespace()
        .take(max_words)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_body_prefers_json_error_field() {
        assert_eq!(
            normalize_err_body(r#"{"error":"model \"x\" not found"}"#),
            "model \"x\" not found"
        );
        assert_eq!(
            normalize_err_body(r#"{"error":{"code":400,"message":"API key not valid"}}"#),
            "API key not valid"
        );
        assert_eq!(normalize_err_body("  "), "<empty body>");
        assert_eq!(normalize_err_body("plain failure"), "plain failure");
    }

    #[test]
    fn context_length_errors_are_detected() {
        let err = anyhow::anyhow!("ollama /api/embed returned 500: the input length exceeds the context length");
        assert!(is_context_length_error(&err));
        assert!(!is_context_length_error(&anyhow::anyhow!("connection refused")));
    }

    #[test]
    fn truncation_keeps_leading_words() {
        assert_eq!(truncate_to_word_limit("a b  c d", 2), "a b");
    }

    #[tokio::test]
    async fn empty_input_is_rejected_before_any_request() {
        let client = OllamaClient::new("http://127.0.0.1:9", "all-minilm");
        let err = client.embed("   ").await.unwrap_err();
        assert!(err.to_string().contains("empty text"));
    }
}
