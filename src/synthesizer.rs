use std::sync::{Arc, OnceLock};

use anyhow::{Context, Result};
use regex::Regex;

use crate::models::RetrievedChunk;
use crate::traits::LanguageModel;

pub const NO_CONTEXT_MESSAGE: &str =
    "I could not find any relevant information in the loaded documents.";

pub const DEFAULT_QA_TEMPLATE: &str = "You are a friendly and professional customer service assistant.\n\
Answer the customer's question using only the context below. If the context does not contain \
the answer, say that you do not have that information and suggest contacting a human agent.\n\
Keep the answer short, clear, and polite.\n\
---------------------\n\
{context_str}\n\
---------------------\n\
Question: {query_str}\n\
Answer: ";

pub const DEFAULT_REFINE_TEMPLATE: &str = "The original question is: {query_str}\n\
We have provided an existing answer: {existing_answer}\n\
We have the opportunity to refine the existing answer (only if needed) with some more context below.\n\
------------\n\
{context_msg}\n\
------------\n\
Given the new context, refine the original answer to better answer the question. \
If the context isn't useful, return the original answer.\n\
Refined Answer: ";

/// A prompt with `{context_str}` and `{query_str}` placeholders.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        for placeholder in ["{context_str}", "{query_str}"] {
            if !template.contains(placeholder) {
                anyhow::bail!("prompt template is missing the {placeholder} placeholder");
            }
        }
        Ok(Self { template })
    }

    pub fn format(&self, context: &str, query: &str) -> String {
        self.template
            .replace("{context_str}", context)
            .replace("{query_str}", query)
    }
}

fn format_refine(existing_answer: &str, context: &str, query: &str) -> String {
    DEFAULT_REFINE_TEMPLATE
        .replace("{existing_answer}", existing_answer)
        .replace("{context_msg}", context)
        .replace("{query_str}", query)
}

/// Turns retrieved chunks into an answer. Chunks are packed into as few
/// prompts as fit `context_window_chars`; each extra prompt refines the
/// running answer.
#[derive(Clone)]
pub struct ResponseSynthesizer {
    llm: Arc<dyn LanguageModel>,
    qa_template: PromptTemplate,
    context_window_chars: usize,
}

impl ResponseSynthesizer {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        qa_template: PromptTemplate,
        context_window_chars: usize,
    ) -> Self {
        Self {
            llm,
            qa_template,
            context_window_chars,
        }
    }

    pub async fn synthesize(&self, query: &str, nodes: &[RetrievedChunk]) -> Result<String> {
        let segments = pack_context(nodes, self.context_window_chars);
        let Some((first, rest)) = segments.split_first() else {
            return Ok(NO_CONTEXT_MESSAGE.to_string());
        };

        let prompt = self.qa_template.format(first, query);
        let mut answer = self
            .llm
            .complete(&prompt)
            .await
            .with_context(|| format!("{} failed to generate an answer", self.llm.model()))?;
        answer = sanitize_model_output(answer);

        for segment in rest {
            let prompt = format_refine(&answer, segment, query);
            let refined = self
                .llm
                .complete(&prompt)
                .await
                .with_context(|| format!("{} failed to refine the answer", self.llm.model()))?;
            let refined = sanitize_model_output(refined);
            if !refined.is_empty() {
                answer = refined;
            }
        }

        tracing::debug!(segments = segments.len(), "synthesized answer");
        Ok(answer)
    }
}

fn pack_context(nodes: &[RetrievedChunk], budget_chars: usize) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();

    for node in nodes {
        let text = node.text.trim();
        if text.is_empty() {
            continue;
        }

        if !current.is_empty() && current.len() + 2 + text.len() > budget_chars {
            segments.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(text);
    }

    if !current.is_empty() {
        segments.push(current);
    }

    segments
}

fn fence_regex() -> Option<&'static Regex> {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    FENCE
        .get_or_init(|| Regex::new(r"(?s)^```[a-zA-Z]*\n(.*)\n```$").ok())
        .as_ref()
}

fn sanitize_model_output(answer: String) -> String {
    let mut text = answer.trim().to_string();
    if text.starts_with("```") {
        let fenced = fence_regex()
            .and_then(|re| re.captures(&text).and_then(|caps| caps.get(1)))
            .map(|body| body.as_str().trim().to_string());
        text = match fenced {
            Some(body) => body,
            None => text.replace("```", "").trim().to_string(),
        };
    }
    text
}
