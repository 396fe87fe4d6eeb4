use anyhow::Result;

use crate::models::QueryResponse;
use crate::retrieval::Retriever;
use crate::synthesizer::ResponseSynthesizer;

/// Retriever and synthesizer composed into a single question → answer call.
#[derive(Clone)]
pub struct QueryEngine {
    retriever: Retriever,
    synthesizer: ResponseSynthesizer,
}

impl QueryEngine {
    pub fn new(retriever: Retriever, synthesizer: ResponseSynthesizer) -> Self {
        Self {
            retriever,
            synthesizer,
        }
    }

    pub async fn query(&self, question: &str) -> Result<QueryResponse> {
        let source_nodes = self.retriever.retrieve(question).await?;
        let response = self.synthesizer.synthesize(question, &source_nodes).await?;

        Ok(QueryResponse {
            response,
            source_nodes,
        })
    }
}
