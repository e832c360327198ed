use crate::error::BenchResult;

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub source: String,
    pub content: String,
}

impl Document {
    pub fn new(source: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            content: content.into(),
        }
    }
}

/// Retrieval collaborator used by the RAG experiment.
pub trait VectorStore {
    /// Index documents, returning how many were stored.
    fn upsert(&mut self, documents: Vec<Document>) -> BenchResult<usize>;
    /// The `k` documents most similar to `text`, best first.
    fn query(&self, text: &str, k: usize) -> BenchResult<Vec<Document>>;
}
