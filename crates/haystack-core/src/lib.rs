pub mod client;
pub mod document;
pub mod error;
pub mod needle;
pub mod trial;
pub mod vector;

pub use client::{GenerateParams, GenerateResponse, LlmClient, ServerStats};
pub use document::{
    write_json_atomic, ExperimentMetadata, ResultDocument, ResultDocumentView, RunSummary,
};
pub use error::{BenchError, BenchResult};
pub use needle::{detect, embed_fact, insert_secret_message};
pub use trial::{Position, TrialResult, TrialSpec};
pub use vector::{Document, VectorStore};
