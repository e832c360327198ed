use thiserror::Error;

#[derive(Debug, Error)]
pub enum BenchError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("invalid position: {0}")]
    InvalidPosition(String),

    #[error("unknown experiment: {0}")]
    UnknownExperiment(String),

    #[error("empty response from model for trial {0}")]
    EmptyResponse(String),

    #[error("runtime error: {0}")]
    Runtime(String),

    #[error("failed to save results to {path}: {reason}")]
    ResultWrite { path: String, reason: String },
}

impl BenchError {
    pub fn result_write(path: &std::path::Path, err: BenchError) -> Self {
        Self::ResultWrite {
            path: path.display().to_string(),
            reason: err.to_string(),
        }
    }
}

pub type BenchResult<T> = Result<T, BenchError>;
