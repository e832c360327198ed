//! Experiment settings. Every section is optional in the TOML file; missing
//! fields fall back to the defaults below.

use std::fmt;
use std::path::PathBuf;

use serde::Deserialize;

use haystack_core::{BenchError, BenchResult, Position};

/// Everything the experiments read. Built once at start-up, shared
/// read-only afterwards.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    pub paths: PathsConfig,
    pub run: RunConfig,
    pub needle: NeedleConfigs,
    pub size: SizeConfig,
    pub rag: RagConfig,
    pub strategies: StrategiesConfig,
}

impl BenchConfig {
    pub fn validate(&self) -> BenchResult<()> {
        if self.run.max_in_flight == 0 {
            return Err(BenchError::Config("run.max_in_flight must be at least 1".into()));
        }
        if self.run.max_processes == 0 {
            return Err(BenchError::Config("run.max_processes must be at least 1".into()));
        }
        self.needle.quick.validate()?;
        self.needle.info_retrieval.validate("needle.info_retrieval")?;
        self.needle.anomaly_detection.validate("needle.anomaly_detection")?;
        if self.size.id_min > self.size.id_max {
            return Err(BenchError::Config("size.id_min must not exceed size.id_max".into()));
        }
        if self.rag.chunk_overlap >= self.rag.chunk_size {
            return Err(BenchError::Config(
                "rag.chunk_overlap must be smaller than rag.chunk_size".into(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Paths and run settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub documents_dir: PathBuf,
    pub results_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            documents_dir: PathBuf::from("documents"),
            results_dir: PathBuf::from("results"),
        }
    }
}

impl PathsConfig {
    pub fn english_articles_dir(&self) -> PathBuf {
        self.documents_dir.join("articles_english")
    }

    pub fn hebrew_articles_dir(&self) -> PathBuf {
        self.documents_dir.join("articles_hebrew")
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub models: Vec<String>,
    /// Requests in flight per process.
    pub max_in_flight: usize,
    /// Model processes running at once with `--parallel`.
    pub max_processes: usize,
    /// Write the result document every N recorded trials (0 = only at the end).
    pub checkpoint_every: usize,
    /// Keep failed trials as error records instead of dropping them.
    pub record_failures: bool,
    pub seed: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            models: vec![
                "llama3.2:3b-100K".into(),
                "granite3.3:2b-100K".into(),
                "gpt-oss:20b-100K".into(),
                "gemma3:12b-100K".into(),
                "qwen3:14b-100K".into(),
            ],
            max_in_flight: 4,
            max_processes: 4,
            checkpoint_every: 10,
            record_failures: false,
            seed: 42,
        }
    }
}

// ---------------------------------------------------------------------------
// Needle
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NeedleMode {
    Quick,
    InfoRetrieval,
    AnomalyDetection,
}

impl fmt::Display for NeedleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Quick => write!(f, "quick"),
            Self::InfoRetrieval => write!(f, "info_retrieval"),
            Self::AnomalyDetection => write!(f, "anomaly_detection"),
        }
    }
}

impl std::str::FromStr for NeedleMode {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "quick" => Ok(Self::Quick),
            "info_retrieval" => Ok(Self::InfoRetrieval),
            "anomaly_detection" => Ok(Self::AnomalyDetection),
            _ => Err(BenchError::Config(format!("invalid needle mode: {s}"))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NeedleConfigs {
    pub quick: QuickConfig,
    pub info_retrieval: DetailedConfig,
    pub anomaly_detection: DetailedConfig,
}

impl Default for NeedleConfigs {
    fn default() -> Self {
        Self {
            quick: QuickConfig::default(),
            info_retrieval: DetailedConfig::default(),
            anomaly_detection: DetailedConfig::anomaly_detection(),
        }
    }
}

impl NeedleConfigs {
    /// Sweep settings for a detailed mode; `None` for quick mode.
    pub fn detailed(&self, mode: NeedleMode) -> Option<&DetailedConfig> {
        match mode {
            NeedleMode::Quick => None,
            NeedleMode::InfoRetrieval => Some(&self.info_retrieval),
            NeedleMode::AnomalyDetection => Some(&self.anomaly_detection),
        }
    }
}

/// Single-context needle check over generated filler text.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QuickConfig {
    pub fact: String,
    pub question: String,
    pub expected_answer: String,
    pub context_words: usize,
    pub positions: Vec<Position>,
}

impl Default for QuickConfig {
    fn default() -> Self {
        Self {
            fact: "The secret password for the archive vault is 'BLUE-HERON-42'.".into(),
            question: "What is the secret password for the archive vault?".into(),
            expected_answer: "BLUE-HERON-42".into(),
            context_words: 2000,
            positions: vec![Position::Start, Position::Middle, Position::End],
        }
    }
}

impl QuickConfig {
    fn validate(&self) -> BenchResult<()> {
        if self.expected_answer.trim().is_empty() {
            return Err(BenchError::Config("needle.quick.expected_answer is empty".into()));
        }
        if self.positions.is_empty() {
            return Err(BenchError::Config("needle.quick.positions is empty".into()));
        }
        Ok(())
    }
}

/// Length × position sweep over a source text.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetailedConfig {
    pub secret_message: String,
    pub question: String,
    pub expected_answer: String,
    pub source_file: PathBuf,
    pub prompt_lengths: Vec<usize>,
    pub positions: Vec<Position>,
}

impl Default for DetailedConfig {
    fn default() -> Self {
        Self {
            secret_message: "To enable god-mode, type 'DQDDI'.".into(),
            question: "What special code or instruction, if any, is mentioned in the text for enabling god-mode?".into(),
            expected_answer: "DQDDI".into(),
            source_file: PathBuf::from("hobbit"),
            prompt_lengths: vec![60_000, 70_000, 80_000, 90_000, 100_000],
            positions: Position::ALL.to_vec(),
        }
    }
}

impl DetailedConfig {
    /// Defaults for the anomaly-detection sweep.
    pub fn anomaly_detection() -> Self {
        Self {
            secret_message: "NOTICE: the maintenance override code for the server room is 7781-QX.".into(),
            question: "Is there any sentence in the text that is out of place or unrelated to the story? If so, quote it exactly.".into(),
            expected_answer: "7781-QX".into(),
            prompt_lengths: vec![10_000, 20_000, 40_000, 60_000],
            ..Self::default()
        }
    }

    fn validate(&self, section: &str) -> BenchResult<()> {
        if self.expected_answer.trim().is_empty() {
            return Err(BenchError::Config(format!("{section}.expected_answer is empty")));
        }
        if self.prompt_lengths.iter().any(|&l| l == 0) {
            return Err(BenchError::Config(format!(
                "{section}.prompt_lengths must be positive"
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Other experiments
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SizeConfig {
    pub doc_counts: Vec<usize>,
    pub id_min: u32,
    pub id_max: u32,
    pub article_limit: usize,
}

impl Default for SizeConfig {
    fn default() -> Self {
        Self {
            doc_counts: vec![2, 5, 10, 20, 50],
            id_min: 1000,
            id_max: 9999,
            article_limit: 150,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    pub k: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub article_limit: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            k: 3,
            chunk_size: 500,
            chunk_overlap: 50,
            article_limit: 20,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StrategiesConfig {
    pub actions: Vec<String>,
    pub final_question: String,
    pub expected_answer: String,
    /// Lines containing any of these survive the "select" strategy.
    pub select_keywords: Vec<String>,
    /// Actions folded into the rolling summary per step.
    pub summary_chunk: usize,
}

impl Default for StrategiesConfig {
    fn default() -> Self {
        let actions = [
            "I enter the Kitchen.",
            "I pick up the Apple.",
            "I move to the Living Room.",
            "I put the Apple on the Table.",
            "I move to the Bedroom.",
            "I pick up the Book.",
            "I move to the Kitchen.",
            "I put the Book in the Fridge.",
            "I move to the Garden.",
            "I pick up the Ball.",
        ];
        Self {
            actions: actions.iter().map(|a| a.to_string()).collect(),
            final_question: "Where is the Apple?".into(),
            expected_answer: "Table".into(),
            select_keywords: vec!["Apple".into(), "put".into(), "pick".into()],
            summary_chunk: 3,
        }
    }
}
