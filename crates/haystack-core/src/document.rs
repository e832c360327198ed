use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BenchResult;
use crate::trial::{Position, TrialResult};

// ---------------------------------------------------------------------------
// ResultDocument
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentMetadata {
    pub experiment_name: String,
    pub date_run: DateTime<Utc>,
    pub secret_message: String,
    pub source_file: String,
    pub total_experiments: usize,
    pub models: Vec<String>,
    pub prompt_lengths: Vec<usize>,
    pub positions: Vec<Position>,
}

/// Persisted artifact of one run: metadata plus every trial record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultDocument {
    pub experiment_metadata: ExperimentMetadata,
    pub results: Vec<TrialResult>,
}

impl ExperimentMetadata {
    pub fn new(
        experiment_name: impl Into<String>,
        secret_message: impl Into<String>,
        source_file: impl Into<String>,
    ) -> Self {
        Self {
            experiment_name: experiment_name.into(),
            date_run: Utc::now(),
            secret_message: secret_message.into(),
            source_file: source_file.into(),
            total_experiments: 0,
            models: Vec::new(),
            prompt_lengths: Vec::new(),
            positions: Vec::new(),
        }
    }

    /// Recompute the count and the model/length/position sets from the
    /// results actually present.
    pub fn observe(&mut self, results: &[TrialResult]) {
        let models: BTreeSet<&str> = results.iter().map(|r| r.model.as_str()).collect();
        let lengths: BTreeSet<usize> = results.iter().map(|r| r.target_prompt_length).collect();
        let positions: BTreeSet<Position> = results.iter().map(|r| r.message_position).collect();

        self.total_experiments = results.len();
        self.models = models.into_iter().map(str::to_string).collect();
        self.prompt_lengths = lengths.into_iter().collect();
        self.positions = positions.into_iter().collect();
    }
}

impl ResultDocument {
    pub fn new(
        experiment_name: impl Into<String>,
        secret_message: impl Into<String>,
        source_file: impl Into<String>,
        results: Vec<TrialResult>,
    ) -> Self {
        let mut experiment_metadata =
            ExperimentMetadata::new(experiment_name, secret_message, source_file);
        experiment_metadata.observe(&results);
        Self {
            experiment_metadata,
            results,
        }
    }

    pub fn refresh_metadata(&mut self) {
        self.experiment_metadata.observe(&self.results);
    }

    /// Union of several documents. Static metadata comes from the first one.
    pub fn merge(docs: Vec<ResultDocument>) -> Option<Self> {
        let mut iter = docs.into_iter();
        let mut merged = iter.next()?;
        for doc in iter {
            merged.results.extend(doc.results);
        }
        merged.experiment_metadata.date_run = Utc::now();
        merged.refresh_metadata();
        Some(merged)
    }

    pub fn read_from(path: &Path) -> BenchResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn write_to(&self, path: &Path) -> BenchResult<()> {
        write_json_atomic(path, self)
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary::from_results(&self.results)
    }
}

/// Borrowed form of [`ResultDocument`] with the same JSON layout, for
/// writing checkpoints without copying the result list.
#[derive(Debug, Serialize)]
pub struct ResultDocumentView<'a> {
    pub experiment_metadata: ExperimentMetadata,
    pub results: &'a [TrialResult],
}

impl<'a> ResultDocumentView<'a> {
    pub fn new(mut experiment_metadata: ExperimentMetadata, results: &'a [TrialResult]) -> Self {
        experiment_metadata.observe(results);
        Self {
            experiment_metadata,
            results,
        }
    }

    pub fn write_to(&self, path: &Path) -> BenchResult<()> {
        write_json_atomic(path, self)
    }
}

/// Pretty-printed JSON, written to a sibling temp file and renamed into
/// place so readers never see a half-written file. Missing parent
/// directories are created.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> BenchResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// RunSummary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub total: usize,
    pub successful: usize,
    pub detected: usize,
}

impl RunSummary {
    pub fn from_results(results: &[TrialResult]) -> Self {
        let successful: Vec<&TrialResult> = results.iter().filter(|r| r.is_success()).collect();
        Self {
            total: results.len(),
            successful: successful.len(),
            detected: successful.iter().filter(|r| r.found_secret).count(),
        }
    }

    /// Share of successful trials where the secret was detected, in percent.
    pub fn detection_rate(&self) -> f64 {
        if self.successful == 0 {
            0.0
        } else {
            self.detected as f64 / self.successful as f64 * 100.0
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Successful runs: {}/{}", self.successful, self.total)?;
        write!(
            f,
            "Secret detected: {}/{} ({:.1}%)",
            self.detected,
            self.successful,
            self.detection_rate()
        )
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::client::GenerateResponse;
    use crate::trial::TrialSpec;

    fn result(model: &str, length: usize, position: Position, found: bool) -> TrialResult {
        let spec = TrialSpec {
            target_length: length,
            position,
            secret: "s".into(),
            expected_answer: "s".into(),
            question: "q".into(),
            source: PathBuf::from("src"),
        };
        let resp = GenerateResponse {
            response: "r".into(),
            ..Default::default()
        };
        TrialResult::completed(&spec, model, None, length, &resp, found, 0.5)
    }

    #[test]
    fn test_metadata_reflects_observed_results() {
        let doc = ResultDocument::new(
            "needle",
            "s",
            "hobbit",
            vec![
                result("b", 200, Position::End, true),
                result("a", 100, Position::Control, false),
                result("a", 200, Position::End, true),
            ],
        );
        let meta = &doc.experiment_metadata;
        assert_eq!(meta.total_experiments, 3);
        assert_eq!(meta.models, vec!["a", "b"]);
        assert_eq!(meta.prompt_lengths, vec![100, 200]);
        assert_eq!(meta.positions, vec![Position::Control, Position::End]);
    }

    #[test]
    fn test_empty_document() {
        let doc = ResultDocument::new("needle", "s", "hobbit", Vec::new());
        assert_eq!(doc.experiment_metadata.total_experiments, 0);
        assert!(doc.experiment_metadata.models.is_empty());
        assert_eq!(doc.summary().detection_rate(), 0.0);
    }

    #[test]
    fn test_write_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("results.json");
        let doc = ResultDocument::new(
            "needle",
            "s",
            "hobbit",
            vec![result("a", 100, Position::Start, true)],
        );
        doc.write_to(&path).unwrap();
        let back = ResultDocument::read_from(&path).unwrap();
        assert_eq!(back, doc);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_written_json_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        ResultDocument::new("needle", "s", "hobbit", vec![result("a", 100, Position::Middle, true)])
            .write_to(&path)
            .unwrap();
        let v: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(v["experiment_metadata"]["total_experiments"], 1);
        assert_eq!(v["experiment_metadata"]["positions"][0], "middle");
        assert_eq!(v["results"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_merge_unions_results() {
        let a = ResultDocument::new("needle", "s", "hobbit", vec![result("a", 100, Position::Start, true)]);
        let b = ResultDocument::new(
            "other-name",
            "s",
            "hobbit",
            vec![
                result("b", 300, Position::End, false),
                result("b", 100, Position::Start, true),
            ],
        );
        let merged = ResultDocument::merge(vec![a, b]).unwrap();
        let meta = &merged.experiment_metadata;
        assert_eq!(meta.experiment_name, "needle");
        assert_eq!(meta.total_experiments, 3);
        assert_eq!(meta.models, vec!["a", "b"]);
        assert_eq!(meta.prompt_lengths, vec![100, 300]);
        assert!(ResultDocument::merge(Vec::new()).is_none());
    }

    #[test]
    fn test_view_serializes_like_owned_document() {
        let results = vec![
            result("a", 100, Position::Start, true),
            result("b", 200, Position::End, false),
        ];
        let meta = ExperimentMetadata::new("needle", "s", "hobbit");
        let view = ResultDocumentView::new(meta.clone(), &results);
        let mut owned = ResultDocument {
            experiment_metadata: meta,
            results: results.clone(),
        };
        owned.refresh_metadata();
        assert_eq!(
            serde_json::to_value(&view).unwrap(),
            serde_json::to_value(&owned).unwrap()
        );
    }

    #[test]
    fn test_write_json_atomic_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("report.json");
        write_json_atomic(&path, &serde_json::json!({"model": "m"})).unwrap();
        let v: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(v["model"], "m");
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_write_json_atomic_reports_blocked_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        std::fs::create_dir(&path).unwrap();
        assert!(write_json_atomic(&path, &serde_json::json!({})).is_err());
    }

    #[test]
    fn test_summary_counts() {
        let mut failed = result("a", 100, Position::End, false);
        failed.error = Some("timeout".into());
        let results = vec![
            result("a", 100, Position::Start, true),
            result("a", 100, Position::Middle, false),
            failed,
        ];
        let summary = RunSummary::from_results(&results);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.successful, 2);
        assert_eq!(summary.detected, 1);
        assert_eq!(summary.detection_rate(), 50.0);
        assert!(summary.to_string().contains("1/2 (50.0%)"));
    }
}
