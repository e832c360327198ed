//! Runs a selection of experiments against one model and writes the
//! combined per-model results file.

use std::path::{Path, PathBuf};
use std::time::Instant;

use serde_json::{Map, Value};
use tracing::{error, info};

use haystack_core::{write_json_atomic, BenchError, BenchResult};

use crate::experiment::{lookup, ExperimentContext};

#[derive(Debug, Clone)]
pub struct ModelReport {
    pub model: String,
    /// Experiment key -> output, in run order.
    pub outputs: Map<String, Value>,
    /// Experiment key -> error message.
    pub failures: Vec<(String, String)>,
}

impl ModelReport {
    /// `{model, <experiment key>: output, ...}`
    pub fn to_json(&self) -> Value {
        let mut doc = Map::new();
        doc.insert("model".into(), Value::String(self.model.clone()));
        doc.extend(self.outputs.clone());
        Value::Object(doc)
    }

    pub fn write_to(&self, path: &Path) -> BenchResult<()> {
        write_json_atomic(path, &self.to_json())
    }
}

pub fn results_path(ctx: &ExperimentContext) -> PathBuf {
    ctx.config
        .paths
        .results_dir
        .join(format!("{}_results.json", ctx.model_slug()))
}

/// Run `ids` in order. A failing experiment is logged and left out of the
/// report; the rest still run. A result file that cannot be saved aborts
/// the run with that error. The report is written to [`results_path`].
pub fn run_model(ctx: &ExperimentContext, ids: &[u32]) -> BenchResult<ModelReport> {
    let mut report = ModelReport {
        model: ctx.model.clone(),
        outputs: Map::new(),
        failures: Vec::new(),
    };

    for &id in ids {
        let entry = lookup(id)?;
        info!(model = %ctx.model, id, name = entry.name, "running experiment");
        let started = Instant::now();

        let outcome = (entry.build)(ctx).and_then(|exp| exp.run());
        match outcome.and_then(|out| serde_json::to_value(out).map_err(Into::into)) {
            Ok(value) => {
                info!(
                    id,
                    secs = started.elapsed().as_secs_f64(),
                    "experiment finished"
                );
                report.outputs.insert(entry.key.to_string(), value);
            }
            Err(e @ BenchError::ResultWrite { .. }) => {
                error!(model = %ctx.model, id, error = %e, "experiment results not saved");
                return Err(e);
            }
            Err(e) => {
                error!(model = %ctx.model, id, error = %e, "experiment failed");
                report.failures.push((entry.key.to_string(), e.to_string()));
            }
        }
    }

    let path = results_path(ctx);
    report
        .write_to(&path)
        .map_err(|e| BenchError::result_write(&path, e))?;
    info!(model = %ctx.model, path = %path.display(), "model results saved");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::{BenchConfig, NeedleMode};
    use crate::testing::EchoClient;

    #[test]
    fn test_failed_experiment_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = BenchConfig::default();
        config.paths.documents_dir = dir.path().join("documents");
        config.paths.results_dir = dir.path().join("results");
        let ctx = ExperimentContext::new(
            "qwen3:14b",
            Arc::new(EchoClient::new("Table")),
            Arc::new(config),
        );

        // no Hebrew articles, so experiment 3 fails
        let report = run_model(&ctx, &[3, 4]).unwrap();
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, "exp3_rag");
        assert!(report.outputs.contains_key("exp4_strategies"));

        let path = dir.path().join("results").join("qwen3-14b_results.json");
        let on_disk: Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk["model"], "qwen3:14b");
        assert_eq!(on_disk["exp4_strategies"]["baseline"]["correct"], true);
        assert!(on_disk.get("exp3_rag").is_none());
    }

    #[test]
    fn test_unsaved_needle_results_fail_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("hobbit");
        std::fs::write(&source, "one two three four five six seven eight nine ten").unwrap();
        let results = dir.path().join("results");
        // a directory where the needle results file should go
        std::fs::create_dir_all(results.join("info_retrieval_m_results.json")).unwrap();

        let mut config = BenchConfig::default();
        config.paths.results_dir = results.clone();
        config.needle.info_retrieval.source_file = source;
        config.needle.info_retrieval.prompt_lengths = vec![40];
        let ctx = ExperimentContext::new("m", Arc::new(EchoClient::new("x")), Arc::new(config))
            .with_needle_mode(NeedleMode::InfoRetrieval);

        let err = run_model(&ctx, &[1, 4]).unwrap_err();
        assert!(matches!(err, BenchError::ResultWrite { .. }));
        assert!(!results.join("m_results.json").exists());
    }

    #[test]
    fn test_unwritable_report_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let results = dir.path().join("results");
        std::fs::create_dir_all(results.join("m_results.json")).unwrap();

        let mut config = BenchConfig::default();
        config.paths.results_dir = results;
        let ctx = ExperimentContext::new("m", Arc::new(EchoClient::new("Table")), Arc::new(config));
        let err = run_model(&ctx, &[4]).unwrap_err();
        assert!(matches!(err, BenchError::ResultWrite { .. }));
    }

    #[test]
    fn test_unknown_id_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = BenchConfig::default();
        config.paths.results_dir = dir.path().to_path_buf();
        let ctx = ExperimentContext::new("m", Arc::new(EchoClient::new("x")), Arc::new(config));
        assert!(run_model(&ctx, &[7]).is_err());
    }

    #[test]
    fn test_keys_follow_run_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = BenchConfig::default();
        config.paths.documents_dir = dir.path().join("documents");
        config.paths.results_dir = dir.path().join("results");
        config.needle.quick.context_words = 10;
        let ctx = ExperimentContext::new("m", Arc::new(EchoClient::new("x")), Arc::new(config));

        let report = run_model(&ctx, &[4, 2, 1]).unwrap();
        let keys: Vec<&str> = report.outputs.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["exp4_strategies", "exp2_size", "exp1_needle"]);
        assert_eq!(report.outputs["exp2_size"], serde_json::json!([]));
    }
}
