//! Collects trial results in completion order and checkpoints them to disk.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use haystack_core::{
    BenchError, BenchResult, ExperimentMetadata, ResultDocument, ResultDocumentView, TrialResult,
};

#[derive(Debug)]
struct Sink {
    path: PathBuf,
    every: usize,
}

/// Owns the result list of one needle sweep. Only the scheduler's join
/// loop records into it, so it needs no locking.
#[derive(Debug)]
pub struct Aggregator {
    metadata: ExperimentMetadata,
    results: Vec<TrialResult>,
    sink: Option<Sink>,
}

impl Aggregator {
    pub fn new(
        experiment_name: impl Into<String>,
        secret_message: impl Into<String>,
        source_file: impl Into<String>,
    ) -> Self {
        Self {
            metadata: ExperimentMetadata::new(experiment_name, secret_message, source_file),
            results: Vec::new(),
            sink: None,
        }
    }

    /// Persist to `path` on `finish`, and every `every` recorded results
    /// along the way (`0` disables intermediate checkpoints).
    pub fn with_sink(mut self, path: impl Into<PathBuf>, every: usize) -> Self {
        self.sink = Some(Sink {
            path: path.into(),
            every,
        });
        self
    }

    pub fn output_path(&self) -> Option<&Path> {
        self.sink.as_ref().map(|s| s.path.as_path())
    }

    /// Append a result; checkpoint when the count hits a multiple of the
    /// configured interval. Checkpoint failures are logged, never fatal.
    pub fn record(&mut self, result: TrialResult) {
        self.results.push(result);
        let Some(sink) = &self.sink else {
            return;
        };
        if sink.every == 0 || self.results.len() % sink.every != 0 {
            return;
        }
        let view = ResultDocumentView::new(self.metadata.clone(), &self.results);
        match view.write_to(&sink.path) {
            Ok(()) => debug!(
                path = %sink.path.display(),
                count = self.results.len(),
                "checkpoint written"
            ),
            Err(e) => warn!(path = %sink.path.display(), error = %e, "checkpoint failed"),
        }
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn results(&self) -> &[TrialResult] {
        &self.results
    }

    /// Document over everything recorded so far.
    pub fn snapshot(&self) -> ResultDocument {
        let mut doc = ResultDocument {
            experiment_metadata: self.metadata.clone(),
            results: self.results.clone(),
        };
        doc.refresh_metadata();
        doc
    }

    /// Final document. When a sink is configured the final write must
    /// succeed; its error is returned to the caller.
    pub fn finish(self) -> BenchResult<ResultDocument> {
        let mut doc = ResultDocument {
            experiment_metadata: self.metadata,
            results: self.results,
        };
        doc.refresh_metadata();
        if let Some(sink) = &self.sink {
            doc.write_to(&sink.path)
                .map_err(|e| BenchError::result_write(&sink.path, e))?;
            debug!(path = %sink.path.display(), count = doc.results.len(), "results saved");
        }
        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_result;
    use haystack_core::Position;

    fn on_disk(path: &Path) -> usize {
        ResultDocument::read_from(path).unwrap().results.len()
    }

    #[test]
    fn test_checkpoints_every_n() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let mut agg = Aggregator::new("needle", "secret", "hobbit").with_sink(&path, 10);

        for i in 0..25 {
            agg.record(sample_result(1000 + i, Position::End, true));
            match i + 1 {
                1..=9 => assert!(!path.exists()),
                10 => assert_eq!(on_disk(&path), 10),
                15 => assert_eq!(on_disk(&path), 10),
                20 => assert_eq!(on_disk(&path), 20),
                _ => {}
            }
        }
        assert_eq!(on_disk(&path), 20);

        let doc = agg.finish().unwrap();
        assert_eq!(doc.results.len(), 25);
        assert_eq!(on_disk(&path), 25);
    }

    #[test]
    fn test_checkpoint_metadata_matches_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let mut agg = Aggregator::new("needle", "secret", "hobbit").with_sink(&path, 2);
        agg.record(sample_result(500, Position::End, true));
        agg.record(sample_result(100, Position::Start, false));

        let doc = ResultDocument::read_from(&path).unwrap();
        let meta = &doc.experiment_metadata;
        assert_eq!(meta.experiment_name, "needle");
        assert_eq!(meta.secret_message, "secret");
        assert_eq!(meta.total_experiments, 2);
        assert_eq!(meta.prompt_lengths, vec![100, 500]);
        assert_eq!(meta.positions, vec![Position::Start, Position::End]);
        assert_eq!(doc.results, agg.results());
    }

    #[test]
    fn test_zero_interval_writes_only_at_finish() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let mut agg = Aggregator::new("needle", "secret", "hobbit").with_sink(&path, 0);
        for i in 0..5 {
            agg.record(sample_result(i, Position::Start, false));
        }
        assert!(!path.exists());
        agg.finish().unwrap();
        assert_eq!(on_disk(&path), 5);
    }

    #[test]
    fn test_without_sink_nothing_is_written() {
        let mut agg = Aggregator::new("needle", "secret", "hobbit");
        agg.record(sample_result(1, Position::Control, false));
        assert_eq!(agg.len(), 1);
        assert!(agg.output_path().is_none());
        let doc = agg.finish().unwrap();
        assert_eq!(doc.experiment_metadata.total_experiments, 1);
    }

    #[test]
    fn test_final_write_error_is_returned() {
        let dir = tempfile::tempdir().unwrap();
        // a regular file where the parent directory should be
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "x").unwrap();
        let mut agg =
            Aggregator::new("needle", "secret", "hobbit").with_sink(blocker.join("out.json"), 1);
        // checkpoint failure is swallowed
        agg.record(sample_result(1, Position::End, true));
        assert_eq!(agg.len(), 1);
        let err = agg.finish().unwrap_err();
        assert!(matches!(err, BenchError::ResultWrite { .. }));
    }

    #[test]
    fn test_snapshot_keeps_completion_order() {
        let mut agg = Aggregator::new("needle", "secret", "hobbit");
        agg.record(sample_result(300, Position::End, true));
        agg.record(sample_result(100, Position::Start, true));
        let doc = agg.snapshot();
        let lengths: Vec<usize> = doc.results.iter().map(|r| r.target_prompt_length).collect();
        assert_eq!(lengths, vec![300, 100]);
        assert_eq!(doc.experiment_metadata.prompt_lengths, vec![100, 300]);
    }
}
