//! Concurrent execution of a needle sweep.
//!
//! Every trial is its own tokio task; a semaphore caps how many requests
//! are in flight at once. Results reach the [`Aggregator`] from the single
//! join loop, in completion order.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use haystack_core::{
    detect, insert_secret_message, BenchError, GenerateParams, LlmClient, TrialResult, TrialSpec,
};

use crate::aggregator::Aggregator;
use crate::config::DetailedConfig;
use crate::corpus::load_text_from_file;

pub const TRIAL_TEMPERATURE: f32 = 0.1;
pub const TRIAL_MAX_TOKENS: u32 = 500;

/// Cross product of lengths (outer) and positions (inner).
pub fn build_specs(config: &DetailedConfig) -> Vec<TrialSpec> {
    config
        .prompt_lengths
        .iter()
        .flat_map(|&target_length| {
            config.positions.iter().map(move |&position| TrialSpec {
                target_length,
                position,
                secret: config.secret_message.clone(),
                expected_answer: config.expected_answer.clone(),
                question: config.question.clone(),
                source: config.source_file.clone(),
            })
        })
        .collect()
}

pub fn render_prompt(question: &str, text: &str) -> String {
    format!(
        "Below is a passage of text. Please read it carefully and answer the following question:\n\n\
         {question}\n\n<TEXT>\n{text}\n</TEXT>\n\nPlease provide your answer clearly."
    )
}

pub fn trial_params() -> GenerateParams {
    GenerateParams::default()
        .with_temperature(TRIAL_TEMPERATURE)
        .with_max_tokens(TRIAL_MAX_TOKENS)
}

#[derive(Debug)]
pub enum TrialOutcome {
    Completed(TrialResult),
    Failed {
        spec: TrialSpec,
        error: String,
        elapsed: f64,
    },
    /// Source text unavailable; no query was made.
    Skipped(TrialSpec),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.completed + self.failed + self.skipped
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SchedulerSettings {
    pub max_in_flight: usize,
    pub record_failures: bool,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            max_in_flight: 4,
            record_failures: false,
        }
    }
}

pub struct TrialScheduler {
    model: String,
    mode: Option<String>,
    client: Arc<dyn LlmClient>,
    settings: SchedulerSettings,
}

impl TrialScheduler {
    pub fn new(
        model: impl Into<String>,
        client: Arc<dyn LlmClient>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            model: model.into(),
            mode: None,
            client,
            settings,
        }
    }

    pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = Some(mode.into());
        self
    }

    /// Run every spec and feed the results into `aggregator`.
    ///
    /// A failing or panicking trial never aborts the batch; it is counted
    /// and, with `record_failures`, kept as an error record.
    pub async fn run(&self, specs: Vec<TrialSpec>, aggregator: &mut Aggregator) -> BatchReport {
        let total = specs.len();
        let semaphore = Arc::new(Semaphore::new(self.settings.max_in_flight.max(1)));
        let mut tasks = JoinSet::new();
        let mut pending = HashMap::with_capacity(total);

        info!(
            model = %self.model,
            trials = total,
            max_in_flight = self.settings.max_in_flight,
            "starting sweep"
        );

        for spec in specs {
            let semaphore = Arc::clone(&semaphore);
            let client = Arc::clone(&self.client);
            let model = self.model.clone();
            let mode = self.mode.clone();
            let task_spec = spec.clone();
            let handle = tasks.spawn(async move {
                // the semaphore is never closed
                let _permit = semaphore.acquire_owned().await.ok();
                run_trial(client.as_ref(), &model, mode.as_deref(), task_spec).await
            });
            pending.insert(handle.id(), spec);
        }

        let mut report = BatchReport::default();
        while let Some(joined) = tasks.join_next_with_id().await {
            let outcome = match joined {
                Ok((id, outcome)) => {
                    pending.remove(&id);
                    outcome
                }
                Err(e) => {
                    let Some(spec) = pending.remove(&e.id()) else {
                        error!(error = %e, "trial task lost");
                        report.failed += 1;
                        continue;
                    };
                    error!(
                        length = spec.target_length,
                        position = %spec.position,
                        error = %e,
                        "trial task panicked"
                    );
                    TrialOutcome::Failed {
                        spec,
                        error: e.to_string(),
                        elapsed: 0.0,
                    }
                }
            };
            self.absorb(outcome, aggregator, &mut report);
            debug!(done = report.total(), total, "progress");
        }

        info!(
            model = %self.model,
            completed = report.completed,
            failed = report.failed,
            skipped = report.skipped,
            "sweep finished"
        );
        report
    }

    fn absorb(&self, outcome: TrialOutcome, aggregator: &mut Aggregator, report: &mut BatchReport) {
        match outcome {
            TrialOutcome::Completed(result) => {
                report.completed += 1;
                aggregator.record(result);
            }
            TrialOutcome::Failed {
                spec,
                error,
                elapsed,
            } => {
                report.failed += 1;
                if self.settings.record_failures {
                    aggregator.record(TrialResult::failed(
                        &spec,
                        &self.model,
                        self.mode.as_deref(),
                        elapsed,
                        error,
                    ));
                }
            }
            TrialOutcome::Skipped(_) => report.skipped += 1,
        }
    }
}

/// Load, insert, query, detect. The empty envelope from the client counts
/// as a failure.
pub async fn run_trial(
    client: &dyn LlmClient,
    model: &str,
    mode: Option<&str>,
    spec: TrialSpec,
) -> TrialOutcome {
    info!(length = spec.target_length, position = %spec.position, "trial started");

    let Some(base_text) = load_text_from_file(&spec.source, spec.target_length) else {
        warn!(source = %spec.source.display(), "could not load source text, skipping trial");
        return TrialOutcome::Skipped(spec);
    };

    let text = insert_secret_message(&base_text, spec.position, &spec.secret);
    let prompt = render_prompt(&spec.question, &text);

    let started = Instant::now();
    let response = client
        .generate_with_stats_async(&prompt, &trial_params())
        .await;
    let elapsed = started.elapsed().as_secs_f64();

    if response.is_empty() {
        warn!(
            length = spec.target_length,
            position = %spec.position,
            "empty response, trial failed"
        );
        let error = BenchError::EmptyResponse(spec.trial_id(model, Utc::now())).to_string();
        return TrialOutcome::Failed {
            spec,
            error,
            elapsed,
        };
    }

    let found = detect(&response.response, &spec.expected_answer);
    info!(
        found,
        tokens = response.prompt_eval_count,
        secs = elapsed,
        "trial finished"
    );
    TrialOutcome::Completed(TrialResult::completed(
        &spec,
        model,
        mode,
        text.chars().count(),
        &response,
        found,
        elapsed,
    ))
}
