//! Experiment 1: needle in a haystack.
//!
//! Quick mode embeds one fact into generated filler text at a few positions
//! and asks synchronously. The detailed modes sweep lengths × positions over
//! a source text through the concurrent scheduler.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::info;

use haystack_core::{
    detect, embed_fact, BenchError, BenchResult, GenerateParams, Position, ResultDocument,
};

use crate::aggregator::Aggregator;
use crate::config::{DetailedConfig, NeedleMode};
use crate::corpus::{generate_filler_text, load_articles};
use crate::experiment::{Experiment, ExperimentContext, ExperimentOutput};
use crate::scheduler::{build_specs, SchedulerSettings, TrialScheduler, TRIAL_TEMPERATURE};

/// English articles sampled for quick-mode filler.
const ENGLISH_ARTICLE_LIMIT: usize = 150;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuickOutcome {
    pub accuracy: f64,
    pub latency: f64,
    pub response: String,
    pub prompt_tokens: u64,
}

pub struct NeedleExperiment {
    ctx: ExperimentContext,
}

impl NeedleExperiment {
    pub fn new(ctx: ExperimentContext) -> Self {
        Self { ctx }
    }

    /// Where a detailed sweep for this model is written.
    pub fn output_path(&self) -> PathBuf {
        self.ctx.config.paths.results_dir.join(format!(
            "{}_{}_results.json",
            self.ctx.needle_mode,
            self.ctx.model_slug()
        ))
    }

    pub fn run_quick(&self) -> BenchResult<BTreeMap<Position, QuickOutcome>> {
        let cfg = &self.ctx.config.needle.quick;
        info!(model = %self.ctx.model, "needle experiment, quick mode");

        let articles = load_articles(
            &self.ctx.config.paths.english_articles_dir(),
            ENGLISH_ARTICLE_LIMIT,
        );
        let mut rng = StdRng::seed_from_u64(self.ctx.config.run.seed);
        let base = generate_filler_text(cfg.context_words, &articles, &mut rng);
        let params = GenerateParams::default().with_temperature(TRIAL_TEMPERATURE);

        let mut results = BTreeMap::new();
        for &position in &cfg.positions {
            let context = embed_fact(&base, &cfg.fact, position);
            let prompt = format!("Context:\n{context}\n\nQuestion: {}", cfg.question);

            let started = Instant::now();
            let response = self.ctx.client.generate_with_stats(&prompt, &params);
            let latency = started.elapsed().as_secs_f64();

            let correct = detect(&response.response, &cfg.expected_answer);
            info!(%position, correct, latency, "quick needle position done");
            results.insert(
                position,
                QuickOutcome {
                    accuracy: if correct { 1.0 } else { 0.0 },
                    latency,
                    response: response.response,
                    prompt_tokens: response.prompt_eval_count,
                },
            );
        }
        Ok(results)
    }

    /// Detailed sweep written to [`Self::output_path`].
    pub fn run_detailed(&self) -> BenchResult<ResultDocument> {
        self.run_detailed_to(self.output_path())
    }

    /// Detailed sweep on a fresh single-threaded runtime, written to `path`.
    pub fn run_detailed_to(&self, path: PathBuf) -> BenchResult<ResultDocument> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.run_detailed_async(Some(path)))
    }

    /// Detailed sweep on the caller's runtime. With `output` set, results
    /// are checkpointed there and the final document written.
    pub async fn run_detailed_async(&self, output: Option<PathBuf>) -> BenchResult<ResultDocument> {
        let mode = self.ctx.needle_mode;
        let cfg = self.detailed_config()?;
        let run = &self.ctx.config.run;
        info!(model = %self.ctx.model, %mode, "needle experiment, detailed mode");

        let mut aggregator = Aggregator::new(
            format!("needle-in-haystack-{mode}"),
            cfg.secret_message.clone(),
            cfg.source_file.display().to_string(),
        );
        if let Some(path) = output {
            aggregator = aggregator.with_sink(path, run.checkpoint_every);
        }

        let settings = SchedulerSettings {
            max_in_flight: run.max_in_flight,
            record_failures: run.record_failures,
        };
        let scheduler = TrialScheduler::new(self.ctx.model.clone(), self.ctx.client.clone(), settings)
            .with_mode(mode.to_string());
        scheduler.run(build_specs(cfg), &mut aggregator).await;

        let doc = aggregator.finish()?;
        info!(model = %self.ctx.model, "{}", doc.summary().to_string().replace('\n', "; "));
        Ok(doc)
    }

    fn detailed_config(&self) -> BenchResult<&DetailedConfig> {
        self.ctx
            .config
            .needle
            .detailed(self.ctx.needle_mode)
            .ok_or_else(|| {
                BenchError::Config(format!(
                    "needle mode {} has no sweep settings",
                    self.ctx.needle_mode
                ))
            })
    }
}

impl Experiment for NeedleExperiment {
    fn run(&self) -> BenchResult<ExperimentOutput> {
        match self.ctx.needle_mode {
            NeedleMode::Quick => self.run_quick().map(ExperimentOutput::NeedleQuick),
            _ => self.run_detailed().map(ExperimentOutput::Needle),
        }
    }
}
