//! Experiment 2: retrieval accuracy as the number of documents grows.

use std::time::Instant;

use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use haystack_core::{BenchResult, GenerateParams};

use crate::corpus::{count_tokens, load_articles};
use crate::experiment::{Experiment, ExperimentContext, ExperimentOutput};
use crate::scheduler::TRIAL_TEMPERATURE;

const QUESTION: &str = "What is the Unique Reference ID mentioned in the text? Return only the ID.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizeOutcome {
    pub doc_count: usize,
    pub token_count: f64,
    pub latency: f64,
    pub accuracy: f64,
    pub response: String,
}

pub struct SizeExperiment {
    ctx: ExperimentContext,
}

impl SizeExperiment {
    pub fn new(ctx: ExperimentContext) -> Self {
        Self { ctx }
    }
}

impl Experiment for SizeExperiment {
    fn run(&self) -> BenchResult<ExperimentOutput> {
        let cfg = &self.ctx.config.size;
        info!(model = %self.ctx.model, "context size experiment");

        let articles = load_articles(
            &self.ctx.config.paths.english_articles_dir(),
            cfg.article_limit,
        );
        let mut rng = StdRng::seed_from_u64(self.ctx.config.run.seed);
        let params = GenerateParams::default().with_temperature(TRIAL_TEMPERATURE);

        let mut results = Vec::new();
        for &doc_count in &cfg.doc_counts {
            if doc_count == 0 || doc_count > articles.len() {
                warn!(doc_count, available = articles.len(), "not enough articles, skipping");
                continue;
            }

            let mut selected: Vec<String> = articles
                .choose_multiple(&mut rng, doc_count)
                .cloned()
                .collect();
            let unique_id = format!("ID-{}", rng.random_range(cfg.id_min..=cfg.id_max));
            let target = selected.len() / 2;
            selected[target].push_str(&format!("\n\nUnique Reference ID: {unique_id}"));

            let context = selected.join("\n\n");
            let token_count = count_tokens(&context);
            let prompt = format!("Context:\n{context}\n\nQuestion: {QUESTION}");

            let started = Instant::now();
            let response = self.ctx.client.generate(&prompt, &params);
            let latency = started.elapsed().as_secs_f64();

            let correct = response.contains(&unique_id);
            info!(doc_count, tokens = token_count, correct, latency, "size step done");
            results.push(SizeOutcome {
                doc_count,
                token_count,
                latency,
                accuracy: if correct { 1.0 } else { 0.0 },
                response,
            });
        }
        Ok(ExperimentOutput::Size(results))
    }
}
