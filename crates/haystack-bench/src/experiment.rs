//! Experiment trait and the static registry of experiments 1-4.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use haystack_core::{BenchError, BenchResult, LlmClient, Position, ResultDocument};

use crate::config::{BenchConfig, NeedleMode};
use crate::needle::{NeedleExperiment, QuickOutcome};
use crate::rag::{RagExperiment, RagReport};
use crate::size::{SizeExperiment, SizeOutcome};
use crate::strategies::{StrategiesExperiment, StrategiesReport};

/// Everything an experiment needs to run against one model.
#[derive(Clone)]
pub struct ExperimentContext {
    pub model: String,
    pub client: Arc<dyn LlmClient>,
    pub config: Arc<BenchConfig>,
    pub needle_mode: NeedleMode,
}

impl ExperimentContext {
    pub fn new(model: impl Into<String>, client: Arc<dyn LlmClient>, config: Arc<BenchConfig>) -> Self {
        Self {
            model: model.into(),
            client,
            config,
            needle_mode: NeedleMode::Quick,
        }
    }

    pub fn with_needle_mode(mut self, mode: NeedleMode) -> Self {
        self.needle_mode = mode;
        self
    }

    /// Model name usable inside a file name.
    pub fn model_slug(&self) -> String {
        model_slug(&self.model)
    }
}

pub trait Experiment {
    fn run(&self) -> BenchResult<ExperimentOutput>;
}

/// What an experiment produced, serialized without a wrapper tag.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ExperimentOutput {
    NeedleQuick(BTreeMap<Position, QuickOutcome>),
    Needle(ResultDocument),
    Size(Vec<SizeOutcome>),
    Rag(RagReport),
    Strategies(StrategiesReport),
}

pub type ExperimentBuilder = fn(&ExperimentContext) -> BenchResult<Box<dyn Experiment>>;

pub struct ExperimentEntry {
    pub id: u32,
    pub name: &'static str,
    /// Key under which the output lands in the per-model results file.
    pub key: &'static str,
    pub build: ExperimentBuilder,
}

pub static REGISTRY: &[ExperimentEntry] = &[
    ExperimentEntry {
        id: 1,
        name: "Needle in Haystack",
        key: "exp1_needle",
        build: build_needle,
    },
    ExperimentEntry {
        id: 2,
        name: "Context Size",
        key: "exp2_size",
        build: build_size,
    },
    ExperimentEntry {
        id: 3,
        name: "RAG vs Full Context",
        key: "exp3_rag",
        build: build_rag,
    },
    ExperimentEntry {
        id: 4,
        name: "Context Strategies",
        key: "exp4_strategies",
        build: build_strategies,
    },
];

fn build_needle(ctx: &ExperimentContext) -> BenchResult<Box<dyn Experiment>> {
    Ok(Box::new(NeedleExperiment::new(ctx.clone())))
}

fn build_size(ctx: &ExperimentContext) -> BenchResult<Box<dyn Experiment>> {
    Ok(Box::new(SizeExperiment::new(ctx.clone())))
}

fn build_rag(ctx: &ExperimentContext) -> BenchResult<Box<dyn Experiment>> {
    Ok(Box::new(RagExperiment::new(ctx.clone())))
}

fn build_strategies(ctx: &ExperimentContext) -> BenchResult<Box<dyn Experiment>> {
    Ok(Box::new(StrategiesExperiment::new(ctx.clone())))
}

pub fn lookup(id: u32) -> BenchResult<&'static ExperimentEntry> {
    REGISTRY
        .iter()
        .find(|e| e.id == id)
        .ok_or_else(|| BenchError::UnknownExperiment(id.to_string()))
}

/// Parse a comma-separated id list such as `"1,3"`.
pub fn parse_ids(list: &str) -> BenchResult<Vec<u32>> {
    let mut ids = Vec::new();
    for part in list.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let id: u32 = part
            .parse()
            .map_err(|_| BenchError::UnknownExperiment(part.to_string()))?;
        lookup(id)?;
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    Ok(ids)
}

/// Replace anything outside `[A-Za-z0-9._-]` with `-`.
pub fn model_slug(model: &str) -> String {
    model
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect()
}
