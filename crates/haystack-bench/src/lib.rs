pub mod aggregator;
pub mod config;
pub mod corpus;
pub mod experiment;
pub mod needle;
pub mod rag;
pub mod runner;
pub mod scheduler;
pub mod size;
pub mod strategies;

#[cfg(test)]
mod testing;

pub use aggregator::Aggregator;
pub use config::{BenchConfig, DetailedConfig, NeedleMode};
pub use experiment::{
    lookup, model_slug, parse_ids, Experiment, ExperimentContext, ExperimentOutput, REGISTRY,
};
pub use needle::NeedleExperiment;
pub use runner::{results_path, run_model, ModelReport};
pub use scheduler::{BatchReport, SchedulerSettings, TrialOutcome, TrialScheduler};
