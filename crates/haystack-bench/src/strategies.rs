//! Experiment 4: context management strategies over a short action log.
//!
//! Four ways of carrying history into the final question: everything
//! (baseline), keyword-selected lines, a rolling summary, and a scratchpad
//! state rewritten after every action.

use serde::{Deserialize, Serialize};
use tracing::info;

use haystack_core::{detect, BenchResult, GenerateParams};

use crate::config::StrategiesConfig;
use crate::experiment::{Experiment, ExperimentContext, ExperimentOutput};

const ANSWER_HINT: &str = "Answer with just the location name.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyOutcome {
    pub response: String,
    pub correct: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategiesReport {
    pub baseline: StrategyOutcome,
    pub select: StrategyOutcome,
    pub compress: StrategyOutcome,
    pub write: StrategyOutcome,
}

pub struct StrategiesExperiment {
    ctx: ExperimentContext,
}

impl StrategiesExperiment {
    pub fn new(ctx: ExperimentContext) -> Self {
        Self { ctx }
    }

    fn generate(&self, prompt: &str) -> String {
        self.ctx.client.generate(prompt, &GenerateParams::default())
    }

    fn answer(&self, cfg: &StrategiesConfig, header: &str, body: &str) -> StrategyOutcome {
        let prompt = format!(
            "{header}:\n{body}\n\nQuestion: {}\n{ANSWER_HINT}",
            cfg.final_question
        );
        let response = self.generate(&prompt);
        let correct = detect(&response, &cfg.expected_answer);
        StrategyOutcome { response, correct }
    }

    fn baseline(&self, cfg: &StrategiesConfig) -> StrategyOutcome {
        self.answer(cfg, "History", &cfg.actions.join("\n"))
    }

    fn select(&self, cfg: &StrategiesConfig) -> StrategyOutcome {
        let selected = select_actions(&cfg.actions, &cfg.select_keywords);
        self.answer(cfg, "Relevant History", &selected.join("\n"))
    }

    fn compress(&self, cfg: &StrategiesConfig) -> StrategyOutcome {
        let mut summary = String::new();
        for chunk in cfg.actions.chunks(cfg.summary_chunk.max(1)) {
            let prompt = format!(
                "Current Summary: {summary}\nNew Actions:\n{}\n\n\
                 Update the summary of where items are located. Keep it brief.",
                chunk.join("\n")
            );
            summary = self.generate(&prompt);
        }
        self.answer(cfg, "Summary of Events", &summary)
    }

    fn write(&self, cfg: &StrategiesConfig) -> StrategyOutcome {
        let mut scratchpad = String::from("Current State: {}");
        for action in &cfg.actions {
            let prompt = format!(
                "{scratchpad}\nAction: {action}\n\n\
                 Update the Current State JSON to reflect item locations. Return only JSON."
            );
            scratchpad = self.generate(&prompt);
        }
        self.answer(cfg, "Final State", &scratchpad)
    }
}

/// Actions mentioning any keyword (case-sensitive), in original order.
pub fn select_actions<'a>(actions: &'a [String], keywords: &[String]) -> Vec<&'a str> {
    actions
        .iter()
        .filter(|a| keywords.iter().any(|k| a.contains(k.as_str())))
        .map(String::as_str)
        .collect()
}

impl Experiment for StrategiesExperiment {
    fn run(&self) -> BenchResult<ExperimentOutput> {
        let cfg = &self.ctx.config.strategies;
        info!(model = %self.ctx.model, "context strategies experiment");

        let report = StrategiesReport {
            baseline: self.baseline(cfg),
            select: self.select(cfg),
            compress: self.compress(cfg),
            write: self.write(cfg),
        };
        info!(
            baseline = report.baseline.correct,
            select = report.select.correct,
            compress = report.compress.correct,
            write = report.write.correct,
            "strategies done"
        );
        Ok(ExperimentOutput::Strategies(report))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::BenchConfig;
    use crate::testing::EchoClient;

    #[test]
    fn test_select_actions_keeps_keyword_lines() {
        let cfg = StrategiesConfig::default();
        let selected = select_actions(&cfg.actions, &cfg.select_keywords);
        assert_eq!(
            selected,
            vec![
                "I pick up the Apple.",
                "I put the Apple on the Table.",
                "I pick up the Book.",
                "I put the Book in the Fridge.",
                "I pick up the Ball.",
            ]
        );
    }

    #[test]
    fn test_call_count_and_scoring() {
        let client = Arc::new(EchoClient::new("On the living room table"));
        let ctx = ExperimentContext::new("m", client.clone(), Arc::new(BenchConfig::default()));

        let ExperimentOutput::Strategies(report) = StrategiesExperiment::new(ctx).run().unwrap()
        else {
            panic!("wrong output variant");
        };
        assert!(report.baseline.correct);
        assert!(report.select.correct);
        assert!(report.compress.correct);
        assert!(report.write.correct);
        // 1 baseline + 1 select + 4 summaries + 1 + 10 scratchpad updates + 1
        assert_eq!(client.calls(), 18);
    }

    #[test]
    fn test_wrong_answer_is_not_correct() {
        let ctx = ExperimentContext::new(
            "m",
            Arc::new(EchoClient::new("In the Fridge")),
            Arc::new(BenchConfig::default()),
        );
        let output = StrategiesExperiment::new(ctx).run().unwrap();
        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["baseline"]["correct"], false);
        assert_eq!(json["write"]["response"], "In the Fridge");
    }
}
