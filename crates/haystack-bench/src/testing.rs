//! Stub clients and fixtures shared by the unit tests.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use haystack_core::{
    GenerateParams, GenerateResponse, LlmClient, Position, TrialResult, TrialSpec,
};

pub fn sample_spec(target_length: usize, position: Position) -> TrialSpec {
    TrialSpec {
        target_length,
        position,
        secret: "The code is XYZZY.".into(),
        expected_answer: "XYZZY".into(),
        question: "What is the code?".into(),
        source: PathBuf::from("hobbit"),
    }
}

pub fn sample_result(target_length: usize, position: Position, found: bool) -> TrialResult {
    let response = GenerateResponse {
        model: "stub".into(),
        response: "answer".into(),
        done: true,
        ..Default::default()
    };
    TrialResult::completed(
        &sample_spec(target_length, position),
        "stub",
        None,
        target_length,
        &response,
        found,
        0.01,
    )
}

fn reply(text: impl Into<String>, prompt: &str) -> GenerateResponse {
    GenerateResponse {
        model: "stub".into(),
        response: text.into(),
        done: true,
        prompt_eval_count: prompt.split_whitespace().count() as u64,
        eval_count: 3,
        total_duration: 1_000,
        ..Default::default()
    }
}

/// Answers with a fixed string and counts calls.
pub struct EchoClient {
    pub answer: String,
    pub calls: AtomicUsize,
}

impl EchoClient {
    pub fn new(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for EchoClient {
    fn generate_with_stats(&self, prompt: &str, _params: &GenerateParams) -> GenerateResponse {
        self.calls.fetch_add(1, Ordering::SeqCst);
        reply(self.answer.clone(), prompt)
    }

    async fn generate_with_stats_async(
        &self,
        prompt: &str,
        params: &GenerateParams,
    ) -> GenerateResponse {
        self.generate_with_stats(prompt, params)
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        vec![text.len() as f32, 1.0]
    }
}

/// Answers with `needle` whenever it appears in the prompt, otherwise with
/// a refusal.
pub struct SecretAwareClient {
    pub needle: String,
}

#[async_trait]
impl LlmClient for SecretAwareClient {
    fn generate_with_stats(&self, prompt: &str, _params: &GenerateParams) -> GenerateResponse {
        if prompt.contains(&self.needle) {
            reply(format!("The text says: {}", self.needle), prompt)
        } else {
            reply("I found nothing special in the text.", prompt)
        }
    }

    async fn generate_with_stats_async(
        &self,
        prompt: &str,
        params: &GenerateParams,
    ) -> GenerateResponse {
        tokio::task::yield_now().await;
        self.generate_with_stats(prompt, params)
    }

    fn embed(&self, _text: &str) -> Vec<f32> {
        Vec::new()
    }
}

/// Returns the empty envelope for prompts containing `marker`.
pub struct FailingClient {
    pub marker: String,
    pub answer: String,
}

#[async_trait]
impl LlmClient for FailingClient {
    fn generate_with_stats(&self, prompt: &str, _params: &GenerateParams) -> GenerateResponse {
        if prompt.contains(&self.marker) {
            GenerateResponse::default()
        } else {
            reply(self.answer.clone(), prompt)
        }
    }

    async fn generate_with_stats_async(
        &self,
        prompt: &str,
        params: &GenerateParams,
    ) -> GenerateResponse {
        self.generate_with_stats(prompt, params)
    }

    fn embed(&self, _text: &str) -> Vec<f32> {
        Vec::new()
    }
}

/// Panics for prompts containing `marker`.
pub struct PanickingClient {
    pub marker: String,
}

#[async_trait]
impl LlmClient for PanickingClient {
    fn generate_with_stats(&self, prompt: &str, _params: &GenerateParams) -> GenerateResponse {
        if prompt.contains(&self.marker) {
            panic!("stub client blew up");
        }
        reply("fine", prompt)
    }

    async fn generate_with_stats_async(
        &self,
        prompt: &str,
        params: &GenerateParams,
    ) -> GenerateResponse {
        self.generate_with_stats(prompt, params)
    }

    fn embed(&self, _text: &str) -> Vec<f32> {
        Vec::new()
    }
}

/// Embeds text as keyword counts so similarity follows shared vocabulary.
pub struct KeywordEmbedClient {
    pub vocabulary: Vec<String>,
    pub answer: String,
}

#[async_trait]
impl LlmClient for KeywordEmbedClient {
    fn generate_with_stats(&self, prompt: &str, _params: &GenerateParams) -> GenerateResponse {
        reply(self.answer.clone(), prompt)
    }

    async fn generate_with_stats_async(
        &self,
        prompt: &str,
        params: &GenerateParams,
    ) -> GenerateResponse {
        self.generate_with_stats(prompt, params)
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let lower = text.to_lowercase();
        self.vocabulary
            .iter()
            .map(|w| lower.matches(&w.to_lowercase()).count() as f32)
            .collect()
    }
}
