use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{BenchError, BenchResult};

pub const MAX_TEMPERATURE: f32 = 2.0;

/// Sampling parameters for one generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateParams {
    pub system: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerateParams {
    fn default() -> Self {
        Self {
            system: String::new(),
            temperature: 0.7,
            max_tokens: 2048,
        }
    }
}

impl GenerateParams {
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = system.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn validate(&self) -> BenchResult<()> {
        if !self.temperature.is_finite() || !(0.0..=MAX_TEMPERATURE).contains(&self.temperature) {
            return Err(BenchError::Config(format!(
                "temperature must be within [0, {MAX_TEMPERATURE}], got {}",
                self.temperature
            )));
        }
        if self.max_tokens == 0 {
            return Err(BenchError::Config("max_tokens must be positive".into()));
        }
        Ok(())
    }
}

/// Response envelope of the generation endpoint.
///
/// The all-default value is the failure sentinel returned by clients when a
/// request could not be completed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerateResponse {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub eval_count: u64,
    #[serde(default)]
    pub eval_duration: u64,
    #[serde(default)]
    pub load_duration: u64,
    #[serde(default)]
    pub prompt_eval_count: u64,
    #[serde(default)]
    pub prompt_eval_duration: u64,
    #[serde(default)]
    pub total_duration: u64,
}

impl GenerateResponse {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn stats(&self) -> ServerStats {
        ServerStats {
            eval_count: self.eval_count,
            eval_duration: self.eval_duration,
            load_duration: self.load_duration,
            prompt_eval_count: self.prompt_eval_count,
            prompt_eval_duration: self.prompt_eval_duration,
            total_duration: self.total_duration,
        }
    }
}

/// Token counts and timing breakdown (nanoseconds) reported by the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerStats {
    pub eval_count: u64,
    pub eval_duration: u64,
    pub load_duration: u64,
    pub prompt_eval_count: u64,
    pub prompt_eval_duration: u64,
    pub total_duration: u64,
}

/// Capability set shared by every inference backend.
///
/// Implementations never surface transport errors: a failed call yields an
/// empty string, an empty [`GenerateResponse`] or an empty vector, and the
/// failure is logged where it happened.
#[async_trait]
pub trait LlmClient: Send + Sync {
    fn generate(&self, prompt: &str, params: &GenerateParams) -> String {
        self.generate_with_stats(prompt, params).response
    }

    fn generate_with_stats(&self, prompt: &str, params: &GenerateParams) -> GenerateResponse;

    /// Same contract and cache key as [`LlmClient::generate_with_stats`].
    async fn generate_with_stats_async(
        &self,
        prompt: &str,
        params: &GenerateParams,
    ) -> GenerateResponse;

    fn embed(&self, text: &str) -> Vec<f32>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_params_are_valid() {
        let params = GenerateParams::default();
        assert!(params.validate().is_ok());
        assert_eq!(params.max_tokens, 2048);
        assert!(params.system.is_empty());
    }

    #[test]
    fn test_params_reject_out_of_range_temperature() {
        assert!(GenerateParams::default()
            .with_temperature(2.5)
            .validate()
            .is_err());
        assert!(GenerateParams::default()
            .with_temperature(-0.1)
            .validate()
            .is_err());
        assert!(GenerateParams::default()
            .with_temperature(f32::NAN)
            .validate()
            .is_err());
        assert!(GenerateParams::default()
            .with_temperature(2.0)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_params_reject_zero_max_tokens() {
        assert!(GenerateParams::default()
            .with_max_tokens(0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_response_decodes_partial_envelope() {
        let raw = r#"{"response": "hello", "prompt_eval_count": 12}"#;
        let resp: GenerateResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(resp.response, "hello");
        assert_eq!(resp.prompt_eval_count, 12);
        assert_eq!(resp.eval_count, 0);
        assert!(!resp.is_empty());
    }

    #[test]
    fn test_default_response_is_failure_sentinel() {
        assert!(GenerateResponse::default().is_empty());
        assert_eq!(GenerateResponse::default().stats(), ServerStats::default());
    }
}
