//! Deterministic stub client for offline and test runs.
//!
//! Responses are chosen by substring match on the prompt, first match
//! wins; with no match the stub answers an empty JSON object, which the
//! schema-guided extractor treats as "nothing found". Same inputs, same
//! outputs, every run.

use super::{LlmClient, LlmError, LlmResponse};
use async_trait::async_trait;

pub struct StubLlm {
    responses: Vec<(String, String)>,
}

impl StubLlm {
    /// Always answers `{}`.
    pub fn empty() -> Self {
        StubLlm {
            responses: Vec::new(),
        }
    }

    /// Answer `response` whenever `needle` appears in the prompt.
    pub fn with_responses(responses: Vec<(String, String)>) -> Self {
        StubLlm { responses }
    }

    fn answer(&self, prompt: &str) -> String {
        for (needle, response) in &self.responses {
            if prompt.contains(needle.as_str()) {
                return response.clone();
            }
        }
        "{}".to_string()
    }
}

#[async_trait]
impl LlmClient for StubLlm {
    async fn complete(
        &self,
        prompt: &str,
        _system: Option<&str>,
    ) -> Result<LlmResponse, LlmError> {
        Ok(LlmResponse {
            text: self.answer(prompt),
            provider: "stub".to_string(),
            model: "stub".to_string(),
            cached: false,
        })
    }

    async fn complete_json(
        &self,
        prompt: &str,
        system: Option<&str>,
    ) -> Result<LlmResponse, LlmError> {
        self.complete(prompt, system).await
    }

    fn provider_name(&self) -> &'static str {
        "stub"
    }

    fn model_name(&self) -> &str {
        "stub"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_matching_needle_wins() {
        let stub = StubLlm::with_responses(vec![
            ("alpha".to_string(), "{\"a\":1}".to_string()),
            ("beta".to_string(), "{\"b\":2}".to_string()),
        ]);
        let resp = stub.complete_json("contains beta and alpha", None).await.unwrap();
        assert_eq!(resp.text, "{\"a\":1}");
        let resp = stub.complete_json("nothing known", None).await.unwrap();
        assert_eq!(resp.text, "{}");
    }
}
