/// Text-generation backends.
///
/// A backend turns a prompt into text. It never fails loudly: transport or
/// model errors are logged and reported as an empty string, which the
/// session treats as a skipped iteration.
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::core::markov::{MarkovBackend, MarkovError, MarkovModel};
use crate::schema::config::{BackendConfig, GenerationConfig};

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("markov error: {0}")]
    Markov(#[from] MarkovError),
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

pub trait Backend: Send {
    /// Generate text for `prompt`, using at most `max_tokens` tokens.
    /// Returns an empty string on failure.
    fn generate(&mut self, prompt: &str, max_tokens: u32) -> String;
}

impl<B: Backend + ?Sized> Backend for Box<B> {
    fn generate(&mut self, prompt: &str, max_tokens: u32) -> String {
        (**self).generate(prompt, max_tokens)
    }
}

/// Build the backend a config asks for.
pub fn from_config(
    backend: &BackendConfig,
    generation: &GenerationConfig,
    seed: Option<u64>,
) -> Result<Box<dyn Backend>, BackendError> {
    match backend {
        BackendConfig::Markov {
            corpus,
            order,
            sentences,
        } => {
            let backend = match corpus {
                Some(path) => {
                    MarkovBackend::new(MarkovModel::load_corpus(path, *order)?, *sentences, seed)
                }
                None => MarkovBackend::bundled(*order, *sentences, seed)?,
            };
            Ok(Box::new(backend))
        }
        BackendConfig::LlamaServer {
            url,
            timeout_seconds,
        } => Ok(Box::new(LlamaServerBackend::new(
            url,
            Duration::from_secs_f64(*timeout_seconds),
            generation,
        )?)),
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    prompt: &'a str,
    n_predict: u32,
    temperature: f32,
    top_p: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    content: String,
}

/// Client for a llama.cpp-compatible server (`POST {url}/completion`).
///
/// The request timeout bounds how long a stop request can go unnoticed while
/// a generation call is in flight.
#[derive(Debug)]
pub struct LlamaServerBackend {
    client: reqwest::blocking::Client,
    endpoint: String,
    temperature: f32,
    top_p: f32,
}

impl LlamaServerBackend {
    pub fn new(
        url: &str,
        timeout: Duration,
        generation: &GenerationConfig,
    ) -> Result<Self, BackendError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/completion", url.trim_end_matches('/')),
            temperature: generation.temperature,
            top_p: generation.top_p,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn request(&self, prompt: &str, max_tokens: u32) -> Result<String, reqwest::Error> {
        let body = CompletionRequest {
            prompt,
            n_predict: max_tokens,
            temperature: self.temperature,
            top_p: self.top_p,
            stream: false,
        };
        let response: CompletionResponse = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()?
            .error_for_status()?
            .json()?;
        Ok(response.content)
    }
}

impl Backend for LlamaServerBackend {
    fn generate(&mut self, prompt: &str, max_tokens: u32) -> String {
        match self.request(prompt, max_tokens) {
            Ok(text) => {
                debug!(endpoint = %self.endpoint, chars = text.len(), "completion received");
                text.trim().to_string()
            }
            Err(err) => {
                warn!(endpoint = %self.endpoint, error = %err, "generation request failed");
                String::new()
            }
        }
    }
}

/// Replays canned responses in order, then returns empty strings.
///
/// Every prompt it receives is kept; clones share the same record, so a
/// handle kept outside the session can inspect what was asked.
#[derive(Debug, Clone, Default)]
pub struct ScriptedBackend {
    responses: Arc<Mutex<VecDeque<String>>>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl ScriptedBackend {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Arc::new(Mutex::new(responses.into_iter().map(Into::into).collect())),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        match self.prompts.lock() {
            Ok(prompts) => prompts.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Backend for ScriptedBackend {
    fn generate(&mut self, prompt: &str, _max_tokens: u32) -> String {
        match self.prompts.lock() {
            Ok(mut prompts) => prompts.push(prompt.to_string()),
            Err(poisoned) => poisoned.into_inner().push(prompt.to_string()),
        }
        let next = match self.responses.lock() {
            Ok(mut responses) => responses.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        };
        next.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_backend_replays_then_runs_dry() {
        let mut backend = ScriptedBackend::new(["first", "second"]);
        let handle = backend.clone();
        assert_eq!(backend.generate("p1", 10), "first");
        assert_eq!(backend.generate("p2", 10), "second");
        assert_eq!(backend.generate("p3", 10), "");
        assert_eq!(handle.prompts(), vec!["p1", "p2", "p3"]);
    }

    #[test]
    fn server_endpoint_is_normalized() {
        let backend = LlamaServerBackend::new(
            "http://127.0.0.1:8080/",
            Duration::from_secs(5),
            &GenerationConfig::default(),
        )
        .unwrap();
        assert_eq!(backend.endpoint(), "http://127.0.0.1:8080/completion");
    }

    #[test]
    fn unreachable_server_yields_empty_output() {
        // Port 9 (discard) on localhost is almost never listening.
        let mut backend = LlamaServerBackend::new(
            "http://127.0.0.1:9",
            Duration::from_millis(500),
            &GenerationConfig::default(),
        )
        .unwrap();
        assert_eq!(backend.generate("hello", 8), "");
    }

    #[test]
    fn completion_request_shape() {
        let body = CompletionRequest {
            prompt: "hi",
            n_predict: 16,
            temperature: 0.5,
            top_p: 0.9,
            stream: false,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["prompt"], "hi");
        assert_eq!(json["n_predict"], 16);
        assert_eq!(json["stream"], false);
    }

    #[test]
    fn config_builds_markov_backend() {
        let mut backend =
            from_config(&BackendConfig::default(), &GenerationConfig::default(), Some(9)).unwrap();
        assert!(!backend.generate("anything", 64).is_empty());
    }
}
