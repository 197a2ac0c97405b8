/// Stream configuration — loaded once from RON, validated, then read-only.
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use super::persona::Persona;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("no personas defined in config")]
    NoPersonas,
    #[error("no static topics defined and backend topic generation is disabled")]
    NoStaticTopics,
    #[error("persona defined more than once: {0}")]
    DuplicatePersona(String),
    #[error("unknown persona: {0}")]
    UnknownPersona(String),
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// How generated text is cut into fragments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChunkMode {
    /// Pack whole sentences up to the word limit.
    #[default]
    Sentence,
    /// Fixed-size word runs that ignore sentence boundaries.
    FixedWords,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename = "Topics", default)]
pub struct TopicsConfig {
    #[serde(rename = "static")]
    pub static_topics: Vec<String>,
    /// Ask the backend for a topic instead of drawing from `static`.
    pub use_backend: bool,
    pub seed_prompt: String,
    /// Generation attempts before falling back to `fallback`.
    pub attempts: u32,
    pub fallback: String,
    /// Character cap applied to generated topics.
    pub max_length: usize,
}

impl Default for TopicsConfig {
    fn default() -> Self {
        Self {
            static_topics: Vec::new(),
            use_backend: false,
            seed_prompt: "Give me a random topic.".to_string(),
            attempts: 3,
            fallback: "the quiet between two thoughts".to_string(),
            max_length: 80,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename = "Streaming", default)]
pub struct StreamingConfig {
    pub max_words_per_chunk: usize,
    pub chunk_mode: ChunkMode,
    pub initial_pause_seconds: f64,
    pub inter_chunk_pause_seconds: f64,
    pub inter_iteration_pause_seconds: f64,
    /// Fragments between forced tangents; 0 disables tangents.
    pub drift_interval_chunks: u64,
    pub max_history_chunks: usize,
    pub tangent_prompt: String,
    /// Generation calls before the stream stops on its own; `None` runs
    /// until stopped externally.
    pub max_iterations: Option<u32>,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            max_words_per_chunk: 60,
            chunk_mode: ChunkMode::Sentence,
            initial_pause_seconds: 1.0,
            inter_chunk_pause_seconds: 2.0,
            inter_iteration_pause_seconds: 0.5,
            drift_interval_chunks: 4,
            max_history_chunks: 5,
            tangent_prompt: "Out of nowhere, an unrelated memory surfaces. Follow it for a moment."
                .to_string(),
            max_iterations: Some(8),
        }
    }
}

impl StreamingConfig {
    pub fn initial_pause(&self) -> Duration {
        Duration::from_secs_f64(self.initial_pause_seconds)
    }

    pub fn inter_chunk_pause(&self) -> Duration {
        Duration::from_secs_f64(self.inter_chunk_pause_seconds)
    }

    pub fn inter_iteration_pause(&self) -> Duration {
        Duration::from_secs_f64(self.inter_iteration_pause_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename = "Generation", default)]
pub struct GenerationConfig {
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
    /// Token budget for the one-off topic request.
    pub topic_max_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.9,
            max_tokens: 256,
            topic_max_tokens: 128,
        }
    }
}

/// Which text generator feeds the stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BackendConfig {
    /// Offline Markov chain; `corpus: None` uses the bundled corpus.
    Markov {
        #[serde(default)]
        corpus: Option<PathBuf>,
        #[serde(default = "default_markov_order")]
        order: usize,
        #[serde(default = "default_markov_sentences")]
        sentences: usize,
    },
    /// A llama.cpp-compatible server exposing `POST /completion`.
    LlamaServer {
        url: String,
        #[serde(default = "default_timeout_seconds")]
        timeout_seconds: f64,
    },
}

fn default_markov_order() -> usize {
    2
}

fn default_markov_sentences() -> usize {
    3
}

fn default_timeout_seconds() -> f64 {
    60.0
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self::Markov {
            corpus: None,
            order: default_markov_order(),
            sentences: default_markov_sentences(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename = "Display", default)]
pub struct DisplayConfig {
    pub columns: usize,
    pub rows: usize,
    pub word_delay_ms: u64,
    pub fade_pause_ms: u64,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            columns: 48,
            rows: 6,
            word_delay_ms: 50,
            fade_pause_ms: 1200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename = "Logging", default)]
pub struct LoggingConfig {
    /// Directory for per-run log files; `None` logs to stderr only.
    pub directory: Option<PathBuf>,
    pub include_full_prompts: bool,
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: Some(PathBuf::from("logs")),
            include_full_prompts: false,
            level: "info".to_string(),
        }
    }
}

/// Everything a stream needs, as read from a RON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename = "StreamConfig")]
pub struct StreamConfig {
    pub personas: Vec<Persona>,
    #[serde(default)]
    pub topics: TopicsConfig,
    #[serde(default)]
    pub streaming: StreamingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Seed for persona and topic selection; `None` draws from entropy.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl StreamConfig {
    /// Load and validate a config from a RON file.
    pub fn load_from_ron(path: &Path) -> Result<StreamConfig, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    /// Parse and validate a config from a RON string.
    pub fn parse_ron(input: &str) -> Result<StreamConfig, ConfigError> {
        let config: StreamConfig = ron::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configs the stream cannot start with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.personas.is_empty() {
            return Err(ConfigError::NoPersonas);
        }

        let mut seen = FxHashSet::default();
        for persona in &self.personas {
            if !seen.insert(persona.name.as_str()) {
                return Err(ConfigError::DuplicatePersona(persona.name.clone()));
            }
        }

        let has_static = self
            .topics
            .static_topics
            .iter()
            .any(|topic| !topic.trim().is_empty());
        if !self.topics.use_backend && !has_static {
            return Err(ConfigError::NoStaticTopics);
        }

        let streaming = &self.streaming;
        check_seconds("streaming.initial_pause_seconds", streaming.initial_pause_seconds)?;
        check_seconds(
            "streaming.inter_chunk_pause_seconds",
            streaming.inter_chunk_pause_seconds,
        )?;
        check_seconds(
            "streaming.inter_iteration_pause_seconds",
            streaming.inter_iteration_pause_seconds,
        )?;
        if streaming.max_words_per_chunk == 0 {
            return Err(ConfigError::Invalid {
                field: "streaming.max_words_per_chunk",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.topics.max_length == 0 {
            return Err(ConfigError::Invalid {
                field: "topics.max_length",
                reason: "must be at least 1".to_string(),
            });
        }

        let generation = &self.generation;
        if !generation.temperature.is_finite() || generation.temperature < 0.0 {
            return Err(ConfigError::Invalid {
                field: "generation.temperature",
                reason: format!("{} is not a usable temperature", generation.temperature),
            });
        }
        if !(0.0..=1.0).contains(&generation.top_p) {
            return Err(ConfigError::Invalid {
                field: "generation.top_p",
                reason: format!("{} is outside 0.0..=1.0", generation.top_p),
            });
        }

        match &self.backend {
            BackendConfig::Markov { order, .. } if !(2..=4).contains(order) => {
                return Err(ConfigError::Invalid {
                    field: "backend.order",
                    reason: format!("n-gram depth must be 2-4, got {}", order),
                });
            }
            BackendConfig::LlamaServer {
                timeout_seconds, ..
            } => check_seconds("backend.timeout_seconds", *timeout_seconds)?,
            _ => {}
        }

        if self.display.columns == 0 || self.display.rows == 0 {
            return Err(ConfigError::Invalid {
                field: "display",
                reason: "columns and rows must be at least 1".to_string(),
            });
        }

        Ok(())
    }

    /// Look up a persona by name.
    pub fn persona(&self, name: &str) -> Result<&Persona, ConfigError> {
        self.personas
            .iter()
            .find(|persona| persona.name == name)
            .ok_or_else(|| ConfigError::UnknownPersona(name.to_string()))
    }
}

fn check_seconds(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 && value < 86_400.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            reason: format!("{} is not a usable number of seconds", value),
        })
    }
}
