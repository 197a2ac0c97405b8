/// The stream pipeline: config → persona → backend → topic → session.
///
/// Builds everything up front, so configuration errors surface before any
/// thread starts, then runs the generation session against a display
/// consumer on its own thread.
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use thiserror::Error;
use tracing::{debug, info};

use crate::core::backend::{self, Backend, BackendError};
use crate::core::dispatcher;
use crate::core::display::{Display, DisplaySettings, Renderer};
use crate::core::events::{EventSink, StreamEvent, TracingSink};
use crate::core::session::{GenerationSession, SessionError, SessionSettings, SessionSummary};
use crate::core::stop::StopSignal;
use crate::core::topic::{self, TopicError, TopicOrigin};
use crate::schema::config::{ConfigError, StreamConfig};
use crate::schema::persona::Persona;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
    #[error("topic error: {0}")]
    Topic(#[from] TopicError),
    #[error("session error: {0}")]
    Session(#[from] SessionError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no config provided")]
    MissingConfig,
    #[error("display thread panicked")]
    DisplayPanicked,
}

/// A fully prepared stream. Built via `StreamEngine::builder()`.
pub struct StreamEngine {
    config: StreamConfig,
    persona: Persona,
    topic: String,
    topic_origin: TopicOrigin,
    backend: Box<dyn Backend>,
    events: Arc<dyn EventSink>,
    stop: StopSignal,
}

/// Builder for constructing a `StreamEngine`.
#[derive(Default)]
pub struct StreamEngineBuilder {
    config_path: Option<PathBuf>,
    /// Directly provided config (for testing without files).
    config: Option<StreamConfig>,
    persona: Option<String>,
    seed: Option<u64>,
    max_iterations: Option<Option<u32>>,
    /// Directly provided backend (for testing without a model).
    backend: Option<Box<dyn Backend>>,
    events: Option<Arc<dyn EventSink>>,
    stop: Option<StopSignal>,
}

impl StreamEngine {
    pub fn builder() -> StreamEngineBuilder {
        StreamEngineBuilder::default()
    }

    pub fn persona(&self) -> &Persona {
        &self.persona
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn topic_origin(&self) -> TopicOrigin {
        self.topic_origin
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Handle for stopping the stream from another thread.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Run the stream to completion, presenting fragments through `renderer`.
    pub fn run<R>(self, renderer: R) -> Result<SessionSummary, StreamError>
    where
        R: Renderer + 'static,
    {
        let settings =
            SessionSettings::from_config(&self.config.streaming, &self.config.generation, &self.persona);
        let display = Display::new(renderer, DisplaySettings::from(&self.config.display));

        let (mut dispatcher, receiver) = dispatcher::channel();
        let consumer = thread::Builder::new()
            .name("reverie-display".to_string())
            .spawn(move || {
                display.run(receiver);
            })?;

        let mut session = GenerationSession::new(self.persona, self.topic, self.backend, settings)
            .with_events(self.events)
            .with_stop_signal(self.stop);
        let result = session.run(&mut dispatcher);

        // Closing the channel lets the consumer drain and exit.
        drop(dispatcher);
        consumer.join().map_err(|_| StreamError::DisplayPanicked)?;

        let summary = result?;
        debug!(?summary, "stream finished");
        Ok(summary)
    }
}

impl StreamEngineBuilder {
    pub fn config_path(mut self, path: impl AsRef<Path>) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_config(mut self, config: StreamConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Use the named persona instead of a random one.
    pub fn persona(mut self, name: impl Into<String>) -> Self {
        self.persona = Some(name.into());
        self
    }

    /// Seed persona/topic choice and the offline backend. Overrides the
    /// config's seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Override `streaming.max_iterations`; `None` means unbounded.
    pub fn max_iterations(mut self, limit: Option<u32>) -> Self {
        self.max_iterations = Some(limit);
        self
    }

    pub fn with_backend(mut self, backend: Box<dyn Backend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn build(self) -> Result<StreamEngine, StreamError> {
        let mut config = match (self.config, &self.config_path) {
            (Some(config), _) => {
                config.validate()?;
                config
            }
            (None, Some(path)) => StreamConfig::load_from_ron(path)?,
            (None, None) => return Err(StreamError::MissingConfig),
        };
        if let Some(limit) = self.max_iterations {
            config.streaming.max_iterations = limit;
        }

        let seed = self.seed.or(config.seed);
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let events = self.events.unwrap_or_else(|| {
            Arc::new(TracingSink::new(config.logging.include_full_prompts))
        });

        let persona = match &self.persona {
            Some(name) => config.persona(name)?.clone(),
            None => config
                .personas
                .choose(&mut rng)
                .cloned()
                .ok_or(ConfigError::NoPersonas)?,
        };
        events.record(StreamEvent::PersonaSelected {
            name: persona.display_name().to_string(),
        });

        let mut backend = match self.backend {
            Some(backend) => backend,
            None => backend::from_config(&config.backend, &config.generation, seed)?,
        };

        let (topic, topic_origin) = topic::pick_topic(
            &config.topics,
            &mut backend,
            config.generation.topic_max_tokens,
            &mut rng,
            events.as_ref(),
        )?;
        events.record(StreamEvent::TopicSelected {
            topic: topic.clone(),
            origin: topic_origin,
        });
        info!(persona = %persona.name, topic = %topic, "stream ready");

        Ok(StreamEngine {
            config,
            persona,
            topic,
            topic_origin,
            backend,
            events,
            stop: self.stop.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::backend::ScriptedBackend;
    use crate::core::display::RecordingRenderer;
    use crate::core::events::RecordingSink;
    use crate::core::session::StopReason;

    const CONFIG: &str = r#"
        StreamConfig(
            personas: [
                Persona(name: "mira", template: Prefix("You are Mira.")),
                Persona(name: "otto", display_name: Some("Otto the Clockmaker"), template: Prefix("You are Otto.")),
            ],
            topics: Topics(static: ["tides"]),
            streaming: Streaming(
                initial_pause_seconds: 0.0,
                inter_chunk_pause_seconds: 0.0,
                inter_iteration_pause_seconds: 0.0,
                max_words_per_chunk: 5,
                max_iterations: Some(2),
            ),
            display: Display(word_delay_ms: 0, fade_pause_ms: 0),
            seed: Some(3),
        )
    "#;

    fn config() -> StreamConfig {
        StreamConfig::parse_ron(CONFIG).unwrap()
    }

    #[test]
    fn build_requires_config() {
        assert!(matches!(
            StreamEngine::builder().build(),
            Err(StreamError::MissingConfig)
        ));
    }

    #[test]
    fn named_persona_and_static_topic() {
        let sink = RecordingSink::new();
        let engine = StreamEngine::builder()
            .with_config(config())
            .persona("otto")
            .with_backend(Box::new(ScriptedBackend::new(Vec::<String>::new())))
            .with_events(Arc::new(sink.clone()))
            .build()
            .unwrap();

        assert_eq!(engine.persona().name, "otto");
        assert_eq!(engine.topic(), "tides");
        assert_eq!(engine.topic_origin(), TopicOrigin::Static);
        assert_eq!(
            sink.events()[0],
            StreamEvent::PersonaSelected {
                name: "Otto the Clockmaker".to_string()
            }
        );
    }

    #[test]
    fn unknown_persona_is_a_config_error() {
        let result = StreamEngine::builder()
            .with_config(config())
            .persona("nobody")
            .with_backend(Box::new(ScriptedBackend::new(Vec::<String>::new())))
            .build();
        assert!(matches!(
            result,
            Err(StreamError::Config(ConfigError::UnknownPersona(_)))
        ));
    }

    #[test]
    fn seeded_persona_choice_is_repeatable() {
        let pick = || {
            StreamEngine::builder()
                .with_config(config())
                .seed(42)
                .with_backend(Box::new(ScriptedBackend::new(Vec::<String>::new())))
                .build()
                .unwrap()
                .persona()
                .name
                .clone()
        };
        assert_eq!(pick(), pick());
    }

    #[test]
    fn run_streams_through_renderer() {
        let renderer = RecordingRenderer::new(100);
        let engine = StreamEngine::builder()
            .with_config(config())
            .persona("mira")
            .with_backend(Box::new(ScriptedBackend::new([
                "The tide comes in. It goes out.",
                "Salt on the glass.",
            ])))
            .build()
            .unwrap();

        let summary = engine.run(renderer.clone()).unwrap();
        assert_eq!(summary.reason, StopReason::IterationLimit);
        assert_eq!(summary.iterations, 2);
        assert_eq!(summary.fragments, 3);
        assert_eq!(
            renderer.screens(),
            vec!["The tide comes in. It goes out. Salt on the glass.".to_string()]
        );
    }

    #[test]
    fn max_iterations_override_applies() {
        let backend = ScriptedBackend::new(["One.", "Two.", "Three."]);
        let handle = backend.clone();
        let engine = StreamEngine::builder()
            .with_config(config())
            .max_iterations(Some(1))
            .with_backend(Box::new(backend))
            .build()
            .unwrap();

        let summary = engine.run(RecordingRenderer::new(100)).unwrap();
        assert_eq!(summary.iterations, 1);
        assert_eq!(handle.prompts().len(), 1);
    }
}
