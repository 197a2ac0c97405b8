/// Generation session — the producer loop.
///
/// Each iteration builds a prompt (continuation or tangent), calls the
/// backend, chunks the output and hands fragments to the dispatcher one at a
/// time. A stop request is honored at iteration and fragment boundaries;
/// the only blocking points are the backend call, a single dispatch and the
/// interruptible pauses.
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::core::backend::Backend;
use crate::core::chunker::chunk;
use crate::core::dispatcher::{DispatchError, Dispatcher};
use crate::core::events::{EventSink, StreamEvent, TracingSink};
use crate::core::history::HistoryWindow;
use crate::core::prompt::{PromptBuilder, PromptKind};
use crate::core::stop::StopSignal;
use crate::schema::config::{ChunkMode, GenerationConfig, StreamingConfig};
use crate::schema::fragment::Fragment;
use crate::schema::persona::Persona;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("fragment hand-off failed: {0}")]
    Dispatch(#[from] DispatchError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Priming,
    Generating,
    Dispatching,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// A controller raised the stop signal.
    Requested,
    /// The configured iteration cap was reached.
    IterationLimit,
    /// The display consumer went away.
    DisplayClosed,
}

/// Whether the iteration about to start should be a tangent.
pub fn tangent_due(fragments_emitted: u64, drift_interval: u64) -> bool {
    drift_interval > 0 && fragments_emitted > 0 && fragments_emitted % drift_interval == 0
}

/// Loop parameters, resolved from config and persona.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub max_words: usize,
    pub chunk_mode: ChunkMode,
    pub initial_pause: Duration,
    pub inter_chunk_pause: Duration,
    pub inter_iteration_pause: Duration,
    pub drift_interval: u64,
    pub history_capacity: usize,
    pub max_iterations: Option<u32>,
    pub max_tokens: u32,
    pub tangent_prompt: String,
}

impl SessionSettings {
    pub fn from_config(
        streaming: &StreamingConfig,
        generation: &GenerationConfig,
        persona: &Persona,
    ) -> Self {
        Self {
            max_words: persona.max_words(streaming.max_words_per_chunk),
            chunk_mode: streaming.chunk_mode,
            initial_pause: streaming.initial_pause(),
            inter_chunk_pause: streaming.inter_chunk_pause(),
            inter_iteration_pause: streaming.inter_iteration_pause(),
            drift_interval: streaming.drift_interval_chunks,
            history_capacity: streaming.max_history_chunks,
            max_iterations: streaming.max_iterations,
            max_tokens: generation.max_tokens,
            tangent_prompt: streaming.tangent_prompt.clone(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        let streaming = StreamingConfig::default();
        Self {
            max_words: streaming.max_words_per_chunk,
            chunk_mode: streaming.chunk_mode,
            initial_pause: streaming.initial_pause(),
            inter_chunk_pause: streaming.inter_chunk_pause(),
            inter_iteration_pause: streaming.inter_iteration_pause(),
            drift_interval: streaming.drift_interval_chunks,
            history_capacity: streaming.max_history_chunks,
            max_iterations: streaming.max_iterations,
            max_tokens: GenerationConfig::default().max_tokens,
            tangent_prompt: streaming.tangent_prompt,
        }
    }
}

/// What a finished session did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
    pub iterations: u32,
    pub fragments: u64,
    pub tangents: u32,
    pub empty_responses: u32,
    pub reason: StopReason,
}

pub struct GenerationSession<B: Backend> {
    persona: Persona,
    topic: String,
    backend: B,
    prompts: PromptBuilder,
    settings: SessionSettings,
    history: HistoryWindow,
    state: SessionState,
    iteration: u32,
    fragments_emitted: u64,
    tangents: u32,
    empty_responses: u32,
    stop: StopSignal,
    events: Arc<dyn EventSink>,
}

impl<B: Backend> GenerationSession<B> {
    pub fn new(persona: Persona, topic: impl Into<String>, backend: B, settings: SessionSettings) -> Self {
        Self {
            persona,
            topic: topic.into(),
            backend,
            prompts: PromptBuilder::new(&settings.tangent_prompt),
            history: HistoryWindow::new(settings.history_capacity),
            settings,
            state: SessionState::Idle,
            iteration: 0,
            fragments_emitted: 0,
            tangents: 0,
            empty_responses: 0,
            stop: StopSignal::new(),
            events: Arc::new(TracingSink::default()),
        }
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    /// A handle that stops this session when raised.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn history(&self) -> &HistoryWindow {
        &self.history
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn persona(&self) -> &Persona {
        &self.persona
    }

    /// Run until stopped, capped, or the display goes away.
    ///
    /// A lost or out-of-order acknowledgment is a protocol violation and is
    /// returned as an error; every other ending is a [`SessionSummary`].
    pub fn run(&mut self, dispatcher: &mut Dispatcher) -> Result<SessionSummary, SessionError> {
        self.events.record(StreamEvent::StreamStarted);
        self.state = SessionState::Priming;
        if self.stop.sleep(self.settings.initial_pause) {
            return Ok(self.finish(StopReason::Requested));
        }

        loop {
            if self.stop.is_stopped() {
                return Ok(self.finish(StopReason::Requested));
            }
            if let Some(limit) = self.settings.max_iterations {
                if self.iteration >= limit {
                    return Ok(self.finish(StopReason::IterationLimit));
                }
            }
            if self.iteration > 0 && self.stop.sleep(self.settings.inter_iteration_pause) {
                return Ok(self.finish(StopReason::Requested));
            }

            self.iteration += 1;
            self.state = SessionState::Generating;

            let kind = if tangent_due(self.fragments_emitted, self.settings.drift_interval) {
                self.tangents += 1;
                self.events.record(StreamEvent::TangentInjected {
                    iteration: self.iteration,
                    fragments_emitted: self.fragments_emitted,
                });
                PromptKind::Tangent
            } else {
                PromptKind::Continuation
            };

            let prompt = self
                .prompts
                .build(&self.persona, &self.topic, &self.history, kind);
            self.events.record(StreamEvent::Prompt {
                iteration: self.iteration,
                kind,
                prompt: prompt.clone(),
            });

            let output = self.backend.generate(&prompt, self.settings.max_tokens);
            if output.trim().is_empty() {
                self.empty_responses += 1;
                self.events.record(StreamEvent::EmptyOutput {
                    iteration: self.iteration,
                });
                continue;
            }

            self.state = SessionState::Dispatching;
            for text in chunk(&output, self.settings.max_words, self.settings.chunk_mode) {
                if self.stop.is_stopped() {
                    return Ok(self.finish(StopReason::Requested));
                }

                let fragment = Fragment::new(self.fragments_emitted + 1, text.clone());
                let seq = fragment.seq;
                match dispatcher.dispatch(fragment) {
                    Ok(()) => {}
                    Err(DispatchError::ConsumerGone) => {
                        return Ok(self.finish(StopReason::DisplayClosed));
                    }
                    Err(err) => {
                        self.state = SessionState::Stopped;
                        return Err(err.into());
                    }
                }

                self.fragments_emitted += 1;
                self.events.record(StreamEvent::Fragment {
                    seq,
                    text: text.clone(),
                });
                self.history.push(text);

                if self.stop.sleep(self.settings.inter_chunk_pause) {
                    return Ok(self.finish(StopReason::Requested));
                }
            }
            debug!(iteration = self.iteration, fragments = self.fragments_emitted, "iteration done");
        }
    }

    fn finish(&mut self, reason: StopReason) -> SessionSummary {
        self.state = SessionState::Stopped;
        self.events.record(StreamEvent::Stopped {
            reason,
            iterations: self.iteration,
            fragments: self.fragments_emitted,
        });
        SessionSummary {
            iterations: self.iteration,
            fragments: self.fragments_emitted,
            tangents: self.tangents,
            empty_responses: self.empty_responses,
            reason,
        }
    }
}
