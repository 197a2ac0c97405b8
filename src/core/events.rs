/// Structured stream events and the sinks that receive them.
///
/// The session never writes logs directly; it reports events to an injected
/// [`EventSink`]. [`TracingSink`] forwards them to `tracing`, while
/// [`RecordingSink`] keeps them in memory for inspection.
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use crate::core::prompt::PromptKind;
use crate::core::session::StopReason;
use crate::core::topic::{Rejection, TopicOrigin};

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    PersonaSelected {
        name: String,
    },
    TopicRejected {
        attempt: u32,
        candidate: String,
        reason: Rejection,
    },
    TopicSelected {
        topic: String,
        origin: TopicOrigin,
    },
    StreamStarted,
    Prompt {
        iteration: u32,
        kind: PromptKind,
        prompt: String,
    },
    TangentInjected {
        iteration: u32,
        fragments_emitted: u64,
    },
    EmptyOutput {
        iteration: u32,
    },
    Fragment {
        seq: u64,
        text: String,
    },
    Stopped {
        reason: StopReason,
        iterations: u32,
        fragments: u64,
    },
}

pub trait EventSink: Send + Sync {
    fn record(&self, event: StreamEvent);
}

/// Forwards events to `tracing`. Prompts are dropped unless enabled.
#[derive(Debug, Clone, Default)]
pub struct TracingSink {
    include_prompts: bool,
}

impl TracingSink {
    pub fn new(include_prompts: bool) -> Self {
        Self { include_prompts }
    }
}

impl EventSink for TracingSink {
    fn record(&self, event: StreamEvent) {
        match event {
            StreamEvent::PersonaSelected { name } => info!(persona = %name, "Using persona"),
            StreamEvent::TopicRejected {
                attempt,
                candidate,
                reason,
            } => warn!(attempt, candidate = %candidate, ?reason, "Rejected generated topic"),
            StreamEvent::TopicSelected { topic, origin } => {
                info!(topic = %topic, ?origin, "Selected topic")
            }
            StreamEvent::StreamStarted => info!("Beginning stream of consciousness..."),
            StreamEvent::Prompt {
                iteration,
                kind,
                prompt,
            } => {
                if self.include_prompts {
                    debug!(iteration, ?kind, "Prompt:\n{}", prompt);
                }
            }
            StreamEvent::TangentInjected {
                iteration,
                fragments_emitted,
            } => info!(iteration, fragments_emitted, "Injecting tangent"),
            StreamEvent::EmptyOutput { iteration } => {
                warn!(iteration, "Backend returned empty output; skipping")
            }
            StreamEvent::Fragment { seq, text } => info!(seq, "Chunk {}: {}", seq, text),
            StreamEvent::Stopped {
                reason,
                iterations,
                fragments,
            } => info!(?reason, iterations, fragments, "Stream completed."),
        }
    }
}

/// Keeps every event in memory; clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<StreamEvent>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events recorded so far.
    pub fn events(&self) -> Vec<StreamEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl EventSink for RecordingSink {
    fn record(&self, event: StreamEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_sink_clones_share_buffer() {
        let sink = RecordingSink::new();
        let handle = sink.clone();
        sink.record(StreamEvent::StreamStarted);
        sink.record(StreamEvent::EmptyOutput { iteration: 2 });

        assert_eq!(
            handle.events(),
            vec![
                StreamEvent::StreamStarted,
                StreamEvent::EmptyOutput { iteration: 2 }
            ]
        );
    }

    #[test]
    fn tracing_sink_accepts_every_event() {
        let sink = TracingSink::new(true);
        sink.record(StreamEvent::Prompt {
            iteration: 1,
            kind: PromptKind::Tangent,
            prompt: "wander".to_string(),
        });
        sink.record(StreamEvent::Fragment {
            seq: 1,
            text: "hello.".to_string(),
        });
    }
}
