/// Prompt construction — persona framing, topic, rolling context, tangents.
use crate::core::history::HistoryWindow;
use crate::schema::persona::{Persona, PersonaTemplate};

/// History entries quoted back in a continuation prompt.
pub const CONTEXT_ENTRIES: usize = 2;

const OPENING_INSTRUCTION: &str = "Begin a stream of consciousness exploring the topic. \
Let thoughts flow, include associations and mild tangents.";
const CONTINUE_INSTRUCTION: &str = "Continue the stream of consciousness. Previous few thoughts:";
const DRIFT_INSTRUCTION: &str = "Let your mind drift naturally and explore related ideas.";
const DEFAULT_TANGENT: &str = "Let your thoughts wander somewhere unexpected for a moment.";

/// Which prompt form to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    /// Opening or continuation, depending on whether history is empty.
    Continuation,
    /// A short diversion, then back to the topic.
    Tangent,
}

/// Builds generation prompts. Pure: identical inputs give identical output.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    tangent_prompt: String,
    context_entries: usize,
}

impl PromptBuilder {
    pub fn new(tangent_prompt: &str) -> Self {
        let tangent_prompt = tangent_prompt.trim();
        Self {
            tangent_prompt: if tangent_prompt.is_empty() {
                DEFAULT_TANGENT.to_string()
            } else {
                tangent_prompt.to_string()
            },
            context_entries: CONTEXT_ENTRIES,
        }
    }

    pub fn build(
        &self,
        persona: &Persona,
        topic: &str,
        history: &HistoryWindow,
        kind: PromptKind,
    ) -> String {
        let mut blocks: Vec<String> = Vec::new();

        match kind {
            PromptKind::Continuation => {
                blocks.extend(persona_blocks(&persona.template));
                blocks.push(format!("Topic: {}", topic));

                if history.is_empty() {
                    blocks.push(OPENING_INSTRUCTION.to_string());
                } else {
                    let context: Vec<&str> = history.recent(self.context_entries).collect();
                    blocks.push(format!("{}\n{}", CONTINUE_INSTRUCTION, context.join("\n\n")));
                    blocks.push(DRIFT_INSTRUCTION.to_string());
                }
            }
            PromptKind::Tangent => {
                blocks.push(self.tangent_prompt.clone());
                blocks.push(format!(
                    "Then continue the stream in character about {}.",
                    topic
                ));
            }
        }

        blocks.push(format!("Stay in character as {}.", persona.display_name()));
        blocks.join("\n\n").trim().to_string()
    }
}

/// The one-off request used when the backend picks the topic.
pub fn topic_request(seed_prompt: &str) -> String {
    format!(
        "{}\n\nRespond with a concise topic phrase only.",
        seed_prompt.trim()
    )
}

fn persona_blocks(template: &PersonaTemplate) -> Vec<String> {
    let mut blocks = Vec::new();
    match template {
        PersonaTemplate::Prefix(prefix) => {
            if !prefix.trim().is_empty() {
                blocks.push(prefix.trim().to_string());
            }
        }
        PersonaTemplate::Structured {
            persona,
            style_rules,
            examples,
        } => {
            if !persona.trim().is_empty() {
                blocks.push(persona.trim().to_string());
            }
            if let Some(block) = bullets("Style rules:", style_rules) {
                blocks.push(block);
            }
            if let Some(block) = bullets("Example phrases:", examples) {
                blocks.push(block);
            }
        }
    }
    blocks
}

fn bullets(heading: &str, items: &[String]) -> Option<String> {
    let lines: Vec<String> = items
        .iter()
        .map(|item| item.trim())
        .filter(|item| !item.is_empty())
        .map(|item| format!("- {}", item))
        .collect();
    if lines.is_empty() {
        None
    } else {
        Some(format!("{}\n{}", heading, lines.join("\n")))
    }
}
