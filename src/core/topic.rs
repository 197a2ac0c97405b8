/// Topic selection — static choice, or backend-generated with sanitation,
/// blocklist rejection, bounded retry and a fixed fallback.
use rand::seq::SliceRandom;
use rand::Rng;
use thiserror::Error;

use crate::core::backend::Backend;
use crate::core::events::{EventSink, StreamEvent};
use crate::core::prompt::topic_request;
use crate::schema::config::TopicsConfig;

#[derive(Debug, Error)]
pub enum TopicError {
    #[error("no static topics defined")]
    NoStaticTopics,
}

/// Where the session topic came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicOrigin {
    Static,
    Generated,
    Fallback,
}

/// Why a generated candidate was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    Empty,
    MetaInstruction(&'static str),
}

/// Lowercase fragments that mark text as instructions about the task rather
/// than a topic.
const META_PATTERNS: &[&str] = &[
    "do not",
    "don't",
    "instruction",
    "paragraph",
    "respond with",
    "topic phrase",
    "as an ai",
    "here is",
    "here's a",
    "sure,",
    "concise",
];

/// Opening and closing quote pairs stripped from around a topic.
const QUOTE_PAIRS: &[(char, char)] = &[
    ('"', '"'),
    ('\'', '\''),
    ('`', '`'),
    ('\u{201c}', '\u{201d}'),
    ('\u{2018}', '\u{2019}'),
];

/// Remove matching quote pairs wrapping `text`. A lone quote is kept.
fn strip_quote_pairs(mut text: &str) -> &str {
    loop {
        let mut chars = text.chars();
        let (Some(first), Some(last)) = (chars.next(), chars.next_back()) else {
            return text;
        };
        if !QUOTE_PAIRS.contains(&(first, last)) {
            return text;
        }
        text = text[first.len_utf8()..text.len() - last.len_utf8()].trim();
    }
}

/// First non-empty line, trimmed, stripped of surrounding quotes and capped
/// at `max_chars` characters. `None` when nothing is left.
pub fn sanitize(raw: &str, max_chars: usize) -> Option<String> {
    let line = raw.lines().map(str::trim).find(|line| !line.is_empty())?;
    let unquoted = strip_quote_pairs(line);
    let capped: String = unquoted.chars().take(max_chars).collect();
    let capped = capped.trim_end();
    if capped.is_empty() {
        None
    } else {
        Some(capped.to_string())
    }
}

/// The blocklist pattern a candidate matches, if any.
pub fn meta_pattern(candidate: &str) -> Option<&'static str> {
    let lower = candidate.to_lowercase();
    META_PATTERNS
        .iter()
        .copied()
        .find(|pattern| lower.contains(pattern))
}

/// Sanitize and vet one generated candidate.
pub fn vet(raw: &str, max_chars: usize) -> Result<String, Rejection> {
    let topic = sanitize(raw, max_chars).ok_or(Rejection::Empty)?;
    match meta_pattern(&topic) {
        Some(pattern) => Err(Rejection::MetaInstruction(pattern)),
        None => Ok(topic),
    }
}

/// Pick the session topic according to `config`.
///
/// With backend generation on, up to `config.attempts` candidates are asked
/// for; each rejection is reported to `events`. When all attempts fail the
/// fixed fallback is used, so a meta-instruction is never returned.
pub fn pick_topic<B, R>(
    config: &TopicsConfig,
    backend: &mut B,
    max_tokens: u32,
    rng: &mut R,
    events: &dyn EventSink,
) -> Result<(String, TopicOrigin), TopicError>
where
    B: Backend + ?Sized,
    R: Rng + ?Sized,
{
    if !config.use_backend {
        let candidates: Vec<&String> = config
            .static_topics
            .iter()
            .filter(|topic| !topic.trim().is_empty())
            .collect();
        let topic = candidates.choose(rng).ok_or(TopicError::NoStaticTopics)?;
        return Ok((topic.trim().to_string(), TopicOrigin::Static));
    }

    let request = topic_request(&config.seed_prompt);
    for attempt in 1..=config.attempts {
        let raw = backend.generate(&request, max_tokens);
        match vet(&raw, config.max_length) {
            Ok(topic) => return Ok((topic, TopicOrigin::Generated)),
            Err(reason) => events.record(StreamEvent::TopicRejected {
                attempt,
                candidate: raw.trim().chars().take(config.max_length).collect(),
                reason,
            }),
        }
    }

    Ok((config.fallback.trim().to_string(), TopicOrigin::Fallback))
}
