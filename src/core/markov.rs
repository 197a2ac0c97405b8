/// Markov chain text generator — the offline backend used when no model
/// server is configured.
use rand::distributions::WeightedIndex;
use rand::prelude::Distribution;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

use crate::core::backend::Backend;

#[derive(Debug, Error)]
pub enum MarkovError {
    #[error("n-gram depth must be 2-4, got {0}")]
    InvalidOrder(usize),
    #[error("corpus produced no transitions")]
    EmptyCorpus,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Corpus bundled into the binary for the default offline backend.
pub const BUNDLED_CORPUS: &str = include_str!("../../data/corpus.txt");

const SENTENCE_START: &str = "<S>";
const SENTENCE_END: &str = "</S>";
const SENTENCE_ENDERS: &[char] = &['.', '!', '?'];

/// Transition table keyed by the previous `n - 1` words.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MarkovModel {
    pub n: usize,
    pub transitions: HashMap<Vec<String>, Vec<(String, u32)>>,
}

impl MarkovModel {
    /// Train on raw text. Sentence boundaries come from `.`, `!` and `?`
    /// closing a word; each sentence is padded with start and end markers.
    pub fn train(text: &str, n: usize) -> Result<MarkovModel, MarkovError> {
        if !(2..=4).contains(&n) {
            return Err(MarkovError::InvalidOrder(n));
        }

        let mut transitions: HashMap<Vec<String>, Vec<(String, u32)>> = HashMap::new();
        for sentence in sentences(text) {
            let mut padded = vec![SENTENCE_START.to_string(); n - 1];
            padded.extend(sentence);
            padded.push(SENTENCE_END.to_string());

            for window in padded.windows(n) {
                let entries = transitions.entry(window[..n - 1].to_vec()).or_default();
                let next = &window[n - 1];
                match entries.iter_mut().find(|(token, _)| token == next) {
                    Some(entry) => entry.1 += 1,
                    None => entries.push((next.clone(), 1)),
                }
            }
        }

        if transitions.is_empty() {
            return Err(MarkovError::EmptyCorpus);
        }
        Ok(MarkovModel { n, transitions })
    }

    pub fn load_corpus(path: &Path, n: usize) -> Result<MarkovModel, MarkovError> {
        let text = std::fs::read_to_string(path)?;
        Self::train(&text, n)
    }

    /// Walk the chain for one sentence, stopping at an end marker or after
    /// `max_words` words.
    pub fn sentence(&self, rng: &mut StdRng, max_words: usize) -> String {
        let mut state = vec![SENTENCE_START.to_string(); self.n - 1];
        let mut words: Vec<String> = Vec::new();

        while words.len() < max_words {
            let Some(next) = self.pick_next(&state, rng) else {
                break;
            };
            if next == SENTENCE_END {
                break;
            }
            words.push(next.clone());
            state.remove(0);
            state.push(next);
        }

        words.join(" ")
    }

    fn pick_next(&self, state: &[String], rng: &mut StdRng) -> Option<String> {
        let options = self.transitions.get(state)?;
        let weights: Vec<u32> = options.iter().map(|(_, count)| *count).collect();
        let dist = WeightedIndex::new(&weights).ok()?;
        Some(options[dist.sample(rng)].0.clone())
    }
}

fn sentences(text: &str) -> Vec<Vec<String>> {
    let mut out = Vec::new();
    let mut current: Vec<String> = Vec::new();
    for word in text.split_whitespace() {
        current.push(word.to_string());
        if word.ends_with(SENTENCE_ENDERS) {
            out.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

/// Offline backend: a few chain-generated sentences per call. The prompt is
/// ignored; only the token budget is honored (one word per token).
#[derive(Debug)]
pub struct MarkovBackend {
    model: MarkovModel,
    rng: StdRng,
    sentences: usize,
}

impl MarkovBackend {
    pub fn new(model: MarkovModel, sentences: usize, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            model,
            rng,
            sentences: sentences.max(1),
        }
    }

    pub fn bundled(order: usize, sentences: usize, seed: Option<u64>) -> Result<Self, MarkovError> {
        let model = MarkovModel::train(BUNDLED_CORPUS, order)?;
        Ok(Self::new(model, sentences, seed))
    }
}

impl Backend for MarkovBackend {
    fn generate(&mut self, _prompt: &str, max_tokens: u32) -> String {
        let mut budget = max_tokens as usize;
        let mut passage: Vec<String> = Vec::new();
        for _ in 0..self.sentences {
            if budget == 0 {
                break;
            }
            let sentence = self.model.sentence(&mut self.rng, budget);
            budget = budget.saturating_sub(sentence.split_whitespace().count());
            if !sentence.is_empty() {
                passage.push(sentence);
            }
        }
        passage.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CORPUS: &str = "The lamp hums at night. The sea hums back. \
        I remember the lamp and the sea. Nothing else hums like that!";

    #[test]
    fn train_rejects_bad_order() {
        assert!(matches!(
            MarkovModel::train(CORPUS, 1),
            Err(MarkovError::InvalidOrder(1))
        ));
        assert!(matches!(
            MarkovModel::train(CORPUS, 5),
            Err(MarkovError::InvalidOrder(5))
        ));
    }

    #[test]
    fn train_rejects_empty_corpus() {
        assert!(matches!(
            MarkovModel::train("   ", 2),
            Err(MarkovError::EmptyCorpus)
        ));
    }

    #[test]
    fn transitions_are_counted() {
        let model = MarkovModel::train(CORPUS, 2).unwrap();
        let after_the = model.transitions.get(&vec!["The".to_string()]).unwrap();
        let total: u32 = after_the.iter().map(|(_, count)| *count).sum();
        assert_eq!(total, 2);

        let starts = model
            .transitions
            .get(&vec![SENTENCE_START.to_string()])
            .unwrap();
        let start_total: u32 = starts.iter().map(|(_, count)| *count).sum();
        assert_eq!(start_total, 4);
    }

    #[test]
    fn sentences_use_corpus_words_only() {
        let model = MarkovModel::train(CORPUS, 2).unwrap();
        let vocabulary: Vec<&str> = CORPUS.split_whitespace().collect();
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..20 {
            let sentence = model.sentence(&mut rng, 30);
            assert!(!sentence.is_empty());
            for word in sentence.split_whitespace() {
                assert!(vocabulary.contains(&word), "unexpected word {}", word);
            }
        }
    }

    #[test]
    fn backend_is_deterministic_with_seed() {
        let model = MarkovModel::train(CORPUS, 2).unwrap();
        let mut first = MarkovBackend::new(model.clone(), 3, Some(11));
        let mut second = MarkovBackend::new(model, 3, Some(11));
        assert_eq!(first.generate("a", 64), second.generate("b", 64));
    }

    #[test]
    fn backend_respects_token_budget() {
        let mut backend = MarkovBackend::new(MarkovModel::train(CORPUS, 2).unwrap(), 5, Some(1));
        for _ in 0..10 {
            assert!(backend.generate("", 4).split_whitespace().count() <= 4);
        }
        assert!(backend.generate("", 0).is_empty());
    }

    #[test]
    fn bundled_corpus_trains() {
        let mut backend = MarkovBackend::bundled(2, 3, Some(5)).unwrap();
        assert!(!backend.generate("anything", 256).is_empty());
    }
}
