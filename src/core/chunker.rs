/// Sentence chunker — cuts generated text into bounded, speakable fragments.
///
/// Words are whitespace-separated tokens. The one exception is a detached
/// sentence terminal: a token made only of `.`, `!`, `?` or closing
/// quotes and brackets (`end .` or `why ?"`) is glued onto the word before
/// it. Every other token, symbols like `&` or `—` included, is a word.
use std::iter::Peekable;
use std::str::SplitWhitespace;

use crate::schema::config::ChunkMode;

/// Characters that end a sentence when they close a token.
const SENTENCE_ENDERS: &[char] = &['.', '!', '?'];
/// Closing characters allowed after a sentence ender (`end."` or `end.)`).
const TRAILING_CLOSERS: &[char] = &['"', '\'', ')', ']', '\u{201d}', '\u{2019}'];

/// Cut `text` into fragments of at most `max_words` words.
///
/// The returned iterator is lazy and cheap to clone; cloning it before
/// consuming restarts the sequence from the same point.
pub fn chunk(text: &str, max_words: usize, mode: ChunkMode) -> Chunks<'_> {
    Chunks {
        sentences: Sentences::new(text),
        max_words: max_words.max(1),
        mode,
        current: Vec::new(),
        overlong: Vec::new(),
        overlong_pos: 0,
    }
}

/// Lazy fragment sequence produced by [`chunk`].
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    sentences: Sentences<'a>,
    max_words: usize,
    mode: ChunkMode,
    /// Whole sentences accumulated for the next fragment.
    current: Vec<String>,
    /// A sentence longer than `max_words`, being sliced.
    overlong: Vec<String>,
    overlong_pos: usize,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        match self.mode {
            ChunkMode::Sentence => self.next_sentence_packed(),
            ChunkMode::FixedWords => self.next_fixed(),
        }
    }
}

impl<'a> Chunks<'a> {
    fn next_sentence_packed(&mut self) -> Option<String> {
        loop {
            if let Some(slice) = self.next_overlong_slice() {
                return Some(slice);
            }

            let Some(sentence) = self.sentences.next() else {
                return self.flush();
            };

            if sentence.len() > self.max_words {
                // Emit what is pending first; the slices follow on later calls.
                self.overlong = sentence;
                self.overlong_pos = 0;
                if let Some(pending) = self.flush() {
                    return Some(pending);
                }
                continue;
            }

            if !self.current.is_empty() && self.current.len() + sentence.len() > self.max_words {
                let out = self.flush();
                self.current = sentence;
                return out;
            }

            self.current.extend(sentence);
        }
    }

    /// Fixed-size runs over the whole text, ignoring sentence boundaries.
    fn next_fixed(&mut self) -> Option<String> {
        loop {
            if self.current.len() >= self.max_words {
                let rest = self.current.split_off(self.max_words);
                let out = std::mem::replace(&mut self.current, rest);
                return Some(out.join(" "));
            }
            match self.sentences.next() {
                Some(sentence) => self.current.extend(sentence),
                None => return self.flush(),
            }
        }
    }

    fn next_overlong_slice(&mut self) -> Option<String> {
        if self.overlong_pos >= self.overlong.len() {
            return None;
        }
        let end = (self.overlong_pos + self.max_words).min(self.overlong.len());
        let slice = self.overlong[self.overlong_pos..end].join(" ");
        self.overlong_pos = end;
        if self.overlong_pos >= self.overlong.len() {
            self.overlong.clear();
            self.overlong_pos = 0;
        }
        Some(slice)
    }

    fn flush(&mut self) -> Option<String> {
        if self.current.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.current).join(" "))
        }
    }
}

/// Iterator over sentences, each a list of normalized words.
#[derive(Debug, Clone)]
struct Sentences<'a> {
    tokens: Peekable<SplitWhitespace<'a>>,
}

impl<'a> Sentences<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            tokens: text.split_whitespace().peekable(),
        }
    }
}

impl<'a> Iterator for Sentences<'a> {
    type Item = Vec<String>;

    fn next(&mut self) -> Option<Vec<String>> {
        let mut words: Vec<String> = Vec::new();

        while let Some(token) = self.tokens.next() {
            match words.last_mut() {
                Some(last) if is_detached_terminal(token) => last.push_str(token),
                _ => words.push(token.to_string()),
            }

            if ends_sentence(token) {
                // Trailing punctuation-only tokens belong to this sentence.
                while let Some(next) = self.tokens.peek() {
                    if !is_detached_terminal(next) {
                        break;
                    }
                    if let Some(last) = words.last_mut() {
                        last.push_str(next);
                    }
                    self.tokens.next();
                }
                break;
            }
        }

        if words.is_empty() {
            None
        } else {
            Some(words)
        }
    }
}

fn is_detached_terminal(token: &str) -> bool {
    token
        .chars()
        .all(|c| SENTENCE_ENDERS.contains(&c) || TRAILING_CLOSERS.contains(&c))
}

fn ends_sentence(token: &str) -> bool {
    token
        .trim_end_matches(TRAILING_CLOSERS)
        .ends_with(SENTENCE_ENDERS)
}
