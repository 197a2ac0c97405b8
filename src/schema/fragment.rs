use serde::{Deserialize, Serialize};

/// One bounded unit of generated text, numbered in emission order.
///
/// Sequence numbers start at 1 and are gap-free within a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    pub seq: u64,
    pub text: String,
}

impl Fragment {
    pub fn new(seq: u64, text: impl Into<String>) -> Self {
        Self {
            seq,
            text: text.into(),
        }
    }

    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragment_word_count() {
        let fragment = Fragment::new(1, "  the tide   goes out ");
        assert_eq!(fragment.seq, 1);
        assert_eq!(fragment.word_count(), 4);
    }
}
