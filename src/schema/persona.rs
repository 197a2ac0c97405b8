use serde::{Deserialize, Serialize};

/// How a persona frames its prompts.
///
/// A plain prefix is pasted verbatim ahead of the topic line. A structured
/// persona additionally carries style rules and exemplar phrases, which the
/// prompt builder renders as bullet blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PersonaTemplate {
    Prefix(String),
    Structured {
        persona: String,
        #[serde(default)]
        style_rules: Vec<String>,
        #[serde(default)]
        examples: Vec<String>,
    },
}

impl Default for PersonaTemplate {
    fn default() -> Self {
        Self::Prefix(String::new())
    }
}

/// A character whose stream of consciousness is being generated.
///
/// Selected once at session start and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub template: PersonaTemplate,
    /// Overrides `streaming.max_words_per_chunk` for this persona.
    #[serde(default)]
    pub max_words_per_chunk: Option<usize>,
}

impl Persona {
    /// Plain-prefix persona, mostly useful in tests and demos.
    pub fn with_prefix(name: &str, prefix: &str) -> Self {
        Self {
            name: name.to_string(),
            display_name: None,
            template: PersonaTemplate::Prefix(prefix.to_string()),
            max_words_per_chunk: None,
        }
    }

    /// The name shown to the audience, falling back to `name`.
    pub fn display_name(&self) -> &str {
        match self.display_name.as_deref() {
            Some(display) if !display.trim().is_empty() => display,
            _ => &self.name,
        }
    }

    /// Fragment size for this persona given the stream-wide default.
    pub fn max_words(&self, default: usize) -> usize {
        self.max_words_per_chunk.unwrap_or(default).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_falls_back_to_name() {
        let mut persona = Persona::with_prefix("mira", "You are Mira.");
        assert_eq!(persona.display_name(), "mira");

        persona.display_name = Some("Mira the Lighthouse Keeper".to_string());
        assert_eq!(persona.display_name(), "Mira the Lighthouse Keeper");

        persona.display_name = Some("   ".to_string());
        assert_eq!(persona.display_name(), "mira");
    }

    #[test]
    fn max_words_override() {
        let mut persona = Persona::with_prefix("mira", "");
        assert_eq!(persona.max_words(60), 60);

        persona.max_words_per_chunk = Some(12);
        assert_eq!(persona.max_words(60), 12);

        persona.max_words_per_chunk = Some(0);
        assert_eq!(persona.max_words(60), 1);
    }

    #[test]
    fn structured_template_from_ron() {
        let persona: Persona = ron::from_str(
            r#"Persona(
                name: "oracle",
                template: Structured(
                    persona: "You are an oracle who speaks in riddles.",
                    style_rules: ["Short sentences.", "No lists."],
                ),
            )"#,
        )
        .unwrap();

        match &persona.template {
            PersonaTemplate::Structured {
                style_rules,
                examples,
                ..
            } => {
                assert_eq!(style_rules.len(), 2);
                assert!(examples.is_empty());
            }
            other => panic!("expected structured template, got {:?}", other),
        }
        assert!(persona.max_words_per_chunk.is_none());
    }
}
