use std::collections::{HashMap, HashSet};

/// Forward table of original to translated text, plus the set of every
/// translation produced so far. Neither is evicted.
#[derive(Debug, Default)]
pub struct TranslationCache {
    forward: HashMap<String, String>,
    reverse: HashSet<String>,
}

impl TranslationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Known translation for a trimmed original text.
    pub fn lookup(&self, original: &str) -> Option<&str> {
        self.forward.get(original).map(String::as_str)
    }

    /// Whether `text` is itself output of an earlier translation.
    pub fn is_translation(&self, text: &str) -> bool {
        self.reverse.contains(text)
    }

    /// Record a completed translation in both tables.
    pub fn record(&mut self, original: &str, translated: &str) {
        self.forward
            .insert(original.to_string(), translated.to_string());
        self.mark_translation(translated);
    }

    pub fn mark_translation(&mut self, translated: &str) {
        self.reverse.insert(translated.to_string());
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }
}
