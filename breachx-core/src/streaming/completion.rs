use std::fmt;

/// Decides from a log line whether the producing job has finished.
pub trait CompletionPredicate: Send + Sync + fmt::Debug {
    fn is_complete(&self, message: &str) -> bool;
}

/// Substring match against a fixed list of phrases.
#[derive(Debug, Clone)]
pub struct PhraseCompletion {
    phrases: Vec<String>,
}

pub const DEFAULT_COMPLETION_PHRASES: [&str; 2] =
    ["Build complete", "Completed build:"];

impl PhraseCompletion {
    pub fn new<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            phrases: phrases
                .into_iter()
                .map(Into::into)
                .filter(|p: &String| !p.is_empty())
                .collect(),
        }
    }
}

impl Default for PhraseCompletion {
    fn default() -> Self {
        Self::new(DEFAULT_COMPLETION_PHRASES)
    }
}

impl CompletionPredicate for PhraseCompletion {
    fn is_complete(&self, message: &str) -> bool {
        self.phrases.iter().any(|phrase| message.contains(phrase.as_str()))
    }
}
