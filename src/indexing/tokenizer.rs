use crate::core::config::TokenizerConfig;
use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

/// Turns a raw alphanumeric run into an index term.
///
/// Implementations must be deterministic: the same input always yields the
/// same output, otherwise index-time and query-time terms drift apart.
/// Returning an empty string drops the token.
pub trait Normalizer: Send + Sync {
    fn normalize<'a>(&self, raw: &'a str) -> Cow<'a, str>;
}

/// Default normalizer: Unicode lower-case folding.
#[derive(Debug, Clone, Copy, Default)]
pub struct LowercaseNormalizer;

impl Normalizer for LowercaseNormalizer {
    fn normalize<'a>(&self, raw: &'a str) -> Cow<'a, str> {
        if raw.chars().any(char::is_uppercase) {
            Cow::Owned(raw.to_lowercase())
        } else {
            Cow::Borrowed(raw)
        }
    }
}

/// A normalized term and where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub term: String,
    /// Ordinal of the raw token in the text. Filtered tokens still count.
    pub position: u32,
    /// Byte range of the raw token in the source text
    pub offset: Range<usize>,
}

/// Splits text on non-alphanumeric boundaries and normalizes each piece.
#[derive(Clone)]
pub struct Tokenizer {
    normalizer: Arc<dyn Normalizer>,
    min_token_length: usize,
    stopwords: HashSet<String>,
}

impl Tokenizer {
    pub fn new(config: &TokenizerConfig) -> Self {
        Self::with_normalizer(config, Arc::new(LowercaseNormalizer))
    }

    /// Build a tokenizer around a custom normalizer. Stopwords are passed
    /// through the same normalizer so they compare against folded terms.
    pub fn with_normalizer(config: &TokenizerConfig, normalizer: Arc<dyn Normalizer>) -> Self {
        let stopwords = config
            .stopwords
            .iter()
            .map(|word| normalizer.normalize(word).into_owned())
            .filter(|word| !word.is_empty())
            .collect();

        Self {
            normalizer,
            min_token_length: config.min_token_length.max(1),
            stopwords,
        }
    }

    /// Lazily tokenize `text`. The returned iterator is `Clone`, so a
    /// sequence can be replayed from any point.
    pub fn tokenize<'t>(&'t self, text: &'t str) -> Tokens<'t> {
        Tokens {
            tokenizer: self,
            text,
            cursor: 0,
            position: 0,
        }
    }

    /// Count occurrences of each term in `text`.
    pub fn term_frequencies(&self, text: &str) -> HashMap<String, u32> {
        let mut freq = HashMap::new();
        for token in self.tokenize(text) {
            *freq.entry(token.term).or_insert(0) += 1;
        }
        freq
    }

    /// Distinct terms of `text` in first-occurrence order.
    pub fn unique_terms(&self, text: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        self.tokenize(text)
            .filter_map(|token| seen.insert(token.term.clone()).then_some(token.term))
            .collect()
    }

    fn accept(&self, raw: &str) -> Option<String> {
        let term = self.normalizer.normalize(raw);
        if term.is_empty()
            || term.chars().count() < self.min_token_length
            || self.stopwords.contains(term.as_ref())
        {
            return None;
        }
        Some(term.into_owned())
    }
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new(&TokenizerConfig::default())
    }
}

impl fmt::Debug for Tokenizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tokenizer")
            .field("min_token_length", &self.min_token_length)
            .field("stopwords", &self.stopwords.len())
            .finish_non_exhaustive()
    }
}

/// Iterator returned by [`Tokenizer::tokenize`].
#[derive(Clone)]
pub struct Tokens<'t> {
    tokenizer: &'t Tokenizer,
    text: &'t str,
    cursor: usize,
    position: u32,
}

impl Iterator for Tokens<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        loop {
            let rest = &self.text[self.cursor..];
            let start = self.cursor + rest.find(char::is_alphanumeric)?;
            let end = self.text[start..]
                .find(|c: char| !c.is_alphanumeric())
                .map(|len| start + len)
                .unwrap_or(self.text.len());

            self.cursor = end;
            let position = self.position;
            self.position += 1;

            if let Some(term) = self.tokenizer.accept(&self.text[start..end]) {
                return Some(Token {
                    term,
                    position,
                    offset: start..end,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terms(tokenizer: &Tokenizer, text: &str) -> Vec<String> {
        tokenizer.tokenize(text).map(|t| t.term).collect()
    }

    #[test]
    fn test_lowercases_and_splits_on_punctuation() {
        let tokenizer = Tokenizer::default();
        assert_eq!(
            terms(&tokenizer, "Hello, World! it's snake_case-ish"),
            vec!["hello", "world", "it", "s", "snake", "case", "ish"]
        );
    }

    #[test]
    fn test_positions_and_offsets() {
        let tokenizer = Tokenizer::default();
        let tokens: Vec<Token> = tokenizer.tokenize("  the cat\tsat.").collect();
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0].position, 0);
        assert_eq!(tokens[0].offset, 2..5);
        assert_eq!(tokens[2].term, "sat");
        assert_eq!(tokens[2].position, 2);
        assert_eq!(tokens[2].offset, 10..13);
    }

    #[test]
    fn test_empty_and_punctuation_only() {
        let tokenizer = Tokenizer::default();
        assert!(tokenizer.tokenize("").next().is_none());
        assert!(tokenizer.tokenize("   \n\t ").next().is_none());
        assert!(tokenizer.tokenize("--- ... !!!").next().is_none());
    }

    #[test]
    fn test_unicode_text() {
        let tokenizer = Tokenizer::default();
        assert_eq!(terms(&tokenizer, "Ünïcode Straße 東京"), vec!["ünïcode", "straße", "東京"]);
    }

    #[test]
    fn test_min_length_filter_keeps_positions() {
        let config = TokenizerConfig {
            min_token_length: 2,
            ..TokenizerConfig::default()
        };
        let tokenizer = Tokenizer::new(&config);
        let tokens: Vec<Token> = tokenizer.tokenize("a big cat").collect();
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].term, "big");
        assert_eq!(tokens[0].position, 1);
        assert_eq!(tokens[1].position, 2);
    }

    #[test]
    fn test_stopwords_are_case_folded() {
        let config = TokenizerConfig {
            stopwords: ["The".to_string(), "AND".to_string()].into_iter().collect(),
            ..TokenizerConfig::default()
        };
        let tokenizer = Tokenizer::new(&config);
        assert_eq!(terms(&tokenizer, "the cat AND The dog"), vec!["cat", "dog"]);
    }

    #[test]
    fn test_restartable_and_deterministic() {
        let tokenizer = Tokenizer::default();
        let text = "one two three two one";
        let mut iter = tokenizer.tokenize(text);
        iter.next();
        let replay = iter.clone();
        assert_eq!(iter.collect::<Vec<_>>(), replay.collect::<Vec<_>>());
        assert_eq!(terms(&tokenizer, text), terms(&tokenizer, text));
    }

    #[test]
    fn test_term_frequencies() {
        let tokenizer = Tokenizer::default();
        let freq = tokenizer.term_frequencies("The cat cat SAT, the end");
        assert_eq!(freq.get("the"), Some(&2));
        assert_eq!(freq.get("cat"), Some(&2));
        assert_eq!(freq.get("sat"), Some(&1));
        assert_eq!(freq.get("end"), Some(&1));
        assert_eq!(freq.values().sum::<u32>(), 6);
    }

    #[test]
    fn test_unique_terms() {
        let tokenizer = Tokenizer::default();
        assert_eq!(tokenizer.unique_terms("b a B c a"), vec!["b", "a", "c"]);
    }

    struct TruncatingNormalizer;

    impl Normalizer for TruncatingNormalizer {
        fn normalize<'a>(&self, raw: &'a str) -> Cow<'a, str> {
            Cow::Owned(raw.to_lowercase().chars().take(4).collect())
        }
    }

    #[test]
    fn test_custom_normalizer() {
        let tokenizer =
            Tokenizer::with_normalizer(&TokenizerConfig::default(), Arc::new(TruncatingNormalizer));
        assert_eq!(terms(&tokenizer, "Searching searched"), vec!["sear", "sear"]);
    }
}
