use porter_stemmer::stem;
use std::collections::HashSet;
use std::sync::OnceLock;

static STOP_WORDS: OnceLock<HashSet<&'static str>> = OnceLock::new();

pub const STOP_WORD_LIST: [&str; 20] = [
    "a", "an", "and", "the", "of", "be", "to", "it", "that", "have", "for", "not", "on", "with",
    "as", "do", "at", "this", "but", "by",
];

pub fn get_stop_words() -> &'static HashSet<&'static str> {
    STOP_WORDS.get_or_init(|| HashSet::from(STOP_WORD_LIST))
}

/// A tokenizer receives a stream of characters, breaks it up into individual tokens (usually individual words),
/// and outputs a stream of tokens.
pub trait Tokenizer: Send + Sync {
    fn tokenize(&self, text: &str) -> Vec<String>;
}

/// Splits on every character that is neither a letter nor a digit, so
/// "Hello, world-wide web!" becomes [Hello, world, wide, web].
pub struct AlphanumericTokenizer;

impl Tokenizer for AlphanumericTokenizer {
    fn tokenize(&self, text: &str) -> Vec<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|s| !s.is_empty())
            .map(|w| w.to_string())
            .collect()
    }
}

/// A token filter receives the token stream and may add, remove, or change tokens.
/// For example, a lowercase token filter converts all tokens to lowercase, a stop token
/// filter removes common words (stop words) like the from the token stream.
pub trait TokenFilter: Send + Sync {
    fn filter(&self, tokens: Vec<TextToken>) -> Vec<TextToken>;
}

/// Lowercases each term. Lowercasing can expand a letter into a letter plus
/// a combining mark ("İ" becomes "i\u{307}"), so anything that is not a
/// letter or digit afterwards is dropped.
pub struct LowerCaseTokenFilter;

impl TokenFilter for LowerCaseTokenFilter {
    fn filter(&self, tokens: Vec<TextToken>) -> Vec<TextToken> {
        tokens
            .into_iter()
            .map(|mut t| {
                t.term = t
                    .term
                    .to_lowercase()
                    .chars()
                    .filter(|c| c.is_alphanumeric())
                    .collect();
                t
            })
            .filter(|t| !t.term.is_empty())
            .collect()
    }
}

pub struct StopWordTokenFilter;

impl TokenFilter for StopWordTokenFilter {
    fn filter(&self, mut tokens: Vec<TextToken>) -> Vec<TextToken> {
        let stop_words = get_stop_words();
        tokens.retain(|w| !stop_words.contains(w.term.as_str()));
        tokens
    }
}

/// Porter stemming for ASCII words. Anything else is passed through as-is,
/// the algorithm's suffix rules only make sense for English letters.
pub struct PorterStemmerTokenFilter;

impl TokenFilter for PorterStemmerTokenFilter {
    fn filter(&self, tokens: Vec<TextToken>) -> Vec<TextToken> {
        tokens
            .into_iter()
            .map(|mut w| {
                if w.term.is_ascii() {
                    w.term = stem(&w.term);
                }
                w
            })
            .filter(|w| !w.term.is_empty())
            .collect::<Vec<TextToken>>()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextToken {
    pub term: String,
    pub pos: usize,
}

impl std::ops::Deref for TextToken {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.term
    }
}

/// Pure text analysis pipeline - no async, no DB, just text transformations.
///
/// The same instance configuration must be used for indexing and for
/// queries, otherwise stored terms and query terms stop lining up.
pub struct TextAnalyzer {
    tokenizer: Box<dyn Tokenizer>,
    token_filters: Vec<Box<dyn TokenFilter>>,
}

impl TextAnalyzer {
    pub fn new(tokenizer: Box<dyn Tokenizer>, token_filters: Vec<Box<dyn TokenFilter>>) -> Self {
        Self {
            tokenizer,
            token_filters,
        }
    }

    /// tokenize -> lowercase -> stop words -> stem.
    ///
    /// Stemming can land on a stop word ("doing" -> "do"), so the stop list
    /// runs once more after the stemmer.
    pub fn standard() -> Self {
        Self::new(
            Box::new(AlphanumericTokenizer),
            vec![
                Box::new(LowerCaseTokenFilter),
                Box::new(StopWordTokenFilter),
                Box::new(PorterStemmerTokenFilter),
                Box::new(StopWordTokenFilter),
            ],
        )
    }

    pub fn tokenize(&self, content: &str) -> Vec<TextToken> {
        self.tokenizer
            .tokenize(content)
            .into_iter()
            .enumerate()
            .map(|(pos, term)| TextToken { term, pos })
            .collect()
    }

    pub fn token_filter(&self, mut tokens: Vec<TextToken>) -> Vec<TextToken> {
        for filter in self.token_filters.iter() {
            tokens = filter.filter(tokens);
        }
        tokens
    }

    /// Analyzes raw content and returns a list of tokens
    pub fn analyze(&self, raw_content: &str) -> Vec<TextToken> {
        let tokens = self.tokenize(raw_content);
        self.token_filter(tokens)
    }

    /// Same as [`TextAnalyzer::analyze`], keeping only the terms.
    pub fn terms(&self, raw_content: &str) -> Vec<String> {
        self.analyze(raw_content)
            .into_iter()
            .map(|t| t.term)
            .collect()
    }
}

impl Default for TextAnalyzer {
    fn default() -> Self {
        Self::standard()
    }
}
