//! Keyword and topic tables that drive turn classification
//!
//! All matching is on lower-cased text and uses substring containment,
//! so "ok" matches inside "okay" and "graph" inside "graphing".

use regex::Regex;

/// Short replies containing one of these confirm a pending graph offer
pub const AFFIRMATIVES: &[&str] = &[
    "yes", "yeah", "sure", "ok", "okay", "generate", "show", "graph", "plot", "draw",
];

/// Any of these in a problem statement is an explicit graph request
pub const GRAPH_KEYWORDS: &[&str] = &["draw", "plot", "graph", "sketch", "visualize", "diagram"];

/// Confirmations must be strictly shorter than this many characters
pub const CONFIRMATION_MAX_CHARS: usize = 50;

/// (name, pattern) for topics worth offering a graph for
pub const TOPIC_PATTERNS: &[(&str, &str)] = &[
    (
        "polynomial",
        r"quadratic|parabola|polynomial|cubic|\b[a-z]\s*\^\s*[23]\b",
    ),
    ("trigonometric", r"sine|cosine|tangent|trig|\b(?:sin|cos|tan)\b"),
    ("exponential", r"exponential|logarithm|\bln\b|\blog\b"),
    ("calculus", r"derivative|integral|calculus"),
    ("function", r"function|equation|curve"),
];

/// A named topic pattern
#[derive(Debug, Clone)]
pub struct TopicCategory {
    pub name: String,
    pub pattern: Regex,
}

/// Tunable classification tables
#[derive(Debug, Clone)]
pub struct Vocabulary {
    pub affirmatives: Vec<String>,
    pub graph_keywords: Vec<String>,
    pub topics: Vec<TopicCategory>,
    pub confirmation_max_chars: usize,
}

impl Vocabulary {
    pub fn new(
        affirmatives: &[&str],
        graph_keywords: &[&str],
        topics: &[(&str, &str)],
        confirmation_max_chars: usize,
    ) -> Result<Self, regex::Error> {
        let topics = topics
            .iter()
            .map(|(name, pattern)| {
                Ok(TopicCategory {
                    name: (*name).to_string(),
                    pattern: Regex::new(pattern)?,
                })
            })
            .collect::<Result<Vec<_>, regex::Error>>()?;

        Ok(Self {
            affirmatives: lowercase_all(affirmatives),
            graph_keywords: lowercase_all(graph_keywords),
            topics,
            confirmation_max_chars,
        })
    }

    /// Short affirmative reply to a graph offer.
    ///
    /// The length gate dominates: a long restatement that happens to contain
    /// "ok" is a new problem, not a confirmation.
    pub fn is_confirmation(&self, text: &str) -> bool {
        let normalized = text.trim().to_lowercase();
        normalized.chars().count() < self.confirmation_max_chars
            && self.affirmatives.iter().any(|w| normalized.contains(w.as_str()))
    }

    /// Does the text explicitly ask for a graph?
    pub fn requests_graph(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        self.graph_keywords.iter().any(|k| lower.contains(k.as_str()))
    }

    /// First topic matching the combined problem and solution text
    pub fn matching_topic(&self, problem: &str, solution: &str) -> Option<&str> {
        let combined = format!("{problem} {solution}").to_lowercase();
        self.topics
            .iter()
            .find(|t| t.pattern.is_match(&combined))
            .map(|t| t.name.as_str())
    }

    /// Offer a graph when the exchange is graphable and none was asked for
    pub fn should_offer_graph(&self, problem: &str, solution: &str) -> bool {
        !self.requests_graph(problem) && self.matching_topic(problem, solution).is_some()
    }
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self::new(AFFIRMATIVES, GRAPH_KEYWORDS, TOPIC_PATTERNS, CONFIRMATION_MAX_CHARS)
            .expect("built-in topic patterns are valid")
    }
}

fn lowercase_all(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_lowercase()).collect()
}
