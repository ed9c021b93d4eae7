//! Spoken-utterance matching for task confirmation.
//!
//! Scores a recognizer transcript against the current task's title and
//! expected phrase. The acceptance rule is deliberately lenient -- young
//! children's speech comes back partial and garbled, so a false positive is
//! much cheaper than a child stuck repeating themselves. Three independent
//! signals each suffice on their own:
//!
//! 1. a fuzzy similarity score above 50 against either target string,
//! 2. any non-trivial target keyword contained in the transcript,
//! 3. a generic completion word ("done", "next", ...).

use crate::routine::Task;

/// Filler tokens that never count as keywords.
const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "to", "my", "your", "try", "saying", "i", "am",
];

/// Always-accepted completion words, independent of the task.
const COMPLETION_WORDS: &[&str] = &["done", "finish", "next", "yes", "okay"];

/// Fuzzy score threshold (exclusive) for acceptance.
const ACCEPT_SCORE: u32 = 50;

/// How an utterance was judged against a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchDecision {
    pub accepted: bool,
    /// Best fuzzy score (0-100) against title and expected phrase.
    pub best_score: u32,
    /// A target keyword appeared in the transcript.
    pub keyword_hit: bool,
    /// A generic completion word appeared in the transcript.
    pub completion_word: bool,
}

/// Judge a spoken transcript against a task.
///
/// Input casing and surrounding whitespace are normalized here; callers pass
/// the transcript as the recognizer produced it.
pub fn is_match(spoken: &str, task: &Task) -> MatchDecision {
    let spoken = spoken.trim().to_lowercase();
    let title = task.title.to_lowercase();
    let phrase = task.expected_speech.to_lowercase();

    if spoken.is_empty() {
        return MatchDecision {
            accepted: false,
            best_score: 0,
            keyword_hit: false,
            completion_word: false,
        };
    }

    let best_score = weighted_ratio(&spoken, &title).max(weighted_ratio(&spoken, &phrase));
    let keyword_hit = target_keywords(&title, &phrase)
        .iter()
        .any(|kw| spoken.contains(kw.as_str()));
    let completion_word = COMPLETION_WORDS.iter().any(|w| spoken.contains(w));

    MatchDecision {
        accepted: best_score > ACCEPT_SCORE || keyword_hit || completion_word,
        best_score,
        keyword_hit,
        completion_word,
    }
}

/// Fuzzy similarity (0-100) between two lowercase strings.
///
/// Takes the best of a plain edit-distance ratio, an order-insensitive
/// token-sorted ratio, and a slightly discounted best-token alignment for
/// partial recognitions ("brushed" out of "i brushed my teeth").
pub fn weighted_ratio(a: &str, b: &str) -> u32 {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let plain = strsim::normalized_levenshtein(a, b);
    let sorted = strsim::normalized_levenshtein(&sorted_tokens(a), &sorted_tokens(b));
    let partial = token_alignment(a, b) * 0.95;

    (plain.max(sorted).max(partial) * 100.0).round() as u32
}

fn sorted_tokens(s: &str) -> String {
    let mut tokens: Vec<&str> = s.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

/// Average best-pair similarity between the token sets, anchored on the
/// shorter side so a single well-recognized word still scores high.
fn token_alignment(a: &str, b: &str) -> f64 {
    let ta: Vec<&str> = a.split_whitespace().collect();
    let tb: Vec<&str> = b.split_whitespace().collect();
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }
    let (short, long) = if ta.len() <= tb.len() { (ta, tb) } else { (tb, ta) };
    let total: f64 = short
        .iter()
        .map(|s| {
            long.iter()
                .map(|l| strsim::normalized_levenshtein(s, l))
                .fold(0.0, f64::max)
        })
        .sum();
    total / short.len() as f64
}

/// Tokens of title + phrase, minus stop words and anything of length <= 2.
fn target_keywords(title: &str, phrase: &str) -> Vec<String> {
    title
        .split_whitespace()
        .chain(phrase.split_whitespace())
        .filter(|t| t.len() > 2 && !STOP_WORDS.contains(t))
        .map(str::to_string)
        .collect()
}
