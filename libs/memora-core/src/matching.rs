//! Free-text answer grading with typo tolerance.

use serde::{Deserialize, Serialize};

/// Shortest reference answer for which typos are considered at all.
pub const MIN_FUZZY_LENGTH: usize = 4;

/// Result of grading a typed answer against the reference answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    /// Whether the answer is accepted.
    pub is_correct: bool,
    /// Edit distance between the normalized answers.
    pub distance: usize,
    /// Largest distance that would still have been accepted.
    pub tolerance: usize,
    /// Normalized typed answer (for display).
    pub typed_normalized: String,
    /// Normalized correct answer (for display).
    pub correct_normalized: String,
}

/// Whether `user_answer` is accepted for `correct_answer`.
pub fn check_answer(user_answer: &str, correct_answer: &str) -> bool {
    grade_answer(user_answer, correct_answer).is_correct
}

/// Grade `user_answer`, keeping the details of the comparison.
pub fn grade_answer(user_answer: &str, correct_answer: &str) -> MatchResult {
    let typed_normalized = normalize_answer(user_answer);
    let correct_normalized = normalize_answer(correct_answer);

    if typed_normalized == correct_normalized {
        return MatchResult {
            is_correct: true,
            distance: 0,
            tolerance: typo_tolerance(correct_normalized.chars().count()),
            typed_normalized,
            correct_normalized,
        };
    }

    let length = correct_normalized.chars().count();
    let tolerance = typo_tolerance(length);
    let (is_correct, distance) = if length >= MIN_FUZZY_LENGTH {
        let distance = levenshtein_distance(&typed_normalized, &correct_normalized);
        (distance <= tolerance, distance)
    } else {
        (false, levenshtein_distance(&typed_normalized, &correct_normalized))
    };

    MatchResult {
        is_correct,
        distance,
        tolerance,
        typed_normalized,
        correct_normalized,
    }
}

/// Allowed edit distance for a reference answer of `length` characters.
pub fn typo_tolerance(length: usize) -> usize {
    match length {
        l if l >= 10 => 2,
        l if l >= 6 => 1,
        _ => 0,
    }
}

/// Trim and case-fold an answer.
pub fn normalize_answer(s: &str) -> String {
    s.trim().to_lowercase()
}

/// Calculate Levenshtein distance between two strings, by characters.
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();

    let m = a_chars.len();
    let n = b_chars.len();

    if m == 0 {
        return n;
    }
    if n == 0 {
        return m;
    }

    // Two rows instead of the full matrix
    let mut prev = (0..=n).collect::<Vec<_>>();
    let mut curr = vec![0; n + 1];

    for i in 1..=m {
        curr[0] = i;

        for j in 1..=n {
            let cost = usize::from(a_chars[i - 1] != b_chars[j - 1]);

            curr[j] = (prev[j] + 1) // deletion
                .min(curr[j - 1] + 1) // insertion
                .min(prev[j - 1] + cost); // substitution
        }

        std::mem::swap(&mut prev, &mut curr);
    }

    prev[n]
}
