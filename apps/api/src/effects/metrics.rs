//! Local effect heuristics. Deterministic, no I/O.

use once_cell::sync::Lazy;
use regex::Regex;

/// Score used when no overall rating can be read from an AI assessment.
pub const DEFAULT_AI_SCORE: f64 = 7.0;

/// Rules need this many evaluations before their overall score carries full weight.
pub const FULL_WEIGHT_USAGE: f64 = 100.0;

pub const PROFESSIONAL_KEYWORDS: [&str; 9] = [
    "java",
    "python",
    "javascript",
    "react",
    "spring",
    "leadership",
    "management",
    "teamwork",
    "communication",
];

// Label, an optional "(1-10)" style range, then the first number on the line.
static OVERALL_SCORE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:overall effect|整体优化效果)(?:\s*[(（][^)）\n]*[)）])?[^\d\n]*(\d+(?:\.\d+)?)",
    )
    .expect("overall score regex is valid")
});

static SENTENCE_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.!?。！？]+").expect("sentence regex is valid"));

/// Percentage change in character count. 0 when the original is empty.
pub fn content_length_change(original: &str, optimized: &str) -> f64 {
    let before = original.chars().count() as f64;
    if before == 0.0 {
        return 0.0;
    }
    let after = optimized.chars().count() as f64;
    (after - before) / before * 100.0
}

/// Professional keywords present in `optimized` minus those present in `original`.
pub fn keyword_improvement(original: &str, optimized: &str) -> i64 {
    let count = |text: &str| {
        let lower = text.to_lowercase();
        PROFESSIONAL_KEYWORDS
            .iter()
            .filter(|k| lower.contains(*k))
            .count() as i64
    };
    count(optimized) - count(original)
}

/// 0-10 proxy that penalizes sentences averaging more than 20 words.
pub fn readability_score(content: &str) -> f64 {
    let sentences = SENTENCE_BREAK
        .split(content)
        .filter(|s| !s.trim().is_empty())
        .count();
    let words = content.split_whitespace().count();
    if sentences == 0 || words == 0 {
        return 0.0;
    }
    let avg_words = words as f64 / sentences as f64;
    (10.0 - (avg_words - 20.0).max(0.0) * 0.5).clamp(0.0, 10.0)
}

/// Reads the overall rating from a free-text assessment, clamped to 0-10.
/// Falls back to `DEFAULT_AI_SCORE` when no rating line is found.
pub fn extract_ai_score(assessment: &str) -> f64 {
    OVERALL_SCORE
        .captures(assessment)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .map(|score| score.clamp(0.0, 10.0))
        .unwrap_or(DEFAULT_AI_SCORE)
}

/// `(ai_avg * 0.6 + positive_rate * 10 * 0.4) * min(1, usage / 100)`.
pub fn overall_score(average_ai_score: f64, positive_rate: f64, usage_count: i64) -> f64 {
    let usage_weight = (usage_count.max(0) as f64 / FULL_WEIGHT_USAGE).min(1.0);
    (average_ai_score * 0.6 + positive_rate * 10.0 * 0.4) * usage_weight
}

/// Fixed-point encoding used by the running sums.
pub fn scale(value: f64) -> i64 {
    (value * 100.0).round() as i64
}

pub fn unscale(total: i64, count: i64) -> f64 {
    if count <= 0 {
        0.0
    } else {
        total as f64 / (count as f64 * 100.0)
    }
}
