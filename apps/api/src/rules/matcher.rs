//! Pure pattern helpers shared by the engine and rule validation.

use regex::{Regex, RegexBuilder};

use crate::errors::AppError;
use crate::models::rule::Rule;

/// Used when the AI call fails and the rule carries no suggestion of its own.
pub const GENERIC_SUGGESTION: &str = "Consider revising this part of the resume.";

/// Compiles a rule pattern with case-insensitive matching.
pub fn compile(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}

/// Leftmost-first, non-overlapping matches as literal substrings.
pub fn find_matches(regex: &Regex, content: &str) -> Vec<String> {
    regex
        .find_iter(content)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// True for active rules whose pattern is non-empty and compiles.
pub fn is_applicable(rule: &Rule) -> bool {
    rule.is_active && rule.has_pattern() && compile(&rule.pattern).is_ok()
}

/// Rejects empty or non-compiling patterns on the write path.
pub fn validate_pattern(pattern: &str) -> Result<(), AppError> {
    if pattern.trim().is_empty() {
        return Err(AppError::InvalidPattern("pattern must not be empty".to_string()));
    }
    compile(pattern)
        .map(|_| ())
        .map_err(|e| AppError::InvalidPattern(e.to_string()))
}

pub fn fallback_suggestion(rule: &Rule) -> String {
    if rule.suggestion.trim().is_empty() {
        GENERIC_SUGGESTION.to_string()
    } else {
        rule.suggestion.clone()
    }
}
