/// Focus area passed to the improver for assessments.
pub const ASSESSMENT_FOCUS: &str = "rule_evaluation";

/// Stored as the assessment text when the AI call fails.
pub const ASSESSMENT_UNAVAILABLE: &str =
    "AI assessment is temporarily unavailable; a manual review is recommended.";

/// Asks for five 1-10 ratings. The last line format is what `extract_ai_score` reads.
pub fn assessment_prompt(original: &str, optimized: &str) -> String {
    format!(
        "Assess how much the following resume optimization improved the text, \
         with analysis and further suggestions.\n\
         \n\
         [Original content]\n{original}\n\
         \n\
         [Optimized content]\n{optimized}\n\
         \n\
         Rate each aspect from 1 to 10:\n\
         1. Content improvement\n\
         2. Keyword optimization\n\
         3. Language and expression\n\
         4. Professionalism\n\
         5. Overall effect\n\
         \n\
         Finish with a line of the form 'Overall effect: <score>'."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_embeds_both_versions() {
        let prompt = assessment_prompt("负责开发工作", "主导开发，性能提升30%");
        assert!(prompt.contains("[Original content]\n负责开发工作"));
        assert!(prompt.contains("[Optimized content]\n主导开发，性能提升30%"));
        assert!(prompt.ends_with("'Overall effect: <score>'."));
    }
}
