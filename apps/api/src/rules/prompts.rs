use crate::models::rule::Rule;

/// Content prefix cap for suggestion requests, in characters.
pub const CONTEXT_CONTENT_LIMIT: usize = 500;

/// Builds the bounded text sent to the improver for one matched rule.
pub fn suggestion_context(rule: &Rule, matches: &[String], content: &str) -> String {
    let prefix: String = content.chars().take(CONTEXT_CONTENT_LIMIT).collect();
    format!(
        "Resume optimization rule: '{name}'\n\
         Category: {category}\n\
         Target section: {section}\n\
         Description: {description}\n\
         \n\
         Matched issues: {matches}\n\
         \n\
         Original content: {prefix}",
        name = rule.name,
        category = rule.category,
        section = rule.target_section,
        description = rule.description,
        matches = matches.join(", "),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::rule::{RuleInput, TargetSection};

    fn rule() -> Rule {
        Rule::from_input(RuleInput {
            name: "Quantify experience".to_string(),
            description: "Duty-only phrasing".to_string(),
            category: "content".to_string(),
            target_section: TargetSection::Experience,
            pattern: "负责.*工作".to_string(),
            suggestion: String::new(),
            priority: None,
            is_active: None,
        })
    }

    #[test]
    fn test_context_lists_rule_metadata_and_matches() {
        let ctx = suggestion_context(&rule(), &["负责A工作".into(), "负责B工作".into()], "body");
        assert!(ctx.contains("'Quantify experience'"));
        assert!(ctx.contains("Target section: EXPERIENCE"));
        assert!(ctx.contains("Matched issues: 负责A工作, 负责B工作"));
        assert!(ctx.ends_with("Original content: body"));
    }

    #[test]
    fn test_context_truncates_content_by_characters() {
        let content = "负".repeat(CONTEXT_CONTENT_LIMIT + 200);
        let ctx = suggestion_context(&rule(), &[], &content);
        let tail = ctx.rsplit("Original content: ").next().unwrap();
        assert_eq!(tail.chars().count(), CONTEXT_CONTENT_LIMIT);
    }
}
