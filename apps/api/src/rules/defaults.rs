//! Stock rule catalog seeded into an empty store at startup.
//! Patterns target Chinese-language resumes.

use tracing::info;

use crate::errors::AppError;
use crate::models::rule::{RuleInput, TargetSection};
use crate::rules::RuleEngine;

struct DefaultRule {
    name: &'static str,
    category: &'static str,
    target_section: TargetSection,
    pattern: &'static str,
    description: &'static str,
    suggestion: &'static str,
    priority: i32,
}

const DEFAULT_RULES: [DefaultRule; 10] = [
    DefaultRule {
        name: "Summary length check",
        category: "format",
        target_section: TargetSection::Summary,
        pattern: r"^[\s\S]{0,50}$",
        description: "Flags summaries that are too short",
        suggestion: "A summary should name 3-5 key achievements and skills, roughly 100-200 characters.",
        priority: 1,
    },
    DefaultRule {
        name: "Skill keywords",
        category: "content",
        target_section: TargetSection::Skills,
        pattern: r"(?i)(java|python|javascript|react|spring|sql|git|docker|kubernetes)",
        description: "Checks for in-demand technology keywords",
        suggestion: "Add technology keywords that match the target role to get past screening.",
        priority: 2,
    },
    DefaultRule {
        name: "Quantified experience",
        category: "content",
        target_section: TargetSection::Experience,
        pattern: "负责.*工作|参与.*项目|协助.*完成",
        description: "Checks whether work experience states measurable results",
        suggestion: "Quantify achievements with concrete numbers, e.g. 'improved throughput 30%'.",
        priority: 1,
    },
    DefaultRule {
        name: "Consistent date format",
        category: "format",
        target_section: TargetSection::All,
        pattern: r"\d{4}\.\d{1,2}|\d{4}/\d{1,2}|\d{4}年\d{1,2}月",
        description: "Checks that dates use one format",
        suggestion: "Use a single date format throughout, preferably YYYY.MM such as 2023.01.",
        priority: 3,
    },
    DefaultRule {
        name: "Contact details",
        category: "completeness",
        target_section: TargetSection::All,
        pattern: r"(?i)(电话|手机|邮箱|email|@.*\.com)",
        description: "Checks that contact details are present",
        suggestion: "Include both a phone number and a professional email address.",
        priority: 1,
    },
    DefaultRule {
        name: "Education detail",
        category: "content",
        target_section: TargetSection::Education,
        pattern: r"^[^\n]*大学|^[^\n]*学院",
        description: "Checks that education entries carry enough detail",
        suggestion: "Add degree, major, graduation date and, where relevant, coursework and GPA.",
        priority: 2,
    },
    DefaultRule {
        name: "Result-oriented projects",
        category: "content",
        target_section: TargetSection::Experience,
        pattern: "负责.*开发|参与.*设计|协助.*测试",
        description: "Checks whether project descriptions highlight outcomes",
        suggestion: "Describe projects with STAR: Situation, Task, Action, Result.",
        priority: 2,
    },
    DefaultRule {
        name: "Skill proficiency wording",
        category: "content",
        target_section: TargetSection::Skills,
        pattern: "(?i)(精通|熟练|掌握|了解|熟悉)",
        description: "Checks that skill levels are described accurately",
        suggestion: "Avoid overusing 'expert'; prefer objective wording such as 'hands-on experience with'.",
        priority: 3,
    },
    DefaultRule {
        name: "Resume length",
        category: "format",
        target_section: TargetSection::All,
        pattern: r"^[\s\S]{1000,}",
        description: "Flags resumes that run long",
        suggestion: "Keep the resume to 1-2 pages and focus on experience relevant to the role.",
        priority: 2,
    },
    DefaultRule {
        name: "Clear career objective",
        category: "content",
        target_section: TargetSection::Summary,
        pattern: "寻求.*机会|希望.*职位|应聘.*岗位",
        description: "Checks that the career objective is explicit",
        suggestion: "State the career objective up front and align it with the role's requirements.",
        priority: 2,
    },
];

fn inputs() -> impl Iterator<Item = RuleInput> {
    DEFAULT_RULES.iter().map(|d| RuleInput {
        name: d.name.to_string(),
        description: d.description.to_string(),
        category: d.category.to_string(),
        target_section: d.target_section,
        pattern: d.pattern.to_string(),
        suggestion: d.suggestion.to_string(),
        priority: Some(d.priority),
        is_active: Some(true),
    })
}

/// Creates the stock rules if the catalog is empty. Returns how many were created.
pub async fn seed_default_rules(engine: &RuleEngine) -> Result<usize, AppError> {
    if engine.count_rules().await? > 0 {
        info!("Rule catalog already populated, skipping default seeding");
        return Ok(0);
    }

    let mut created = 0;
    for input in inputs() {
        engine.create_rule(input).await?;
        created += 1;
    }

    info!("Seeded {created} default optimization rules");
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::matcher::validate_pattern;
    use crate::rules::tests::engine_with;
    use std::sync::Arc;

    use crate::llm_client::DisabledImprover;

    #[test]
    fn test_every_default_pattern_compiles() {
        for rule in &DEFAULT_RULES {
            assert!(validate_pattern(rule.pattern).is_ok(), "{}", rule.name);
        }
    }

    #[tokio::test]
    async fn test_seeding_only_fills_an_empty_catalog() {
        let engine = engine_with(Arc::new(DisabledImprover));
        assert_eq!(seed_default_rules(&engine).await.unwrap(), 10);
        assert_eq!(seed_default_rules(&engine).await.unwrap(), 0);
        assert_eq!(engine.count_rules().await.unwrap(), 10);
    }
}
