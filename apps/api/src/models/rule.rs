use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_PRIORITY: i32 = 3;

/// Resume area a rule inspects. `All` marks section-agnostic rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TargetSection {
    Summary,
    Skills,
    Experience,
    Education,
    All,
}

impl TargetSection {
    /// Concrete sections scanned by a batch run, before the general (`All`) pass.
    pub const CONCRETE: [TargetSection; 4] = [
        TargetSection::Summary,
        TargetSection::Skills,
        TargetSection::Experience,
        TargetSection::Education,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TargetSection::Summary => "SUMMARY",
            TargetSection::Skills => "SKILLS",
            TargetSection::Experience => "EXPERIENCE",
            TargetSection::Education => "EDUCATION",
            TargetSection::All => "ALL",
        }
    }
}

impl fmt::Display for TargetSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetSection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SUMMARY" => Ok(TargetSection::Summary),
            "SKILLS" => Ok(TargetSection::Skills),
            "EXPERIENCE" => Ok(TargetSection::Experience),
            "EDUCATION" => Ok(TargetSection::Education),
            "ALL" => Ok(TargetSection::All),
            other => Err(format!("unknown target section '{other}'")),
        }
    }
}

/// A named pattern-to-suggestion mapping scoped to a resume section.
/// The live row is mutated in place; history lives in `RuleVersion`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Rule {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub category: String,
    pub target_section: TargetSection,
    pub pattern: String,
    pub suggestion: String,
    pub priority: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Rule {
    /// Builds a new rule from client input, filling defaults and fresh timestamps.
    pub fn from_input(input: RuleInput) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: input.name,
            description: input.description,
            category: input.category,
            target_section: input.target_section,
            pattern: input.pattern,
            suggestion: input.suggestion,
            priority: input.priority.unwrap_or(DEFAULT_PRIORITY),
            is_active: input.is_active.unwrap_or(true),
            created_at: now,
            updated_at: now,
        }
    }

    /// Overwrites every mutable field with `input`. Identity and `created_at` are kept.
    pub fn apply_input(&mut self, input: RuleInput) {
        self.name = input.name;
        self.description = input.description;
        self.category = input.category;
        self.target_section = input.target_section;
        self.pattern = input.pattern;
        self.suggestion = input.suggestion;
        self.priority = input.priority.unwrap_or(self.priority);
        self.is_active = input.is_active.unwrap_or(self.is_active);
        self.updated_at = Utc::now();
    }

    pub fn has_pattern(&self) -> bool {
        !self.pattern.trim().is_empty()
    }
}

/// Client-supplied rule fields for create and update.
#[derive(Debug, Clone, Deserialize)]
pub struct RuleInput {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    pub target_section: TargetSection,
    pub pattern: String,
    #[serde(default)]
    pub suggestion: String,
    pub priority: Option<i32>,
    pub is_active: Option<bool>,
}

/// Lifecycle of a version snapshot. Exactly one version per rule is `Current`,
/// apart from the instant between inserting a new version and expiring its predecessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VersionStatus {
    Current,
    Expired,
}

impl VersionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VersionStatus::Current => "CURRENT",
            VersionStatus::Expired => "EXPIRED",
        }
    }
}

impl FromStr for VersionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CURRENT" => Ok(VersionStatus::Current),
            "EXPIRED" => Ok(VersionStatus::Expired),
            other => Err(format!("unknown version status '{other}'")),
        }
    }
}

/// Immutable snapshot of a rule's mutable fields at one point in time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleVersion {
    pub id: Uuid,
    pub rule_id: Uuid,
    pub rule_name: String,
    pub version: i32,
    pub pattern: String,
    pub suggestion: String,
    pub description: String,
    pub category: String,
    pub priority: i32,
    pub target_section: TargetSection,
    pub is_active: bool,
    pub change_reason: String,
    pub changed_by: String,
    pub status: VersionStatus,
    pub created_at: DateTime<Utc>,
    pub effective_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl RuleVersion {
    pub fn snapshot(rule: &Rule, version: i32, change_reason: &str, changed_by: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            rule_id: rule.id,
            rule_name: rule.name.clone(),
            version,
            pattern: rule.pattern.clone(),
            suggestion: rule.suggestion.clone(),
            description: rule.description.clone(),
            category: rule.category.clone(),
            priority: rule.priority,
            target_section: rule.target_section,
            is_active: rule.is_active,
            change_reason: change_reason.to_string(),
            changed_by: changed_by.to_string(),
            status: VersionStatus::Current,
            created_at: now,
            effective_at: now,
            expires_at: None,
        }
    }

    /// Copies this snapshot's fields onto the live rule. Name and identity are untouched.
    pub fn restore_onto(&self, rule: &mut Rule) {
        rule.pattern = self.pattern.clone();
        rule.suggestion = self.suggestion.clone();
        rule.description = self.description.clone();
        rule.category = self.category.clone();
        rule.priority = self.priority;
        rule.target_section = self.target_section;
        rule.is_active = self.is_active;
        rule.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> RuleInput {
        RuleInput {
            name: "Quantify experience".to_string(),
            description: "Flags duty-only phrasing".to_string(),
            category: "content".to_string(),
            target_section: TargetSection::Experience,
            pattern: "负责.*工作".to_string(),
            suggestion: "Add numbers".to_string(),
            priority: None,
            is_active: None,
        }
    }

    #[test]
    fn test_target_section_parses_case_insensitively() {
        assert_eq!("skills".parse::<TargetSection>(), Ok(TargetSection::Skills));
        assert_eq!(" ALL ".parse::<TargetSection>(), Ok(TargetSection::All));
        assert!("HOBBIES".parse::<TargetSection>().is_err());
    }

    #[test]
    fn test_target_section_serializes_upper_case() {
        let json = serde_json::to_string(&TargetSection::Experience).unwrap();
        assert_eq!(json, "\"EXPERIENCE\"");
    }

    #[test]
    fn test_from_input_applies_defaults() {
        let rule = Rule::from_input(input());
        assert_eq!(rule.priority, DEFAULT_PRIORITY);
        assert!(rule.is_active);
        assert_eq!(rule.created_at, rule.updated_at);
    }

    #[test]
    fn test_restore_onto_copies_snapshot_fields() {
        let original = Rule::from_input(input());
        let snapshot = RuleVersion::snapshot(&original, 1, "initial", "tester");

        let mut live = original.clone();
        live.pattern = "changed".to_string();
        live.priority = 5;
        live.is_active = false;
        snapshot.restore_onto(&mut live);

        assert_eq!(live.pattern, original.pattern);
        assert_eq!(live.priority, original.priority);
        assert!(live.is_active);
        assert_eq!(live.id, original.id);
    }
}
