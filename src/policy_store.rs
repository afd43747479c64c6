//! Organization Policy Store: loads a rule set per policy type
//! and checks code artifacts against it. Grounded in the teacher's
//! `orchestrator/policy.rs` rule-extraction shape, retargeted from markdown
//! policy-document parsing to a flat, simpler rule file plus a fixed
//! security baseline — the distilled contract only names three policy
//! types (`style`, `security`, `custom`), not a document format.

use regex::Regex;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::errors::{OrchestratorError, Result};
use crate::models::{PolicyCategory, PolicyRule, PolicySeverity, PolicyViolation};

/// A policy document is a newline-separated list of rules in the shape:
/// `id | severity | description | violation_pattern`
/// (`violation_pattern` optional). This is the store's own on-disk format,
/// not a protocol the rest of the system depends on.
pub struct PolicyStore {
    file_paths: HashMap<PolicyCategory, PathBuf>,
}

impl PolicyStore {
    pub fn new() -> Self {
        Self {
            file_paths: HashMap::new(),
        }
    }

    pub fn with_file(mut self, category: PolicyCategory, path: PathBuf) -> Self {
        self.file_paths.insert(category, path);
        self
    }

    /// `read_org_policies`: returns the active rule set and whether it came
    /// from a configured file or the built-in default.
    pub fn rules_for(&self, category: PolicyCategory) -> Result<(Vec<PolicyRule>, &'static str)> {
        if let Some(path) = self.file_paths.get(&category) {
            let content = std::fs::read_to_string(path)
                .map_err(|e| OrchestratorError::Internal(format!("policy file unreadable: {e}")))?;
            let rules = parse_policy_file(&content, category, &path.to_string_lossy());
            return Ok((rules, "file"));
        }

        let rules = match category {
            PolicyCategory::Security => owasp_top_ten_baseline(),
            PolicyCategory::Style | PolicyCategory::Custom => Vec::new(),
        };
        Ok((rules, "default"))
    }

    /// Check a code artifact's content against every configured category's
    /// rule set, producing the violations fed into the quality score.
    pub fn check_all(&self, code: &str) -> Result<Vec<PolicyViolation>> {
        let mut violations = Vec::new();
        for category in [PolicyCategory::Style, PolicyCategory::Security, PolicyCategory::Custom] {
            let (rules, _source) = self.rules_for(category)?;
            violations.extend(check_rules(&rules, code));
        }
        Ok(violations)
    }
}

impl Default for PolicyStore {
    fn default() -> Self {
        Self::new()
    }
}

fn check_rules(rules: &[PolicyRule], code: &str) -> Vec<PolicyViolation> {
    let mut violations = Vec::new();
    for rule in rules {
        if let Some(pattern) = &rule.violation_pattern {
            if let Ok(re) = Regex::new(pattern) {
                if re.is_match(code) {
                    violations.push(PolicyViolation {
                        rule_id: rule.id.clone(),
                        description: rule.description.clone(),
                        severity: rule.severity,
                    });
                    continue;
                }
            }
        }
        if let Some(pattern) = &rule.enforcement_pattern {
            if let Ok(re) = Regex::new(pattern) {
                if !re.is_match(code) {
                    violations.push(PolicyViolation {
                        rule_id: rule.id.clone(),
                        description: rule.description.clone(),
                        severity: rule.severity,
                    });
                }
            }
        }
    }
    violations
}

fn parse_policy_file(content: &str, category: PolicyCategory, source_file: &str) -> Vec<PolicyRule> {
    let mut rules = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split('|').map(str::trim).collect();
        if fields.len() < 3 {
            continue;
        }
        let severity = match fields[1].to_lowercase().as_str() {
            "critical" => PolicySeverity::Critical,
            "info" => PolicySeverity::Info,
            _ => PolicySeverity::Warning,
        };
        rules.push(PolicyRule {
            id: fields[0].to_string(),
            description: fields[2].to_string(),
            severity,
            category,
            pattern: None,
            enforcement_pattern: None,
            violation_pattern: fields.get(3).map(|s| s.to_string()),
            source_file: format!("{source_file}:{}", idx + 1),
        });
    }
    rules
}

/// Fixed OWASP Top-10-inspired baseline used when no security policy file is
/// configured — the security category defaults to a fixed OWASP Top-10 baseline.
fn owasp_top_ten_baseline() -> Vec<PolicyRule> {
    let entries: &[(&str, &str, &str)] = &[
        ("OWASP-A01", "Broken access control: avoid unchecked authorization bypass", r"(?i)skip[_\- ]?auth"),
        ("OWASP-A02", "Cryptographic failure: avoid hard-coded secrets", r#"(?i)(password|secret|api[_-]?key)\s*=\s*["'][^"']+["']"#),
        ("OWASP-A03", "Injection: avoid string-built SQL queries", r#"(?i)format!\(\s*"[^"]*select[^"]*\{"#),
        ("OWASP-A04", "Insecure design: avoid disabling TLS verification", r"(?i)danger_accept_invalid_certs|verify\s*=\s*false"),
        ("OWASP-A05", "Security misconfiguration: avoid debug mode left on", r"(?i)debug\s*=\s*true"),
        ("OWASP-A06", "Vulnerable components: avoid unpinned dependency wildcards", r#"version\s*=\s*"\*""#),
        ("OWASP-A07", "Identification/authentication failure: avoid plaintext password comparison", r"(?i)password\s*==\s*"),
        ("OWASP-A08", "Software/data integrity failure: avoid unchecked deserialization of untrusted input", r"(?i)unsafe\s*\{[^}]*transmute"),
        ("OWASP-A09", "Security logging failure: avoid swallowed errors", r"(?i)\.unwrap_or\(\(\)\)"),
        ("OWASP-A10", "Server-side request forgery: avoid unvalidated outbound URLs built from user input", r"(?i)reqwest::get\(\s*&?format!"),
    ];

    entries
        .iter()
        .map(|(id, description, violation_pattern)| PolicyRule {
            id: id.to_string(),
            description: description.to_string(),
            severity: PolicySeverity::Critical,
            category: PolicyCategory::Security,
            pattern: None,
            enforcement_pattern: None,
            violation_pattern: Some(violation_pattern.to_string()),
            source_file: "default".to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_security_rules_are_the_owasp_baseline() {
        let store = PolicyStore::new();
        let (rules, source) = store.rules_for(PolicyCategory::Security).unwrap();
        assert_eq!(source, "default");
        assert_eq!(rules.len(), 10);
    }

    #[test]
    fn default_style_rules_are_empty() {
        let store = PolicyStore::new();
        let (rules, source) = store.rules_for(PolicyCategory::Style).unwrap();
        assert_eq!(source, "default");
        assert!(rules.is_empty());
    }

    #[test]
    fn hard_coded_secret_triggers_a_violation() {
        let store = PolicyStore::new();
        let violations = store
            .check_all(r#"let api_key = "sk-deadbeef12345";"#)
            .unwrap();
        assert!(violations.iter().any(|v| v.rule_id == "OWASP-A02"));
    }

    #[test]
    fn clean_code_triggers_no_violations() {
        let store = PolicyStore::new();
        let violations = store.check_all("fn add(a: i32, b: i32) -> i32 { a + b }").unwrap();
        assert!(violations.is_empty());
    }
}
