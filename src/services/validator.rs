//! Validator: per-tool argument schemas, path sanitization, and an
//! injection-pattern sniffer.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub enum FieldType {
    String,
    Integer,
    Float,
    Bool,
    Object,
    Array,
}

#[derive(Debug, Clone, Default)]
pub struct FieldSchema {
    pub field_type: Option<FieldType>,
    pub required: bool,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub pattern: Option<String>,
    pub enum_values: Option<Vec<String>>,
}

impl FieldSchema {
    pub fn required() -> Self {
        Self { required: true, ..Default::default() }
    }

    pub fn optional() -> Self {
        Self::default()
    }

    pub fn with_bounds(mut self, min_length: usize, max_length: usize) -> Self {
        self.min_length = Some(min_length);
        self.max_length = Some(max_length);
        self
    }

    pub fn with_enum(mut self, values: &[&str]) -> Self {
        self.enum_values = Some(values.iter().map(|s| s.to_string()).collect());
        self
    }
}

pub type ToolSchema = HashMap<&'static str, FieldSchema>;

pub struct ValidationOutcome {
    pub valid: bool,
    pub errors: Vec<String>,
    pub sanitized: Value,
}

static PATH_TRAVERSAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.\.|~/|\$\(|`|\$\{").unwrap());
static SYSTEM_ROOTS: &[&str] = &["/etc", "/proc", "/sys", "/dev", "C:\\Windows"];
static SQL_INJECTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(;\s*drop\s+table|union\s+select|'\s*or\s+'1'\s*=\s*'1)").unwrap());
static XSS_INJECTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<script[\s>]|javascript:|on\w+\s*=\s*\"").unwrap());

pub struct Validator;

impl Validator {
    /// Validate and sanitize `arguments` against `schema`. All strings are
    /// trimmed in the sanitized output.
    pub fn validate(schema: &ToolSchema, arguments: &Value) -> ValidationOutcome {
        let mut errors = Vec::new();
        let mut sanitized = serde_json::Map::new();

        let Some(obj) = arguments.as_object() else {
            return ValidationOutcome {
                valid: false,
                errors: vec!["arguments must be an object".to_string()],
                sanitized: Value::Null,
            };
        };

        for (field, field_schema) in schema {
            let value = obj.get(*field);

            if value.is_none() || value == Some(&Value::Null) {
                if field_schema.required {
                    errors.push(format!("missing required field '{field}'"));
                }
                continue;
            }
            let value = value.unwrap();

            if let Some(s) = value.as_str() {
                let trimmed = s.trim();

                if let Some(min) = field_schema.min_length {
                    if trimmed.chars().count() < min {
                        errors.push(format!("'{field}' shorter than {min} characters"));
                    }
                }
                if let Some(max) = field_schema.max_length {
                    if trimmed.chars().count() > max {
                        errors.push(format!("'{field}' longer than {max} characters"));
                    }
                }
                if let Some(values) = &field_schema.enum_values {
                    if !values.iter().any(|v| v == trimmed) {
                        errors.push(format!("'{field}' must be one of {values:?}"));
                    }
                }
                if let Some(pattern) = &field_schema.pattern {
                    if let Ok(re) = Regex::new(pattern) {
                        if !re.is_match(trimmed) {
                            errors.push(format!("'{field}' does not match required pattern"));
                        }
                    }
                }
                if let Some(reason) = sniff_dangerous(trimmed) {
                    errors.push(format!("'{field}' rejected: {reason}"));
                }

                sanitized.insert(field.to_string(), Value::String(trimmed.to_string()));
            } else {
                sanitized.insert(field.to_string(), value.clone());
            }
        }

        ValidationOutcome {
            valid: errors.is_empty(),
            errors,
            sanitized: Value::Object(sanitized),
        }
    }

    /// Path-sanitization guard: rejects traversal, home-relative, and
    /// variable/command-substitution patterns, plus a fixed system-root
    /// deny-list.
    pub fn sanitize_path(path: &str) -> Result<(), String> {
        if PATH_TRAVERSAL.is_match(path) {
            return Err("path contains traversal or substitution sequences".to_string());
        }
        if SYSTEM_ROOTS.iter().any(|root| path.starts_with(root)) {
            return Err("path targets a system root".to_string());
        }
        Ok(())
    }
}

/// SQL/XSS injection heuristic sniffer. Returns `Some(reason)` on a match.
fn sniff_dangerous(value: &str) -> Option<&'static str> {
    if SQL_INJECTION.is_match(value) {
        return Some("sql injection heuristic matched");
    }
    if XSS_INJECTION.is_match(value) {
        return Some("xss injection heuristic matched");
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> ToolSchema {
        let mut s = ToolSchema::new();
        s.insert("description", FieldSchema::required().with_bounds(10, 10_000));
        s.insert("language", FieldSchema::required());
        s
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let outcome = Validator::validate(&schema(), &json!({ "language": "rust" }));
        assert!(!outcome.valid);
    }

    #[test]
    fn strings_are_trimmed() {
        let outcome = Validator::validate(
            &schema(),
            &json!({ "description": "  implement a parser  ", "language": "rust" }),
        );
        assert!(outcome.valid);
        assert_eq!(outcome.sanitized["description"], "implement a parser");
    }

    #[test]
    fn sql_injection_heuristic_is_rejected() {
        let outcome = Validator::validate(
            &schema(),
            &json!({ "description": "x'; DROP TABLE users; --", "language": "rust" }),
        );
        assert!(!outcome.valid);
    }

    #[test]
    fn path_traversal_is_rejected() {
        assert!(Validator::sanitize_path("../../etc/passwd").is_err());
        assert!(Validator::sanitize_path("~/secrets").is_err());
        assert!(Validator::sanitize_path("/etc/shadow").is_err());
    }

    #[test]
    fn ordinary_relative_path_is_accepted() {
        assert!(Validator::sanitize_path("src/lib.rs").is_ok());
    }
}
