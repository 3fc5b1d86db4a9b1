//! Builtin detection rule catalog.
//!
//! Rule shapes for the vendor-token entries follow the ripsecrets-derived
//! catalog; identity-document rules pair a deliberately narrow regex with
//! a structural validator so the regex alone never decides a verdict.

use super::validator::Validator;
use super::{Pattern, PatternCategory, Severity};
use anyhow::{Context, Result};
use regex::Regex;

struct RuleSpec {
    name: &'static str,
    category: PatternCategory,
    severity: Severity,
    regex: &'static str,
    validator: Validator,
    description: &'static str,
}

const BUILTIN_RULES: &[RuleSpec] = &[
    RuleSpec {
        name: "ssn",
        category: PatternCategory::Pii,
        severity: Severity::Critical,
        regex: r"\b\d{3}-\d{2}-\d{4}\b",
        validator: Validator::SsnArea,
        description: "US Social Security Number",
    },
    RuleSpec {
        name: "credit_card",
        category: PatternCategory::Financial,
        severity: Severity::Critical,
        regex: r"\b(?:\d{4}[ -]?){3}\d{4}\b",
        validator: Validator::Luhn,
        description: "Payment card number (Luhn-validated)",
    },
    RuleSpec {
        name: "email",
        category: PatternCategory::Pii,
        severity: Severity::Medium,
        regex: r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b",
        validator: Validator::None,
        description: "Email address",
    },
    RuleSpec {
        name: "phone",
        category: PatternCategory::Pii,
        severity: Severity::Low,
        regex: r"\b(?:\+?1[ .-])?\(?\d{3}\)?[ .-]\d{3}[ .-]\d{4}\b",
        validator: Validator::None,
        description: "North American phone number",
    },
    RuleSpec {
        name: "iban",
        category: PatternCategory::Financial,
        severity: Severity::High,
        regex: r"\b[A-Z]{2}\d{2}[A-Z0-9]{11,30}\b",
        validator: Validator::None,
        description: "International Bank Account Number",
    },
    RuleSpec {
        name: "swift_bic",
        category: PatternCategory::Financial,
        severity: Severity::Medium,
        regex: r"(?i)\b(?:swift|bic)\s*:?\s*[A-Z]{6}[A-Z0-9]{2}(?:[A-Z0-9]{3})?\b",
        validator: Validator::None,
        description: "SWIFT/BIC bank identifier (context-gated)",
    },
    RuleSpec {
        name: "aws_access_key",
        category: PatternCategory::Corporate,
        severity: Severity::Critical,
        regex: r"\b(?:AKIA|ASIA)[0-9A-Z]{16}\b",
        validator: Validator::None,
        description: "AWS access key ID",
    },
    RuleSpec {
        name: "aws_secret_key",
        category: PatternCategory::Corporate,
        severity: Severity::Critical,
        regex: r#"(?i)aws.{0,20}?(?:secret|sk).{0,20}?['"][0-9A-Za-z/+]{40}['"]"#,
        validator: Validator::None,
        description: "AWS secret access key",
    },
    RuleSpec {
        name: "github_token",
        category: PatternCategory::Corporate,
        severity: Severity::Critical,
        regex: r"\b(?:gh[oprsu]|github_pat)_[0-9A-Za-z_]{36,}\b",
        validator: Validator::None,
        description: "GitHub personal access token",
    },
    RuleSpec {
        name: "gcp_api_key",
        category: PatternCategory::Corporate,
        severity: Severity::High,
        regex: r"\bAIzaSy[0-9A-Za-z_-]{33}\b",
        validator: Validator::None,
        description: "Google Cloud Platform API key",
    },
    RuleSpec {
        name: "slack_token",
        category: PatternCategory::Corporate,
        severity: Severity::High,
        regex: r"\bxox[aboprs]-(?:\d+-)+[0-9a-z]+\b",
        validator: Validator::None,
        description: "Slack API token",
    },
    RuleSpec {
        name: "jwt",
        category: PatternCategory::Corporate,
        severity: Severity::Medium,
        regex: r"\beyJ[0-9A-Za-z_-]+\.[0-9A-Za-z_=-]+\.[0-9A-Za-z_=-]+\b",
        validator: Validator::JwtShape,
        description: "JSON Web Token",
    },
    RuleSpec {
        name: "private_key",
        category: PatternCategory::Corporate,
        severity: Severity::Critical,
        regex: r"-----BEGIN (?:RSA |EC |DSA |OPENSSH |PGP )?PRIVATE KEY(?: BLOCK)?-----",
        validator: Validator::None,
        description: "PEM private key header",
    },
    RuleSpec {
        name: "medical_record_number",
        category: PatternCategory::Medical,
        severity: Severity::High,
        regex: r"(?i)\b(?:mrn|medical record(?: number)?)\s*[:#]?\s*\d{6,10}\b",
        validator: Validator::None,
        description: "Medical record number (context-gated)",
    },
];

/// Compile the builtin catalog. Regexes are static, so a compile failure
/// here is a programming error surfaced at engine construction.
pub fn builtin_patterns() -> Result<Vec<Pattern>> {
    BUILTIN_RULES
        .iter()
        .map(|spec| {
            let regex = Regex::new(spec.regex)
                .with_context(|| format!("builtin pattern '{}' failed to compile", spec.name))?;
            Ok(Pattern {
                name: spec.name.to_string(),
                category: spec.category,
                severity: spec.severity,
                regex,
                validator: spec.validator,
                description: spec.description.to_string(),
            })
        })
        .collect()
}
