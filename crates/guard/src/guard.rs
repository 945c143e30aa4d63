//! Input and output policy checks.

use crate::audit::{AuditDirection, AuditRecord, AuditSink};
use crate::fingerprint::fingerprint;
use crate::repeat::has_repeated_pattern;
use crate::sanitize::sanitize;
use bastion_core::config::{GuardPolicy, RepeatPolicy};
use bastion_core::{AppError, AppResult, GuardVerdict};
use chrono::Utc;
use regex::Regex;
use std::sync::Arc;

/// A compiled rule with the label reported when it matches.
#[derive(Debug)]
struct Rule {
    label: String,
    regex: Regex,
}

/// Compiled rule set for one direction.
#[derive(Debug, Default)]
struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    fn compile(terms: &[String], patterns: &[String]) -> AppResult<Self> {
        let mut rules = Vec::with_capacity(terms.len() + patterns.len());

        for term in terms.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
            let regex = Regex::new(&format!("(?i){}", regex::escape(term)))
                .map_err(|e| AppError::Config(format!("Invalid blocked term {:?}: {}", term, e)))?;
            rules.push(Rule {
                label: format!("blocked term '{}'", term),
                regex,
            });
        }

        for pattern in patterns {
            let regex = Regex::new(pattern).map_err(|e| {
                AppError::Config(format!("Invalid blocked pattern {:?}: {}", pattern, e))
            })?;
            rules.push(Rule {
                label: format!("blocked pattern /{}/", pattern),
                regex,
            });
        }

        Ok(Self { rules })
    }

    /// Label of the first matching rule.
    fn first_match(&self, text: &str) -> Option<&str> {
        self.rules
            .iter()
            .find(|rule| rule.regex.is_match(text))
            .map(|rule| rule.label.as_str())
    }
}

/// Policy enforcement for queries and answers.
///
/// Checks are pure functions of the text and the compiled policy; the only
/// side effect is the audit record handed to the sink.
#[derive(Debug)]
pub struct Guard {
    max_input_chars: usize,
    max_output_chars: usize,
    input_rules: RuleSet,
    output_rules: RuleSet,
    repeat: RepeatPolicy,
    input_refusal: String,
    output_refusal: String,
    sink: Arc<dyn AuditSink>,
}

impl Guard {
    /// Compile `policy`. Invalid expressions are configuration errors.
    pub fn new(policy: &GuardPolicy, sink: Arc<dyn AuditSink>) -> AppResult<Self> {
        let input_rules = RuleSet::compile(&policy.blocked_terms, &policy.blocked_patterns)?;
        let output_rules =
            RuleSet::compile(&policy.output_blocked_terms, &policy.output_blocked_patterns)?;

        tracing::debug!(
            "Guard compiled {} input rules and {} output rules",
            input_rules.rules.len(),
            output_rules.rules.len()
        );

        Ok(Self {
            max_input_chars: policy.max_input_chars,
            max_output_chars: policy.max_output_chars,
            input_rules,
            output_rules,
            repeat: policy.repeat,
            input_refusal: policy.input_refusal.clone(),
            output_refusal: policy.output_refusal.clone(),
            sink,
        })
    }

    /// Also refuse answers that echo any of `secrets` verbatim.
    ///
    /// Secrets are matched literally and never appear in verdict reasons.
    pub fn with_secrets<'a>(mut self, secrets: impl IntoIterator<Item = &'a str>) -> Self {
        for secret in secrets.into_iter().map(str::trim).filter(|s| !s.is_empty()) {
            if let Ok(regex) = Regex::new(&regex::escape(secret)) {
                self.output_rules.rules.push(Rule {
                    label: "configured credential".to_string(),
                    regex,
                });
            }
        }
        self
    }

    /// Maximum accepted query length, in characters.
    pub fn max_input_chars(&self) -> usize {
        self.max_input_chars
    }

    /// Fixed answer for refused queries.
    pub fn input_refusal(&self) -> &str {
        &self.input_refusal
    }

    /// Fixed answer replacing refused model output.
    pub fn output_refusal(&self) -> &str {
        &self.output_refusal
    }

    /// Validate and sanitize an inbound query.
    pub fn check_input(&self, raw_text: &str) -> GuardVerdict {
        let verdict = self.evaluate_input(raw_text);
        self.audit(AuditDirection::Input, raw_text, &verdict);
        verdict
    }

    /// Validate a generated answer before it reaches the caller.
    pub fn check_output(&self, answer_text: &str) -> GuardVerdict {
        let verdict = self.evaluate_output(answer_text);
        self.audit(AuditDirection::Output, answer_text, &verdict);
        verdict
    }

    fn evaluate_input(&self, raw_text: &str) -> GuardVerdict {
        if raw_text.trim().is_empty() {
            return GuardVerdict::deny("empty query");
        }

        let length = raw_text.chars().count();
        if length > self.max_input_chars {
            return GuardVerdict::deny(format!(
                "query too long ({} > {} characters)",
                length, self.max_input_chars
            ));
        }

        let sanitized = sanitize(raw_text);
        if sanitized.is_empty() {
            return GuardVerdict::deny("empty query");
        }

        if let Some(label) = self.input_rules.first_match(&sanitized) {
            return GuardVerdict::deny(format!("query matched {}", label));
        }

        if has_repeated_pattern(&sanitized, &self.repeat) {
            return GuardVerdict::deny("query contains a long repeated pattern");
        }

        GuardVerdict::allow(sanitized)
    }

    fn evaluate_output(&self, answer_text: &str) -> GuardVerdict {
        let trimmed = answer_text.trim();
        if trimmed.is_empty() {
            return GuardVerdict::deny("empty answer");
        }

        // Must run before the quadratic repeat scan
        if trimmed.chars().nth(self.max_output_chars).is_some() {
            return GuardVerdict::deny(format!(
                "answer too long (over {} characters)",
                self.max_output_chars
            ));
        }

        if let Some(label) = self.output_rules.first_match(trimmed) {
            return GuardVerdict::deny(format!("answer matched {}", label));
        }

        if has_repeated_pattern(trimmed, &self.repeat) {
            return GuardVerdict::deny("answer contains a long repeated pattern");
        }

        GuardVerdict::allow(trimmed)
    }

    fn audit(&self, direction: AuditDirection, text: &str, verdict: &GuardVerdict) {
        let basis = verdict.sanitized_text.as_deref().unwrap_or(text);

        if !verdict.allowed {
            tracing::warn!(
                "Guard refused {:?}: {}",
                direction,
                verdict.reason.as_deref().unwrap_or("unspecified")
            );
        }

        self.sink.record(AuditRecord {
            fingerprint: fingerprint(basis),
            direction,
            allowed: verdict.allowed,
            reason: verdict.reason.clone(),
            timestamp: Utc::now(),
        });
    }
}
