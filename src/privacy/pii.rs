//! PII detection, redaction and restoration
//!
//! Detection is regex based. Each category carries a base confidence; card
//! numbers are additionally Luhn-checked and only a valid checksum earns a
//! redaction-grade confidence. Overlapping matches are resolved to a single
//! finding so spans never intersect.
//!
//! Redaction is a single left-to-right pass over original-text offsets, so
//! substituting one finding can never shift another. The resulting
//! `RedactionMap` records where every placeholder landed in the redacted
//! text, which makes `restore` an exact inverse.

use crate::error::{AppError, AppResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Category of personal data
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PiiCategory {
    Email,
    Phone,
    Financial,
    Identifier,
    Address,
    IpAddress,
}

impl PiiCategory {
    pub const ALL: [PiiCategory; 6] = [
        PiiCategory::Email,
        PiiCategory::Phone,
        PiiCategory::Financial,
        PiiCategory::Identifier,
        PiiCategory::Address,
        PiiCategory::IpAddress,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Phone => "phone",
            Self::Financial => "financial",
            Self::Identifier => "identifier",
            Self::Address => "address",
            Self::IpAddress => "ip_address",
        }
    }

    /// Text substituted for a redacted value of this category
    pub fn placeholder(self) -> &'static str {
        match self {
            Self::Email => "[EMAIL_REDACTED]",
            Self::Phone => "[PHONE_REDACTED]",
            Self::Financial => "[FINANCIAL_REDACTED]",
            Self::Identifier => "[IDENTIFIER_REDACTED]",
            Self::Address => "[ADDRESS_REDACTED]",
            Self::IpAddress => "[IP_ADDRESS_REDACTED]",
        }
    }
}

impl fmt::Display for PiiCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One detected span of personal data
///
/// Offsets are byte offsets into the scanned text. The original value is
/// never serialized.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PiiFinding {
    pub category: PiiCategory,
    pub start: usize,
    pub end: usize,
    pub confidence: f64,
    #[serde(skip)]
    pub original_value: String,
    pub placeholder: &'static str,
}

/// One substitution as it appears in the redacted text
#[derive(Debug, Clone, PartialEq)]
pub struct RedactedSpan {
    pub category: PiiCategory,
    /// Byte range of the placeholder within the redacted text
    pub start: usize,
    pub end: usize,
    pub placeholder: &'static str,
    pub original_value: String,
}

/// Ordered substitutions applied to one payload
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RedactionMap {
    spans: Vec<RedactedSpan>,
}

impl RedactionMap {
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn spans(&self) -> &[RedactedSpan] {
        &self.spans
    }
}

/// Redacted text plus the map needed to undo it
#[derive(Debug, Clone, PartialEq)]
pub struct Redaction {
    pub text: String,
    pub map: RedactionMap,
}

struct PiiPattern {
    category: PiiCategory,
    regex: Regex,
    confidence: f64,
}

/// Confidence for a card-shaped number failing the Luhn check
const UNVERIFIED_CARD_CONFIDENCE: f64 = 0.3;

/// Regex-based PII detector and redactor
pub struct PiiDetector {
    patterns: Vec<PiiPattern>,
    confidence_threshold: f64,
}

impl PiiDetector {
    /// Compile the pattern catalog
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a pattern fails to compile or the
    /// threshold is outside 0.0..=1.0.
    pub fn new(confidence_threshold: f64) -> AppResult<Self> {
        if !(0.0..=1.0).contains(&confidence_threshold) {
            return Err(AppError::Config(format!(
                "PII confidence threshold must be between 0.0 and 1.0, got {}",
                confidence_threshold
            )));
        }

        let specs: [(PiiCategory, &str, f64); 7] = [
            (
                PiiCategory::Email,
                r"(?i)\b[a-z0-9._%+-]+@[a-z0-9-]+(?:\.[a-z0-9-]+)*\.[a-z]{2,}\b",
                0.95,
            ),
            (PiiCategory::Identifier, r"\b\d{3}-\d{2}-\d{4}\b", 0.9),
            (PiiCategory::Financial, r"\b\d(?:[ -]?\d){12,18}\b", 0.95),
            (
                PiiCategory::Financial,
                r"\b[A-Z]{2}\d{2}(?: ?[A-Z0-9]{4}){2,7}(?: ?[A-Z0-9]{1,4})?\b",
                0.85,
            ),
            (
                PiiCategory::Phone,
                r"(?:\+\d{1,3}[ .-]?)?(?:\(\d{3}\)|\b\d{3})[ .-]?\d{3}[ .-]?\d{4}\b",
                0.75,
            ),
            (
                PiiCategory::IpAddress,
                r"\b(?:(?:25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)\.){3}(?:25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)\b",
                0.8,
            ),
            (
                PiiCategory::Address,
                r"(?i)\b\d{1,5}(?: [a-z]+){1,4} (?:street|st|avenue|ave|road|rd|boulevard|blvd|lane|ln|drive|dr|court|ct)\b",
                0.6,
            ),
        ];

        let patterns = specs
            .into_iter()
            .map(|(category, pattern, confidence)| {
                Regex::new(pattern)
                    .map(|regex| PiiPattern {
                        category,
                        regex,
                        confidence,
                    })
                    .map_err(|e| {
                        AppError::Config(format!("Invalid {} PII pattern: {}", category, e))
                    })
            })
            .collect::<AppResult<Vec<_>>>()?;

        Ok(Self {
            patterns,
            confidence_threshold,
        })
    }

    pub fn confidence_threshold(&self) -> f64 {
        self.confidence_threshold
    }

    /// Whether a finding is confident enough to be substituted
    pub fn is_redactable(&self, finding: &PiiFinding) -> bool {
        finding.confidence >= self.confidence_threshold
    }

    /// Find all PII spans, ordered by start offset, never overlapping
    ///
    /// Findings below the confidence threshold are included.
    pub fn detect(&self, text: &str) -> Vec<PiiFinding> {
        let mut candidates = Vec::new();
        for pattern in &self.patterns {
            for m in pattern.regex.find_iter(text) {
                let confidence = match pattern.category {
                    PiiCategory::Financial if m.as_str().chars().all(is_card_char) => {
                        if luhn_valid(m.as_str()) {
                            pattern.confidence
                        } else {
                            UNVERIFIED_CARD_CONFIDENCE
                        }
                    }
                    _ => pattern.confidence,
                };
                candidates.push(PiiFinding {
                    category: pattern.category,
                    start: m.start(),
                    end: m.end(),
                    confidence,
                    original_value: m.as_str().to_string(),
                    placeholder: pattern.category.placeholder(),
                });
            }
        }
        resolve_overlaps(text, candidates)
    }

    /// Substitute every redactable finding in one pass over original offsets
    pub fn redact(&self, text: &str, findings: &[PiiFinding]) -> Redaction {
        let mut ordered: Vec<&PiiFinding> = findings
            .iter()
            .filter(|f| self.is_redactable(f))
            .filter(|f| f.start < f.end && text.get(f.start..f.end).is_some())
            .collect();
        ordered.sort_by_key(|f| f.start);

        let mut out = String::with_capacity(text.len());
        let mut spans = Vec::with_capacity(ordered.len());
        let mut cursor = 0;
        for finding in ordered {
            // Skip anything overlapping an already substituted span
            if finding.start < cursor {
                continue;
            }
            out.push_str(&text[cursor..finding.start]);
            let start = out.len();
            out.push_str(finding.placeholder);
            spans.push(RedactedSpan {
                category: finding.category,
                start,
                end: out.len(),
                placeholder: finding.placeholder,
                original_value: text[finding.start..finding.end].to_string(),
            });
            cursor = finding.end;
        }
        out.push_str(&text[cursor..]);

        Redaction {
            text: out,
            map: RedactionMap { spans },
        }
    }

    /// Detect then redact
    pub fn scan(&self, text: &str) -> (Vec<PiiFinding>, Redaction) {
        let findings = self.detect(text);
        let redaction = self.redact(text, &findings);
        (findings, redaction)
    }

    /// Redact every string inside a JSON value, returning the findings
    ///
    /// Context redaction is one-way: no map is kept.
    pub fn redact_value(&self, value: &serde_json::Value) -> (serde_json::Value, Vec<PiiFinding>) {
        let mut findings = Vec::new();
        let redacted = self.redact_value_into(value, &mut findings);
        (redacted, findings)
    }

    fn redact_value_into(
        &self,
        value: &serde_json::Value,
        findings: &mut Vec<PiiFinding>,
    ) -> serde_json::Value {
        use serde_json::Value;
        match value {
            Value::String(s) => {
                let (found, redaction) = self.scan(s);
                findings.extend(found);
                Value::String(redaction.text)
            }
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.redact_value_into(item, findings))
                    .collect(),
            ),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.redact_value_into(v, findings)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

/// Undo a redaction
///
/// When every placeholder still sits at its recorded offset the text is
/// rebuilt positionally, which is exact even if the original contained
/// placeholder-like literals. Otherwise (e.g. a backend answer quoting the
/// placeholders) each placeholder is replaced in order of first occurrence.
pub fn restore(text: &str, map: &RedactionMap) -> String {
    let positional = map
        .spans
        .iter()
        .all(|span| text.get(span.start..span.end) == Some(span.placeholder));

    if positional {
        let mut out = String::with_capacity(text.len());
        let mut cursor = 0;
        for span in &map.spans {
            out.push_str(&text[cursor..span.start]);
            out.push_str(&span.original_value);
            cursor = span.end;
        }
        out.push_str(&text[cursor..]);
        return out;
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    for span in &map.spans {
        if let Some(pos) = rest.find(span.placeholder) {
            out.push_str(&rest[..pos]);
            out.push_str(&span.original_value);
            rest = &rest[pos + span.placeholder.len()..];
        }
    }
    out.push_str(rest);
    out
}

/// Count findings per category
pub fn category_counts(findings: &[PiiFinding]) -> BTreeMap<PiiCategory, usize> {
    let mut counts = BTreeMap::new();
    for finding in findings {
        *counts.entry(finding.category).or_insert(0) += 1;
    }
    counts
}

fn is_card_char(c: char) -> bool {
    c.is_ascii_digit() || c == ' ' || c == '-'
}

fn luhn_valid(number: &str) -> bool {
    let digits: Vec<u32> = number.chars().filter_map(|c| c.to_digit(10)).collect();
    if !(13..=19).contains(&digits.len()) {
        return false;
    }
    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 { doubled - 9 } else { doubled }
            } else {
                d
            }
        })
        .sum();
    sum % 10 == 0
}

/// Merge overlapping candidates into one finding per cluster
///
/// A cluster is every candidate transitively overlapping another. The merged
/// finding takes category and confidence from the best member (highest
/// confidence, then longest) and spans the union, so no matched byte is left
/// outside a redaction.
fn resolve_overlaps(text: &str, mut candidates: Vec<PiiFinding>) -> Vec<PiiFinding> {
    candidates.sort_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));

    let mut kept: Vec<PiiFinding> = Vec::with_capacity(candidates.len());
    let mut cluster: Option<(PiiFinding, usize, usize)> = None;
    for candidate in candidates {
        cluster = match cluster {
            Some((best, start, end)) if candidate.start < end => {
                let end = end.max(candidate.end);
                let better = candidate.confidence > best.confidence
                    || (candidate.confidence == best.confidence
                        && candidate.end - candidate.start > best.end - best.start);
                Some((if better { candidate } else { best }, start, end))
            }
            Some(done) => {
                kept.push(merge(text, done));
                let (start, end) = (candidate.start, candidate.end);
                Some((candidate, start, end))
            }
            None => {
                let (start, end) = (candidate.start, candidate.end);
                Some((candidate, start, end))
            }
        };
    }
    if let Some(done) = cluster {
        kept.push(merge(text, done));
    }
    kept
}

fn merge(text: &str, (best, start, end): (PiiFinding, usize, usize)) -> PiiFinding {
    if best.start == start && best.end == end {
        return best;
    }
    PiiFinding {
        start,
        end,
        original_value: text[start..end].to_string(),
        ..best
    }
}
