//! Ban classification.
//!
//! Maps the observable signal set of a failed request to exactly one category
//! from a closed taxonomy. Classification is a pure function of the signals:
//! same input, same verdict, no hidden state.

mod rules;

pub use rules::default_rules;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::pool::EndpointId;

/// Closed taxonomy of ban categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BanKind {
    RateLimited,
    IpBlocked,
    CaptchaChallenge,
    JsChallenge,
    AccountLocked,
    GeoBlocked,
    HoneypotTriggered,
    FingerprintBlocked,
    BehavioralBlock,
    TlsFingerprintBlock,
    HeaderRejected,
    Unknown,
}

impl BanKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BanKind::RateLimited => "rate_limited",
            BanKind::IpBlocked => "ip_blocked",
            BanKind::CaptchaChallenge => "captcha_challenge",
            BanKind::JsChallenge => "js_challenge",
            BanKind::AccountLocked => "account_locked",
            BanKind::GeoBlocked => "geo_blocked",
            BanKind::HoneypotTriggered => "honeypot_triggered",
            BanKind::FingerprintBlocked => "fingerprint_blocked",
            BanKind::BehavioralBlock => "behavioral_block",
            BanKind::TlsFingerprintBlock => "tls_fingerprint_block",
            BanKind::HeaderRejected => "header_rejected",
            BanKind::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for BanKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observable signal set of one response, as supplied by the request
/// executor. Header names are expected lowercase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signals {
    #[serde(default)]
    pub status: Option<u16>,
    /// Where the response redirected to, if anywhere.
    #[serde(default)]
    pub redirect_target: Option<String>,
    /// Leading portion of the response body, lowercased by the caller or not;
    /// matching is case-insensitive either way.
    #[serde(default)]
    pub body_snippet: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Headers the caller expected the origin to set (e.g. session cookies);
    /// their absence is itself a signal.
    #[serde(default)]
    pub expected_headers: Vec<String>,
}

impl Signals {
    pub fn with_status(status: u16) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    pub fn body_contains(&self, needle: &str) -> bool {
        self.body_snippet
            .as_deref()
            .map(|b| b.to_ascii_lowercase().contains(needle))
            .unwrap_or(false)
    }

    pub fn redirect_contains(&self, needle: &str) -> bool {
        self.redirect_target
            .as_deref()
            .map(|r| r.to_ascii_lowercase().contains(needle))
            .unwrap_or(false)
    }

    /// True when any expected header is missing from the observed set.
    pub fn missing_expected_header(&self) -> bool {
        self.expected_headers
            .iter()
            .any(|name| !self.headers.contains_key(name))
    }
}

/// Classification result: one category plus a confidence in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verdict {
    pub kind: BanKind,
    pub confidence: f64,
}

impl Verdict {
    pub fn new(kind: BanKind, confidence: f64) -> Self {
        Self {
            kind,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// The no-match fallback: not an error, but carries no signal either.
    pub fn ambiguous() -> Self {
        Self {
            kind: BanKind::Unknown,
            confidence: 0.0,
        }
    }
}

/// Immutable record of one classified failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BanEvent {
    pub id: Uuid,
    pub at_ms: i64,
    pub endpoint: EndpointId,
    pub domain: String,
    pub signals: Signals,
    pub kind: BanKind,
    pub confidence: f64,
}

/// One signal-to-category rule: a predicate over the signal set yielding a
/// confidence when it matches.
pub struct Rule {
    pub name: &'static str,
    pub kind: BanKind,
    matcher: Box<dyn Fn(&Signals) -> Option<f64> + Send + Sync>,
}

impl Rule {
    pub fn new(
        name: &'static str,
        kind: BanKind,
        matcher: impl Fn(&Signals) -> Option<f64> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            kind,
            matcher: Box::new(matcher),
        }
    }

    fn evaluate(&self, signals: &Signals) -> Option<Verdict> {
        (self.matcher)(signals).map(|confidence| Verdict::new(self.kind, confidence))
    }
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Ordered rule table. Custom rules run ahead of the defaults so new anti-bot
/// systems can be supported without editing existing rules; within each list
/// the first match wins.
pub struct BanClassifier {
    custom: Vec<Rule>,
    defaults: Vec<Rule>,
}

impl BanClassifier {
    pub fn new() -> Self {
        Self {
            custom: Vec::new(),
            defaults: default_rules(),
        }
    }

    /// Register a rule evaluated before the default table.
    pub fn register_rule(&mut self, rule: Rule) {
        tracing::debug!(
            target = "classify",
            rule = rule.name,
            kind = %rule.kind,
            "custom classification rule registered"
        );
        self.custom.push(rule);
    }

    pub fn rule_count(&self) -> usize {
        self.custom.len() + self.defaults.len()
    }

    pub fn classify(&self, signals: &Signals) -> Verdict {
        for rule in self.custom.iter().chain(self.defaults.iter()) {
            if let Some(verdict) = rule.evaluate(signals) {
                return verdict;
            }
        }
        Verdict::ambiguous()
    }
}

impl Default for BanClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unmatched_signals_fall_back_to_unknown() {
        let classifier = BanClassifier::new();
        let verdict = classifier.classify(&Signals::with_status(200));
        // 200 with no body is not enough to call anything.
        assert_eq!(verdict.kind, BanKind::Unknown);
        assert_eq!(verdict.confidence, 0.0);
    }

    #[test]
    fn custom_rules_run_before_defaults() {
        let mut classifier = BanClassifier::new();
        classifier.register_rule(Rule::new("always-behavioral", BanKind::BehavioralBlock, |_| {
            Some(0.99)
        }));
        let verdict = classifier.classify(&Signals::with_status(429));
        assert_eq!(verdict.kind, BanKind::BehavioralBlock);
    }

    #[test]
    fn classification_is_deterministic() {
        let classifier = BanClassifier::new();
        let mut signals = Signals::with_status(403);
        signals.body_snippet = Some("Your IP has been blocked".into());
        let first = classifier.classify(&signals);
        for _ in 0..50 {
            assert_eq!(classifier.classify(&signals), first);
        }
    }

    #[test]
    fn verdict_confidence_is_clamped() {
        let v = Verdict::new(BanKind::RateLimited, 1.7);
        assert_eq!(v.confidence, 1.0);
    }
}
