//! Default signal-to-category rule table.
//!
//! Ordering is the evaluation priority; the first matching rule wins. The
//! exact marker lists are tunable reconstructions of observed anti-bot
//! behavior, not a fixed contract.

use super::{BanKind, Rule, Signals};

const BLOCK_MARKERS: &[&str] = &[
    "blocked",
    "banned",
    "forbidden",
    "access denied",
    "unauthorized access",
    "ip block",
];

const CAPTCHA_MARKERS: &[&str] = &[
    "captcha",
    "recaptcha",
    "hcaptcha",
    "verify you are human",
    "robot check",
];

const JS_CHALLENGE_MARKERS: &[&str] = &[
    "checking your browser",
    "ddos protection",
    "cf-chl",
    "challenge-form",
    "just a moment",
];

const GEO_MARKERS: &[&str] = &[
    "not available in your country",
    "not available in your region",
    "geo block",
    "location restricted",
];

const BEHAVIORAL_MARKERS: &[&str] = &[
    "suspicious activity",
    "unusual traffic",
    "automated behavior",
    "bot detected",
    "non-human",
];

const ACCOUNT_MARKERS: &[&str] = &[
    "account locked",
    "account suspended",
    "account disabled",
    "too many login attempts",
];

const FINGERPRINT_MARKERS: &[&str] = &[
    "fingerprint",
    "device not recognized",
    "integrity check failed",
];

const HEADER_MARKERS: &[&str] = &[
    "unsupported browser",
    "update your browser",
    "browser not supported",
    "invalid user agent",
];

fn any_marker(signals: &Signals, markers: &[&str]) -> bool {
    markers.iter().any(|m| signals.body_contains(m))
}

/// Body looks like an empty shell or garbage rather than real content.
fn looks_hollow(signals: &Signals) -> bool {
    match signals.body_snippet.as_deref() {
        None => true,
        Some(body) => {
            let trimmed = body.trim();
            trimmed.is_empty() || (trimmed.len() < 64 && !trimmed.contains('<'))
        }
    }
}

pub fn default_rules() -> Vec<Rule> {
    vec![
        // Explicit rate-limit headers are the strongest signal available.
        Rule::new("ratelimit-exhausted", BanKind::RateLimited, |s| {
            (s.header("x-ratelimit-remaining") == Some("0")).then_some(0.99)
        }),
        Rule::new("retry-after", BanKind::RateLimited, |s| {
            s.header("retry-after").map(|_| 0.95)
        }),
        Rule::new("status-429", BanKind::RateLimited, |s| {
            (s.status == Some(429)).then_some(0.95)
        }),
        Rule::new("status-403-block-marker", BanKind::IpBlocked, |s| {
            (s.status == Some(403) && any_marker(s, BLOCK_MARKERS)).then_some(0.8)
        }),
        Rule::new("challenge-redirect-captcha", BanKind::CaptchaChallenge, |s| {
            (CAPTCHA_MARKERS.iter().any(|m| s.redirect_contains(m))
                || any_marker(s, CAPTCHA_MARKERS))
            .then_some(0.9)
        }),
        Rule::new("challenge-redirect-js", BanKind::JsChallenge, |s| {
            (s.redirect_contains("challenge")
                || s.header("cf-ray").is_some() && s.status == Some(503)
                || any_marker(s, JS_CHALLENGE_MARKERS))
            .then_some(0.85)
        }),
        Rule::new("status-451-or-geo-marker", BanKind::GeoBlocked, |s| {
            (s.status == Some(451)
                || s.redirect_contains("geo")
                || any_marker(s, GEO_MARKERS))
            .then_some(0.85)
        }),
        Rule::new("account-locked-marker", BanKind::AccountLocked, |s| {
            any_marker(s, ACCOUNT_MARKERS).then_some(0.85)
        }),
        Rule::new("behavioral-marker", BanKind::BehavioralBlock, |s| {
            any_marker(s, BEHAVIORAL_MARKERS).then_some(0.75)
        }),
        Rule::new("fingerprint-marker", BanKind::FingerprintBlocked, |s| {
            any_marker(s, FINGERPRINT_MARKERS).then_some(0.7)
        }),
        Rule::new("header-rejected-marker", BanKind::HeaderRejected, |s| {
            any_marker(s, HEADER_MARKERS).then_some(0.75)
        }),
        // Expected cookies/headers never arrived: the TLS stack itself was
        // profiled and rejected before the application layer.
        Rule::new("expected-header-missing", BanKind::TlsFingerprintBlock, |s| {
            (s.status == Some(200) && s.missing_expected_header()).then_some(0.65)
        }),
        Rule::new("bare-403", BanKind::IpBlocked, |s| {
            (s.status == Some(403)).then_some(0.6)
        }),
        // A 200 with an empty or garbage body is a honeypot response: the
        // origin pretends success while serving nothing.
        Rule::new("hollow-200", BanKind::HoneypotTriggered, |s| {
            (s.status == Some(200) && s.body_snippet.is_some() && looks_hollow(s)).then_some(0.7)
        }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::classify::BanClassifier;

    fn classify(signals: &Signals) -> (BanKind, f64) {
        let verdict = BanClassifier::new().classify(signals);
        (verdict.kind, verdict.confidence)
    }

    #[test]
    fn status_429_is_rate_limited() {
        assert_eq!(
            classify(&Signals::with_status(429)),
            (BanKind::RateLimited, 0.95)
        );
    }

    #[test]
    fn exhausted_ratelimit_header_beats_status() {
        let mut s = Signals::with_status(403);
        s.headers
            .insert("x-ratelimit-remaining".into(), "0".into());
        assert_eq!(classify(&s), (BanKind::RateLimited, 0.99));
    }

    #[test]
    fn forbidden_with_block_marker_is_ip_blocked() {
        let mut s = Signals::with_status(403);
        s.body_snippet = Some("<html>Access Denied: your IP has been banned</html>".into());
        assert_eq!(classify(&s).0, BanKind::IpBlocked);
    }

    #[test]
    fn bare_forbidden_is_low_confidence_ip_block() {
        let (kind, confidence) = classify(&Signals::with_status(403));
        assert_eq!(kind, BanKind::IpBlocked);
        assert!(confidence < 0.8);
    }

    #[test]
    fn captcha_redirect_wins_over_js_challenge() {
        let mut s = Signals::with_status(302);
        s.redirect_target = Some("https://example.com/recaptcha/verify".into());
        assert_eq!(classify(&s).0, BanKind::CaptchaChallenge);
    }

    #[test]
    fn cloudflare_challenge_is_js_challenge() {
        let mut s = Signals::with_status(503);
        s.headers.insert("cf-ray".into(), "8a1b2c3d4e5f".into());
        s.body_snippet = Some("Checking your browser before accessing".into());
        assert_eq!(classify(&s).0, BanKind::JsChallenge);
    }

    #[test]
    fn status_451_is_geo_blocked() {
        assert_eq!(classify(&Signals::with_status(451)).0, BanKind::GeoBlocked);
    }

    #[test]
    fn missing_expected_cookie_is_tls_fingerprint_block() {
        let mut s = Signals::with_status(200);
        s.body_snippet = Some("<html><body>plenty of perfectly normal content here</body></html>".into());
        s.expected_headers = vec!["set-cookie".into()];
        assert_eq!(classify(&s).0, BanKind::TlsFingerprintBlock);
    }

    #[test]
    fn hollow_200_is_honeypot() {
        let mut s = Signals::with_status(200);
        s.body_snippet = Some("   ".into());
        assert_eq!(classify(&s).0, BanKind::HoneypotTriggered);
    }

    #[test]
    fn behavioral_marker_detected_without_status() {
        let mut s = Signals::default();
        s.body_snippet = Some("We have detected unusual traffic from your network".into());
        assert_eq!(classify(&s).0, BanKind::BehavioralBlock);
    }

    #[test]
    fn account_lock_marker() {
        let mut s = Signals::with_status(200);
        s.body_snippet = Some("Your account locked due to suspicious login".into());
        assert_eq!(classify(&s).0, BanKind::AccountLocked);
    }

    #[test]
    fn header_rejection_marker() {
        let mut s = Signals::with_status(400);
        s.body_snippet = Some("invalid user agent supplied".into());
        assert_eq!(classify(&s).0, BanKind::HeaderRejected);
    }
}
