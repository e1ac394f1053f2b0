//! Error-cause classifier (spec §4.1).
//!
//! Recognises explicit cancellation first, then falls back to a
//! multi-pattern substring search over the lowercased error text using an
//! Aho-Corasick automaton built once from a fixed `(substring, cause)`
//! table.

use aho_corasick::AhoCorasick;
use chatcore_domain::PingCause;
use std::sync::OnceLock;

/// Disposition of a probe attempt before classification. `Other` carries
/// the rendered error text that the substring table runs against.
#[derive(Debug, Clone)]
pub enum ProbeOutcome {
    DeadlineExceeded,
    Canceled,
    Failed(String),
}

const PATTERN_TABLE: &[(&str, PingCause)] = &[
    // network
    ("connection refused", PingCause::Network),
    ("no route to host", PingCause::Network),
    ("connection reset", PingCause::Network),
    ("broken pipe", PingCause::Network),
    ("dns", PingCause::Network),
    ("network is unreachable", PingCause::Network),
    // tls
    ("x509", PingCause::Tls),
    ("handshake", PingCause::Tls),
    ("certificate", PingCause::Tls),
    ("tls", PingCause::Tls),
    // auth
    ("unauthorized", PingCause::AuthFailed),
    ("authentication failed", PingCause::AuthFailed),
    ("permission denied", PingCause::AuthFailed),
    ("access denied", PingCause::AuthFailed),
    // overload
    ("too many connections", PingCause::Overloaded),
    ("resource exhausted", PingCause::Overloaded),
    ("throttl", PingCause::Overloaded),
    ("rate limit", PingCause::Overloaded),
    // bad response
    ("syntax error", PingCause::BadResponse),
    ("unexpected response", PingCause::BadResponse),
    ("malformed", PingCause::BadResponse),
    ("protocol error", PingCause::BadResponse),
    // internal
    ("panic", PingCause::Internal),
    ("internal error", PingCause::Internal),
    ("out of memory", PingCause::Internal),
];

fn automaton() -> &'static AhoCorasick {
    static AUTOMATON: OnceLock<AhoCorasick> = OnceLock::new();
    AUTOMATON.get_or_init(|| {
        AhoCorasick::new(PATTERN_TABLE.iter().map(|(pattern, _)| pattern))
            .expect("pattern table is a fixed, valid literal set")
    })
}

/// Classify a probe outcome into a coarse cause.
///
/// Deterministic and pure: `classify(x) == classify(x)` for any fixed
/// `x`, satisfying the testable property in spec §8.
pub fn classify(outcome: &ProbeOutcome) -> PingCause {
    match outcome {
        ProbeOutcome::DeadlineExceeded => PingCause::Timeout,
        ProbeOutcome::Canceled => PingCause::Internal,
        ProbeOutcome::Failed(text) => {
            let lowered = text.to_ascii_lowercase();
            match automaton().find(&lowered) {
                Some(m) => PATTERN_TABLE[m.pattern().as_usize()].1,
                None => PingCause::Unknown,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadline_exceeded_is_timeout() {
        assert_eq!(classify(&ProbeOutcome::DeadlineExceeded), PingCause::Timeout);
    }

    #[test]
    fn canceled_is_internal() {
        assert_eq!(classify(&ProbeOutcome::Canceled), PingCause::Internal);
    }

    #[test]
    fn matches_network_substrings_case_insensitively() {
        assert_eq!(
            classify(&ProbeOutcome::Failed("Connection Refused by peer".into())),
            PingCause::Network
        );
    }

    #[test]
    fn matches_tls_substrings() {
        assert_eq!(
            classify(&ProbeOutcome::Failed("x509: certificate signed by unknown authority".into())),
            PingCause::Tls
        );
    }

    #[test]
    fn matches_auth_substrings() {
        assert_eq!(
            classify(&ProbeOutcome::Failed("401 Unauthorized".into())),
            PingCause::AuthFailed
        );
    }

    #[test]
    fn matches_overload_substrings() {
        assert_eq!(
            classify(&ProbeOutcome::Failed("too many connections for role".into())),
            PingCause::Overloaded
        );
    }

    #[test]
    fn matches_bad_response_substrings() {
        assert_eq!(
            classify(&ProbeOutcome::Failed("syntax error near SELECT".into())),
            PingCause::BadResponse
        );
    }

    #[test]
    fn matches_internal_substrings() {
        assert_eq!(
            classify(&ProbeOutcome::Failed("thread panicked at 'index out of bounds'".into())),
            PingCause::Internal
        );
    }

    #[test]
    fn unmatched_text_is_unknown() {
        assert_eq!(
            classify(&ProbeOutcome::Failed("something entirely novel happened".into())),
            PingCause::Unknown
        );
    }

    #[test]
    fn classification_is_deterministic() {
        let outcome = ProbeOutcome::Failed("connection refused".into());
        assert_eq!(classify(&outcome), classify(&outcome));
    }
}
