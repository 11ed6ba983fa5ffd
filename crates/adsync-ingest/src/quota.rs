//! Quota-exhaustion classification
//!
//! The upstream reports every failure through the same opaque error, so the
//! only way to tell quota exhaustion apart is the message text. This module is
//! the single place that knows those signatures.

use crate::error::FetchError;

/// Message fragments that indicate the shared request quota is spent
pub const DEFAULT_QUOTA_SIGNATURES: &[&str] = &[
    "user request limit reached",
    "application request limit reached",
    "quota exceeded",
];

/// Severity class of a fetch failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    QuotaExhausted,
    Other,
}

/// Maps an upstream failure message to a [`FailureKind`]
pub trait FailureClassifier: Send + Sync {
    fn classify(&self, message: &str) -> FailureKind;

    fn classify_fetch(&self, err: &FetchError) -> FailureKind {
        self.classify(err.upstream_message())
    }
}

/// Case-insensitive substring match against a list of signatures
#[derive(Debug, Clone)]
pub struct SignatureClassifier {
    signatures: Vec<String>,
}

impl SignatureClassifier {
    pub fn new<I, S>(signatures: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let signatures = signatures
            .into_iter()
            .map(|s| s.as_ref().trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        Self { signatures }
    }

    pub fn signatures(&self) -> &[String] {
        &self.signatures
    }
}

impl Default for SignatureClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_QUOTA_SIGNATURES)
    }
}

impl FailureClassifier for SignatureClassifier {
    fn classify(&self, message: &str) -> FailureKind {
        let message = message.to_lowercase();
        if self.signatures.iter().any(|sig| message.contains(sig.as_str())) {
            FailureKind::QuotaExhausted
        } else {
            FailureKind::Other
        }
    }
}
