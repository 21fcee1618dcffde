//! Match key normalization

use dnr_core::config::IdentityConfig;
use std::collections::HashSet;

/// A normalized value two contacts can share
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MatchKey {
    Email(String),
    Phone(String),
}

/// Turns raw emails and phones into match keys, dropping placeholders
#[derive(Debug, Clone)]
pub struct KeyNormalizer {
    min_phone_digits: usize,
    ignored_emails: HashSet<String>,
    ignored_phones: HashSet<String>,
}

impl KeyNormalizer {
    pub fn new(config: &IdentityConfig) -> Self {
        Self {
            min_phone_digits: config.min_phone_digits,
            ignored_emails: config
                .ignored_emails
                .iter()
                .filter_map(|e| normalize_email(e))
                .collect(),
            ignored_phones: config
                .ignored_phones
                .iter()
                .filter_map(|p| normalize_phone(p))
                .collect(),
        }
    }

    pub fn email(&self, raw: &str) -> Option<MatchKey> {
        normalize_email(raw)
            .filter(|e| !self.ignored_emails.contains(e))
            .map(MatchKey::Email)
    }

    pub fn phone(&self, raw: &str) -> Option<MatchKey> {
        normalize_phone(raw)
            .filter(|p| p.len() >= self.min_phone_digits && !self.ignored_phones.contains(p))
            .map(MatchKey::Phone)
    }
}

/// Trimmed, lower-cased email
pub fn normalize_email(raw: &str) -> Option<String> {
    let email = raw.trim().to_lowercase();
    (email.contains('@') && email.len() > 1).then_some(email)
}

/// Digits only
pub fn normalize_phone(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    (!digits.is_empty()).then_some(digits)
}
