//! Contact identifier normalization.
//!
//! A conversation is scoped to one peer, identified by a phone number that
//! reaches the engine in several representations: formatted user input
//! (`"+1 (555) 010-2030"`), bare national numbers from the historical
//! store, and fully-qualified numbers on push-event payloads. Subscribing
//! under one representation and matching events under another is the
//! classic way to silently drop events, so every path funnels through
//! [`NormalizationRules::canonicalize`] — there is deliberately no other
//! way to construct a [`ContactKey`].

use serde::Deserialize;

/// Canonical contact identifier: digits only, country-code qualified.
///
/// Constructed exclusively by [`NormalizationRules::canonicalize`] so that
/// subscribe-time and event-time representations can never diverge.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContactKey(String);

impl ContactKey {
    /// Returns the canonical digit string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the raw input contained no digits at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for ContactKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Rules for reducing a raw phone representation to a [`ContactKey`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NormalizationRules {
    /// Country code prepended to bare national numbers.
    pub country_code: String,
    /// Length of a national-significant number; a stripped number of
    /// exactly this length gets the country code prefixed.
    pub national_number_len: usize,
    /// How many trailing digits two representations must share to be
    /// considered the same contact.
    pub suffix_match_len: usize,
}

impl Default for NormalizationRules {
    fn default() -> Self {
        Self {
            country_code: "1".to_owned(),
            national_number_len: 10,
            suffix_match_len: 8,
        }
    }
}

impl NormalizationRules {
    /// Reduces a raw phone representation to its canonical form.
    ///
    /// Strips every non-digit character, then prefixes the country code
    /// when the remainder is exactly a national-significant number. The
    /// result is stable under re-application.
    #[must_use]
    pub fn canonicalize(&self, raw: &str) -> ContactKey {
        let mut digits = Self::digits(raw);
        if digits.len() == self.national_number_len {
            digits.insert_str(0, &self.country_code);
        }
        ContactKey(digits)
    }

    /// Whether a raw phone from an event payload refers to the given
    /// contact.
    ///
    /// Compares trailing digits ([`suffix_match_len`](Self::suffix_match_len)
    /// of them, or fewer when either side is shorter) so that events keep
    /// matching across country-code and prefix variation.
    #[must_use]
    pub fn same_contact(&self, raw: &str, key: &ContactKey) -> bool {
        let digits = Self::digits(raw);
        if digits.is_empty() || key.as_str().is_empty() {
            return false;
        }
        let len = self
            .suffix_match_len
            .min(digits.len())
            .min(key.as_str().len())
            .max(1);
        digits[digits.len() - len..] == key.as_str()[key.as_str().len() - len..]
    }

    fn digits(raw: &str) -> String {
        raw.chars().filter(char::is_ascii_digit).collect()
    }
}
