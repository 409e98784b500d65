//! Platform payment reference value object.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::foundation::ValidationError;

/// Platform-generated payment reference.
///
/// Generated before any gateway call so a payment row exists even when the
/// provider is unreachable. The `VS-` prefix makes platform references
/// recognizable in provider dashboards and webhook payloads.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentReference(String);

impl PaymentReference {
    /// Generates a fresh, globally unique reference.
    pub fn generate() -> Self {
        Self(format!("VS-{}", Uuid::new_v4().simple()))
    }

    /// Validates and wraps an existing reference string.
    pub fn parse(value: impl AsRef<str>) -> Result<Self, ValidationError> {
        let value = value.as_ref().trim();
        let rest = value.strip_prefix("VS-").ok_or_else(|| {
            ValidationError::invalid_format("reference", "missing VS- prefix")
        })?;
        if rest.is_empty() || !rest.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ValidationError::invalid_format(
                "reference",
                "expected alphanumeric body after prefix",
            ));
        }
        Ok(Self(value.to_string()))
    }

    /// Returns the reference string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PaymentReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PaymentReference {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn generate_produces_prefixed_reference() {
        let reference = PaymentReference::generate();
        assert!(reference.as_str().starts_with("VS-"));
        assert_eq!(reference.as_str().len(), 3 + 32);
    }

    #[test]
    fn generate_produces_distinct_references() {
        let references: HashSet<String> = (0..10_000)
            .map(|_| PaymentReference::generate().as_str().to_string())
            .collect();
        assert_eq!(references.len(), 10_000);
    }

    #[test]
    fn parse_accepts_generated_references() {
        let reference = PaymentReference::generate();
        let parsed = PaymentReference::parse(reference.as_str()).unwrap();
        assert_eq!(parsed, reference);
    }

    #[test]
    fn parse_rejects_missing_prefix() {
        assert!(PaymentReference::parse("550e8400e29b41d4").is_err());
    }

    #[test]
    fn parse_rejects_empty_body() {
        assert!(PaymentReference::parse("VS-").is_err());
    }

    #[test]
    fn parse_rejects_non_alphanumeric_body() {
        assert!(PaymentReference::parse("VS-abc def").is_err());
        assert!(PaymentReference::parse("VS-abc;drop").is_err());
    }

    #[test]
    fn serializes_as_plain_string() {
        let reference = PaymentReference::parse("VS-abc123").unwrap();
        let json = serde_json::to_string(&reference).unwrap();
        assert_eq!(json, "\"VS-abc123\"");
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn any_alphanumeric_body_round_trips(body in "[a-zA-Z0-9]{1,40}") {
                let raw = format!("VS-{}", body);
                let parsed = PaymentReference::parse(&raw).unwrap();
                prop_assert_eq!(parsed.to_string(), raw);
            }

            #[test]
            fn parse_never_accepts_an_unprefixed_string(raw in "[a-zA-Z0-9]{0,40}") {
                // Without the prefix nothing gets through, however clean the body.
                prop_assert!(PaymentReference::parse(&raw).is_err());
            }

            #[test]
            fn accepted_references_are_always_shaped(raw in "\\PC{0,40}") {
                if let Ok(reference) = PaymentReference::parse(&raw) {
                    let rest = reference.as_str().strip_prefix("VS-").unwrap();
                    prop_assert!(!rest.is_empty());
                    prop_assert!(rest.chars().all(|c| c.is_ascii_alphanumeric()));
                }
            }
        }
    }
}
