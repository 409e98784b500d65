//! Hostname value object.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::ValidationError;

/// Validated DNS hostname, stored lowercase.
///
/// Hostnames end up in nginx vhost files and certbot invocations, so only
/// well-formed names are representable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Hostname(String);

impl Hostname {
    /// Parses and normalizes a hostname.
    pub fn new(value: impl AsRef<str>) -> Result<Self, ValidationError> {
        let value = value.as_ref().trim().to_ascii_lowercase();
        if value.is_empty() {
            return Err(ValidationError::empty_field("hostname"));
        }
        if value.len() > 253 {
            return Err(ValidationError::invalid_format("hostname", "too long"));
        }
        for label in value.split('.') {
            let valid = !label.is_empty()
                && label.len() <= 63
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
                && !label.starts_with('-')
                && !label.ends_with('-');
            if !valid {
                return Err(ValidationError::invalid_format(
                    "hostname",
                    format!("bad label '{label}'"),
                ));
            }
        }
        Ok(Self(value))
    }

    /// Returns the hostname string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Hostname {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Hostname {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hostname_lowercases_input() {
        let host = Hostname::new("Shop.Example.COM").unwrap();
        assert_eq!(host.as_str(), "shop.example.com");
    }

    #[test]
    fn hostname_accepts_hyphenated_labels() {
        assert!(Hostname::new("my-shop.vumashops.com").is_ok());
    }

    #[test]
    fn hostname_rejects_empty() {
        assert!(Hostname::new("").is_err());
        assert!(Hostname::new("   ").is_err());
    }

    #[test]
    fn hostname_rejects_empty_labels() {
        assert!(Hostname::new("shop..com").is_err());
        assert!(Hostname::new(".shop.com").is_err());
        assert!(Hostname::new("shop.com.").is_err());
    }

    #[test]
    fn hostname_rejects_label_edge_hyphens() {
        assert!(Hostname::new("-shop.com").is_err());
        assert!(Hostname::new("shop-.com").is_err());
    }

    #[test]
    fn hostname_rejects_special_characters() {
        assert!(Hostname::new("shop.com; include /etc/nginx").is_err());
        assert!(Hostname::new("shop_underscore.com").is_err());
        assert!(Hostname::new("shop com").is_err());
    }

    #[test]
    fn hostname_rejects_overlong_names() {
        let long = format!("{}.com", "a".repeat(251));
        assert!(Hostname::new(long).is_err());

        let long_label = format!("{}.com", "a".repeat(64));
        assert!(Hostname::new(long_label).is_err());
    }
}
