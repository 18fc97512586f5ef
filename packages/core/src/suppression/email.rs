//! Syntactic email address validation.
//!
//! Addresses are checked before any provider call is attempted. The rules
//! cover the dot-atom form of RFC 5322 with a DNS hostname domain; quoted
//! local parts and address literals are rejected.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use thiserror::Error;

const MAX_ADDRESS_LEN: usize = 254;
const MAX_LOCAL_LEN: usize = 64;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("'{input}' is not a valid email address: {reason}")]
pub struct InvalidEmail {
    pub input: String,
    pub reason: &'static str,
}

/// A syntactically valid email address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct EmailAddress(String);

fn local_part_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9!#$%&'*+/=?^_`{|}~-]+(\.[A-Za-z0-9!#$%&'*+/=?^_`{|}~-]+)*$")
            .expect("local part pattern is valid")
    })
}

fn domain_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^([A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?\.)+[A-Za-z][A-Za-z0-9-]{0,61}[A-Za-z0-9]$")
            .expect("domain pattern is valid")
    })
}

impl EmailAddress {
    pub fn parse(input: &str) -> Result<Self, InvalidEmail> {
        let invalid = |reason| InvalidEmail {
            input: input.to_string(),
            reason,
        };

        if input.is_empty() {
            return Err(invalid("address is empty"));
        }
        if input.len() > MAX_ADDRESS_LEN {
            return Err(invalid("address is longer than 254 characters"));
        }

        let (local, domain) = match input.split_once('@') {
            Some(parts) => parts,
            None => return Err(invalid("missing '@'")),
        };
        if domain.contains('@') {
            return Err(invalid("more than one '@'"));
        }
        if local.is_empty() || local.len() > MAX_LOCAL_LEN {
            return Err(invalid("local part must be 1 to 64 characters"));
        }
        if !local_part_pattern().is_match(local) {
            return Err(invalid("local part contains invalid characters or dots"));
        }
        if !domain_pattern().is_match(domain) {
            return Err(invalid("domain is not a valid hostname"));
        }

        Ok(Self(input.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn domain(&self) -> &str {
        self.0.rsplit_once('@').map(|(_, d)| d).unwrap_or_default()
    }

    /// Address form safe for logs: `j***@example.com`.
    pub fn redacted(&self) -> String {
        let first = self.0.chars().next().unwrap_or('*');
        format!("{}***@{}", first, self.domain())
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_common_addresses() {
        for input in [
            "user@example.com",
            "first.last@sub.example.co.uk",
            "user+tag@example.io",
            "o'brien@example.ie",
            "x@a-b.example.org",
        ] {
            assert!(EmailAddress::parse(input).is_ok(), "{} should be valid", input);
        }
    }

    #[test]
    fn rejects_malformed_addresses() {
        for input in [
            "",
            "not-an-email",
            "@example.com",
            "user@",
            "user@@example.com",
            "a@b@example.com",
            "user@localhost",
            "user@example.c",
            ".user@example.com",
            "user.@example.com",
            "us..er@example.com",
            "user name@example.com",
            " user@example.com",
            "user@example.com ",
            "user@-example.com",
            "user@example-.com",
            "user@exa_mple.com",
            "user@example.123",
        ] {
            assert!(EmailAddress::parse(input).is_err(), "{:?} should be invalid", input);
        }
    }

    #[test]
    fn accepts_punycode_top_level_domain() {
        for input in ["user@example.xn--p1ai", "user@xn--bcher-kva.xn--3e0b707e"] {
            assert!(EmailAddress::parse(input).is_ok(), "{} should be valid", input);
        }
        for input in ["user@example.xn--", "user@example.1xn--p1ai"] {
            assert!(EmailAddress::parse(input).is_err(), "{} should be invalid", input);
        }
    }

    #[test]
    fn rejects_overlong_local_part() {
        let input = format!("{}@example.com", "a".repeat(65));
        let err = EmailAddress::parse(&input).unwrap_err();
        assert_eq!(err.reason, "local part must be 1 to 64 characters");
    }

    #[test]
    fn rejects_overlong_address() {
        let label = "a".repeat(60);
        let input = format!("user@{}.{}.{}.{}.com", label, label, label, label);
        assert!(input.len() > MAX_ADDRESS_LEN);
        assert!(EmailAddress::parse(&input).is_err());
    }

    #[test]
    fn redacted_hides_local_part() {
        let email = EmailAddress::parse("jane.doe@example.com").unwrap();
        assert_eq!(email.redacted(), "j***@example.com");
        assert_eq!(email.domain(), "example.com");
    }
}
