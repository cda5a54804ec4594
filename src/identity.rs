//! Identity checks for the email-verification step.
//!
//! Pure functions: syntactic email validation, domain allowlisting, and
//! verification-code generation/comparison.

use std::sync::LazyLock;

use rand::Rng;
use regex::Regex;

/// Smallest verification code (inclusive).
pub const CODE_MIN: u32 = 100_000;
/// Largest verification code (inclusive).
pub const CODE_MAX: u32 = 999_999;

/// RFC 5322-style address grammar: dotted-atom or quoted local part; dotted
/// labels or a bracketed IPv4/tagged literal for the domain.
static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r#"(?i)^(?:[a-z0-9!#$%&'*+/=?^_`{|}~-]+(?:\.[a-z0-9!#$%&'*+/=?^_`{|}~-]+)*"#,
        r#"|"(?:[\x01-\x08\x0b\x0c\x0e-\x1f\x21\x23-\x5b\x5d-\x7f]|\\[\x01-\x09\x0b\x0c\x0e-\x7f])*")"#,
        r#"@(?:(?:[a-z0-9](?:[a-z0-9-]*[a-z0-9])?\.)+[a-z0-9](?:[a-z0-9-]*[a-z0-9])?"#,
        r#"|\[(?:(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\.){3}"#,
        r#"(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?"#,
        r#"|[a-z0-9-]*[a-z0-9]:(?:[\x01-\x08\x0b\x0c\x0e-\x1f\x21-\x5a\x53-\x7f]|\\[\x01-\x09\x0b\x0c\x0e-\x7f])+)\])$"#,
    ))
    .expect("email pattern is valid")
});

/// Whether `s` is a syntactically valid email address. No network checks.
pub fn is_syntactically_valid_email(s: &str) -> bool {
    EMAIL_PATTERN.is_match(s)
}

/// Whether `s` ends with the configured domain suffix, literally.
pub fn has_allowed_domain(s: &str, allowed_suffix: &str) -> bool {
    s.ends_with(allowed_suffix)
}

/// Why an email reply was rejected. Syntax is checked before domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailRejection {
    InvalidSyntax,
    WrongDomain,
}

/// Validate an email reply: syntax first, then domain.
pub fn check_email(s: &str, allowed_suffix: &str) -> Result<(), EmailRejection> {
    if !is_syntactically_valid_email(s) {
        return Err(EmailRejection::InvalidSyntax);
    }
    if !has_allowed_domain(s, allowed_suffix) {
        return Err(EmailRejection::WrongDomain);
    }
    Ok(())
}

/// Uniform random code in `[CODE_MIN, CODE_MAX]`.
pub fn generate_verification_code() -> u32 {
    rand::thread_rng().gen_range(CODE_MIN..=CODE_MAX)
}

/// Digit-for-digit comparison; no trimming or normalisation.
pub fn codes_match(candidate: &str, expected: u32) -> bool {
    candidate == expected.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_standard_addresses() {
        for ok in [
            "a@b.edu",
            "student@berkeley.edu",
            "first.last+tag@eecs.berkeley.edu",
            "Oski@Berkeley.EDU",
            "\"john..doe\"@berkeley.edu",
            "user@[192.168.0.1]",
        ] {
            assert!(is_syntactically_valid_email(ok), "{ok} should be valid");
        }
    }

    #[test]
    fn rejects_malformed_addresses() {
        for bad in [
            "",
            "student",
            "student.berkeley.edu",
            "student@",
            "@berkeley.edu",
            "student@berkeley",
            "student@.edu",
            "two words@berkeley.edu",
            "a@b.edu trailing",
            "user@[300.1.1.1]",
        ] {
            assert!(!is_syntactically_valid_email(bad), "{bad:?} should be invalid");
        }
    }

    #[test]
    fn domain_suffix_is_literal() {
        assert!(has_allowed_domain("x@berkeley.edu", "berkeley.edu"));
        assert!(has_allowed_domain("x@eecs.berkeley.edu", "berkeley.edu"));
        assert!(!has_allowed_domain("x@berkeley.edu.evil.com", "berkeley.edu"));
        assert!(!has_allowed_domain("x@BERKELEY.EDU", "berkeley.edu"));
    }

    #[test]
    fn syntax_checked_before_domain() {
        assert_eq!(
            check_email("not an email", "berkeley.edu"),
            Err(EmailRejection::InvalidSyntax)
        );
        assert_eq!(
            check_email("x@gmail.com", "berkeley.edu"),
            Err(EmailRejection::WrongDomain)
        );
        assert_eq!(check_email("x@berkeley.edu", "berkeley.edu"), Ok(()));
    }

    #[test]
    fn generated_codes_in_range() {
        for _ in 0..10_000 {
            let code = generate_verification_code();
            assert!((CODE_MIN..=CODE_MAX).contains(&code));
            assert_eq!(code.to_string().len(), 6);
        }
    }

    #[test]
    fn codes_match_exactly() {
        assert!(codes_match("482913", 482913));
        assert!(!codes_match(" 482913", 482913));
        assert!(!codes_match("482913 ", 482913));
        assert!(!codes_match("482914", 482913));
        assert!(!codes_match("", 482913));
    }
}
