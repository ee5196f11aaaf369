//! Canonical forms for the two unique identity keys.

use validator::ValidateEmail;

/// Trim and lowercase, then run `validator`'s email rule. A dotted domain
/// is also required so that intranet-style `user@host` is refused.
/// Returns `None` when the address is unusable.
pub fn normalize_email(raw: &str) -> Option<String> {
    let email = raw.trim().to_lowercase();
    if !email.validate_email() {
        return None;
    }

    let (_, domain) = email.rsplit_once('@')?;
    domain.contains('.').then_some(email)
}

/// Strip spaces, dashes, dots and parentheses; keep an optional leading `+`.
/// Requires 7 to 15 digits.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let (plus, rest) = match trimmed.strip_prefix('+') {
        Some(rest) => ("+", rest),
        None => ("", trimmed),
    };

    let mut digits = String::with_capacity(rest.len());
    for c in rest.chars() {
        match c {
            '0'..='9' => digits.push(c),
            ' ' | '-' | '.' | '(' | ')' => {}
            _ => return None,
        }
    }

    (7..=15)
        .contains(&digits.len())
        .then(|| format!("{}{}", plus, digits))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emails_are_trimmed_and_lowercased() {
        assert_eq!(
            normalize_email("  ANA@Test.com "),
            Some("ana@test.com".to_string())
        );
    }

    #[test]
    fn malformed_emails_are_rejected() {
        for bad in ["", "ana", "ana@", "@test.com", "ana@test", "a b@test.com", "ana@@test.com"] {
            assert_eq!(normalize_email(bad), None, "{bad}");
        }
    }

    #[test]
    fn characters_a_mailbox_cannot_carry_are_rejected() {
        for bad in ["a<b>@test.com", "ana,bob@test.com", "a\"b@test.com", "(x)@test.com"] {
            assert_eq!(normalize_email(bad), None, "{bad}");
        }
    }

    #[test]
    fn phones_keep_digits_and_leading_plus() {
        assert_eq!(
            normalize_phone("300 123-4567"),
            Some("3001234567".to_string())
        );
        assert_eq!(
            normalize_phone("+57 (300) 123 4567"),
            Some("+573001234567".to_string())
        );
        assert_eq!(normalize_phone("12345"), None);
        assert_eq!(normalize_phone("300-CALL-NOW"), None);
    }
}
