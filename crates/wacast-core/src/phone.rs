// SPDX-FileCopyrightText: 2026 Wacast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Phone number normalization.
//!
//! Every phone the engine stores, sends to, or suppresses is first reduced
//! to E.164 digits without the leading `+` (`5511999990000`). Suppression
//! and opt-out lookups key on this form, so two spellings of the same
//! number always hit the same entry.

/// Shortest E.164 number we accept (country code + subscriber).
const MIN_DIGITS: usize = 8;
/// E.164 maximum.
const MAX_DIGITS: usize = 15;

/// Normalize a raw phone string to E.164 digits.
///
/// Accepts `+`, a `00` international prefix, and the usual separators
/// (spaces, dashes, dots, parentheses). When `default_country_code` is set,
/// numbers written without an international prefix lose a leading trunk
/// `0` and gain the country code. Returns `None` for anything that cannot
/// be a dialable number.
pub fn normalize_phone(raw: &str, default_country_code: Option<&str>) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let (international, rest) = match trimmed.strip_prefix('+') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };

    let mut digits = String::with_capacity(rest.len());
    for c in rest.chars() {
        match c {
            '0'..='9' => digits.push(c),
            ' ' | '-' | '.' | '(' | ')' => {}
            _ => return None,
        }
    }

    let digits = if international {
        digits
    } else if let Some(stripped) = digits.strip_prefix("00") {
        stripped.to_string()
    } else if let Some(cc) = default_country_code.filter(|cc| !cc.is_empty()) {
        let national = digits.strip_prefix('0').unwrap_or(&digits);
        if national.starts_with(cc) && national.len() >= MIN_DIGITS + cc.len() {
            national.to_string()
        } else {
            format!("{cc}{national}")
        }
    } else {
        digits
    };

    if digits.len() < MIN_DIGITS || digits.len() > MAX_DIGITS || digits.starts_with('0') {
        return None;
    }
    Some(digits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn strips_separators_and_plus() {
        assert_eq!(
            normalize_phone("+55 (11) 99999-0000", None).as_deref(),
            Some("5511999990000")
        );
        assert_eq!(
            normalize_phone("1.415.555.2671", None).as_deref(),
            Some("14155552671")
        );
    }

    #[test]
    fn international_double_zero_prefix() {
        assert_eq!(
            normalize_phone("0044 20 7946 0958", None).as_deref(),
            Some("442079460958")
        );
    }

    #[test]
    fn default_country_code_applies_to_national_numbers() {
        assert_eq!(
            normalize_phone("(11) 99999-0000", Some("55")).as_deref(),
            Some("5511999990000")
        );
        assert_eq!(
            normalize_phone("011 99999-0000", Some("55")).as_deref(),
            Some("5511999990000")
        );
        // Already carries the country code.
        assert_eq!(
            normalize_phone("5511999990000", Some("55")).as_deref(),
            Some("5511999990000")
        );
        // Explicit international numbers are left alone.
        assert_eq!(
            normalize_phone("+14155552671", Some("55")).as_deref(),
            Some("14155552671")
        );
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(normalize_phone("", None), None);
        assert_eq!(normalize_phone("not a phone", None), None);
        assert_eq!(normalize_phone("12345", None), None);
        assert_eq!(normalize_phone("+1234567890123456", None), None);
        assert_eq!(normalize_phone("+0123456789", None), None);
        assert_eq!(normalize_phone("+55 11 9999x0000", None), None);
    }

    proptest! {
        #[test]
        fn normalized_output_is_plain_e164_digits(raw in "[+0-9 ()-]{0,24}") {
            if let Some(n) = normalize_phone(&raw, None) {
                prop_assert!(n.chars().all(|c| c.is_ascii_digit()));
                prop_assert!(n.len() >= MIN_DIGITS && n.len() <= MAX_DIGITS);
                prop_assert!(!n.starts_with('0'));
            }
        }

        #[test]
        fn normalization_is_idempotent(raw in "\\+?[1-9][0-9]{7,14}") {
            let once = normalize_phone(&raw, None);
            prop_assert!(once.is_some());
            let twice = normalize_phone(&format!("+{}", once.clone().unwrap()), None);
            prop_assert_eq!(once, twice);
        }
    }
}
