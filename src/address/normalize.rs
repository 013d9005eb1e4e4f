//! Numbering-plan driven normalization.

use std::fmt;

use crate::error::DispatchError;

/// Domain suffix for individual chat addresses.
const USER_DOMAIN: &str = "s.whatsapp.net";

/// Numbering plan of the region phone numbers are resolved against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumberingPlan {
    /// Country calling code, without `+`.
    pub country_code: &'static str,
    /// Trunk prefix dialled before national numbers.
    pub trunk_prefix: char,
    /// Length of a national significant number.
    pub national_len: usize,
}

impl NumberingPlan {
    /// Sri Lanka: `+94`, trunk prefix `0`, nine-digit national numbers.
    pub const SRI_LANKA: NumberingPlan = NumberingPlan {
        country_code: "94",
        trunk_prefix: '0',
        national_len: 9,
    };

    fn international_len(&self) -> usize {
        self.country_code.len() + self.national_len
    }
}

impl Default for NumberingPlan {
    fn default() -> Self {
        Self::SRI_LANKA
    }
}

/// A resolved, digits-only international number.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalAddress(String);

impl CanonicalAddress {
    /// The digits of the address.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Transport-level chat identifier for this address.
    pub fn chat_id(&self) -> ChatId {
        ChatId::from_digits(&self.0)
    }
}

impl fmt::Display for CanonicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Routing identifier handed to the transport (`<digits>@s.whatsapp.net`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChatId(String);

impl ChatId {
    /// Build a chat id from an already-normalized digit string.
    pub fn from_digits(digits: &str) -> Self {
        Self(format!("{}@{}", digits, USER_DOMAIN))
    }

    /// Build a chat id by stripping non-digits only, without consulting a
    /// numbering plan.
    pub fn from_raw_digits(raw: &str) -> Self {
        Self::from_digits(&digits_only(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn digits_only(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}

/// Normalize a phone number against the default numbering plan.
pub fn normalize(raw: &str) -> Result<CanonicalAddress, DispatchError> {
    normalize_with(&NumberingPlan::default(), raw)
}

/// Normalize a phone number against `plan`.
///
/// Accepted shapes, after dropping every non-digit:
/// - trunk prefix + national number: prefix replaced by the country code
/// - bare national number: country code prepended
/// - country code + national number: unchanged
/// - country code + national number + one extra digit: unchanged
pub fn normalize_with(plan: &NumberingPlan, raw: &str) -> Result<CanonicalAddress, DispatchError> {
    let digits = digits_only(raw);
    let len = digits.len();

    let normalized = if len == plan.national_len + 1 && digits.starts_with(plan.trunk_prefix) {
        format!("{}{}", plan.country_code, &digits[1..])
    } else if len == plan.national_len {
        format!("{}{}", plan.country_code, digits)
    } else if (len == plan.international_len() || len == plan.international_len() + 1)
        && digits.starts_with(plan.country_code)
    {
        digits
    } else {
        return Err(DispatchError::InvalidAddressFormat {
            input: raw.to_string(),
            normalized: String::new(),
        });
    };

    Ok(CanonicalAddress(normalized))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(raw: &str) -> String {
        normalize(raw).unwrap().as_str().to_string()
    }

    #[test]
    fn test_trunk_prefixed_local_number() {
        assert_eq!(norm("0771234567"), "94771234567");
    }

    #[test]
    fn test_bare_national_number() {
        assert_eq!(norm("771234567"), "94771234567");
    }

    #[test]
    fn test_international_passes_through() {
        assert_eq!(norm("94771234567"), "94771234567");
    }

    #[test]
    fn test_twelve_digit_international_passes_through() {
        assert_eq!(norm("947712345678"), "947712345678");
    }

    #[test]
    fn test_short_number_rejected() {
        match normalize("12345") {
            Err(DispatchError::InvalidAddressFormat { input, normalized }) => {
                assert_eq!(input, "12345");
                assert!(normalized.is_empty());
            }
            other => panic!("expected InvalidAddressFormat, got {:?}", other),
        }
    }

    #[test]
    fn test_formatting_characters_stripped() {
        assert_eq!(norm("+94 77 123-4567"), "94771234567");
        assert_eq!(norm("(077) 123 4567"), "94771234567");
    }

    #[test]
    fn test_ten_digits_without_trunk_rejected() {
        assert!(normalize("1771234567").is_err());
    }

    #[test]
    fn test_eleven_digits_wrong_country_rejected() {
        assert!(normalize("44771234567").is_err());
        assert!(normalize("447712345678").is_err());
    }

    #[test]
    fn test_empty_rejected() {
        assert!(normalize("").is_err());
        assert!(normalize("phone").is_err());
    }

    #[test]
    fn test_every_nine_digit_input_gets_country_code() {
        for sample in ["000000000", "012345678", "999999999", "771234567"] {
            assert_eq!(norm(sample), format!("94{}", sample));
        }
    }

    #[test]
    fn test_trunk_rule_holds_for_samples() {
        for sample in ["0000000000", "0112345678", "0999999999"] {
            assert_eq!(norm(sample), format!("94{}", &sample[1..]));
        }
    }

    #[test]
    fn test_normalization_is_idempotent() {
        for sample in ["0771234567", "771234567", "94771234567", "947712345678"] {
            let once = norm(sample);
            assert_eq!(norm(&once), once);
        }
    }

    #[test]
    fn test_other_lengths_rejected() {
        for len in (0..20).filter(|l| ![9, 10, 11, 12].contains(l)) {
            let sample = format!("94{}", "7".repeat(len)).chars().take(len).collect::<String>();
            assert!(normalize(&sample).is_err(), "length {} accepted", len);
        }
    }

    #[test]
    fn test_chat_id() {
        let addr = normalize("0771234567").unwrap();
        assert_eq!(addr.chat_id().as_str(), "94771234567@s.whatsapp.net");
    }

    #[test]
    fn test_raw_digit_chat_id_skips_plan() {
        let id = ChatId::from_raw_digits("077-123 4567");
        assert_eq!(id.as_str(), "0771234567@s.whatsapp.net");
    }

    #[test]
    fn test_custom_plan() {
        let plan = NumberingPlan {
            country_code: "61",
            trunk_prefix: '0',
            national_len: 9,
        };
        let addr = normalize_with(&plan, "0412345678").unwrap();
        assert_eq!(addr.as_str(), "61412345678");
    }
}
