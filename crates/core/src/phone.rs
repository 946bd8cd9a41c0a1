//! Phone number normalization used for lead de-duplication

/// Minimum digits for something to count as a phone number
pub const MIN_PHONE_DIGITS: usize = 7;
/// Maximum digits (E.164)
pub const MAX_PHONE_DIGITS: usize = 15;

/// Keep only ASCII digits
pub fn digits_only(input: &str) -> String {
    input.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// De-duplication key: the last 10 digits of the number, so `+1 (555) 123-4567`
/// and `555.123.4567` collide. Returns `None` for inputs that are not phone-like.
pub fn phone_key(input: &str) -> Option<String> {
    let digits = digits_only(input);
    if digits.len() < MIN_PHONE_DIGITS || digits.len() > MAX_PHONE_DIGITS {
        return None;
    }
    let start = digits.len().saturating_sub(10);
    Some(digits[start..].to_string())
}

/// Whether the input carries a plausible phone number
pub fn is_phone_like(input: &str) -> bool {
    phone_key(input).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phone_key_collides_across_formats() {
        assert_eq!(phone_key("+1 (555) 123-4567").as_deref(), Some("5551234567"));
        assert_eq!(phone_key("555.123.4567").as_deref(), Some("5551234567"));
        assert_eq!(phone_key("15551234567"), phone_key("5551234567"));
    }

    #[test]
    fn test_short_numbers_keep_all_digits() {
        assert_eq!(phone_key("123-4567").as_deref(), Some("1234567"));
    }

    #[test]
    fn test_rejects_non_phone() {
        assert!(phone_key("").is_none());
        assert!(phone_key("call me maybe").is_none());
        assert!(phone_key("12345").is_none());
        assert!(phone_key("1234567890123456").is_none());
        assert!(!is_phone_like("42"));
    }
}
