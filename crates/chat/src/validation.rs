//! Inbound message validation.

use spurchat_core::error::Error;

/// Reject messages that are blank or longer than `max_chars` characters.
///
/// Length counts Unicode scalar values of the text as sent; blankness is
/// judged after trimming. Returns the first issue only.
pub fn validate_message(text: &str, max_chars: usize) -> Result<(), Error> {
    if text.trim().is_empty() {
        return Err(Error::validation("Message cannot be empty"));
    }
    if text.chars().count() > max_chars {
        return Err(Error::validation("Message too long"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ordinary_text() {
        assert!(validate_message("Do you ship to India?", 2000).is_ok());
    }

    #[test]
    fn rejects_empty_and_whitespace() {
        for text in ["", "   ", "\n\t"] {
            let err = validate_message(text, 2000).unwrap_err();
            assert!(err.is_validation());
            assert_eq!(err.to_string(), "Message cannot be empty");
        }
    }

    #[test]
    fn length_boundary() {
        assert!(validate_message(&"a".repeat(2000), 2000).is_ok());
        let err = validate_message(&"a".repeat(2001), 2000).unwrap_err();
        assert_eq!(err.to_string(), "Message too long");
    }

    #[test]
    fn counts_characters_not_bytes() {
        // 2000 two-byte characters is 4000 bytes but still within limit.
        assert!(validate_message(&"é".repeat(2000), 2000).is_ok());
    }
}
