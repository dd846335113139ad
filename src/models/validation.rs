use crate::{
    error::{Error, Result},
    models::message::NotificationRequest,
};

pub fn validate_request(request: &NotificationRequest) -> Result<()> {
    if request.category.trim().is_empty() {
        return Err(Error::validation("type is required"));
    }

    if request.body.trim().is_empty() {
        return Err(Error::validation("message is required"));
    }

    validate_destination(&request.destination)
}

/// Destinations are phone numbers: an optional leading `+` and 7 to 15 digits.
pub fn validate_destination(destination: &str) -> Result<()> {
    if destination.is_empty() {
        return Err(Error::validation("phone is required"));
    }

    let digits = destination.strip_prefix('+').unwrap_or(destination);

    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(Error::validation("phone must contain only digits"));
    }

    if !(7..=15).contains(&digits.len()) {
        return Err(Error::validation("phone must have between 7 and 15 digits"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_international_number() {
        assert!(validate_destination("+15555550100").is_ok());
        assert!(validate_destination("5491155550100").is_ok());
    }

    #[test]
    fn test_rejects_malformed_numbers() {
        assert!(validate_destination("").is_err());
        assert!(validate_destination("+").is_err());
        assert!(validate_destination("12345").is_err());
        assert!(validate_destination("+1 555 555 0100").is_err());
        assert!(validate_destination("1234567890123456").is_err());
    }

    #[test]
    fn test_requires_type_and_message() {
        let mut request = NotificationRequest::new("", "disk full", "+15555550100");
        assert!(matches!(validate_request(&request), Err(Error::Validation(_))));

        request.category = "alert".to_string();
        request.body = "   ".to_string();
        assert!(matches!(validate_request(&request), Err(Error::Validation(_))));

        request.body = "disk full".to_string();
        assert!(validate_request(&request).is_ok());
    }
}
