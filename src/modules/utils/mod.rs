use rand::Rng;

use super::error::code::ErrorCode;

#[macro_export]
macro_rules! utc_now {
    () => {{
        use chrono::Utc;
        Utc::now().timestamp_millis()
    }};
}

#[macro_export]
macro_rules! raise_error {
    ($msg:expr, $code:expr) => {
        $crate::modules::error::MailForgeError::Generic {
            message: $msg,
            location: snafu::Location::default(),
            code: $code,
        }
    };
}

#[macro_export]
macro_rules! validate_email {
    ($email:expr) => {{
        $crate::modules::utils::validate_email($email)
    }};
}

pub fn validate_email(email: &str) -> crate::modules::error::MailForgeResult<()> {
    use std::str::FromStr;
    let email_address = email_address::EmailAddress::from_str(email).map_err(|_| {
        raise_error!(
            format!("Invalid email format : {}", email),
            ErrorCode::InvalidParameter
        )
    })?;
    if email != email_address.email() {
        return Err(raise_error!(
            format!("Invalid email format: {}", email),
            ErrorCode::InvalidParameter
        ));
    }
    Ok(())
}

pub fn generate_message_id() -> String {
    // Generate 16 random bytes
    let random_bytes: [u8; 16] = rand::rng().random();
    // Convert to hex
    let random_id = hex::encode(random_bytes);
    // Get current timestamp in milliseconds
    let timestamp_millis = utc_now!();
    // Format the message ID
    format!("<{}.{}@mailforge>", timestamp_millis, random_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_ids_are_unique_and_bracketed() {
        let a = generate_message_id();
        let b = generate_message_id();
        assert!(a.starts_with('<') && a.ends_with("@mailforge>"));
        assert_ne!(a, b);
    }

    #[test]
    fn email_validation() {
        assert!(validate_email("john.doe@example.com").is_ok());
        assert!(validate_email("").is_err());
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("a b@example.com").is_err());
    }
}
