use serde::{Deserialize, Serialize};

use crate::modules::error::code::ErrorCode;
use crate::raise_error;

/// The protocol + security combination a [`Session`](super::Session) is
/// built for.
///
/// Each variant owns the property-key template used by the session mapper:
/// the plain and STARTTLS variants speak `smtp` and configure keys under
/// `mail.smtp.*`, while the implicit-TLS variant speaks `smtps` and uses
/// `mail.smtps.*`.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub enum TransportStrategy {
    /// Plain SMTP; upgrades to TLS opportunistically when the server offers
    /// STARTTLS and opportunistic TLS has not been disabled.
    #[default]
    Smtp,
    /// SMTP with mandatory STARTTLS and server identity verification.
    SmtpTls,
    /// SMTP over implicit TLS from the first byte (port 465 style).
    Smtps,
}

impl TransportStrategy {
    /// Value for the `mail.transport.protocol` key.
    pub fn protocol_name(&self) -> &'static str {
        match self {
            TransportStrategy::Smtp | TransportStrategy::SmtpTls => "smtp",
            TransportStrategy::Smtps => "smtps",
        }
    }

    /// Key prefix all host/port/auth keys of this variant live under.
    fn key_prefix(&self) -> &'static str {
        match self {
            TransportStrategy::Smtp | TransportStrategy::SmtpTls => "mail.smtp",
            TransportStrategy::Smtps => "mail.smtps",
        }
    }

    pub fn property_host(&self) -> String {
        format!("{}.host", self.key_prefix())
    }

    pub fn property_port(&self) -> String {
        format!("{}.port", self.key_prefix())
    }

    pub fn property_username(&self) -> String {
        format!("{}.username", self.key_prefix())
    }

    pub fn property_auth(&self) -> String {
        format!("{}.auth", self.key_prefix())
    }

    pub fn property_starttls_enable(&self) -> String {
        format!("{}.starttls.enable", self.key_prefix())
    }

    pub fn property_starttls_required(&self) -> String {
        format!("{}.starttls.required", self.key_prefix())
    }

    pub fn property_ssl_trust(&self) -> String {
        format!("{}.ssl.trust", self.key_prefix())
    }

    pub fn property_check_server_identity(&self) -> String {
        format!("{}.ssl.checkserveridentity", self.key_prefix())
    }

    pub fn property_socks_host(&self) -> String {
        format!("{}.socks.host", self.key_prefix())
    }

    pub fn property_socks_port(&self) -> String {
        format!("{}.socks.port", self.key_prefix())
    }

    pub fn property_quitwait(&self) -> String {
        format!("{}.quitwait", self.key_prefix())
    }

    /// Whether STARTTLS keys are emitted at all when opportunistic TLS
    /// resolves to enabled. Implicit TLS never negotiates STARTTLS.
    pub fn uses_starttls_keys(&self) -> bool {
        !matches!(self, TransportStrategy::Smtps)
    }

    /// Proxying over SOCKS is meaningless for implicit TLS; configured
    /// proxies are dropped for that variant.
    pub fn supports_proxy(&self) -> bool {
        !matches!(self, TransportStrategy::Smtps)
    }

    /// Strategy-level default for the opportunistic TLS toggle, the lowest
    /// rung of the resolution chain.
    pub fn default_opportunistic_tls(&self) -> bool {
        true
    }
}

impl std::fmt::Display for TransportStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TransportStrategy::Smtp => "SMTP",
            TransportStrategy::SmtpTls => "SMTP_TLS",
            TransportStrategy::Smtps => "SMTPS",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for TransportStrategy {
    type Err = crate::modules::error::MailForgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SMTP" | "SMTP_PLAIN" => Ok(TransportStrategy::Smtp),
            "SMTP_TLS" | "SMTPTLS" | "STARTTLS" => Ok(TransportStrategy::SmtpTls),
            "SMTPS" | "SMTP_SSL" => Ok(TransportStrategy::Smtps),
            other => Err(raise_error!(
                format!("Unknown transport strategy: {}", other),
                ErrorCode::InvalidParameter
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_templates_follow_the_protocol() {
        assert_eq!(TransportStrategy::Smtp.property_host(), "mail.smtp.host");
        assert_eq!(TransportStrategy::SmtpTls.property_host(), "mail.smtp.host");
        assert_eq!(TransportStrategy::Smtps.property_host(), "mail.smtps.host");
        assert_eq!(TransportStrategy::Smtps.protocol_name(), "smtps");
        assert_eq!(TransportStrategy::SmtpTls.protocol_name(), "smtp");
    }

    #[test]
    fn strategy_parses_common_spellings() {
        assert_eq!(
            "smtp_tls".parse::<TransportStrategy>().unwrap(),
            TransportStrategy::SmtpTls
        );
        assert_eq!(
            "SMTPS".parse::<TransportStrategy>().unwrap(),
            TransportStrategy::Smtps
        );
        assert!("imap".parse::<TransportStrategy>().is_err());
    }
}
