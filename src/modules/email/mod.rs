use std::sync::Arc;

use mime_guess::from_path;
use serde::{Deserialize, Serialize};

use crate::{
    modules::error::{code::ErrorCode, MailForgeResult},
    raise_error, validate_email,
};

pub mod builder;
pub mod model;

pub use model::Email;

/// Whether a recipient appears in the To, Cc or Bcc list of a message.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum RecipientKind {
    To,
    Cc,
    Bcc,
}

/// A named email address tagged with the list it belongs to.
///
/// Immutable; equality covers all three fields.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Recipient {
    /// The display name associated with the email address, if any.
    pub name: Option<String>,
    /// The email address itself. Always non-empty and well-formed.
    pub address: String,
    /// The recipient list this entry belongs to.
    pub kind: RecipientKind,
}

impl Recipient {
    /// Creates a recipient, rejecting an empty or malformed address.
    pub fn new(
        name: Option<&str>,
        address: &str,
        kind: RecipientKind,
    ) -> MailForgeResult<Recipient> {
        if address.is_empty() {
            return Err(raise_error!(
                "Recipient address cannot be empty".into(),
                ErrorCode::InvalidParameter
            ));
        }
        validate_email!(address)?;
        Ok(Recipient {
            name: name.filter(|n| !n.is_empty()).map(String::from),
            address: address.to_string(),
            kind,
        })
    }

    /// Same recipient re-tagged for another list. Used when seeding a reply,
    /// where original senders become To entries.
    pub fn retagged(&self, kind: RecipientKind) -> Recipient {
        Recipient {
            name: self.name.clone(),
            address: self.address.clone(),
            kind,
        }
    }
}

impl std::fmt::Display for Recipient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} <{}>", name, self.address),
            None => write!(f, "{}", self.address),
        }
    }
}

/// The iCalendar METHOD accompanying calendar text (RFC 5546).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum CalendarMethod {
    Publish,
    Request,
    Reply,
    Add,
    Cancel,
    Refresh,
    Counter,
    DeclineCounter,
}

impl std::fmt::Display for CalendarMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CalendarMethod::Publish => "PUBLISH",
            CalendarMethod::Request => "REQUEST",
            CalendarMethod::Reply => "REPLY",
            CalendarMethod::Add => "ADD",
            CalendarMethod::Cancel => "CANCEL",
            CalendarMethod::Refresh => "REFRESH",
            CalendarMethod::Counter => "COUNTER",
            CalendarMethod::DeclineCounter => "DECLINE-COUNTER",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for CalendarMethod {
    type Err = crate::modules::error::MailForgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PUBLISH" => Ok(CalendarMethod::Publish),
            "REQUEST" => Ok(CalendarMethod::Request),
            "REPLY" => Ok(CalendarMethod::Reply),
            "ADD" => Ok(CalendarMethod::Add),
            "CANCEL" => Ok(CalendarMethod::Cancel),
            "REFRESH" => Ok(CalendarMethod::Refresh),
            "COUNTER" => Ok(CalendarMethod::Counter),
            "DECLINE-COUNTER" | "DECLINECOUNTER" => Ok(CalendarMethod::DeclineCounter),
            other => Err(raise_error!(
                format!("Unknown calendar method: {}", other),
                ErrorCode::InvalidParameter
            )),
        }
    }
}

/// A named binary payload with a declared MIME type, used both for regular
/// attachments and for embedded (inline) images.
///
/// The content is shared behind an `Arc`, so cloning an email never copies
/// attachment bytes.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct AttachmentResource {
    /// File name for attachments; doubles as the Content-ID for embedded
    /// images. Never absent, but may be empty for regular attachments.
    pub name: String,
    /// The raw content bytes.
    pub content: Arc<Vec<u8>>,
    /// Declared MIME type, e.g. `application/pdf`.
    pub mime_type: String,
}

impl AttachmentResource {
    pub fn new(name: &str, content: impl Into<Vec<u8>>, mime_type: &str) -> AttachmentResource {
        AttachmentResource {
            name: name.to_string(),
            content: Arc::new(content.into()),
            mime_type: mime_type.to_string(),
        }
    }

    /// Builds a resource guessing the MIME type from the file name
    /// extension, falling back to `application/octet-stream`.
    pub fn with_guessed_type(name: &str, content: impl Into<Vec<u8>>) -> AttachmentResource {
        let mime_type = from_path(name).first_or_octet_stream().to_string();
        Self::new(name, content, &mime_type)
    }

    pub fn content_bytes(&self) -> &[u8] {
        &self.content
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recipient_rejects_bad_addresses() {
        assert!(Recipient::new(None, "", RecipientKind::To).is_err());
        assert!(Recipient::new(Some("X"), "not an address", RecipientKind::Cc).is_err());
        let r = Recipient::new(Some("Moo Shmoo"), "moo.shmoo@example.com", RecipientKind::Bcc)
            .unwrap();
        assert_eq!(r.to_string(), "Moo Shmoo <moo.shmoo@example.com>");
    }

    #[test]
    fn recipient_blank_name_becomes_none() {
        let r = Recipient::new(Some(""), "a@b.example", RecipientKind::To).unwrap();
        assert_eq!(r.name, None);
    }

    #[test]
    fn attachment_type_guessing() {
        let a = AttachmentResource::with_guessed_type("photo.png", vec![1, 2, 3]);
        assert_eq!(a.mime_type, "image/png");
        let b = AttachmentResource::with_guessed_type("blob.weird", vec![]);
        assert_eq!(b.mime_type, "application/octet-stream");
    }

    #[test]
    fn calendar_method_round_trips_through_display() {
        for m in [
            CalendarMethod::Publish,
            CalendarMethod::Cancel,
            CalendarMethod::DeclineCounter,
        ] {
            assert_eq!(m.to_string().parse::<CalendarMethod>().unwrap(), m);
        }
    }
}
