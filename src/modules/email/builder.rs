use std::collections::BTreeMap;
use std::sync::Arc;

use crate::modules::convert::message_to_email;
use crate::modules::email::{
    AttachmentResource, CalendarMethod, Email, Recipient, RecipientKind,
};
use crate::modules::error::{code::ErrorCode, MailForgeResult};
use crate::raise_error;

/// Mutable staging object for [`Email`] instances.
///
/// Fluent setters validate their input at call time and fail fast; nothing
/// is deferred to [`build_email`](EmailBuilder::build_email), which cannot
/// fail and may be called repeatedly to take independent, value-equal
/// snapshots of the accumulated state.
///
/// A builder is not meant to be shared across tasks while being populated;
/// the built [`Email`] is immutable and freely shareable.
#[derive(Clone, Debug, Default)]
pub struct EmailBuilder {
    pub(crate) id: Option<String>,
    pub(crate) from_recipient: Option<Recipient>,
    pub(crate) reply_to_recipient: Option<Recipient>,
    pub(crate) bounce_to_recipient: Option<Recipient>,
    pub(crate) text: Option<String>,
    pub(crate) text_html: Option<String>,
    pub(crate) calendar_method: Option<CalendarMethod>,
    pub(crate) text_calendar: Option<String>,
    pub(crate) subject: Option<String>,
    pub(crate) recipients: Vec<Recipient>,
    pub(crate) embedded_images: Vec<AttachmentResource>,
    pub(crate) attachments: Vec<AttachmentResource>,
    pub(crate) headers: BTreeMap<String, String>,
    pub(crate) use_disposition_notification_to: bool,
    pub(crate) disposition_notification_to: Option<Recipient>,
    pub(crate) use_return_receipt_to: bool,
    pub(crate) return_receipt_to: Option<Recipient>,
    pub(crate) message_to_forward: Option<Arc<Vec<u8>>>,
}

impl EmailBuilder {
    pub fn new() -> EmailBuilder {
        EmailBuilder::default()
    }

    /// Seeds a builder as a reply to an existing wire-format message.
    ///
    /// The subject receives a single `Re: ` prefix, the reply targets the
    /// original Reply-To (falling back to the original From), and with
    /// `reply_all` the remaining original To/Cc entries are carried over.
    /// `quote_original` quotes the original plain body with `> ` line
    /// prefixes and wraps the original HTML body in a blockquote.
    pub fn replying_to(
        raw_message: &[u8],
        reply_all: bool,
        quote_original: bool,
    ) -> MailForgeResult<EmailBuilder> {
        let original = message_to_email(raw_message)?;
        let mut builder = EmailBuilder::new();

        builder.subject = Some(prefixed_subject("Re: ", original.subject().unwrap_or("")));

        let target = original
            .reply_to_recipient()
            .or_else(|| original.from_recipient())
            .ok_or_else(|| {
                raise_error!(
                    "Cannot reply: original message carries neither Reply-To nor From".into(),
                    ErrorCode::MessageParseError
                )
            })?;
        builder.recipients.push(target.retagged(RecipientKind::To));

        if reply_all {
            for recipient in original.recipients() {
                let skip = recipient.kind == RecipientKind::Bcc
                    || recipient.address == target.address;
                if !skip {
                    builder.recipients.push(recipient.clone());
                }
            }
        }

        if quote_original {
            if let Some(text) = original.plain_text() {
                builder.text = Some(quote_plain_text(text));
            }
            if let Some(html) = original.html_text() {
                builder.text_html = Some(format!(
                    "<blockquote style=\"margin:0 0 0 .8ex;border-left:1px #ccc solid;padding-left:1ex\">{}</blockquote>",
                    html
                ));
            }
        }

        Ok(builder)
    }

    /// Seeds a builder that forwards an existing wire-format message.
    ///
    /// The original message rides along untouched and is emitted as a
    /// `message/rfc822` part at conversion time; bodies and attachments set
    /// on this builder become the cover note.
    pub fn forwarding(raw_message: &[u8]) -> MailForgeResult<EmailBuilder> {
        let original = message_to_email(raw_message)?;
        let mut builder = EmailBuilder::new();
        builder.subject = Some(prefixed_subject("Fwd: ", original.subject().unwrap_or("")));
        builder.message_to_forward = Some(Arc::new(raw_message.to_vec()));
        Ok(builder)
    }

    /// Pins the Message-ID the mail will carry instead of a generated one.
    pub fn fixing_message_id(mut self, id: &str) -> EmailBuilder {
        self.id = if id.is_empty() {
            None
        } else {
            Some(id.to_string())
        };
        self
    }

    pub fn from(self, name: Option<&str>, address: &str) -> MailForgeResult<EmailBuilder> {
        let recipient = Recipient::new(name, address, RecipientKind::To)?;
        Ok(self.from_recipient(recipient))
    }

    pub fn from_recipient(mut self, recipient: Recipient) -> EmailBuilder {
        self.from_recipient = Some(recipient);
        self
    }

    pub fn with_reply_to(self, name: Option<&str>, address: &str) -> MailForgeResult<EmailBuilder> {
        let recipient = Recipient::new(name, address, RecipientKind::To)?;
        Ok(self.with_reply_to_recipient(recipient))
    }

    pub fn with_reply_to_recipient(mut self, recipient: Recipient) -> EmailBuilder {
        self.reply_to_recipient = Some(recipient);
        self
    }

    pub fn with_bounce_to(self, name: Option<&str>, address: &str) -> MailForgeResult<EmailBuilder> {
        let recipient = Recipient::new(name, address, RecipientKind::To)?;
        Ok(self.with_bounce_to_recipient(recipient))
    }

    pub fn with_bounce_to_recipient(mut self, recipient: Recipient) -> EmailBuilder {
        self.bounce_to_recipient = Some(recipient);
        self
    }

    pub fn to(self, name: Option<&str>, address: &str) -> MailForgeResult<EmailBuilder> {
        self.add_recipient(name, address, RecipientKind::To)
    }

    pub fn cc(self, name: Option<&str>, address: &str) -> MailForgeResult<EmailBuilder> {
        self.add_recipient(name, address, RecipientKind::Cc)
    }

    pub fn bcc(self, name: Option<&str>, address: &str) -> MailForgeResult<EmailBuilder> {
        self.add_recipient(name, address, RecipientKind::Bcc)
    }

    fn add_recipient(
        mut self,
        name: Option<&str>,
        address: &str,
        kind: RecipientKind,
    ) -> MailForgeResult<EmailBuilder> {
        self.recipients.push(Recipient::new(name, address, kind)?);
        Ok(self)
    }

    /// Appends an already-constructed recipient, preserving its kind tag.
    pub fn with_recipient(mut self, recipient: Recipient) -> EmailBuilder {
        self.recipients.push(recipient);
        self
    }

    pub fn with_subject(mut self, subject: &str) -> EmailBuilder {
        self.subject = Some(subject.to_string());
        self
    }

    pub fn with_plain_text(mut self, text: &str) -> EmailBuilder {
        self.text = Some(text.to_string());
        self
    }

    pub fn with_html_text(mut self, html: &str) -> EmailBuilder {
        self.text_html = Some(html.to_string());
        self
    }

    /// Sets calendar content. Method and text only exist together; empty
    /// text is rejected here rather than surfacing later as a malformed
    /// message. Use [`clear_calendar_text`](EmailBuilder::clear_calendar_text)
    /// to drop both.
    pub fn with_calendar_text(
        mut self,
        method: CalendarMethod,
        text_calendar: &str,
    ) -> MailForgeResult<EmailBuilder> {
        if text_calendar.is_empty() {
            return Err(raise_error!(
                "Calendar text cannot be empty; use clear_calendar_text to remove calendar content"
                    .into(),
                ErrorCode::InvalidParameter
            ));
        }
        self.calendar_method = Some(method);
        self.text_calendar = Some(text_calendar.to_string());
        Ok(self)
    }

    /// Appends a regular attachment. An empty name is tolerated (stored as
    /// the empty string) but the content must carry a MIME type.
    pub fn with_attachment(
        mut self,
        resource: AttachmentResource,
    ) -> MailForgeResult<EmailBuilder> {
        if resource.mime_type.is_empty() {
            return Err(raise_error!(
                format!("Attachment '{}' is missing a MIME type", resource.name),
                ErrorCode::InvalidParameter
            ));
        }
        self.attachments.push(resource);
        Ok(self)
    }

    /// Appends an embedded (inline) image. The name doubles as the
    /// Content-ID referenced from the HTML body (`cid:name`), so it must be
    /// non-empty.
    pub fn with_embedded_image(
        mut self,
        resource: AttachmentResource,
    ) -> MailForgeResult<EmailBuilder> {
        if resource.name.is_empty() {
            return Err(raise_error!(
                "Embedded image name cannot be empty; it is used as the Content-ID".into(),
                ErrorCode::InvalidParameter
            ));
        }
        if resource.mime_type.is_empty() {
            return Err(raise_error!(
                format!("Embedded image '{}' is missing a MIME type", resource.name),
                ErrorCode::InvalidParameter
            ));
        }
        self.embedded_images.push(resource);
        Ok(self)
    }

    /// Sets a custom header; setting the same name again overwrites.
    pub fn with_header(mut self, name: &str, value: &str) -> MailForgeResult<EmailBuilder> {
        if name.is_empty() {
            return Err(raise_error!(
                "Header name cannot be empty".into(),
                ErrorCode::InvalidParameter
            ));
        }
        self.headers.insert(name.to_string(), value.to_string());
        Ok(self)
    }

    /// Requests a read receipt (Disposition-Notification-To). Without an
    /// explicit target the build step resolves it to reply-to, then from.
    pub fn with_disposition_notification_to(mut self) -> EmailBuilder {
        self.use_disposition_notification_to = true;
        self
    }

    pub fn with_disposition_notification_to_recipient(mut self, recipient: Recipient) -> EmailBuilder {
        self.use_disposition_notification_to = true;
        self.disposition_notification_to = Some(recipient);
        self
    }

    /// Requests a delivery receipt (Return-Receipt-To), resolved like the
    /// disposition notification target.
    pub fn with_return_receipt_to(mut self) -> EmailBuilder {
        self.use_return_receipt_to = true;
        self
    }

    pub fn with_return_receipt_to_recipient(mut self, recipient: Recipient) -> EmailBuilder {
        self.use_return_receipt_to = true;
        self.return_receipt_to = Some(recipient);
        self
    }

    pub fn clear_from(mut self) -> EmailBuilder {
        self.from_recipient = None;
        self
    }

    pub fn clear_reply_to(mut self) -> EmailBuilder {
        self.reply_to_recipient = None;
        self
    }

    pub fn clear_bounce_to(mut self) -> EmailBuilder {
        self.bounce_to_recipient = None;
        self
    }

    pub fn clear_subject(mut self) -> EmailBuilder {
        self.subject = None;
        self
    }

    pub fn clear_plain_text(mut self) -> EmailBuilder {
        self.text = None;
        self
    }

    pub fn clear_html_text(mut self) -> EmailBuilder {
        self.text_html = None;
        self
    }

    /// Drops both the calendar method and text, never one of the two.
    pub fn clear_calendar_text(mut self) -> EmailBuilder {
        self.calendar_method = None;
        self.text_calendar = None;
        self
    }

    pub fn clear_recipients(mut self) -> EmailBuilder {
        self.recipients.clear();
        self
    }

    pub fn clear_attachments(mut self) -> EmailBuilder {
        self.attachments.clear();
        self
    }

    pub fn clear_embedded_images(mut self) -> EmailBuilder {
        self.embedded_images.clear();
        self
    }

    pub fn clear_headers(mut self) -> EmailBuilder {
        self.headers.clear();
        self
    }

    pub fn clear_disposition_notification_to(mut self) -> EmailBuilder {
        self.use_disposition_notification_to = false;
        self.disposition_notification_to = None;
        self
    }

    pub fn clear_return_receipt_to(mut self) -> EmailBuilder {
        self.use_return_receipt_to = false;
        self.return_receipt_to = None;
        self
    }

    /// Freezes the accumulated state into an immutable [`Email`] snapshot.
    pub fn build_email(&self) -> Email {
        Email::from_builder(self)
    }

}

/// Prepends `prefix` unless the subject already starts with it,
/// case-insensitively.
fn prefixed_subject(prefix: &str, subject: &str) -> String {
    if subject
        .to_ascii_lowercase()
        .starts_with(&prefix.to_ascii_lowercase())
    {
        subject.to_string()
    } else {
        format!("{}{}", prefix, subject)
    }
}

fn quote_plain_text(original: &str) -> String {
    original
        .lines()
        .map(|line| format!("> {}", line))
        .collect::<Vec<_>>()
        .join("\n")
}
