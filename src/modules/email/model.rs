use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::modules::email::builder::EmailBuilder;
use crate::modules::email::{AttachmentResource, CalendarMethod, Recipient};

/// A fully specified email message, immutable after construction.
///
/// Created exclusively by [`EmailBuilder::build_email`]; every collection is
/// exposed as a read-only view and no setter exists. The protocol-assigned
/// message id of a sent mail travels back through
/// [`SendOutcome`](crate::SendOutcome) instead of mutating this value.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Email {
    id: Option<String>,
    from_recipient: Option<Recipient>,
    reply_to_recipient: Option<Recipient>,
    bounce_to_recipient: Option<Recipient>,
    text: Option<String>,
    text_html: Option<String>,
    calendar_method: Option<CalendarMethod>,
    text_calendar: Option<String>,
    subject: Option<String>,
    recipients: Vec<Recipient>,
    embedded_images: Vec<AttachmentResource>,
    attachments: Vec<AttachmentResource>,
    headers: BTreeMap<String, String>,
    use_disposition_notification_to: bool,
    disposition_notification_to: Option<Recipient>,
    use_return_receipt_to: bool,
    return_receipt_to: Option<Recipient>,
    message_to_forward: Option<Arc<Vec<u8>>>,
}

impl Email {
    /// Transfers everything from the builder, resolving the notification
    /// targets exactly once: an enabled flag without an explicit target
    /// falls back to the reply-to recipient, then to the from recipient.
    pub(crate) fn from_builder(builder: &EmailBuilder) -> Email {
        let fallback_target = || {
            builder
                .reply_to_recipient
                .as_ref()
                .or(builder.from_recipient.as_ref())
                .cloned()
        };

        let mut disposition_notification_to = builder.disposition_notification_to.clone();
        if builder.use_disposition_notification_to && disposition_notification_to.is_none() {
            disposition_notification_to = fallback_target();
        }

        let mut return_receipt_to = builder.return_receipt_to.clone();
        if builder.use_return_receipt_to && return_receipt_to.is_none() {
            return_receipt_to = fallback_target();
        }

        Email {
            id: builder.id.clone(),
            from_recipient: builder.from_recipient.clone(),
            reply_to_recipient: builder.reply_to_recipient.clone(),
            bounce_to_recipient: builder.bounce_to_recipient.clone(),
            text: builder.text.clone(),
            text_html: builder.text_html.clone(),
            calendar_method: builder.calendar_method,
            text_calendar: builder.text_calendar.clone(),
            subject: builder.subject.clone(),
            recipients: builder.recipients.clone(),
            embedded_images: builder.embedded_images.clone(),
            attachments: builder.attachments.clone(),
            headers: builder.headers.clone(),
            use_disposition_notification_to: builder.use_disposition_notification_to,
            disposition_notification_to,
            use_return_receipt_to: builder.use_return_receipt_to,
            return_receipt_to,
            message_to_forward: builder.message_to_forward.clone(),
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn from_recipient(&self) -> Option<&Recipient> {
        self.from_recipient.as_ref()
    }

    pub fn reply_to_recipient(&self) -> Option<&Recipient> {
        self.reply_to_recipient.as_ref()
    }

    pub fn bounce_to_recipient(&self) -> Option<&Recipient> {
        self.bounce_to_recipient.as_ref()
    }

    pub fn plain_text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn html_text(&self) -> Option<&str> {
        self.text_html.as_deref()
    }

    pub fn calendar_method(&self) -> Option<CalendarMethod> {
        self.calendar_method
    }

    pub fn calendar_text(&self) -> Option<&str> {
        self.text_calendar.as_deref()
    }

    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    /// All recipients in insertion order, To/Cc/Bcc mixed, duplicates kept.
    pub fn recipients(&self) -> &[Recipient] {
        &self.recipients
    }

    pub fn attachments(&self) -> &[AttachmentResource] {
        &self.attachments
    }

    pub fn embedded_images(&self) -> &[AttachmentResource] {
        &self.embedded_images
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub fn use_disposition_notification_to(&self) -> bool {
        self.use_disposition_notification_to
    }

    pub fn disposition_notification_to(&self) -> Option<&Recipient> {
        self.disposition_notification_to.as_ref()
    }

    pub fn use_return_receipt_to(&self) -> bool {
        self.use_return_receipt_to
    }

    pub fn return_receipt_to(&self) -> Option<&Recipient> {
        self.return_receipt_to.as_ref()
    }

    /// The raw wire-format message being forwarded, if this email was seeded
    /// through [`EmailBuilder::forwarding`].
    pub fn message_to_forward(&self) -> Option<&[u8]> {
        self.message_to_forward.as_deref().map(Vec::as_slice)
    }
}
