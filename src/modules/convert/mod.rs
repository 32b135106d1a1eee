//! Adapter over the wire-format codec: `mail-send`'s `MessageBuilder` for
//! serialization and `mail-parser`'s `MessageParser` for parsing.
//!
//! The mapping is lossless for everything that lives in the message body.
//! Two fields intentionally do not round-trip: the bounce-to recipient
//! (SMTP envelope only, never part of the message) and the message id
//! (protocol-assigned at send time, ignored when parsing).

use std::borrow::Cow;

use mail_parser::{Address as ParsedAddress, HeaderName, MessageParser, MimeHeaders};
use mail_send::mail_builder::headers::address::{Address, EmailAddress};
use mail_send::mail_builder::headers::raw::Raw;
use mail_send::mail_builder::mime::BodyPart;
use mail_send::mail_builder::MessageBuilder;

use crate::modules::email::builder::EmailBuilder;
use crate::modules::email::{
    AttachmentResource, CalendarMethod, Email, Recipient, RecipientKind,
};
use crate::modules::error::{code::ErrorCode, MailForgeResult};
use crate::raise_error;

const FORWARDED_ATTACHMENT_NAME: &str = "forwarded.eml";

/// Serializes an [`Email`] into a `MessageBuilder` ready for delivery or
/// for [`MessageBuilder::write_to_vec`].
pub fn email_to_message(email: &Email) -> MailForgeResult<MessageBuilder<'static>> {
    let mut builder = MessageBuilder::new();

    if let Some(id) = email.id() {
        builder = builder.message_id(id.to_string());
    }
    if let Some(from) = email.from_recipient() {
        builder = builder.from(to_address(from));
    }
    if let Some(reply_to) = email.reply_to_recipient() {
        builder = builder.reply_to(to_address(reply_to));
    }

    let collect = |kind: RecipientKind| -> Vec<Address<'static>> {
        email
            .recipients()
            .iter()
            .filter(|r| r.kind == kind)
            .map(to_address)
            .collect()
    };
    let to = collect(RecipientKind::To);
    if !to.is_empty() {
        builder = builder.to(Address::new_list(to));
    }
    let cc = collect(RecipientKind::Cc);
    if !cc.is_empty() {
        builder = builder.cc(Address::new_list(cc));
    }
    let bcc = collect(RecipientKind::Bcc);
    if !bcc.is_empty() {
        builder = builder.bcc(Address::new_list(bcc));
    }

    if let Some(subject) = email.subject() {
        builder = builder.subject(subject.to_string());
    }
    if let Some(text) = email.plain_text() {
        builder = builder.text_body(text.to_string());
    }
    if let Some(html) = email.html_text() {
        builder = builder.html_body(html.to_string());
    }

    if let (Some(method), Some(calendar)) = (email.calendar_method(), email.calendar_text()) {
        builder = builder.attachment(
            format!("text/calendar; method={}", method),
            "invite.ics",
            BodyPart::Binary(Cow::Owned(calendar.as_bytes().to_vec())),
        );
    }

    for image in email.embedded_images() {
        builder = builder.inline(
            image.mime_type.clone(),
            image.name.clone(),
            BodyPart::Binary(Cow::Owned(image.content_bytes().to_vec())),
        );
    }
    for attachment in email.attachments() {
        builder = builder.attachment(
            attachment.mime_type.clone(),
            attachment.name.clone(),
            BodyPart::Binary(Cow::Owned(attachment.content_bytes().to_vec())),
        );
    }
    if let Some(raw) = email.message_to_forward() {
        builder = builder.attachment(
            "message/rfc822",
            FORWARDED_ATTACHMENT_NAME,
            BodyPart::Binary(Cow::Owned(raw.to_vec())),
        );
    }

    if let Some(target) = email.disposition_notification_to() {
        builder = builder.header(
            "Disposition-Notification-To",
            Raw::new(target.to_string()),
        );
    }
    if let Some(target) = email.return_receipt_to() {
        builder = builder.header("Return-Receipt-To", Raw::new(target.to_string()));
    }
    for (name, value) in email.headers() {
        builder = builder.header(name.clone(), Raw::new(value.clone()));
    }

    Ok(builder)
}

/// Serializes an [`Email`] to its RFC 5322 byte representation.
pub fn email_to_bytes(email: &Email) -> MailForgeResult<Vec<u8>> {
    email_to_message(email)?.write_to_vec().map_err(|e| {
        raise_error!(
            format!("Failed to serialize message: {}", e),
            ErrorCode::InternalError
        )
    })
}

/// Parses a wire-format message back into an [`Email`].
///
/// The message id is never populated and the bounce-to recipient cannot be
/// recovered; see the module docs.
pub fn message_to_email(raw: &[u8]) -> MailForgeResult<Email> {
    let message = MessageParser::default().parse(raw).ok_or_else(|| {
        raise_error!(
            "Invalid wire format: failed to parse message (RFC 5322 compliance required)".into(),
            ErrorCode::MessageParseError
        )
    })?;

    let mut builder = EmailBuilder::new();

    builder.from_recipient = first_recipient(message.from(), RecipientKind::To);
    builder.reply_to_recipient = first_recipient(message.reply_to(), RecipientKind::To);
    for kind_and_source in [
        (RecipientKind::To, message.to()),
        (RecipientKind::Cc, message.cc()),
        (RecipientKind::Bcc, message.bcc()),
    ] {
        let (kind, source) = kind_and_source;
        builder.recipients.extend(all_recipients(source, kind));
    }

    builder.subject = message.subject().map(String::from);
    if !message.text_body.is_empty() {
        builder.text = message.body_text(0).map(Cow::into_owned);
    }
    if !message.html_body.is_empty() {
        builder.text_html = message.body_html(0).map(Cow::into_owned);
    }

    for part in message.attachments() {
        let content_type = part.content_type();
        let mime_type = content_type
            .map(|ct| match ct.subtype() {
                Some(subtype) => format!("{}/{}", ct.ctype(), subtype),
                None => ct.ctype().to_string(),
            })
            .unwrap_or_else(|| "application/octet-stream".to_string());

        if mime_type.eq_ignore_ascii_case("text/calendar") {
            let method = content_type
                .and_then(|ct| ct.attribute("method"))
                .and_then(|m| m.parse::<CalendarMethod>().ok());
            if let Some(method) = method {
                builder.calendar_method = Some(method);
                builder.text_calendar =
                    Some(String::from_utf8_lossy(part.contents()).into_owned());
                continue;
            }
        }

        if mime_type.eq_ignore_ascii_case("message/rfc822")
            && part.attachment_name() == Some(FORWARDED_ATTACHMENT_NAME)
        {
            builder.message_to_forward =
                Some(std::sync::Arc::new(part.contents().to_vec()));
            continue;
        }

        let inline = part.content_id().is_some()
            || part.content_disposition().is_some_and(|cd| cd.is_inline());
        if inline {
            let name = part
                .content_id()
                .or_else(|| part.attachment_name())
                .unwrap_or_default()
                .to_string();
            builder.embedded_images.push(AttachmentResource::new(
                &name,
                part.contents().to_vec(),
                &mime_type,
            ));
        } else {
            builder.attachments.push(AttachmentResource::new(
                part.attachment_name().unwrap_or_default(),
                part.contents().to_vec(),
                &mime_type,
            ));
        }
    }

    // Every header this codec does not emit itself lands in the custom
    // header map; the receipt headers fold back into their typed fields.
    // Disposition-Notification-To has a dedicated parsed variant, while
    // Return-Receipt-To comes through as an unrecognized header.
    for header in message.headers() {
        match &header.name {
            HeaderName::DispositionNotificationTo => {
                if let Some(target) = header.value.as_text().and_then(parse_mailbox) {
                    builder.use_disposition_notification_to = true;
                    builder.disposition_notification_to = Some(target);
                }
            }
            HeaderName::Other(name) => {
                let Some(value) = header.value.as_text() else {
                    continue;
                };
                if name.eq_ignore_ascii_case("Return-Receipt-To") {
                    if let Some(target) = parse_mailbox(value) {
                        builder.use_return_receipt_to = true;
                        builder.return_receipt_to = Some(target);
                    }
                    continue;
                }
                builder
                    .headers
                    .insert(name.to_string(), value.trim().to_string());
            }
            _ => {}
        }
    }

    Ok(builder.build_email())
}

fn to_address(recipient: &Recipient) -> Address<'static> {
    Address::Address(EmailAddress {
        name: recipient.name.clone().map(Cow::Owned),
        email: Cow::Owned(recipient.address.clone()),
    })
}

fn first_recipient(
    address: Option<&ParsedAddress<'_>>,
    kind: RecipientKind,
) -> Option<Recipient> {
    all_recipients(address, kind).into_iter().next()
}

fn all_recipients(address: Option<&ParsedAddress<'_>>, kind: RecipientKind) -> Vec<Recipient> {
    let mut result = Vec::new();
    let Some(address) = address else {
        return result;
    };
    let entries: Vec<&mail_parser::Addr<'_>> = match address {
        ParsedAddress::List(list) => list.iter().collect(),
        ParsedAddress::Group(groups) => groups
            .iter()
            .flat_map(|group| group.addresses.iter())
            .collect(),
    };
    for entry in entries {
        if let Some(addr) = entry.address.as_deref() {
            result.push(Recipient {
                name: entry
                    .name
                    .as_deref()
                    .filter(|n| !n.is_empty())
                    .map(String::from),
                address: addr.to_string(),
                kind,
            });
        }
    }
    result
}

/// Parses `Display Name <user@host>` or a bare address out of a raw header
/// value. Notification targets are always single mailboxes.
fn parse_mailbox(value: &str) -> Option<Recipient> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    let recipient = match (value.find('<'), value.rfind('>')) {
        (Some(open), Some(close)) if open < close => {
            let name = value[..open].trim().trim_matches('"');
            Recipient {
                name: if name.is_empty() {
                    None
                } else {
                    Some(name.to_string())
                },
                address: value[open + 1..close].trim().to_string(),
                kind: RecipientKind::To,
            }
        }
        _ => Recipient {
            name: None,
            address: value.to_string(),
            kind: RecipientKind::To,
        },
    };
    if recipient.address.is_empty() {
        None
    } else {
        Some(recipient)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::email::builder::EmailBuilder;

    fn dummy_email(with_bounce_to: bool) -> crate::modules::email::Email {
        let mut builder = EmailBuilder::new()
            .from(Some("Moo Shmoo"), "moo.shmoo@example.com")
            .unwrap()
            .with_reply_to(Some("lollypop"), "lo.pop@pretzelfun.example")
            .unwrap()
            .to(Some("C. Cane"), "candycane@candyshop.example")
            .unwrap()
            .cc(None, "mo@shmo.example")
            .unwrap()
            .bcc(Some("Moo"), "moo@shmoo.example")
            .unwrap()
            .with_subject("hey")
            .with_plain_text("We should meet up!")
            .with_html_text("<b>We should meet up!</b>")
            .with_header("X-Dummy-Header", "dummy value")
            .unwrap()
            .with_attachment(AttachmentResource::new(
                "dresscode.txt",
                &b"Black Tie Optional"[..],
                "text/plain",
            ))
            .unwrap()
            .with_embedded_image(AttachmentResource::new(
                "thumbsup",
                vec![137u8, 80, 78, 71, 13, 10, 26, 10],
                "image/png",
            ))
            .unwrap();
        if with_bounce_to {
            builder = builder
                .with_bounce_to(None, "bounce.target@example.com")
                .unwrap();
        }
        builder.build_email()
    }

    #[test]
    fn round_trip_preserves_all_body_level_fields() {
        // Bounce-to lives on the envelope only, so leave it out to compare
        // full value equality, mirroring how callers diff round-tripped
        // messages.
        let email = dummy_email(false);
        let bytes = email_to_bytes(&email).unwrap();
        let reparsed = message_to_email(&bytes).unwrap();
        assert_eq!(reparsed, email);
    }

    #[test]
    fn bounce_to_is_not_part_of_the_wire_message() {
        let email = dummy_email(true);
        let bytes = email_to_bytes(&email).unwrap();
        let reparsed = message_to_email(&bytes).unwrap();
        assert_eq!(reparsed.bounce_to_recipient(), None);
    }

    #[test]
    fn message_id_is_not_recovered_from_the_wire() {
        let email = dummy_email(false);
        let bytes = email_to_bytes(&email).unwrap();
        let reparsed = message_to_email(&bytes).unwrap();
        assert_eq!(reparsed.id(), None);
    }

    #[test]
    fn notification_headers_round_trip() {
        let email = EmailBuilder::new()
            .from(Some("Moo Shmoo"), "moo.shmoo@example.com")
            .unwrap()
            .to(None, "candycane@candyshop.example")
            .unwrap()
            .with_disposition_notification_to()
            .with_return_receipt_to()
            .build_email();
        let bytes = email_to_bytes(&email).unwrap();
        let reparsed = message_to_email(&bytes).unwrap();
        assert!(reparsed.use_disposition_notification_to());
        assert_eq!(
            reparsed.disposition_notification_to().unwrap().address,
            "moo.shmoo@example.com"
        );
        assert!(reparsed.use_return_receipt_to());
        assert_eq!(
            reparsed.return_receipt_to().unwrap().address,
            "moo.shmoo@example.com"
        );
        // The receipt headers are typed fields, never custom headers.
        assert!(reparsed.headers().is_empty());
    }

    #[test]
    fn calendar_part_round_trips_with_its_method() {
        let email = EmailBuilder::new()
            .from(None, "moo.shmoo@example.com")
            .unwrap()
            .to(None, "candycane@candyshop.example")
            .unwrap()
            .with_calendar_text(
                CalendarMethod::Request,
                "BEGIN:VCALENDAR\r\nMETHOD:REQUEST\r\nEND:VCALENDAR",
            )
            .unwrap()
            .build_email();
        let bytes = email_to_bytes(&email).unwrap();
        let reparsed = message_to_email(&bytes).unwrap();
        assert_eq!(reparsed.calendar_method(), Some(CalendarMethod::Request));
        assert!(reparsed
            .calendar_text()
            .unwrap()
            .contains("METHOD:REQUEST"));
    }

    #[test]
    fn unparseable_input_is_a_validation_error() {
        let err = message_to_email(b"").unwrap_err();
        assert_eq!(err.code(), ErrorCode::MessageParseError);
    }
}
