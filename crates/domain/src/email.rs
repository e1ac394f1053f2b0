//! Email send request wire types and the declarative validation schema
//! that guards the send path (spec §4.5).

use thiserror::Error;
use validator::ValidateEmail;

/// Generated from `proto/email.proto` by `prost-build` (see `build.rs`).
/// This is the wire shape produced to and consumed from the partitioned
/// log — the spec calls it "protobuf-shaped" because the request travels
/// the network as this exact structure.
pub mod proto {
    #![allow(clippy::doc_markdown)]
    include!(concat!(env!("OUT_DIR"), "/chatcore.email.rs"));
}

pub use proto::{
    Address, Attachment, ContentMode, EmailSendRequest, Header, Importance, InteractionMode,
    RawContent,
};

/// Header names the mapping table (spec §4.5) permits through to the
/// rebuilt SMTP message. Anything else fails validation.
pub const HEADER_WHITELIST: &[&str] = &[
    "x-priority",
    "x-mailer",
    "x-campaign-id",
    "x-entity-ref-id",
    "in-reply-to",
    "references",
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EmailValidationError {
    #[error("message_id must not be empty")]
    MissingMessageId,

    #[error("at least one recipient (to/cc/bcc) is required")]
    NoRecipients,

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("content_mode=TEMPLATE is not implemented")]
    TemplateContentModeUnsupported,

    #[error("attachments are not implemented")]
    AttachmentsUnsupported,

    #[error("unrecognised header '{0}'")]
    HeaderNotWhitelisted(String),

    #[error("content_mode=RAW requires non-empty raw.text or raw.html")]
    EmptyRawContent,
}

fn validate_address(addr: &Address, field: &'static str) -> Result<(), EmailValidationError> {
    if addr.email.is_empty() || !addr.email.validate_email() {
        return Err(EmailValidationError::InvalidAddress(format!(
            "{field}: '{}'",
            addr.email
        )));
    }
    Ok(())
}

/// Validate a send request against the declarative schema: fields,
/// address shape, content mode, importance enumeration, header
/// whitelist. Mirrors the rejection list in spec §4.5's mapping table.
pub fn validate_send_request(req: &EmailSendRequest) -> Result<(), EmailValidationError> {
    if req.message_id.trim().is_empty() {
        return Err(EmailValidationError::MissingMessageId);
    }

    if let Some(from) = &req.from {
        validate_address(from, "from")?;
    }
    for to in &req.to {
        validate_address(to, "to")?;
    }
    for cc in &req.cc {
        validate_address(cc, "cc")?;
    }
    for bcc in &req.bcc {
        validate_address(bcc, "bcc")?;
    }
    if let Some(reply_to) = &req.reply_to {
        validate_address(reply_to, "reply_to")?;
    }
    for mdn in &req.mdn_to {
        validate_address(mdn, "mdn_to")?;
    }

    if req.to.is_empty() && req.cc.is_empty() && req.bcc.is_empty() {
        return Err(EmailValidationError::NoRecipients);
    }

    match ContentMode::try_from(req.content_mode) {
        Ok(ContentMode::Template) => return Err(EmailValidationError::TemplateContentModeUnsupported),
        Ok(ContentMode::Raw) | Ok(ContentMode::Unspecified) => {
            let raw = req.raw.as_ref();
            let has_text = raw.map(|r| !r.text.is_empty()).unwrap_or(false);
            let has_html = raw.map(|r| !r.html.is_empty()).unwrap_or(false);
            if !has_text && !has_html {
                return Err(EmailValidationError::EmptyRawContent);
            }
        }
        Err(_) => return Err(EmailValidationError::EmptyRawContent),
    }

    if !req.attachments.is_empty() {
        return Err(EmailValidationError::AttachmentsUnsupported);
    }

    for header in &req.headers {
        let canonical = header.name.to_ascii_lowercase();
        if !HEADER_WHITELIST.contains(&canonical.as_str()) {
            return Err(EmailValidationError::HeaderNotWhitelisted(
                header.name.clone(),
            ));
        }
    }

    Ok(())
}

/// An in-flight send request moving through the worker pool: the
/// validated wire request plus a single-shot channel the pool guarantees
/// to complete exactly once with the final error-or-none.
#[derive(Debug)]
pub struct EmailRequest {
    pub send_options: EmailSendRequest,
    pub response: tokio::sync::oneshot::Sender<Option<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(email: &str) -> Address {
        Address {
            email: email.to_string(),
            name: String::new(),
        }
    }

    fn valid_request() -> EmailSendRequest {
        EmailSendRequest {
            message_id: "msg-1".into(),
            created_at_epoch_millis: 0,
            from: Some(addr("alice@example.com")),
            to: vec![addr("bob@example.com")],
            cc: vec![],
            bcc: vec![],
            reply_to: None,
            mdn_to: vec![],
            subject: "Hi".into(),
            content_mode: ContentMode::Raw as i32,
            raw: Some(RawContent {
                text: "Hello".into(),
                html: String::new(),
            }),
            headers: vec![],
            interaction_mode: InteractionMode::Automated as i32,
            importance: Importance::Normal as i32,
            attachments: vec![],
        }
    }

    #[test]
    fn happy_path_request_validates() {
        assert!(validate_send_request(&valid_request()).is_ok());
    }

    #[test]
    fn rejects_missing_message_id() {
        let mut req = valid_request();
        req.message_id = String::new();
        assert_eq!(
            validate_send_request(&req),
            Err(EmailValidationError::MissingMessageId)
        );
    }

    #[test]
    fn rejects_no_recipients() {
        let mut req = valid_request();
        req.to = vec![];
        assert_eq!(
            validate_send_request(&req),
            Err(EmailValidationError::NoRecipients)
        );
    }

    #[test]
    fn rejects_malformed_address() {
        let mut req = valid_request();
        req.to = vec![addr("not-an-email")];
        assert!(matches!(
            validate_send_request(&req),
            Err(EmailValidationError::InvalidAddress(_))
        ));
    }

    #[test]
    fn rejects_template_content_mode() {
        let mut req = valid_request();
        req.content_mode = ContentMode::Template as i32;
        assert_eq!(
            validate_send_request(&req),
            Err(EmailValidationError::TemplateContentModeUnsupported)
        );
    }

    #[test]
    fn rejects_attachments() {
        let mut req = valid_request();
        req.attachments = vec![Attachment {
            filename: "a.txt".into(),
            content: vec![1, 2, 3],
            content_type: "text/plain".into(),
        }];
        assert_eq!(
            validate_send_request(&req),
            Err(EmailValidationError::AttachmentsUnsupported)
        );
    }

    #[test]
    fn rejects_header_not_on_whitelist() {
        let mut req = valid_request();
        req.headers = vec![Header {
            name: "X-Rogue".into(),
            values: vec!["v".into()],
        }];
        assert_eq!(
            validate_send_request(&req),
            Err(EmailValidationError::HeaderNotWhitelisted("X-Rogue".into()))
        );
    }

    #[test]
    fn whitelisted_header_is_accepted_case_insensitively() {
        let mut req = valid_request();
        req.headers = vec![Header {
            name: "X-Priority".into(),
            values: vec!["1".into()],
        }];
        assert!(validate_send_request(&req).is_ok());
    }

    #[test]
    fn rejects_empty_raw_content() {
        let mut req = valid_request();
        req.raw = Some(RawContent {
            text: String::new(),
            html: String::new(),
        });
        assert_eq!(
            validate_send_request(&req),
            Err(EmailValidationError::EmptyRawContent)
        );
    }
}
