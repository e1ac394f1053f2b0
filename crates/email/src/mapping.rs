//! The protobuf -> SMTP mapping table (spec §4.5, "authoritative").
//!
//! Builds an outbound SMTP message from a validated `EmailSendRequest`.
//! Callers must run `chatcore_domain::email::validate_send_request` first
//! — this module assumes the request already satisfies that schema
//! (header whitelist, content mode, no attachments) and only maps
//! shapes, it does not re-validate them.

use chatcore_config::EmailConfig;
use chatcore_domain::email::{Address, ContentMode, EmailSendRequest, Importance, InteractionMode};
use lettre::address::Envelope;
use lettre::message::{header, Mailbox, MultiPart, SinglePart};
use lettre::Message;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum MappingError {
    #[error("malformed address '{0}': {1}")]
    BadAddress(String, String),

    #[error("failed to build message: {0}")]
    BuildFailed(String),

    #[error("DKIM signing failed: {0}")]
    DkimSigningFailed(String),
}

fn mailbox(addr: &Address) -> Result<Mailbox, MappingError> {
    let parsed: lettre::Address = addr
        .email
        .parse()
        .map_err(|e| MappingError::BadAddress(addr.email.clone(), format!("{e}")))?;
    Ok(if addr.name.is_empty() {
        Mailbox::new(None, parsed)
    } else {
        Mailbox::new(Some(addr.name.clone()), parsed)
    })
}

/// Map `importance` to the five-value header vocabulary from spec §4.5.
/// `Unspecified` renders as `normal` (a sane SMTP default); callers that
/// need to know the request never explicitly set importance should check
/// `req.importance` directly rather than the rendered header.
fn importance_header_value(importance: Importance) -> &'static str {
    match importance {
        Importance::Low => "low",
        Importance::NonUrgent => "non-urgent",
        Importance::Normal | Importance::Unspecified => "normal",
        Importance::High => "high",
        Importance::Urgent => "urgent",
    }
}

/// Global, non-request fields carried on every outbound message.
pub struct GlobalHeaders {
    pub organization: String,
    pub user_agent: String,
}

/// A raw header whose name is only known at runtime (the whitelist and
/// the global-config fields are both dynamic), unlike `lettre`'s typed
/// header structs.
#[derive(Clone)]
struct RawHeader {
    name: String,
    value: String,
}

impl header::Header for RawHeader {
    fn name() -> header::HeaderName {
        // `lettre` only calls this to look up a header by its static
        // name; every instance writes its own `name` via `display`
        // below, so this fallback is never observed on the wire.
        header::HeaderName::new_from_ascii_str("X-Chatcore-Dynamic")
    }

    fn parse(_s: &str) -> Result<Self, header::HeaderError> {
        Err(header::HeaderError::Parse)
    }

    fn display(&self) -> header::HeaderValue {
        header::HeaderValue::new(
            header::HeaderName::new_from_ascii_str(&self.name),
            self.value.clone(),
        )
    }
}

fn raw_header(name: &str, value: &str) -> RawHeader {
    RawHeader {
        name: name.to_string(),
        value: value.to_string(),
    }
}

/// The fully mapped, send-ready message: the SMTP envelope (used for
/// `MAIL FROM`/`RCPT TO`) plus the raw, possibly DKIM-signed, message
/// bytes. Carried separately from a typed `lettre::Message` because
/// DKIM signing must see the exact bytes that go over the wire, and a
/// signed message can't be re-parsed back into `lettre`'s builder types.
pub struct OutboundMessage {
    pub envelope: Envelope,
    pub raw: Vec<u8>,
}

/// Build the outbound SMTP message for one validated send request. When
/// `dkim` is set, the computed `DKIM-Signature` header is prepended to
/// the formatted message; a signing failure fails the whole record, per
/// spec §4.5's mapping table.
pub fn build_smtp_message(
    req: &EmailSendRequest,
    globals: &GlobalHeaders,
    dkim: Option<&DkimSigningKey>,
) -> Result<OutboundMessage, MappingError> {
    let from = req
        .from
        .as_ref()
        .ok_or_else(|| MappingError::BuildFailed("from address missing after defaulting".into()))?;

    let mut builder = Message::builder().from(mailbox(from)?);

    for to in &req.to {
        builder = builder.to(mailbox(to)?);
    }
    for cc in &req.cc {
        builder = builder.cc(mailbox(cc)?);
    }
    for bcc in &req.bcc {
        builder = builder.bcc(mailbox(bcc)?);
    }
    if let Some(reply_to) = &req.reply_to {
        builder = builder.reply_to(mailbox(reply_to)?);
    }

    builder = builder.subject(req.subject.clone());
    builder = builder.message_id(Some(req.message_id.clone()));
    builder = builder.date(
        chrono::DateTime::from_timestamp_millis(req.created_at_epoch_millis)
            .unwrap_or_else(chrono::Utc::now)
            .into(),
    );

    builder = builder.header(raw_header("Organization", &globals.organization));
    builder = builder.header(raw_header("User-Agent", &globals.user_agent));
    builder = builder.header(raw_header(
        "Importance",
        importance_header_value(Importance::try_from(req.importance).unwrap_or(Importance::Unspecified)),
    ));

    if InteractionMode::try_from(req.interaction_mode) == Ok(InteractionMode::Automated) {
        builder = builder.header(raw_header("Precedence", "bulk"));
    }

    if !req.mdn_to.is_empty() {
        let mdn_value = req
            .mdn_to
            .iter()
            .map(|a| a.email.clone())
            .collect::<Vec<_>>()
            .join(", ");
        builder = builder.header(raw_header("Disposition-Notification-To", &mdn_value));
    }

    for h in &req.headers {
        // Already whitelist-checked by `validate_send_request`; canonicalise
        // again defensively since this function may be called directly in
        // tests without going through the full send path.
        let canonical = h.name.to_ascii_lowercase();
        if !chatcore_domain::email::HEADER_WHITELIST.contains(&canonical.as_str()) {
            warn!(header = %h.name, "dropping non-whitelisted header seen at mapping time");
            continue;
        }
        for value in &h.values {
            builder = builder.header(raw_header(&h.name, value));
        }
    }

    let content_mode = ContentMode::try_from(req.content_mode).unwrap_or(ContentMode::Raw);
    let message = match content_mode {
        ContentMode::Raw | ContentMode::Unspecified => {
            let raw = req
                .raw
                .as_ref()
                .ok_or_else(|| MappingError::BuildFailed("raw content missing".into()))?;
            let has_text = !raw.text.is_empty();
            let has_html = !raw.html.is_empty();

            if has_text && has_html {
                builder
                    .multipart(MultiPart::alternative_plain_html(
                        raw.text.clone(),
                        raw.html.clone(),
                    ))
                    .map_err(|e| MappingError::BuildFailed(e.to_string()))?
            } else if has_html {
                builder
                    .singlepart(SinglePart::html(raw.html.clone()))
                    .map_err(|e| MappingError::BuildFailed(e.to_string()))?
            } else {
                builder
                    .body(raw.text.clone())
                    .map_err(|e| MappingError::BuildFailed(e.to_string()))?
            }
        }
        ContentMode::Template => {
            return Err(MappingError::BuildFailed(
                "content_mode=TEMPLATE reached the mapper; validate_send_request should have rejected it".into(),
            ))
        }
    };

    let envelope = message.envelope().clone();
    let mut raw = message.formatted();
    if let Some(key) = dkim {
        let signature_header = sign_dkim(&raw, key)?;
        let mut signed = format!("{signature_header}\r\n").into_bytes();
        signed.extend_from_slice(&raw);
        raw = signed;
    }

    Ok(OutboundMessage { envelope, raw })
}

/// Loaded once at startup from `EmailConfig::dkim_private_key_path`; kept
/// opaque here so the send path doesn't need to know the signing
/// algorithm details.
pub struct DkimSigningKey {
    domain: String,
    selector: String,
    key_pem: String,
}

impl DkimSigningKey {
    pub fn load(config: &EmailConfig) -> Result<Self, MappingError> {
        let key_pem = std::fs::read_to_string(&config.dkim_private_key_path)
            .map_err(|e| MappingError::DkimSigningFailed(format!("reading private key: {e}")))?;
        Ok(Self {
            domain: config.dkim_domain.clone(),
            selector: config.dkim_selector.clone(),
            key_pem,
        })
    }
}

/// Sign `raw_message` with the configured DKIM key, returning the
/// `DKIM-Signature` header line ready to prepend to the message.
fn sign_dkim(raw_message: &[u8], key: &DkimSigningKey) -> Result<String, MappingError> {
    let rsa_key = mail_auth::common::crypto::RsaKey::<mail_auth::common::crypto::Sha256>::from_rsa_pem(
        &key.key_pem,
    )
    .map_err(|e| MappingError::DkimSigningFailed(format!("parsing private key: {e}")))?;

    let signer = mail_auth::dkim::DkimSigner::from_key(rsa_key)
        .domain(&key.domain)
        .selector(&key.selector)
        .headers(["From", "To", "Subject", "Date", "Message-ID"])
        .canonicalization(mail_auth::dkim::Canonicalization::RelaxedRelaxed);

    let signature = signer
        .sign(raw_message)
        .map_err(|e| MappingError::DkimSigningFailed(e.to_string()))?;

    Ok(signature.to_header())
}
