//! Domain types shared across the platform crates: ping results, presence
//! sessions, and the email wire protocol.

pub mod email;
pub mod ping;
pub mod session;

pub use email::{validate_send_request, EmailRequest, EmailSendRequest, EmailValidationError};
pub use ping::{PingCause, PingDepth, PingResult, PingStatus};
pub use session::{Platform, PresenceStatus, Session};
