//! Presence session and status types (spec §3, §4.4).

use serde::{Deserialize, Serialize};

/// Client platform a session was opened from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Unknown,
    Web,
    Ios,
    Android,
    Desktop,
}

impl Default for Platform {
    fn default() -> Self {
        Platform::Unknown
    }
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Unknown => "unknown",
            Platform::Web => "web",
            Platform::Ios => "ios",
            Platform::Android => "android",
            Platform::Desktop => "desktop",
        }
    }

    /// Parse from the hash-field string form; unrecognised values fall
    /// back to `Unknown` rather than failing (spec §4.4: malformed
    /// `platform` is logged at warn and replaced with a default).
    pub fn parse_or_default(raw: &str) -> Self {
        match raw {
            "web" => Platform::Web,
            "ios" => Platform::Ios,
            "android" => Platform::Android,
            "desktop" => Platform::Desktop,
            _ => Platform::Unknown,
        }
    }
}

/// A single logged-in device/session for a user. Identity is the pair
/// `(user_id, session_id)`, which callers track outside this struct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub replica_host: String,
    pub device_id: String,
    pub platform: Platform,
    pub ip: String,
    pub started_at: i64,
}

/// Presence status for a user, derived from live session count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Offline,
    Online,
}

impl Default for PresenceStatus {
    fn default() -> Self {
        PresenceStatus::Offline
    }
}

impl PresenceStatus {
    /// Wire encoding used on the presence pub/sub subject: `0` offline,
    /// `1` online (spec §4.4: `userID,<status-as-uint8>`).
    pub fn as_wire_byte(&self) -> u8 {
        match self {
            PresenceStatus::Offline => 0,
            PresenceStatus::Online => 1,
        }
    }

    pub fn from_wire_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(PresenceStatus::Offline),
            1 => Some(PresenceStatus::Online),
            _ => None,
        }
    }

    pub fn from_live_session_count(count: u64) -> Self {
        if count >= 1 {
            PresenceStatus::Online
        } else {
            PresenceStatus::Offline
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_platform_string_falls_back_to_default() {
        assert_eq!(Platform::parse_or_default("qux"), Platform::Unknown);
        assert_eq!(Platform::parse_or_default("android"), Platform::Android);
    }

    #[test]
    fn status_wire_byte_round_trips() {
        assert_eq!(
            PresenceStatus::from_wire_byte(PresenceStatus::Online.as_wire_byte()),
            Some(PresenceStatus::Online)
        );
        assert_eq!(
            PresenceStatus::from_wire_byte(PresenceStatus::Offline.as_wire_byte()),
            Some(PresenceStatus::Offline)
        );
        assert_eq!(PresenceStatus::from_wire_byte(7), None);
    }

    #[test]
    fn status_derives_from_live_session_count() {
        assert_eq!(
            PresenceStatus::from_live_session_count(0),
            PresenceStatus::Offline
        );
        assert_eq!(
            PresenceStatus::from_live_session_count(3),
            PresenceStatus::Online
        );
    }
}
