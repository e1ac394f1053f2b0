//! Key builders for the presence keyspace (spec §4.4).
//!
//! The curly braces are Redis Cluster hash tags: all three keys for one
//! user hash to the same slot, which is what makes `DeleteSession`'s
//! watch/multi/exec transaction valid (cross-key transactions in a
//! cluster require every key in the same slot).

pub fn session_key(user: &str, sid: &str) -> String {
    format!("presence:user:{{{user}}}:session:{sid}")
}

pub fn session_set_key(user: &str) -> String {
    format!("presence:user:{{{user}}}:sessions")
}

pub fn last_seen_key(user: &str) -> String {
    format!("presence:user:{{{user}}}:last_seen")
}
