//! Texts the server sends to clients.
//!
//! Keeping them in one place means the handler, the registry, and the
//! tests all agree on the exact wording.

use chrono::NaiveDateTime;

/// `strftime` pattern for chat timestamps: `2024-05-01 13:37:00`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub const INVALID_CREDENTIALS: &str = "Invalid login/password";
pub const IDENTITY_TAKEN: &str = "Login/nickname is already taken";
pub const AUTHENTICATE_FIRST: &str = "Please authenticate first";
pub const KICKED: &str = "You have been kicked";
pub const IDLE_TIMEOUT: &str = "Disconnected due to inactivity";

/// A chat line as every recipient sees it: `"<timestamp> <nickname>: <text>"`.
pub fn chat_line(at: NaiveDateTime, nickname: &str, text: &str) -> String {
    format!("{} {nickname}: {text}", at.format(TIMESTAMP_FORMAT))
}

pub fn welcome(nickname: &str) -> String {
    format!("{nickname}, welcome to the chat!")
}

pub fn already_online(nickname: &str) -> String {
    format!("{nickname} is already online")
}

pub fn joined(nickname: &str) -> String {
    format!("{nickname} joined the chat")
}

pub fn left(nickname: &str) -> String {
    format!("{nickname} left the chat")
}

pub fn renamed(old: &str, new: &str) -> String {
    format!("{old} is now known as {new}")
}

pub fn nickname_unavailable(nickname: &str) -> String {
    format!("Nickname {nickname} is unavailable")
}

/// Reply to a banned caller attempting a gated command.
pub fn banned(minutes_left: i64) -> String {
    format!(
        "You are banned. This action will be available in {minutes_left} minute(s)"
    )
}

/// Sent to the target of `/ban`.
pub fn ban_imposed(minutes: u64) -> String {
    if minutes == 0 {
        "You have been banned permanently".to_string()
    } else {
        format!("You have been banned for {minutes} minute(s)")
    }
}
