//! The command grammar.
//!
//! Every line a client sends is split on whitespace. The first token is the
//! *keyword*; if it is one of the known `/`-commands the rest are its
//! arguments, otherwise the whole line is chat text to broadcast.
//!
//! ```text
//! /auth <login> <password>
//! /register <login> <nickname> <password>
//! /list
//! /w <recipient> <text...>
//! /changenick <nickname>
//! /kick <nickname>
//! /ban <nickname> [minutes]
//! /shutdown
//! /exit
//! anything else            → broadcast verbatim
//! ```
//!
//! Parsing is stateless: whether a command is *allowed* (authenticated yet?
//! administrator? banned?) is decided by the session layer.

use std::str::SplitWhitespace;

use crate::ProtocolError;

/// Command keywords. Matching is case-sensitive: `/LIST` is chat text.
pub mod keyword {
    pub const AUTH: &str = "/auth";
    pub const REGISTER: &str = "/register";
    pub const LIST: &str = "/list";
    pub const WHISPER: &str = "/w";
    pub const CHANGE_NICK: &str = "/changenick";
    pub const KICK: &str = "/kick";
    pub const BAN: &str = "/ban";
    pub const SHUTDOWN: &str = "/shutdown";
    pub const EXIT: &str = "/exit";
}

/// A parsed client line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Log in with existing credentials.
    Auth { login: String, password: String },

    /// Create a new identity and log in with it.
    Register {
        login: String,
        nickname: String,
        password: String,
    },

    /// Ask for the nicknames currently online.
    List,

    /// Direct message. `text` is every word after the recipient, each
    /// followed by a single space.
    Whisper { recipient: String, text: String },

    /// Rename the caller.
    ChangeNick { nickname: String },

    /// Administrator: force-disconnect a user.
    Kick { nickname: String },

    /// Administrator: ban a user. `minutes == 0` means permanently.
    Ban { nickname: String, minutes: u64 },

    /// Administrator: stop the server.
    Shutdown,

    /// End the caller's session.
    Exit,

    /// Any line whose first token isn't a keyword. Carries the raw line.
    Broadcast(String),
}

impl Command {
    /// Parses one line into a command.
    ///
    /// # Errors
    /// - [`ProtocolError::Empty`] for a blank line
    /// - [`ProtocolError::MissingArgument`] when a required argument is absent
    /// - [`ProtocolError::InvalidArgument`] when `/ban`'s duration isn't a
    ///   non-negative integer
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let mut tokens = line.split_whitespace();
        let Some(first) = tokens.next() else {
            return Err(ProtocolError::Empty);
        };

        let command = match first {
            keyword::AUTH => Self::Auth {
                login: required(&mut tokens, keyword::AUTH, "login")?,
                password: required(&mut tokens, keyword::AUTH, "password")?,
            },
            keyword::REGISTER => Self::Register {
                login: required(&mut tokens, keyword::REGISTER, "login")?,
                nickname: required(&mut tokens, keyword::REGISTER, "nickname")?,
                password: required(&mut tokens, keyword::REGISTER, "password")?,
            },
            keyword::LIST => Self::List,
            keyword::WHISPER => {
                let recipient =
                    required(&mut tokens, keyword::WHISPER, "recipient")?;
                let words: Vec<&str> = tokens.collect();
                if words.is_empty() {
                    return Err(ProtocolError::MissingArgument {
                        command: keyword::WHISPER,
                        argument: "text",
                    });
                }
                Self::Whisper {
                    recipient,
                    text: join_words(&words),
                }
            }
            keyword::CHANGE_NICK => Self::ChangeNick {
                nickname: required(&mut tokens, keyword::CHANGE_NICK, "nickname")?,
            },
            keyword::KICK => Self::Kick {
                nickname: required(&mut tokens, keyword::KICK, "nickname")?,
            },
            keyword::BAN => {
                let nickname = required(&mut tokens, keyword::BAN, "nickname")?;
                let minutes = match tokens.next() {
                    None => 0,
                    Some(raw) => raw.parse::<u64>().map_err(|_| {
                        ProtocolError::InvalidArgument {
                            command: keyword::BAN,
                            value: raw.to_string(),
                        }
                    })?,
                };
                Self::Ban { nickname, minutes }
            }
            keyword::SHUTDOWN => Self::Shutdown,
            keyword::EXIT => Self::Exit,
            _ => Self::Broadcast(line.to_string()),
        };

        Ok(command)
    }

    /// Whether a banned caller is refused this command.
    ///
    /// Moderation commands, `/exit`, and the authentication commands are
    /// exempt; everything a regular user does to talk or rename is gated.
    pub fn is_ban_gated(&self) -> bool {
        matches!(
            self,
            Self::List
                | Self::Whisper { .. }
                | Self::ChangeNick { .. }
                | Self::Broadcast(_)
        )
    }

    /// Whether the caller must hold the administrator role.
    pub fn requires_admin(&self) -> bool {
        matches!(self, Self::Kick { .. } | Self::Ban { .. } | Self::Shutdown)
    }
}

/// Takes the next token or reports which argument was missing.
fn required(
    tokens: &mut SplitWhitespace<'_>,
    command: &'static str,
    argument: &'static str,
) -> Result<String, ProtocolError> {
    tokens
        .next()
        .map(str::to_string)
        .ok_or(ProtocolError::MissingArgument { command, argument })
}

/// Re-joins message words, each followed by one space.
///
/// The trailing space is part of the direct-message format clients
/// already display, so it is kept.
fn join_words(words: &[&str]) -> String {
    words.iter().fold(String::new(), |mut text, word| {
        text.push_str(word);
        text.push(' ');
        text
    })
}
