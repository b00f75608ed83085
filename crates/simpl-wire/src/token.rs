//! Message tokens carried in the first header field.

use crate::error::{Result, WireError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Token {
    /// Resolve a name on the far side; opens a session.
    NameLocate,
    /// A message expecting a reply.
    Send,
    /// The reply to a `Send`.
    Reply,
    /// Orderly end of the session.
    Close,
    /// A proxy notification.
    Proxy,
    /// The far side could not complete the current exchange.
    Error,
    /// Keep-alive probe.
    Alive,
    /// Answer to a keep-alive probe.
    AliveReply,
    /// Local request to a stationary relay for a fresh session.
    Request,
}

impl Token {
    pub fn code(self) -> i64 {
        match self {
            Token::NameLocate => 0,
            Token::Send => 1,
            Token::Reply => 2,
            Token::Close => 3,
            Token::Proxy => 4,
            Token::Error => 5,
            Token::Alive => 6,
            Token::AliveReply => 7,
            Token::Request => 8,
        }
    }

    pub fn from_code(code: i64) -> Result<Self> {
        Ok(match code {
            0 => Token::NameLocate,
            1 => Token::Send,
            2 => Token::Reply,
            3 => Token::Close,
            4 => Token::Proxy,
            5 => Token::Error,
            6 => Token::Alive,
            7 => Token::AliveReply,
            8 => Token::Request,
            other => return Err(WireError::UnknownToken(other)),
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Token::NameLocate => "NAME_LOCATE",
            Token::Send => "SEND",
            Token::Reply => "REPLY",
            Token::Close => "CLOSE",
            Token::Proxy => "PROXY",
            Token::Error => "ERROR",
            Token::Alive => "ALIVE",
            Token::AliveReply => "ALIVE_REPLY",
            Token::Request => "REQUEST",
        }
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
