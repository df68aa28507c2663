//! RSI, the line-oriented text protocol between the search server and its
//! workers.
//!
//! One packet per line, tokens separated by single spaces, integers in
//! signed decimal, moves in engine coordinate notation. This crate is pure
//! data: parsing and emission only, no I/O. Framing (the trailing `'\n'`)
//! belongs to the transport.
//!
//! The protocol reserves the words `loginresult` and `retried`; the
//! reference server never sends or expects them, so they parse as unknown
//! tokens here.

mod command;
mod reply;

pub use command::{Command, ValueSet};
pub use reply::Reply;

use thiserror::Error;

/// Board/turn/hand of the standard initial position, the expansion of the
/// `startpos` shorthand. The wire format carries no move-number field.
pub const STARTPOS: &str = "lnsgkgsnl/1r5b1/ppppppppp/9/9/9/PPPPPPPPP/1B5R1/LNSGKGSNL b -";

/// Priority of preempting packets (`stop`, `quit`).
pub const PRIORITY_PREEMPT: u8 = 100;
/// Priority of every other well-formed packet.
pub const PRIORITY_NORMAL: u8 = 50;
/// Priority of lines this codec does not understand.
pub const PRIORITY_UNKNOWN: u8 = 0;

/// Packet parse failure. Per protocol policy the receiver logs these and
/// drops the frame; nothing here is fatal.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty line")]
    Empty,
    #[error("unknown packet '{0}'")]
    Unknown(String),
    #[error("{packet}: missing field '{field}'")]
    MissingField { packet: &'static str, field: &'static str },
    #[error("{packet}: bad integer '{token}' in field '{field}'")]
    BadInteger { packet: &'static str, field: &'static str, token: String },
    #[error("{packet}: {detail}")]
    Malformed { packet: &'static str, detail: String },
}

/// Classify a raw line by its first token without a full parse.
///
/// The transport uses this to recognize preempting packets the moment they
/// arrive, while a search may still be in flight.
pub fn line_priority(line: &str) -> u8 {
    match line.split_whitespace().next() {
        Some("stop") | Some("quit") => PRIORITY_PREEMPT,
        Some(
            "setposition" | "makemoveroot" | "setpv" | "setmovelist" | "start" | "notify"
            | "cancel" | "commit" | "verify" | "login" | "updatevalue" | "searchdone",
        ) => PRIORITY_NORMAL,
        _ => PRIORITY_UNKNOWN,
    }
}

/// Shared cursor over the whitespace-split tokens of one line.
pub(crate) struct Tokens<'a> {
    packet: &'static str,
    iter: std::str::SplitWhitespace<'a>,
}

impl<'a> Tokens<'a> {
    pub(crate) fn new(packet: &'static str, rest: std::str::SplitWhitespace<'a>) -> Self {
        Tokens { packet, iter: rest }
    }

    pub(crate) fn next(&mut self, field: &'static str) -> Result<&'a str, ParseError> {
        self.iter
            .next()
            .ok_or(ParseError::MissingField { packet: self.packet, field })
    }

    pub(crate) fn try_next(&mut self) -> Option<&'a str> {
        self.iter.next()
    }

    pub(crate) fn next_i32(&mut self, field: &'static str) -> Result<i32, ParseError> {
        let token = self.next(field)?;
        token.parse().map_err(|_| ParseError::BadInteger {
            packet: self.packet,
            field,
            token: token.to_string(),
        })
    }

    pub(crate) fn next_i64(&mut self, field: &'static str) -> Result<i64, ParseError> {
        let token = self.next(field)?;
        token.parse().map_err(|_| ParseError::BadInteger {
            packet: self.packet,
            field,
            token: token.to_string(),
        })
    }

    /// Remaining tokens as owned strings.
    pub(crate) fn rest(self) -> Vec<String> {
        self.iter.map(str::to_string).collect()
    }

    pub(crate) fn expect_end(mut self) -> Result<(), ParseError> {
        match self.iter.next() {
            None => Ok(()),
            Some(extra) => Err(ParseError::Malformed {
                packet: self.packet,
                detail: format!("unexpected trailing token '{extra}'"),
            }),
        }
    }
}

pub(crate) fn parse_i32(packet: &'static str, field: &'static str, token: &str) -> Result<i32, ParseError> {
    token.parse().map_err(|_| ParseError::BadInteger {
        packet,
        field,
        token: token.to_string(),
    })
}
