//! Server-to-client command packets.

use std::fmt;

use crate::{ParseError, STARTPOS, Tokens, parse_i32};

/// One `(value, alpha, beta, gamma)` report inside a `verify` packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueSet {
    pub value: i32,
    pub alpha: i32,
    pub beta: i32,
    pub gamma: i32,
}

/// A command the server addresses to a worker.
///
/// Numeric fields are plain wire integers here; interpreting them against
/// the worker's tree (and converting move text into real moves) is the
/// client's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `setposition <pid> (sfen <board> <turn> <hand> | startpos) [moves <m>...]`
    SetPosition {
        position_id: i32,
        /// Three-field SFEN (`startpos` arrives expanded to [`STARTPOS`]).
        sfen: String,
        moves: Vec<String>,
    },
    /// `makemoveroot <pid> <oldPid> <move>`
    MakeMoveRoot {
        position_id: i32,
        prev_position_id: i32,
        mv: String,
    },
    /// `setpv <pid> <itd> <m1> ... <mN>`
    SetPv {
        position_id: i32,
        iteration_depth: i32,
        pv: Vec<String>,
    },
    /// `setmovelist <pid> <itd> <pld> <m1> ... <mN>`
    SetMoveList {
        position_id: i32,
        iteration_depth: i32,
        ply_depth: i32,
        moves: Vec<String>,
    },
    /// `start <pid> <itd> <pld> <alpha> <beta>`
    Start {
        position_id: i32,
        iteration_depth: i32,
        ply_depth: i32,
        alpha: i32,
        beta: i32,
    },
    /// `stop`
    Stop,
    /// `notify <pid> <itd> <pld> <value>`
    ///
    /// The value rides in the packet's alpha slot on the wire; it is not a
    /// window, so no `alpha <= beta` relation is implied.
    Notify {
        position_id: i32,
        iteration_depth: i32,
        ply_depth: i32,
        value: i32,
    },
    /// `cancel <pid> <itd> <pld>`
    Cancel {
        position_id: i32,
        iteration_depth: i32,
        ply_depth: i32,
    },
    /// `commit <pid> <itd> <pld>`
    Commit {
        position_id: i32,
        iteration_depth: i32,
        ply_depth: i32,
    },
    /// `verify <pid> <itd> <pld> [<v> <alpha> <beta> <gamma>]*`
    Verify {
        position_id: i32,
        iteration_depth: i32,
        ply_depth: i32,
        values: Vec<ValueSet>,
    },
    /// `quit`
    Quit,
}

impl Command {
    /// Parse one line. The line must not contain the `'\n'` frame
    /// delimiter.
    pub fn parse(line: &str) -> Result<Command, ParseError> {
        let mut iter = line.split_whitespace();
        let head = iter.next().ok_or(ParseError::Empty)?;
        match head {
            "setposition" => Self::parse_setposition(Tokens::new("setposition", iter)),
            "makemoveroot" => Self::parse_makemoveroot(Tokens::new("makemoveroot", iter)),
            "setpv" => Self::parse_setpv(Tokens::new("setpv", iter)),
            "setmovelist" => Self::parse_setmovelist(Tokens::new("setmovelist", iter)),
            "start" => Self::parse_start(Tokens::new("start", iter)),
            "stop" => Tokens::new("stop", iter).expect_end().map(|()| Command::Stop),
            "notify" => Self::parse_notify(Tokens::new("notify", iter)),
            "cancel" => Self::parse_cancel(Tokens::new("cancel", iter)),
            "commit" => Self::parse_commit(Tokens::new("commit", iter)),
            "verify" => Self::parse_verify(Tokens::new("verify", iter)),
            "quit" => Tokens::new("quit", iter).expect_end().map(|()| Command::Quit),
            other => Err(ParseError::Unknown(other.to_string())),
        }
    }

    /// Dispatch priority; larger preempts smaller.
    pub fn priority(&self) -> u8 {
        match self {
            Command::Stop | Command::Quit => crate::PRIORITY_PREEMPT,
            _ => crate::PRIORITY_NORMAL,
        }
    }

    /// Packets that abort an in-flight evaluation when they arrive.
    pub fn is_preempting_while_searching(&self) -> bool {
        matches!(
            self,
            Command::SetPosition { .. }
                | Command::MakeMoveRoot { .. }
                | Command::SetPv { .. }
                | Command::Stop
                | Command::Quit
        )
    }

    fn parse_setposition(mut t: Tokens<'_>) -> Result<Command, ParseError> {
        let position_id = t.next_i32("position_id")?;
        let sfen = match t.next("position")? {
            "startpos" => STARTPOS.to_string(),
            "sfen" => {
                let board = t.next("board")?;
                let turn = t.next("turn")?;
                let hand = t.next("hand")?;
                format!("{board} {turn} {hand}")
            }
            other => {
                return Err(ParseError::Malformed {
                    packet: "setposition",
                    detail: format!("expected 'sfen' or 'startpos', got '{other}'"),
                });
            }
        };

        let moves = match t.try_next() {
            None => Vec::new(),
            Some("moves") => {
                let moves = t.rest();
                if moves.is_empty() {
                    return Err(ParseError::MissingField {
                        packet: "setposition",
                        field: "moves",
                    });
                }
                moves
            }
            Some(other) => {
                return Err(ParseError::Malformed {
                    packet: "setposition",
                    detail: format!("expected 'moves', got '{other}'"),
                });
            }
        };

        Ok(Command::SetPosition { position_id, sfen, moves })
    }

    fn parse_makemoveroot(mut t: Tokens<'_>) -> Result<Command, ParseError> {
        let position_id = t.next_i32("position_id")?;
        let prev_position_id = t.next_i32("old_position_id")?;
        let mv = t.next("move")?.to_string();
        t.expect_end()?;
        Ok(Command::MakeMoveRoot { position_id, prev_position_id, mv })
    }

    fn parse_setpv(mut t: Tokens<'_>) -> Result<Command, ParseError> {
        let position_id = t.next_i32("position_id")?;
        let iteration_depth = t.next_i32("iteration_depth")?;
        let pv = t.rest();
        if pv.is_empty() {
            return Err(ParseError::MissingField { packet: "setpv", field: "pv" });
        }
        Ok(Command::SetPv { position_id, iteration_depth, pv })
    }

    fn parse_setmovelist(mut t: Tokens<'_>) -> Result<Command, ParseError> {
        let position_id = t.next_i32("position_id")?;
        let iteration_depth = t.next_i32("iteration_depth")?;
        let ply_depth = t.next_i32("ply_depth")?;
        let moves = t.rest();
        if moves.is_empty() {
            return Err(ParseError::MissingField { packet: "setmovelist", field: "moves" });
        }
        Ok(Command::SetMoveList { position_id, iteration_depth, ply_depth, moves })
    }

    fn parse_start(mut t: Tokens<'_>) -> Result<Command, ParseError> {
        let position_id = t.next_i32("position_id")?;
        let iteration_depth = t.next_i32("iteration_depth")?;
        let ply_depth = t.next_i32("ply_depth")?;
        let alpha = t.next_i32("alpha")?;
        let beta = t.next_i32("beta")?;
        t.expect_end()?;
        Ok(Command::Start { position_id, iteration_depth, ply_depth, alpha, beta })
    }

    fn parse_notify(mut t: Tokens<'_>) -> Result<Command, ParseError> {
        let position_id = t.next_i32("position_id")?;
        let iteration_depth = t.next_i32("iteration_depth")?;
        let ply_depth = t.next_i32("ply_depth")?;
        let value = t.next_i32("value")?;
        t.expect_end()?;
        Ok(Command::Notify { position_id, iteration_depth, ply_depth, value })
    }

    fn parse_cancel(mut t: Tokens<'_>) -> Result<Command, ParseError> {
        let position_id = t.next_i32("position_id")?;
        let iteration_depth = t.next_i32("iteration_depth")?;
        let ply_depth = t.next_i32("ply_depth")?;
        t.expect_end()?;
        Ok(Command::Cancel { position_id, iteration_depth, ply_depth })
    }

    fn parse_commit(mut t: Tokens<'_>) -> Result<Command, ParseError> {
        let position_id = t.next_i32("position_id")?;
        let iteration_depth = t.next_i32("iteration_depth")?;
        let ply_depth = t.next_i32("ply_depth")?;
        t.expect_end()?;
        Ok(Command::Commit { position_id, iteration_depth, ply_depth })
    }

    fn parse_verify(mut t: Tokens<'_>) -> Result<Command, ParseError> {
        let position_id = t.next_i32("position_id")?;
        let iteration_depth = t.next_i32("iteration_depth")?;
        let ply_depth = t.next_i32("ply_depth")?;
        let rest = t.rest();
        if rest.len() % 4 != 0 {
            return Err(ParseError::Malformed {
                packet: "verify",
                detail: format!("value sets come in fours, got {} tokens", rest.len()),
            });
        }
        let mut values = Vec::with_capacity(rest.len() / 4);
        for chunk in rest.chunks_exact(4) {
            values.push(ValueSet {
                value: parse_i32("verify", "value", &chunk[0])?,
                alpha: parse_i32("verify", "alpha", &chunk[1])?,
                beta: parse_i32("verify", "beta", &chunk[2])?,
                gamma: parse_i32("verify", "gamma", &chunk[3])?,
            });
        }
        Ok(Command::Verify { position_id, iteration_depth, ply_depth, values })
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::SetPosition { position_id, sfen, moves } => {
                write!(f, "setposition {position_id} ")?;
                if sfen == STARTPOS {
                    write!(f, "startpos")?;
                } else {
                    write!(f, "sfen {sfen}")?;
                }
                if !moves.is_empty() {
                    write!(f, " moves {}", moves.join(" "))?;
                }
                Ok(())
            }
            Command::MakeMoveRoot { position_id, prev_position_id, mv } => {
                write!(f, "makemoveroot {position_id} {prev_position_id} {mv}")
            }
            Command::SetPv { position_id, iteration_depth, pv } => {
                write!(f, "setpv {position_id} {iteration_depth} {}", pv.join(" "))
            }
            Command::SetMoveList { position_id, iteration_depth, ply_depth, moves } => {
                write!(
                    f,
                    "setmovelist {position_id} {iteration_depth} {ply_depth} {}",
                    moves.join(" ")
                )
            }
            Command::Start { position_id, iteration_depth, ply_depth, alpha, beta } => {
                write!(f, "start {position_id} {iteration_depth} {ply_depth} {alpha} {beta}")
            }
            Command::Stop => write!(f, "stop"),
            Command::Notify { position_id, iteration_depth, ply_depth, value } => {
                write!(f, "notify {position_id} {iteration_depth} {ply_depth} {value}")
            }
            Command::Cancel { position_id, iteration_depth, ply_depth } => {
                write!(f, "cancel {position_id} {iteration_depth} {ply_depth}")
            }
            Command::Commit { position_id, iteration_depth, ply_depth } => {
                write!(f, "commit {position_id} {iteration_depth} {ply_depth}")
            }
            Command::Verify { position_id, iteration_depth, ply_depth, values } => {
                write!(f, "verify {position_id} {iteration_depth} {ply_depth}")?;
                for set in values {
                    write!(f, " {} {} {} {}", set.value, set.alpha, set.beta, set.gamma)?;
                }
                Ok(())
            }
            Command::Quit => write!(f, "quit"),
        }
    }
}
