//! Shogi rules engine and search primitive for the orcinus worker.
//!
//! This crate supplies the position/move layer and the synchronous
//! `search(position, alpha, beta, depth)` probe the distributed client is
//! built around. It is deliberately small: a mailbox board, full legality
//! (minus drop-pawn-mate), material evaluation and plain alpha-beta. Engine
//! strength lives on the server side of the system, not here.

mod movegen;
mod position;
mod search;
mod tt;
mod types;
mod zobrist;

pub use movegen::MoveList;
pub use position::{Position, STARTPOS_SFEN};
pub use search::{SearchResult, Searcher, evaluate};
pub use types::{Bound, Color, Depth, Move, Piece, PieceType, Square, Value};
