//! Fixed-depth alpha-beta search.
//!
//! This is the synchronous probe the distributed worker calls: no iterative
//! deepening, no time management, no quiescence. Cancellation is a shared
//! flag polled every 1024 nodes; a cancelled search reports
//! `completed = false` and its value must be discarded.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::position::Position;
use crate::tt::TransTable;
use crate::types::{Bound, Color, Depth, Move, PieceType, Value};

/// Outcome of one search probe.
#[derive(Debug, Clone)]
pub struct SearchResult {
    /// Score from the searched side's perspective. Meaningless unless
    /// `completed` is true.
    pub value: Value,
    /// Principal variation from the searched position.
    pub pv: Vec<Move>,
    /// False iff the stop flag fired during the search.
    pub completed: bool,
    /// Nodes visited by this probe.
    pub nodes: u64,
}

/// Reusable search state: transposition table, node counter and the
/// cooperative stop flag.
pub struct Searcher {
    tt: TransTable,
    stop: Arc<AtomicBool>,
    nodes: u64,
    halted: bool,
}

const STOP_POLL_MASK: u64 = 1023;

impl Searcher {
    pub fn new(hash_megabytes: usize, stop: Arc<AtomicBool>) -> Searcher {
        Searcher {
            tt: TransTable::new(hash_megabytes),
            stop,
            nodes: 0,
            halted: false,
        }
    }

    /// Total nodes searched over the searcher's lifetime.
    pub fn total_nodes(&self) -> u64 {
        self.nodes
    }

    /// Search `pos` to `depth` within `(alpha, beta)`.
    pub fn search(
        &mut self,
        pos: &mut Position,
        alpha: Value,
        beta: Value,
        depth: Depth,
    ) -> SearchResult {
        debug_assert!(alpha < beta);
        let before = self.nodes;
        self.halted = self.stop.load(Ordering::Acquire);

        let mut pv = Vec::new();
        let value = self.alpha_beta(pos, alpha, beta, depth, 0, &mut pv);

        SearchResult {
            value,
            pv,
            completed: !self.halted,
            nodes: self.nodes - before,
        }
    }

    fn should_stop(&mut self) -> bool {
        if !self.halted && self.nodes & STOP_POLL_MASK == 0 {
            self.halted = self.stop.load(Ordering::Acquire);
        }
        self.halted
    }

    fn alpha_beta(
        &mut self,
        pos: &mut Position,
        mut alpha: Value,
        beta: Value,
        depth: Depth,
        ply: i32,
        pv: &mut Vec<Move>,
    ) -> Value {
        pv.clear();
        if depth < Depth::ONE_PLY {
            return evaluate(pos);
        }

        self.nodes += 1;
        if self.should_stop() {
            return alpha;
        }

        let alpha_orig = alpha;
        let mut tt_move = None;
        if let Some(entry) = self.tt.probe(pos.key()) {
            tt_move = entry.mv;
            // Cutoffs are skipped at the root so a PV is always produced.
            if ply > 0 && entry.depth >= depth {
                match entry.bound {
                    Bound::Exact => return entry.value,
                    Bound::Lower if entry.value >= beta => return entry.value,
                    Bound::Upper if entry.value <= alpha => return entry.value,
                    _ => {}
                }
            }
        }

        let mut moves = pos.legal_moves();
        if moves.is_empty() {
            return Value::mated_in(ply);
        }
        // Cheap ordering: hash move, then captures, then the rest.
        moves.sort_by_key(|&mv| {
            if Some(mv) == tt_move {
                0
            } else if pos.piece_on(mv.to()).is_some() {
                1
            } else {
                2
            }
        });

        let mut best = -Value::INFINITE;
        let mut best_move = None;
        let mut child_pv = Vec::new();

        for &mv in moves.iter() {
            pos.do_move(mv);
            let value = -self.alpha_beta(pos, -beta, -alpha, depth - Depth::ONE_PLY, ply + 1, &mut child_pv);
            pos.undo_move();

            if self.halted {
                return alpha;
            }

            if value > best {
                best = value;
                best_move = Some(mv);
                if value > alpha {
                    alpha = value;
                    pv.clear();
                    pv.push(mv);
                    pv.extend_from_slice(&child_pv);
                    if alpha >= beta {
                        break;
                    }
                }
            }
        }

        if !best.is_mate_score() {
            let bound = Bound::classify(best, alpha_orig, beta);
            self.tt.store(pos.key(), best, depth, bound, best_move);
        }
        best
    }
}

/// Static evaluation: material and hands, from the side to move's
/// perspective.
pub fn evaluate(pos: &Position) -> Value {
    const fn piece_value(kind: PieceType) -> i32 {
        match kind {
            PieceType::Pawn => 100,
            PieceType::Lance => 300,
            PieceType::Knight => 350,
            PieceType::Silver => 450,
            PieceType::Gold => 500,
            PieceType::Bishop => 650,
            PieceType::Rook => 800,
            PieceType::King => 0,
            PieceType::ProPawn => 550,
            PieceType::ProLance => 500,
            PieceType::ProKnight => 500,
            PieceType::ProSilver => 490,
            PieceType::Horse => 900,
            PieceType::Dragon => 1050,
        }
    }

    let mut score = 0i32;
    for sq in crate::types::Square::all() {
        if let Some(piece) = pos.piece_on(sq) {
            let v = piece_value(piece.kind);
            score += if piece.color == Color::Black { v } else { -v };
        }
    }
    for kind in PieceType::HAND {
        let v = piece_value(kind);
        score += v * pos.hand_count(Color::Black, kind) as i32;
        score -= v * pos.hand_count(Color::White, kind) as i32;
    }

    match pos.side_to_move() {
        Color::Black => Value::new(score),
        Color::White => Value::new(-score),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::Position;

    fn window() -> (Value, Value) {
        (Value::new(-30000), Value::new(30000))
    }

    #[test]
    fn evaluate_is_symmetric_at_start() {
        let pos = Position::startpos();
        assert_eq!(evaluate(&pos), Value::ZERO);
    }

    #[test]
    fn evaluate_counts_hands() {
        let pos = Position::from_sfen("4k4/9/9/9/9/9/9/9/4K4 b R 1").unwrap();
        assert_eq!(evaluate(&pos), Value::new(800));
        let pos = Position::from_sfen("4k4/9/9/9/9/9/9/9/4K4 w R 1").unwrap();
        assert_eq!(evaluate(&pos), Value::new(-800));
    }

    #[test]
    fn finds_mate_in_one() {
        // Gold drop on 5b, guarded by the knight on 4d, smothers the king.
        let mut pos = Position::from_sfen("4k4/9/9/5N3/9/9/9/9/4K4 b G 1").unwrap();
        let stop = Arc::new(AtomicBool::new(false));
        let mut searcher = Searcher::new(1, stop);

        let (alpha, beta) = window();
        let result = searcher.search(&mut pos, alpha, beta, Depth::new(4));
        assert!(result.completed);
        assert_eq!(result.value, Value::mate_in(1));
        assert_eq!(result.pv.first().map(|m| m.to_string()), Some("G*5b".to_string()));
        assert!(result.nodes > 0);
        // Search leaves the position untouched.
        assert_eq!(pos.undo_depth(), 0);
    }

    #[test]
    fn prefers_winning_material() {
        // Black rook can capture an undefended white rook on the same file.
        let mut pos = Position::from_sfen("4k4/9/9/9/4r4/9/9/9/4R3K b - 1").unwrap();
        let stop = Arc::new(AtomicBool::new(false));
        let mut searcher = Searcher::new(1, stop);
        let (alpha, beta) = window();
        let result = searcher.search(&mut pos, alpha, beta, Depth::new(2));
        assert!(result.completed);
        assert!(result.value >= Value::new(800), "value {}", result.value);
    }

    #[test]
    fn stop_flag_aborts() {
        let mut pos = Position::startpos();
        let stop = Arc::new(AtomicBool::new(true));
        let mut searcher = Searcher::new(1, stop.clone());
        let (alpha, beta) = window();
        let result = searcher.search(&mut pos, alpha, beta, Depth::new(8));
        assert!(!result.completed);

        // Clearing the flag makes the next probe complete.
        stop.store(false, Ordering::Release);
        let result = searcher.search(&mut pos, alpha, beta, Depth::new(2));
        assert!(result.completed);
    }

    #[test]
    fn null_window_probe_classifies() {
        let mut pos = Position::startpos();
        let stop = Arc::new(AtomicBool::new(false));
        let mut searcher = Searcher::new(1, stop);
        // Null window around an absurdly high alpha: everything fails low.
        let result =
            searcher.search(&mut pos, Value::new(5000), Value::new(5001), Depth::new(2));
        assert!(result.completed);
        assert!(result.value <= Value::new(5000));
    }
}
