//! The worker's projection of the distributed search.
//!
//! One tree models one `(position_id, iteration_depth)` generation: the
//! root position, the principal variation from the root, and a row of
//! candidate nodes per ply along it. Bound changes discovered anywhere in
//! the fleet arrive as `notify`/`start`/`commit` and are propagated across
//! plies here with negamax sign flips.

use anyhow::{Result, anyhow};

use orcinus_engine::{Move, Position, Value};

use crate::mover::ScopedMover;
use crate::row::{MoveRow, ValueKind};
use crate::task::SearchTask;
use crate::{MIN_ITERATIVE_DEPTH, search_depth};

#[derive(Debug)]
pub struct SearchTree {
    position: Position,
    position_id: i32,
    iteration_depth: i32,
    last_ply_depth: i32,
    rows: Vec<MoveRow>,
    pv_from_root: Vec<Move>,
}

impl Default for SearchTree {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchTree {
    pub fn new() -> SearchTree {
        SearchTree {
            position: Position::startpos(),
            position_id: -1,
            iteration_depth: -1,
            last_ply_depth: -1,
            rows: Vec::new(),
            pv_from_root: Vec::new(),
        }
    }

    #[inline]
    pub fn position_id(&self) -> i32 {
        self.position_id
    }

    #[inline]
    pub fn iteration_depth(&self) -> i32 {
        self.iteration_depth
    }

    #[inline]
    pub fn last_ply_depth(&self) -> i32 {
        self.last_ply_depth
    }

    #[inline]
    pub fn position(&self) -> &Position {
        &self.position
    }

    #[inline]
    pub fn pv_from_root(&self) -> &[Move] {
        &self.pv_from_root
    }

    pub fn row(&self, ply_depth: i32) -> Option<&MoveRow> {
        usize::try_from(ply_depth).ok().and_then(|i| self.rows.get(i))
    }

    pub fn row_mut(&mut self, ply_depth: i32) -> Option<&mut MoveRow> {
        usize::try_from(ply_depth).ok().and_then(|i| self.rows.get_mut(i))
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Split borrow for the worker: the root position to walk and the rows
    /// to update, simultaneously.
    pub(crate) fn position_and_rows(&mut self) -> (&mut Position, &mut [MoveRow]) {
        (&mut self.position, &mut self.rows)
    }

    /// Install a new root position. Clears every per-generation structure
    /// and resets the iteration depth to its floor. Fails without touching
    /// the tree if the SFEN or any trailing move is bad.
    pub fn set_position(&mut self, sfen: &str, moves: &[String], position_id: i32) -> Result<()> {
        let mut position = Position::from_sfen(sfen)?;
        for text in moves {
            let mv = position
                .move_from_text(text)
                .ok_or_else(|| anyhow!("illegal move '{text}' in setposition tail"))?;
            position.do_move(mv);
        }

        self.position = position;
        self.position_id = position_id;
        self.iteration_depth = MIN_ITERATIVE_DEPTH;
        self.last_ply_depth = -1;
        self.rows.clear();
        self.pv_from_root.clear();

        log::info!(
            "setposition: pid={}, sfen={}",
            self.position_id,
            self.position.sfen()
        );
        Ok(())
    }

    /// Advance the root by one move (the server played it for real).
    /// Returns false and leaves the tree untouched when the move is not
    /// legal at the current root.
    pub fn make_move_root(&mut self, mv: Move, position_id: i32) -> bool {
        if !self.position.is_legal(mv) {
            log::error!("makemoveroot: illegal move '{mv}' at root");
            return false;
        }

        let prev = self.position_id;
        self.position.do_move(mv);
        self.position_id = position_id;
        self.last_ply_depth = -1;
        self.rows.clear();
        self.pv_from_root.clear();

        log::info!("makemoveroot: pid={prev}->{position_id}, move={mv}");
        true
    }

    /// Resolve wire text against the root position's legal moves.
    pub fn resolve_root_move(&mut self, text: &str) -> Option<Move> {
        self.position.move_from_text(text)
    }

    /// Resolve a PV given as wire text by replaying it from the root.
    /// `None` (with a log) if any move fails to resolve at its ply.
    pub fn resolve_pv(&mut self, texts: &[String]) -> Option<Vec<Move>> {
        let mut resolved = Vec::with_capacity(texts.len());
        let mut mover = ScopedMover::new(&mut self.position);
        for text in texts {
            let Some(mv) = Move::from_text(text) else {
                log::error!("pv move '{text}' is not coordinate notation");
                return None;
            };
            if !mover.do_move(mv) {
                log::error!("pv move '{text}' is illegal at ply {}", resolved.len());
                return None;
            }
            resolved.push(mv);
        }
        Some(resolved)
    }

    /// Install the PV for iteration `iteration_depth`: one fresh row per
    /// ply, each hung off its PV move. This is the only operation that
    /// advances the tree's iteration depth.
    pub fn set_pv(&mut self, iteration_depth: i32, pv: Vec<Move>) {
        self.rows = pv
            .iter()
            .enumerate()
            .map(|(pld, &mv)| MoveRow::new(self.position_id, iteration_depth, pld as i32, mv))
            .collect();

        self.iteration_depth = iteration_depth;
        self.last_ply_depth = pv.len() as i32 - 1;
        self.pv_from_root = pv;

        log::info!(
            "setpv: pid={}, itd={}, pv={}",
            self.position_id,
            self.iteration_depth,
            join_moves(&self.pv_from_root)
        );
    }

    /// Convert a wire move list for row `ply_depth`: walk the root PV to
    /// that ply and resolve each move there. Unresolvable moves are logged
    /// and skipped, the rest survive in order.
    pub fn move_list_from_texts(&mut self, ply_depth: i32, texts: &[String]) -> Vec<Move> {
        let Ok(pld) = usize::try_from(ply_depth) else {
            log::error!("movelist: negative ply depth {ply_depth}");
            return Vec::new();
        };
        if pld >= self.pv_from_root.len() {
            log::error!("movelist: ply depth {pld} is beyond the pv");
            return Vec::new();
        }

        let prefix: Vec<Move> = self.pv_from_root[..pld].to_vec();
        let mut mover = ScopedMover::new(&mut self.position);
        for &mv in &prefix {
            if !mover.do_move(mv) {
                log::error!("movelist: pv does not replay at ply {}", mover.depth());
                return Vec::new();
            }
        }

        let mut moves = Vec::with_capacity(texts.len());
        for text in texts {
            match mover.position().move_from_text(text) {
                Some(mv) => moves.push(mv),
                None => log::error!("movelist: dropping unresolvable move '{text}'"),
            }
        }
        moves
    }

    /// Store the candidate list into row `ply_depth`.
    pub fn set_move_list(&mut self, ply_depth: i32, moves: &[Move]) {
        let (pid, itd) = (self.position_id, self.iteration_depth);
        let Some(row) = self.row_mut(ply_depth) else {
            log::error!("setmovelist: no row at ply {ply_depth}");
            return;
        };
        row.set_move_list(moves);
        log::info!(
            "setmovelist: pid={pid}, itd={itd}, pld={ply_depth}, moves={}",
            join_moves(moves)
        );
    }

    /// Seed the search window at row `ply_depth` and push the tentative
    /// bound to the shallower plies.
    pub fn start(&mut self, ply_depth: i32, alpha: Value, beta: Value) {
        let Some(row) = self.row_mut(ply_depth) else {
            log::error!("start: no row at ply {ply_depth}");
            return;
        };
        row.update_value(alpha, ValueKind::Alpha);
        row.update_value(beta, ValueKind::Beta);
        row.set_value(-Value::INFINITE, ValueKind::Gamma);

        log::info!(
            "start: pid={}, itd={}, pld={ply_depth}, alpha={alpha}, beta={beta}",
            self.position_id,
            self.iteration_depth
        );

        if ply_depth > 0 {
            self.propagate_up(ply_depth - 1, -alpha);
        }
    }

    /// A value improvement was announced for row `ply_depth`. Stale
    /// announcements (nothing above the row's alpha) are ignored;
    /// otherwise the improvement tightens every other ply.
    pub fn notify(&mut self, ply_depth: i32, value: Value) {
        let iteration_depth = self.iteration_depth;
        let Some(row) = self.row_mut(ply_depth) else {
            log::error!("notify: no row at ply {ply_depth}");
            return;
        };
        if value <= row.alpha() {
            return;
        }

        log::info!("notify: itd={iteration_depth}, pld={ply_depth}, value={value}");

        row.update_value(value, ValueKind::Alpha);
        if ply_depth > 0 {
            self.propagate_up(ply_depth - 1, -value);
        }
        if ply_depth < self.last_ply_depth {
            self.propagate_down(ply_depth + 1, -value, ValueKind::Beta);
        }
    }

    /// Row `ply_depth` is complete: retire it and fold its alpha into the
    /// ply above.
    pub fn commit(&mut self, ply_depth: i32) {
        if self.row(ply_depth).is_none() {
            log::error!("commit: no row at ply {ply_depth}");
            return;
        }

        self.last_ply_depth = ply_depth - 1;
        if ply_depth > 0 {
            let committed_alpha = self
                .row(ply_depth)
                .map(|row| row.alpha())
                .unwrap_or(-Value::INFINITE);
            let Some(above) = self.row_mut(ply_depth - 1) else { return };
            let alpha = above.alpha().max(-committed_alpha);
            above.set_value(alpha, ValueKind::Alpha);
            above.set_value(-Value::INFINITE, ValueKind::Gamma);
        }

        log::info!(
            "commit: pid={}, itd={}, pld={ply_depth}",
            self.position_id,
            self.iteration_depth
        );
    }

    /// Push a tentative alpha (gamma) from `ply_depth` toward the root,
    /// sign-flipping against each row's concrete alpha on the way.
    fn propagate_up(&mut self, ply_depth: i32, mut value: Value) {
        if self.row(ply_depth).is_none() {
            log::error!("propagate_up: invalid ply depth {ply_depth}");
            return;
        }
        for pld in (0..=ply_depth).rev() {
            let Some(row) = self.row_mut(pld) else { break };
            row.update_value(value, ValueKind::Gamma);
            value = -(row.alpha().max(value));
        }
    }

    /// Push a concrete bound from `ply_depth` toward the leaves,
    /// alternating alpha/beta and negating at each ply. An alpha that no
    /// longer improves a row stops the walk.
    fn propagate_down(&mut self, ply_depth: i32, mut value: Value, mut kind: ValueKind) {
        if self.row(ply_depth).is_none() {
            log::error!("propagate_down: invalid ply depth {ply_depth}");
            return;
        }
        if kind == ValueKind::Gamma {
            log::error!("propagate_down: gamma cannot be propagated");
            return;
        }
        for pld in ply_depth..=self.last_ply_depth {
            let Some(row) = self.row_mut(pld) else { break };
            if kind == ValueKind::Alpha && value <= row.alpha() {
                break;
            }
            row.update_value(value, kind);
            kind = if kind == ValueKind::Alpha { ValueKind::Beta } else { ValueKind::Alpha };
            value = -value;
        }
    }

    /// Pick the next unit of work: scan rows from the deepest ply toward
    /// the root and return the first candidate that is not settled under
    /// the row's live window. Beta-cut rows are skipped.
    pub fn get_search_task(&self) -> Option<SearchTask> {
        for pld in (0..=self.last_ply_depth).rev() {
            let row = self.row(pld)?;
            let depth = search_depth(self.iteration_depth, pld);
            let alpha = row.effective_alpha();
            let beta = row.beta();

            if alpha >= beta {
                continue;
            }

            if let Some(index) = row.find_undone(depth, alpha, beta) {
                let mv = row.node(index)?.mv();
                return Some(SearchTask::new(
                    self.position_id,
                    self.iteration_depth,
                    pld,
                    index,
                    mv,
                    row.alpha(),
                    beta,
                    row.gamma(),
                ));
            }
        }
        None
    }
}

fn join_moves(moves: &[Move]) -> String {
    moves.iter().map(|m| m.to_string()).collect::<Vec<_>>().join(" ")
}
