//! Scoped position mutation.

use orcinus_engine::{Move, Position};

/// Plays moves on a borrowed position and takes every one of them back
/// when dropped, so early returns can never leave the position walked.
pub struct ScopedMover<'a> {
    position: &'a mut Position,
    count: usize,
}

impl<'a> ScopedMover<'a> {
    pub fn new(position: &'a mut Position) -> ScopedMover<'a> {
        ScopedMover { position, count: 0 }
    }

    /// Play one move. Illegal moves are refused and logged.
    pub fn do_move(&mut self, mv: Move) -> bool {
        if !self.position.is_legal(mv) {
            log::error!("scoped move '{mv}' is illegal here");
            return false;
        }
        self.position.do_move(mv);
        self.count += 1;
        true
    }

    /// Take back the most recent scoped move.
    pub fn undo_move(&mut self) {
        if self.count == 0 {
            log::error!("no scoped move to undo");
            return;
        }
        self.position.undo_move();
        self.count -= 1;
    }

    /// Moves currently applied by this guard.
    pub fn depth(&self) -> usize {
        self.count
    }

    /// The walked position, for probing while the guard is alive.
    pub fn position(&mut self) -> &mut Position {
        self.position
    }

    /// Read-only view of the walked position.
    pub fn position_ref(&self) -> &Position {
        self.position
    }
}

impl Drop for ScopedMover<'_> {
    fn drop(&mut self) {
        while self.count > 0 {
            self.undo_move();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewinds_on_drop() {
        let mut pos = Position::startpos();
        let sfen = pos.sfen();
        {
            let mut mover = ScopedMover::new(&mut pos);
            assert!(mover.do_move(Move::from_text("7g7f").unwrap()));
            assert!(mover.do_move(Move::from_text("3c3d").unwrap()));
            assert_eq!(mover.depth(), 2);
            assert_ne!(mover.position_ref().sfen(), sfen);
        }
        assert_eq!(pos.sfen(), sfen);
        assert_eq!(pos.undo_depth(), 0);
    }

    #[test]
    fn refuses_illegal_moves() {
        let mut pos = Position::startpos();
        let sfen = pos.sfen();
        {
            let mut mover = ScopedMover::new(&mut pos);
            // White's move while black is to play.
            assert!(!mover.do_move(Move::from_text("3c3d").unwrap()));
            assert_eq!(mover.depth(), 0);
        }
        assert_eq!(pos.sfen(), sfen);
    }

    #[test]
    fn rewinds_partial_walk() {
        let mut pos = Position::startpos();
        let sfen = pos.sfen();
        {
            let mut mover = ScopedMover::new(&mut pos);
            assert!(mover.do_move(Move::from_text("7g7f").unwrap()));
            // Second black move in a row is illegal; guard still unwinds
            // the first.
            assert!(!mover.do_move(Move::from_text("2g2f").unwrap()));
        }
        assert_eq!(pos.sfen(), sfen);
    }
}
