//! Pseudo-legal move generation.
//!
//! Deltas are written from Black's point of view (Black moves toward rank
//! 1); [`orient`] mirrors the rank component for White. Promotion and drop
//! restrictions are enforced here, king safety in
//! [`Position::legal_moves`](crate::Position::legal_moves).

use smallvec::SmallVec;

use crate::position::Position;
use crate::types::{Color, Move, PieceType, Square};

pub type MoveList = SmallVec<[Move; 128]>;

/// Single-step attack offsets of `kind`, Black's perspective.
pub(crate) fn step_deltas(kind: PieceType) -> &'static [(i8, i8)] {
    const GOLD: &[(i8, i8)] = &[(0, -1), (-1, -1), (1, -1), (-1, 0), (1, 0), (0, 1)];
    match kind {
        PieceType::Pawn => &[(0, -1)],
        PieceType::Lance => &[],
        PieceType::Knight => &[(-1, -2), (1, -2)],
        PieceType::Silver => &[(0, -1), (-1, -1), (1, -1), (-1, 1), (1, 1)],
        PieceType::Gold
        | PieceType::ProPawn
        | PieceType::ProLance
        | PieceType::ProKnight
        | PieceType::ProSilver => GOLD,
        PieceType::Bishop => &[],
        PieceType::Rook => &[],
        PieceType::King => {
            &[(0, -1), (-1, -1), (1, -1), (-1, 0), (1, 0), (0, 1), (-1, 1), (1, 1)]
        }
        PieceType::Horse => &[(0, -1), (-1, 0), (1, 0), (0, 1)],
        PieceType::Dragon => &[(-1, -1), (1, -1), (-1, 1), (1, 1)],
    }
}

/// Sliding attack directions of `kind`, Black's perspective.
pub(crate) fn slide_deltas(kind: PieceType) -> &'static [(i8, i8)] {
    const DIAG: &[(i8, i8)] = &[(-1, -1), (1, -1), (-1, 1), (1, 1)];
    const ORTHO: &[(i8, i8)] = &[(0, -1), (-1, 0), (1, 0), (0, 1)];
    match kind {
        PieceType::Lance => &[(0, -1)],
        PieceType::Bishop | PieceType::Horse => DIAG,
        PieceType::Rook | PieceType::Dragon => ORTHO,
        _ => &[],
    }
}

/// Mirror a Black-perspective delta for `color`.
#[inline]
pub(crate) fn orient(color: Color, df: i8, dr: i8) -> (i8, i8) {
    match color {
        Color::Black => (df, dr),
        Color::White => (df, -dr),
    }
}

/// Rank as seen by `color`: 1 is the farthest (promotion) rank.
#[inline]
fn relative_rank(color: Color, sq: Square) -> u8 {
    match color {
        Color::Black => sq.rank(),
        Color::White => 10 - sq.rank(),
    }
}

/// Would a piece of `kind` ever move again from `sq`? Pawns and lances die
/// on the last rank, knights on the last two; such destinations force
/// promotion and forbid drops.
#[inline]
fn is_dead_end(color: Color, kind: PieceType, sq: Square) -> bool {
    let rel = relative_rank(color, sq);
    match kind {
        PieceType::Pawn | PieceType::Lance => rel <= 1,
        PieceType::Knight => rel <= 2,
        _ => false,
    }
}

fn push_board_move(out: &mut MoveList, color: Color, kind: PieceType, from: Square, to: Square) {
    let in_zone = relative_rank(color, from) <= 3 || relative_rank(color, to) <= 3;
    let can_promote = kind.promoted().is_some() && in_zone;
    if is_dead_end(color, kind, to) {
        out.push(Move::Board { from, to, promote: true });
        return;
    }
    out.push(Move::Board { from, to, promote: false });
    if can_promote {
        out.push(Move::Board { from, to, promote: true });
    }
}

/// Generate all pseudo-legal moves for the side to move into `out`.
pub(crate) fn pseudo_moves(pos: &Position, out: &mut MoveList) {
    let us = pos.side_to_move();

    for from in Square::all() {
        let Some(piece) = pos.piece_on(from) else { continue };
        if piece.color != us {
            continue;
        }

        for &(df, dr) in step_deltas(piece.kind) {
            let (df, dr) = orient(us, df, dr);
            let Some(to) = from.offset(df, dr) else { continue };
            if pos.piece_on(to).is_some_and(|p| p.color == us) {
                continue;
            }
            push_board_move(out, us, piece.kind, from, to);
        }

        for &(df, dr) in slide_deltas(piece.kind) {
            let (df, dr) = orient(us, df, dr);
            let mut cursor = from;
            while let Some(to) = cursor.offset(df, dr) {
                match pos.piece_on(to) {
                    Some(p) if p.color == us => break,
                    Some(_) => {
                        push_board_move(out, us, piece.kind, from, to);
                        break;
                    }
                    None => {
                        push_board_move(out, us, piece.kind, from, to);
                        cursor = to;
                    }
                }
            }
        }
    }

    // Files already holding one of our unpromoted pawns, for the two-pawn
    // rule.
    let mut pawn_files = [false; 10];
    for sq in Square::all() {
        if pos
            .piece_on(sq)
            .is_some_and(|p| p.color == us && p.kind == PieceType::Pawn)
        {
            pawn_files[sq.file() as usize] = true;
        }
    }

    for kind in PieceType::HAND {
        if pos.hand_count(us, kind) == 0 {
            continue;
        }
        for to in Square::all() {
            if pos.piece_on(to).is_some() {
                continue;
            }
            if is_dead_end(us, kind, to) {
                continue;
            }
            if kind == PieceType::Pawn && pawn_files[to.file() as usize] {
                continue;
            }
            out.push(Move::Drop { piece: kind, to });
        }
    }
}
