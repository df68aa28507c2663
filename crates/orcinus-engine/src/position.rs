//! Board state: mailbox board, hands, side to move and the undo stack.

use anyhow::{Context, Result, anyhow, bail};

use crate::movegen::{self, MoveList};
use crate::types::{Color, Move, Piece, PieceType, Square};
use crate::zobrist::ZOBRIST;

/// SFEN of the standard initial position.
pub const STARTPOS_SFEN: &str =
    "lnsgkgsnl/1r5b1/ppppppppp/9/9/9/PPPPPPPPP/1B5R1/LNSGKGSNL b - 1";

const MAX_HAND: u8 = 18;

#[derive(Debug, Clone)]
struct Undo {
    mv: Move,
    captured: Option<Piece>,
    key: u64,
}

/// A shogi position.
///
/// `do_move` / `undo_move` keep the undo data on an internal stack, so the
/// position itself is the only value callers thread around.
#[derive(Debug, Clone)]
pub struct Position {
    board: [Option<Piece>; Square::COUNT],
    hands: [[u8; 7]; 2],
    side: Color,
    ply: u32,
    key: u64,
    undo: Vec<Undo>,
}

impl Position {
    /// The standard initial position.
    pub fn startpos() -> Position {
        Position::from_sfen(STARTPOS_SFEN).expect("startpos SFEN is well-formed")
    }

    /// Parse an SFEN string: `<board> <side> <hand> [<move number>]`.
    ///
    /// The move number is optional; the reference wire protocol strips it.
    pub fn from_sfen(sfen: &str) -> Result<Position> {
        let fields: Vec<&str> = sfen.split_whitespace().collect();
        if fields.len() < 3 || fields.len() > 4 {
            bail!("SFEN must have 3 or 4 fields, got {}: '{sfen}'", fields.len());
        }

        let mut pos = Position {
            board: [None; Square::COUNT],
            hands: [[0; 7]; 2],
            side: Color::Black,
            ply: 0,
            key: 0,
            undo: Vec::new(),
        };

        // Board: nine ranks separated by '/', files 9..1 within each rank.
        let ranks: Vec<&str> = fields[0].split('/').collect();
        if ranks.len() != 9 {
            bail!("SFEN board must have 9 ranks: '{}'", fields[0]);
        }
        let mut index = 0usize;
        for (rank_no, rank) in ranks.iter().enumerate() {
            let rank_start = index;
            let mut promoted = false;
            for c in rank.chars() {
                if let Some(n) = c.to_digit(10) {
                    if promoted {
                        bail!("dangling '+' in SFEN board: '{rank}'");
                    }
                    index += n as usize;
                } else if c == '+' {
                    if promoted {
                        bail!("doubled '+' in SFEN board: '{rank}'");
                    }
                    promoted = true;
                } else {
                    let color = if c.is_ascii_uppercase() { Color::Black } else { Color::White };
                    let base = PieceType::from_sfen_letter(c.to_ascii_uppercase())
                        .ok_or_else(|| anyhow!("bad piece letter '{c}' in SFEN"))?;
                    let kind = if promoted {
                        base.promoted()
                            .ok_or_else(|| anyhow!("piece '{c}' cannot be promoted"))?
                    } else {
                        base
                    };
                    promoted = false;
                    if index >= rank_start + 9 {
                        bail!("rank {} of SFEN board overflows: '{rank}'", rank_no + 1);
                    }
                    pos.board[index] = Some(Piece::new(color, kind));
                    index += 1;
                }
            }
            if promoted {
                bail!("dangling '+' in SFEN board: '{rank}'");
            }
            if index != rank_start + 9 {
                bail!("rank {} of SFEN board has wrong width: '{rank}'", rank_no + 1);
            }
        }

        pos.side = match fields[1] {
            "b" => Color::Black,
            "w" => Color::White,
            other => bail!("bad side-to-move field '{other}'"),
        };

        // Hands: '-' or counted piece letters, e.g. '2Pb'.
        if fields[2] != "-" {
            let mut count = 0u32;
            for c in fields[2].chars() {
                if let Some(d) = c.to_digit(10) {
                    count = count * 10 + d;
                } else {
                    let color = if c.is_ascii_uppercase() { Color::Black } else { Color::White };
                    let kind = PieceType::from_sfen_letter(c.to_ascii_uppercase())
                        .ok_or_else(|| anyhow!("bad hand letter '{c}' in SFEN"))?;
                    let slot = kind
                        .hand_index()
                        .ok_or_else(|| anyhow!("piece '{c}' cannot be in hand"))?;
                    let n = if count == 0 { 1 } else { count };
                    if n > MAX_HAND as u32 {
                        bail!("hand count {n} out of range in SFEN");
                    }
                    pos.hands[color.index()][slot] = n as u8;
                    count = 0;
                }
            }
            if count != 0 {
                bail!("dangling count in SFEN hand field '{}'", fields[2]);
            }
        }

        if let Some(field) = fields.get(3) {
            let n: u32 = field.parse().with_context(|| format!("bad move number '{field}'"))?;
            pos.ply = n.saturating_sub(1);
        }

        pos.key = pos.compute_key();
        Ok(pos)
    }

    /// Emit the canonical four-field SFEN.
    pub fn sfen(&self) -> String {
        let mut out = String::new();
        for rank in 1..=9u8 {
            if rank > 1 {
                out.push('/');
            }
            let mut empty = 0;
            for file in (1..=9u8).rev() {
                match self.board[Square::new(file, rank).index()] {
                    None => empty += 1,
                    Some(piece) => {
                        if empty > 0 {
                            out.push_str(&empty.to_string());
                            empty = 0;
                        }
                        out.push_str(&piece.to_string());
                    }
                }
            }
            if empty > 0 {
                out.push_str(&empty.to_string());
            }
        }

        out.push(' ');
        out.push(self.side.sfen());
        out.push(' ');

        let mut any = false;
        for &color in &[Color::Black, Color::White] {
            for kind in PieceType::HAND {
                let slot = kind.hand_index().expect("hand kinds have a slot");
                let n = self.hands[color.index()][slot];
                if n == 0 {
                    continue;
                }
                any = true;
                if n > 1 {
                    out.push_str(&n.to_string());
                }
                let c = kind.sfen_letter();
                out.push(if color == Color::Black { c } else { c.to_ascii_lowercase() });
            }
        }
        if !any {
            out.push('-');
        }

        out.push(' ');
        out.push_str(&(self.ply + 1).to_string());
        out
    }

    #[inline]
    pub fn side_to_move(&self) -> Color {
        self.side
    }

    #[inline]
    pub fn key(&self) -> u64 {
        self.key
    }

    #[inline]
    pub fn piece_on(&self, sq: Square) -> Option<Piece> {
        self.board[sq.index()]
    }

    #[inline]
    pub fn hand_count(&self, color: Color, kind: PieceType) -> u8 {
        kind.hand_index().map_or(0, |slot| self.hands[color.index()][slot])
    }

    pub fn king_square(&self, color: Color) -> Option<Square> {
        Square::all().find(|&sq| {
            self.board[sq.index()]
                .is_some_and(|p| p.color == color && p.kind == PieceType::King)
        })
    }

    /// Play a move. The move must be at least pseudo-legal; board
    /// consistency is checked with debug assertions only.
    pub fn do_move(&mut self, mv: Move) {
        let us = self.side;
        let z = &*ZOBRIST;
        let mut captured = None;

        match mv {
            Move::Board { from, to, promote } => {
                let piece = self.board[from.index()].expect("no piece on from-square");
                debug_assert_eq!(piece.color, us, "moving the opponent's piece");

                if let Some(victim) = self.board[to.index()] {
                    debug_assert_ne!(victim.color, us, "capturing own piece");
                    debug_assert_ne!(victim.kind, PieceType::King, "king capture");
                    self.key ^= z.piece(victim.color, victim.kind, to);
                    let base = victim.kind.demoted();
                    let slot = base.hand_index().expect("captured piece goes to hand");
                    let old = self.hands[us.index()][slot];
                    self.key ^= z.hand(us, slot, old);
                    self.hands[us.index()][slot] = old + 1;
                    self.key ^= z.hand(us, slot, old + 1);
                    captured = Some(victim);
                }

                let placed = if promote {
                    Piece::new(us, piece.kind.promoted().expect("promoting unpromotable piece"))
                } else {
                    piece
                };
                self.board[from.index()] = None;
                self.board[to.index()] = Some(placed);
                self.key ^= z.piece(us, piece.kind, from);
                self.key ^= z.piece(us, placed.kind, to);
            }
            Move::Drop { piece, to } => {
                debug_assert!(self.board[to.index()].is_none(), "dropping onto a piece");
                let slot = piece.hand_index().expect("dropping a hand piece");
                let old = self.hands[us.index()][slot];
                debug_assert!(old > 0, "dropping from an empty hand");
                self.key ^= z.hand(us, slot, old);
                self.hands[us.index()][slot] = old - 1;
                self.key ^= z.hand(us, slot, old - 1);
                self.board[to.index()] = Some(Piece::new(us, piece));
                self.key ^= z.piece(us, piece, to);
            }
        }

        self.undo.push(Undo { mv, captured, key: self.key });
        self.key ^= z.side();
        self.side = us.flip();
        self.ply += 1;
    }

    /// Take back the most recent move. Does nothing on an empty stack.
    pub fn undo_move(&mut self) {
        let Some(undo) = self.undo.pop() else {
            log::error!("undo_move on an empty undo stack");
            return;
        };
        let us = self.side.flip();
        self.side = us;
        self.ply -= 1;

        match undo.mv {
            Move::Board { from, to, promote } => {
                let placed = self.board[to.index()].expect("undo: to-square empty");
                let original = if promote {
                    Piece::new(us, placed.kind.demoted())
                } else {
                    placed
                };
                self.board[from.index()] = Some(original);
                self.board[to.index()] = undo.captured;
                if let Some(victim) = undo.captured {
                    let slot = victim.kind.demoted().hand_index().expect("hand slot");
                    self.hands[us.index()][slot] -= 1;
                }
            }
            Move::Drop { piece, to } => {
                self.board[to.index()] = None;
                let slot = piece.hand_index().expect("hand slot");
                self.hands[us.index()][slot] += 1;
            }
        }

        // Keys are restored, not recomputed.
        self.key = if let Some(prev) = self.undo.last() {
            prev.key ^ ZOBRIST.side()
        } else {
            self.compute_key()
        };
        debug_assert_eq!(self.key, self.compute_key());
    }

    /// Depth of the internal undo stack.
    pub fn undo_depth(&self) -> usize {
        self.undo.len()
    }

    /// Is `sq` attacked by any piece of `color`?
    pub fn attacked_by(&self, color: Color, sq: Square) -> bool {
        for from in Square::all() {
            let Some(piece) = self.board[from.index()] else { continue };
            if piece.color != color {
                continue;
            }
            for &(df, dr) in movegen::step_deltas(piece.kind) {
                let (df, dr) = movegen::orient(color, df, dr);
                if from.offset(df, dr) == Some(sq) {
                    return true;
                }
            }
            for &(df, dr) in movegen::slide_deltas(piece.kind) {
                let (df, dr) = movegen::orient(color, df, dr);
                let mut cursor = from;
                while let Some(next) = cursor.offset(df, dr) {
                    if next == sq {
                        return true;
                    }
                    if self.board[next.index()].is_some() {
                        break;
                    }
                    cursor = next;
                }
            }
        }
        false
    }

    /// Is the side to move in check?
    pub fn in_check(&self) -> bool {
        match self.king_square(self.side) {
            Some(king) => self.attacked_by(self.side.flip(), king),
            None => false,
        }
    }

    /// Does the side to move attack the opposing king?
    ///
    /// After a legal move this is always false for the position just
    /// reached; the worker uses it as a king-capture guard.
    pub fn attacks_enemy_king(&self) -> bool {
        match self.king_square(self.side.flip()) {
            Some(king) => self.attacked_by(self.side, king),
            None => false,
        }
    }

    /// All strictly legal moves: pseudo-legal generation filtered so the
    /// mover's king is not left attackable.
    pub fn legal_moves(&mut self) -> MoveList {
        let mut moves = MoveList::new();
        movegen::pseudo_moves(self, &mut moves);
        moves.retain(|&mut mv| {
            self.do_move(mv);
            let safe = !self.attacks_enemy_king();
            self.undo_move();
            safe
        });
        moves
    }

    /// Is `mv` legal in this position?
    pub fn is_legal(&mut self, mv: Move) -> bool {
        self.legal_moves().contains(&mv)
    }

    /// Resolve coordinate-notation text against the legal move list, the
    /// way the wire protocol requires. `None` if the text is malformed or
    /// names no legal move.
    pub fn move_from_text(&mut self, text: &str) -> Option<Move> {
        let mv = Move::from_text(text)?;
        if self.is_legal(mv) { Some(mv) } else { None }
    }

    fn compute_key(&self) -> u64 {
        let z = &*ZOBRIST;
        let mut key = 0u64;
        for sq in Square::all() {
            if let Some(piece) = self.board[sq.index()] {
                key ^= z.piece(piece.color, piece.kind, sq);
            }
        }
        for &color in &[Color::Black, Color::White] {
            for slot in 0..7 {
                key ^= z.hand(color, slot, self.hands[color.index()][slot]);
            }
        }
        if self.side == Color::White {
            key ^= z.side();
        }
        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startpos_round_trip() {
        let pos = Position::startpos();
        assert_eq!(pos.sfen(), STARTPOS_SFEN);
        assert_eq!(pos.side_to_move(), Color::Black);
        assert_eq!(pos.hand_count(Color::Black, PieceType::Pawn), 0);
    }

    #[test]
    fn sfen_with_hands_round_trips() {
        let sfen = "lnsgk1snl/1r4g2/p1pppp1pp/1p4p2/7P1/2P6/PP1PPPP1P/5S1R1/LNSGKG1NL b Bb 11";
        let pos = Position::from_sfen(sfen).unwrap();
        assert_eq!(pos.sfen(), sfen);
        assert_eq!(pos.hand_count(Color::Black, PieceType::Bishop), 1);
        assert_eq!(pos.hand_count(Color::White, PieceType::Bishop), 1);
    }

    #[test]
    fn sfen_move_number_is_optional() {
        let pos = Position::from_sfen(
            "lnsgkgsnl/1r5b1/ppppppppp/9/9/9/PPPPPPPPP/1B5R1/LNSGKGSNL b -",
        )
        .unwrap();
        assert_eq!(pos.sfen(), STARTPOS_SFEN);
    }

    #[test]
    fn sfen_rejects_garbage() {
        assert!(Position::from_sfen("").is_err());
        assert!(Position::from_sfen("lnsgkgsnl/1r5b1 b -").is_err());
        assert!(Position::from_sfen(
            "xnsgkgsnl/1r5b1/ppppppppp/9/9/9/PPPPPPPPP/1B5R1/LNSGKGSNL b - 1"
        )
        .is_err());
        // Rank too wide.
        assert!(Position::from_sfen(
            "lnsgkgsnl9/1r5b1/ppppppppp/9/9/9/PPPPPPPPP/1B5R1/LNSGKGSNL b - 1"
        )
        .is_err());
    }

    #[test]
    fn startpos_has_thirty_legal_moves() {
        let mut pos = Position::startpos();
        assert_eq!(pos.legal_moves().len(), 30);
    }

    #[test]
    fn do_undo_restores_everything() {
        let mut pos = Position::startpos();
        let before_key = pos.key();
        let before_sfen = pos.sfen();

        let moves: Vec<Move> = ["7g7f", "3c3d", "8h2b+"]
            .iter()
            .map(|s| Move::from_text(s).unwrap())
            .collect();
        for &mv in &moves {
            assert!(pos.is_legal(mv), "{mv} should be legal");
            pos.do_move(mv);
        }
        // Bishop capture put a bishop in hand.
        assert_eq!(pos.hand_count(Color::Black, PieceType::Bishop), 1);

        for _ in &moves {
            pos.undo_move();
        }
        assert_eq!(pos.key(), before_key);
        assert_eq!(pos.sfen(), before_sfen);
        assert_eq!(pos.undo_depth(), 0);
    }

    #[test]
    fn key_is_incremental() {
        let mut pos = Position::startpos();
        for text in ["2g2f", "8c8d", "2f2e", "8d8e"] {
            let mv = pos.move_from_text(text).unwrap();
            pos.do_move(mv);
            assert_eq!(pos.key(), pos.compute_key());
        }
    }

    #[test]
    fn move_from_text_rejects_illegal() {
        let mut pos = Position::startpos();
        // Well-formed but illegal: white's pawn push while black to move.
        assert!(pos.move_from_text("3c3d").is_none());
        assert!(pos.move_from_text("nonsense").is_none());
        assert!(pos.move_from_text("7g7f").is_some());
    }

    #[test]
    fn check_detection() {
        // White king on 5a, black rook on 5i gives check down the file.
        let mut pos = Position::from_sfen("4k4/9/9/9/9/9/9/9/4R4 w - 1").unwrap();
        assert!(pos.in_check());
        // Blocking pawn removes the check.
        let mut blocked = Position::from_sfen("4k4/9/4p4/9/9/9/9/9/4R4 w - 1").unwrap();
        assert!(!blocked.in_check());
        // The checked side must address the check.
        for mv in pos.legal_moves() {
            pos.do_move(mv);
            assert!(!pos.attacks_enemy_king(), "{mv} leaves the king en prise");
            pos.undo_move();
        }
        let _ = blocked.legal_moves();
    }
}
