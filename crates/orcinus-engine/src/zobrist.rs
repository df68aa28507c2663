//! Zobrist keys for positions.
//!
//! Keys are generated once from a fixed seed so that hashes are stable
//! across runs and across the worker fleet.

use once_cell::sync::Lazy;
use rand::Rng;
use rand_xoshiro::Xoshiro256PlusPlus;
use rand_xoshiro::rand_core::SeedableRng;

use crate::types::{Color, PieceType, Square};

const MAX_HAND: usize = 18;

pub(crate) struct Zobrist {
    piece: [[[u64; Square::COUNT]; PieceType::COUNT]; 2],
    // Indexed by hand count; slot 0 stays zero so an empty hand does not
    // contribute and count transitions can xor old against new.
    hand: [[[u64; MAX_HAND + 1]; 7]; 2],
    side: u64,
}

pub(crate) static ZOBRIST: Lazy<Zobrist> = Lazy::new(|| {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(0x6f72_6369_6e75_7321);
    let mut z = Zobrist {
        piece: [[[0; Square::COUNT]; PieceType::COUNT]; 2],
        hand: [[[0; MAX_HAND + 1]; 7]; 2],
        side: rng.random(),
    };
    for color in &mut z.piece {
        for kind in color.iter_mut() {
            for key in kind.iter_mut() {
                *key = rng.random();
            }
        }
    }
    for color in &mut z.hand {
        for kind in color.iter_mut() {
            for key in kind.iter_mut().skip(1) {
                *key = rng.random();
            }
        }
    }
    z
});

impl Zobrist {
    #[inline]
    pub(crate) fn piece(&self, color: Color, kind: PieceType, sq: Square) -> u64 {
        self.piece[color.index()][kind.index()][sq.index()]
    }

    #[inline]
    pub(crate) fn hand(&self, color: Color, slot: usize, count: u8) -> u64 {
        self.hand[color.index()][slot][count as usize]
    }

    #[inline]
    pub(crate) fn side(&self) -> u64 {
        self.side
    }
}
