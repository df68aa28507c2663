//! Seam to the search primitive.
//!
//! The worker only ever needs one synchronous operation, searching a
//! walked position within a window to a fixed depth, so that is the whole
//! trait.
//! Tests substitute scripted implementations; the binary wires in
//! [`EngineBackend`].

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use orcinus_engine::{Depth, Position, SearchResult, Searcher, Value};

pub trait SearchBackend {
    /// Probe `pos` within `(alpha, beta)` to `depth`. A result with
    /// `completed == false` means the probe was aborted and its value must
    /// be discarded.
    fn search(
        &mut self,
        pos: &mut Position,
        alpha: Value,
        beta: Value,
        depth: Depth,
    ) -> SearchResult;
}

impl<T: SearchBackend + ?Sized> SearchBackend for Box<T> {
    fn search(
        &mut self,
        pos: &mut Position,
        alpha: Value,
        beta: Value,
        depth: Depth,
    ) -> SearchResult {
        (**self).search(pos, alpha, beta, depth)
    }
}

/// The real engine behind the trait. Owns the transposition table and the
/// node counter; shares the cooperative stop flag with the link reader and
/// the dispatch loop.
pub struct EngineBackend {
    searcher: Searcher,
}

impl EngineBackend {
    pub fn new(hash_megabytes: usize, stop: Arc<AtomicBool>) -> EngineBackend {
        EngineBackend { searcher: Searcher::new(hash_megabytes, stop) }
    }

    /// Nodes searched since startup.
    pub fn total_nodes(&self) -> u64 {
        self.searcher.total_nodes()
    }
}

impl SearchBackend for EngineBackend {
    fn search(
        &mut self,
        pos: &mut Position,
        alpha: Value,
        beta: Value,
        depth: Depth,
    ) -> SearchResult {
        self.searcher.search(pos, alpha, beta, depth)
    }
}
