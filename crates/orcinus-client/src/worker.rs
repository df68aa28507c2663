//! The worker evaluator: take one task from the tree, walk the PV, run a
//! null-window probe (and a research when it fails high), then fold the
//! result back into the node and report it upstream.

use orcinus_engine::{Depth, Move, Value};
use orcinus_rsi::Reply;

use crate::backend::SearchBackend;
use crate::client::{Client, Dispatch};
use crate::mover::ScopedMover;
use crate::search_depth;
use crate::task::SearchTask;

enum Outcome {
    /// The walked position left our own king attackable: a king capture
    /// is one ply away, no search needed.
    Decisive(Value),
    Probe {
        /// Parent-perspective value of the searched move.
        value: Value,
        /// Child PV from the research; empty without an improvement.
        pv: Vec<Move>,
        /// Did the research raise alpha?
        improved: bool,
    },
}

impl<B: SearchBackend> Client<B> {
    /// Evaluate one search task. Every exit path leaves the tree's root
    /// position rewound; a preempted or stale task produces no reply.
    pub(crate) fn run_task(&mut self, task: SearchTask) {
        // A preempting command may have arrived while this task was being
        // picked; non-preempting ones are applied before we read the row.
        if self.process_commands(true) == Dispatch::Aborted {
            return;
        }

        // The tree may have moved on since the task was minted.
        if self.tree.position_id() != task.position_id()
            || self.tree.iteration_depth() != task.iteration_depth()
        {
            return;
        }
        let pld = task.ply_depth();
        let Some(row) = self.tree.row(pld) else { return };
        let Some(node) = row.node(task.node_index()) else { return };
        if node.mv() != task.mv() {
            return;
        }

        let position_id = task.position_id();
        let iteration_depth = task.iteration_depth();
        let mv = task.mv();
        let alpha = row.effective_alpha();
        let beta = row.beta();
        let depth = search_depth(iteration_depth, pld) - Depth::ONE_PLY;
        let prefix: Vec<Move> = self.tree.pv_from_root()[..pld as usize].to_vec();

        let outcome = {
            let (position, _) = self.tree.position_and_rows();
            let mut mover = ScopedMover::new(position);
            for &pv_move in &prefix {
                if !mover.do_move(pv_move) {
                    log::error!("task at pld={pld}: pv does not replay, dropping task");
                    return;
                }
            }
            if !mover.do_move(mv) {
                log::error!("task move '{mv}' is illegal at pld={pld}, dropping task");
                return;
            }

            if mover.position_ref().attacks_enemy_king() {
                Outcome::Decisive(Value::mate_in(1))
            } else {
                log::debug!(
                    "search: itd={iteration_depth}, pld={pld}, move={mv}, alpha={}, beta={}",
                    -beta,
                    -alpha
                );

                let probe = self.backend.search(mover.position(), -alpha - 1, -alpha, depth);
                if !probe.completed {
                    return;
                }
                let mut value = -probe.value;
                let mut pv = Vec::new();
                let mut improved = false;

                if value > alpha {
                    let research = self.backend.search(mover.position(), -beta, -alpha, depth);
                    if !research.completed {
                        return;
                    }
                    value = -research.value;
                    log::info!("research: move={mv}, value={}", research.value);

                    if alpha < value {
                        pv = research.pv;
                        improved = true;
                    }
                }

                Outcome::Probe { value, pv, improved }
            }
        };

        match outcome {
            Outcome::Decisive(value) => {
                if let Some(node) =
                    self.tree.row_mut(pld).and_then(|row| row.node_mut(task.node_index()))
                {
                    node.update_window(Depth::DECISIVE, value, value, value + 1, 0, None);
                }
                self.send_reply(
                    Reply::UpdateValue {
                        position_id,
                        iteration_depth,
                        ply_depth: pld,
                        mv: mv.to_string(),
                        value: value.raw(),
                        alpha: value.raw(),
                        beta: (value + 1).raw(),
                        nodes: 0,
                        pv: Vec::new(),
                    },
                    true,
                );
                self.report_searchdone_if_row_dry(position_id, iteration_depth, pld);
            }
            Outcome::Probe { value, pv, improved } => {
                if improved {
                    log::info!("updated value: move={mv}, value={value}, pv={}", join(&pv));
                    self.tree.notify(pld, value);
                }

                let best = pv.first().copied();
                if let Some(node) =
                    self.tree.row_mut(pld).and_then(|row| row.node_mut(task.node_index()))
                {
                    node.update_window(
                        depth + Depth::ONE_PLY,
                        -value,
                        -beta,
                        -alpha,
                        0,
                        best,
                    );
                }

                self.send_reply(
                    Reply::UpdateValue {
                        position_id,
                        iteration_depth,
                        ply_depth: pld,
                        mv: mv.to_string(),
                        value: (-value).raw(),
                        alpha: (-beta).raw(),
                        beta: (-alpha).raw(),
                        nodes: 0,
                        pv: pv.iter().map(|m| m.to_string()).collect(),
                    },
                    improved,
                );

                self.report_searchdone_if_row_dry(position_id, iteration_depth, pld);
            }
        }
    }

    /// The row may have just run dry under its current window; tell the
    /// server this ply has nothing left.
    fn report_searchdone_if_row_dry(
        &self,
        position_id: i32,
        iteration_depth: i32,
        ply_depth: i32,
    ) {
        let Some(row) = self.tree.row(ply_depth) else { return };
        let full_depth = search_depth(iteration_depth, ply_depth);
        if row.node_count() > 0
            && row.find_undone(full_depth, row.effective_alpha(), row.beta()).is_none()
        {
            self.send_reply(
                Reply::SearchDone { position_id, iteration_depth, ply_depth },
                true,
            );
        }
    }
}

fn join(moves: &[Move]) -> String {
    moves.iter().map(|m| m.to_string()).collect::<Vec<_>>().join(" ")
}
