//! The worker's dispatch loop: prioritized inbound commands interleaved
//! with search work.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crossbeam_channel::Receiver;

use orcinus_engine::Value;
use orcinus_rsi::{Command, Reply};

use crate::backend::SearchBackend;
use crate::link::{Link, LinkError, LinkEvent};
use crate::tree::SearchTree;
use crate::IDLE_SLEEP_MS;

/// Static client settings from the CLI.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub login_name: String,
    /// Benchmark score reported at login; this worker runs none.
    pub bench_result: i32,
    /// Transposition table size in megabytes, echoed at login.
    pub hash_size: i32,
    /// Requested search threads. The probe itself is single-threaded; the
    /// value is reported for the server's bookkeeping.
    pub threads: u32,
}

impl ClientConfig {
    pub fn new(login_name: impl Into<String>) -> ClientConfig {
        ClientConfig {
            login_name: login_name.into(),
            bench_result: 0,
            hash_size: 100,
            threads: 2,
        }
    }
}

/// A parsed command waiting in the queue. Ordered by priority, then
/// arrival (FIFO within one priority class).
#[derive(Debug)]
struct PendingCommand {
    priority: u8,
    seq: u64,
    command: Command,
}

impl PartialEq for PendingCommand {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for PendingCommand {}

impl PartialOrd for PendingCommand {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for PendingCommand {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // Max-heap: higher priority first, earlier sequence first.
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Debug, Default)]
struct CommandQueue {
    heap: BinaryHeap<PendingCommand>,
    next_seq: u64,
}

impl CommandQueue {
    fn push(&mut self, command: Command) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(PendingCommand { priority: command.priority(), seq, command });
    }

    fn peek(&self) -> Option<&Command> {
        self.heap.peek().map(|p| &p.command)
    }

    fn pop(&mut self) -> Option<Command> {
        self.heap.pop().map(|p| p.command)
    }
}

/// Outcome of one command-processing pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dispatch {
    /// Queue drained, nothing preempting.
    Idle,
    /// A preempting command is pending (or the client shut down); the
    /// current task must be dropped.
    Aborted,
}

/// One distributed-search worker: the Link, the tree projection, the
/// command queue and the search backend, driven by a single-threaded
/// cooperative loop.
pub struct Client<B: SearchBackend> {
    pub(crate) link: Link,
    events: Receiver<LinkEvent>,
    queue: CommandQueue,
    pub(crate) tree: SearchTree,
    pub(crate) backend: B,
    /// Shared with the link reader and the engine: flipped on `stop`/
    /// `quit` arrival, observed by the in-flight probe, cleared when the
    /// `stop` command is dispatched.
    abort: Arc<AtomicBool>,
    available: bool,
    logined: bool,
    config: ClientConfig,
}

impl<B: SearchBackend> Client<B> {
    pub fn new(
        link: Link,
        events: Receiver<LinkEvent>,
        abort: Arc<AtomicBool>,
        backend: B,
        config: ClientConfig,
    ) -> Client<B> {
        Client {
            link,
            events,
            queue: CommandQueue::default(),
            tree: SearchTree::new(),
            backend,
            abort,
            available: true,
            logined: false,
            config,
        }
    }

    pub fn tree(&self) -> &SearchTree {
        &self.tree
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    pub fn logined(&self) -> bool {
        self.logined
    }

    /// Introduce this worker to the server.
    pub fn login(&mut self) -> Result<(), LinkError> {
        let reply = Reply::Login {
            name: self.config.login_name.clone(),
            bench_result: self.config.bench_result,
            hash_size: self.config.hash_size,
        };
        self.link.send(reply.to_string(), true)?;
        self.logined = true;
        log::info!("logged in as '{}'", self.config.login_name);
        Ok(())
    }

    /// The dispatch loop: commands first, then one unit of search work,
    /// until `quit` or a transport failure. Returns the process exit code.
    pub fn run(&mut self) -> i32 {
        log::info!("dispatch loop started");
        while self.available {
            self.process_commands(false);
            if !self.available {
                break;
            }

            let Some(task) = self.tree.get_search_task() else {
                thread::sleep(Duration::from_millis(IDLE_SLEEP_MS));
                continue;
            };
            self.run_task(task);
        }
        log::info!("dispatch loop finished");
        0
    }

    /// Drain link events into the queue, then dispatch pending commands in
    /// priority order. With `searching` set, a pending command that must
    /// abort the current evaluation is left in the queue and reported.
    pub(crate) fn process_commands(&mut self, searching: bool) -> Dispatch {
        loop {
            self.poll_events();

            let Some(head) = self.queue.peek() else {
                return Dispatch::Idle;
            };
            if searching && head.is_preempting_while_searching() {
                return Dispatch::Aborted;
            }
            let Some(command) = self.queue.pop() else {
                return Dispatch::Idle;
            };
            self.dispatch(command);
            if !self.available {
                return Dispatch::Aborted;
            }
        }
    }

    fn poll_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            match event {
                LinkEvent::Line(line) => match Command::parse(&line) {
                    Ok(command) => self.queue.push(command),
                    Err(e) => {
                        log::error!("dropping frame '{line}': {e}");
                        // The reader pre-arms the abort flag from the first
                        // token alone; a frame that then fails to parse
                        // must not leave it stuck.
                        if orcinus_rsi::line_priority(&line) == orcinus_rsi::PRIORITY_PREEMPT {
                            self.abort.store(false, Ordering::Release);
                        }
                    }
                },
                LinkEvent::Disconnected => {
                    log::info!("link disconnected; shutting down");
                    self.available = false;
                }
            }
        }
    }

    fn dispatch(&mut self, command: Command) {
        match command {
            Command::SetPosition { position_id, sfen, moves } => {
                if let Err(e) = self.tree.set_position(&sfen, &moves, position_id) {
                    log::error!("setposition dropped: {e}");
                }
            }
            Command::MakeMoveRoot { position_id, prev_position_id, mv } => {
                if self.tree.position_id() != prev_position_id {
                    log::error!(
                        "makemoveroot: stale previous pid {prev_position_id} (tree has {})",
                        self.tree.position_id()
                    );
                    return;
                }
                let Some(mv) = self.tree.resolve_root_move(&mv) else {
                    log::error!("makemoveroot: unresolvable move '{mv}'");
                    return;
                };
                self.tree.make_move_root(mv, position_id);
            }
            Command::SetPv { position_id, iteration_depth, pv } => {
                if !self.check_pid("setpv", position_id) {
                    return;
                }
                if iteration_depth < 1 {
                    log::error!("setpv: bad iteration depth {iteration_depth}");
                    return;
                }
                let Some(pv) = self.tree.resolve_pv(&pv) else {
                    log::error!("setpv: pv does not replay from the root");
                    return;
                };
                if pv.is_empty() {
                    log::error!("setpv: empty pv");
                    return;
                }
                self.tree.set_pv(iteration_depth, pv);
            }
            Command::SetMoveList { position_id, iteration_depth, ply_depth, moves } => {
                if !self.check_pid("setmovelist", position_id)
                    || !self.check_itd("setmovelist", iteration_depth)
                {
                    return;
                }
                let moves = self.tree.move_list_from_texts(ply_depth, &moves);
                self.tree.set_move_list(ply_depth, &moves);
            }
            Command::Start { position_id, iteration_depth, ply_depth, alpha, beta } => {
                if !self.check_pid("start", position_id)
                    || !self.check_itd("start", iteration_depth)
                {
                    return;
                }
                self.tree.start(ply_depth, Value::new(alpha), Value::new(beta));
            }
            Command::Notify { position_id, iteration_depth, ply_depth, value } => {
                if !self.check_pid("notify", position_id)
                    || !self.check_itd("notify", iteration_depth)
                {
                    return;
                }
                self.tree.notify(ply_depth, Value::new(value));
            }
            Command::Commit { position_id, iteration_depth, ply_depth } => {
                if !self.check_pid("commit", position_id)
                    || !self.check_itd("commit", iteration_depth)
                {
                    return;
                }
                self.tree.commit(ply_depth);
            }
            Command::Cancel { position_id, iteration_depth, ply_depth } => {
                log::debug!(
                    "cancel pid={position_id} itd={iteration_depth} pld={ply_depth}: no handler, dropped"
                );
            }
            Command::Verify { position_id, iteration_depth, ply_depth, .. } => {
                log::debug!(
                    "verify pid={position_id} itd={iteration_depth} pld={ply_depth}: diagnostics channel, dropped"
                );
            }
            Command::Stop => {
                log::info!("stop: aborting current work, staying connected");
                self.abort.store(false, Ordering::Release);
            }
            Command::Quit => {
                log::info!("quit: closing link");
                self.link.close();
                self.available = false;
            }
        }
    }

    fn check_pid(&self, what: &str, position_id: i32) -> bool {
        if self.tree.position_id() == position_id {
            true
        } else {
            log::error!(
                "{what}: stale pid {position_id} (tree has {}), dropped",
                self.tree.position_id()
            );
            false
        }
    }

    fn check_itd(&self, what: &str, iteration_depth: i32) -> bool {
        if self.tree.iteration_depth() == iteration_depth {
            true
        } else {
            log::error!(
                "{what}: stale itd {iteration_depth} (tree has {}), dropped",
                self.tree.iteration_depth()
            );
            false
        }
    }

    /// Send one reply, logging (not propagating) transport errors: the
    /// disconnect event will shut the loop down on its own.
    pub(crate) fn send_reply(&self, reply: Reply, log_flag: bool) {
        if let Err(e) = self.link.send(reply.to_string(), log_flag) {
            log::error!("failed to send '{reply}': {e}");
        }
    }
}
