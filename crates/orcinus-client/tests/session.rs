//! End-to-end worker sessions against an in-process fake server.
//!
//! Each test binds a local listener, wires a real [`Link`] to the accepted
//! socket, and drives the client's dispatch loop on its own thread while
//! the test plays the server's side of the RSI dialogue.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::unbounded;

use orcinus_client::{Client, ClientConfig, Link, SearchBackend};
use orcinus_engine::{Depth, Move, Position, SearchResult, Value};

/// Backend that plays back canned probe results.
struct ScriptedBackend {
    results: Vec<SearchResult>,
    calls: usize,
}

impl ScriptedBackend {
    fn new(results: Vec<SearchResult>) -> ScriptedBackend {
        ScriptedBackend { results, calls: 0 }
    }
}

impl SearchBackend for ScriptedBackend {
    fn search(
        &mut self,
        _pos: &mut Position,
        _alpha: Value,
        _beta: Value,
        _depth: Depth,
    ) -> SearchResult {
        let index = self.calls.min(self.results.len().saturating_sub(1));
        self.calls += 1;
        self.results[index].clone()
    }
}

/// Backend that blocks until the shared abort flag fires, then reports an
/// incomplete probe, the shape of a real search interrupted by `stop`.
struct BlockingBackend {
    stop: Arc<AtomicBool>,
}

impl SearchBackend for BlockingBackend {
    fn search(
        &mut self,
        _pos: &mut Position,
        alpha: Value,
        _beta: Value,
        _depth: Depth,
    ) -> SearchResult {
        while !self.stop.load(Ordering::Acquire) {
            thread::sleep(Duration::from_millis(10));
        }
        SearchResult { value: alpha, pv: Vec::new(), completed: false, nodes: 0 }
    }
}

fn completed(value: i32, pv: &[&str]) -> SearchResult {
    SearchResult {
        value: Value::new(value),
        pv: pv.iter().map(|s| Move::from_text(s).unwrap()).collect(),
        completed: true,
        nodes: 1,
    }
}

struct Session {
    server: BufReader<TcpStream>,
    client: JoinHandle<(i32, Client<BoxedBackend>)>,
}

type BoxedBackend = Box<dyn SearchBackend + Send>;

/// Accept one worker with the given backend; the worker logs in and runs
/// its dispatch loop on a background thread.
fn start_session(backend: BoxedBackend, abort: Arc<AtomicBool>) -> Session {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let client = thread::spawn(move || {
        let (events_tx, events_rx) = unbounded();
        let link = Link::connect(&addr.ip().to_string(), addr.port(), events_tx, abort.clone())
            .unwrap();
        let mut config = ClientConfig::new("kakiage");
        config.hash_size = 100;
        let mut client = Client::new(link, events_rx, abort, backend, config);
        client.login().unwrap();
        let code = client.run();
        (code, client)
    });

    let (stream, _) = listener.accept().unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(10))).unwrap();
    Session { server: BufReader::new(stream), client }
}

impl Session {
    fn read_line(&mut self) -> String {
        let mut line = String::new();
        self.server.read_line(&mut line).unwrap();
        line.trim_end().to_string()
    }

    fn send(&mut self, line: &str) {
        self.server.get_mut().write_all(format!("{line}\n").as_bytes()).unwrap();
    }

    fn finish(self) -> (i32, Client<BoxedBackend>) {
        self.client.join().unwrap()
    }
}

#[test]
fn login_setup_search_and_quit() {
    // Probe 1 fails low for the first candidate, probe 2 fails high and
    // the research lands at -30 (child view), i.e. +30 for the row.
    let backend = Box::new(ScriptedBackend::new(vec![
        completed(100, &[]),
        completed(50, &[]),
        completed(-30, &["8c8d"]),
    ]));
    let abort = Arc::new(AtomicBool::new(false));
    let mut session = start_session(backend, abort);

    assert_eq!(session.read_line(), "login kakiage 0 100");

    session.send("setposition 1 startpos");
    session.send("setpv 1 2 7g7f");
    // Window first, then candidates: the first task is only mintable once
    // both have landed, which pins down the probe windows below.
    session.send("start 1 2 0 -100 100");
    session.send("setmovelist 1 2 0 2g2f 6i7h");

    // First candidate: null-window probe fails low, no research.
    assert_eq!(session.read_line(), "updatevalue 1 2 0 2g2f 100 -100 100 0");
    // Second candidate: research improves the row to 30.
    assert_eq!(session.read_line(), "updatevalue 1 2 0 6i7h -30 -100 100 0 8c8d");
    // Both candidates settled: the ply reports itself done.
    assert_eq!(session.read_line(), "searchdone 1 2 0");

    session.send("quit");
    let (code, client) = session.finish();
    assert_eq!(code, 0);

    let tree = client.tree();
    assert_eq!(tree.position_id(), 1);
    assert_eq!(tree.iteration_depth(), 2);
    // The research's improvement was folded back through notify.
    assert_eq!(tree.row(0).unwrap().alpha(), Value::new(30));
    let node = tree.row(0).unwrap().node(1).unwrap();
    assert_eq!(node.lower(), Value::new(-30));
    assert_eq!(node.upper(), Value::new(-30));
    assert_eq!(node.best_move(), Some(Move::from_text("8c8d").unwrap()));
}

#[test]
fn stop_aborts_inflight_probe_without_reply() {
    let abort = Arc::new(AtomicBool::new(false));
    let backend = Box::new(BlockingBackend { stop: abort.clone() });
    let mut session = start_session(backend, abort.clone());

    assert_eq!(session.read_line(), "login kakiage 0 100");

    session.send("setposition 1 startpos");
    session.send("setpv 1 2 7g7f");
    session.send("start 1 2 0 -100 100");
    session.send("setmovelist 1 2 0 2g2f");

    // Let the worker enter the blocking probe, then preempt it.
    thread::sleep(Duration::from_millis(400));
    session.send("stop");
    session.send("quit");

    // No updatevalue ever goes out: the aborted probe is discarded. Drain
    // until the client's write side closes.
    let mut line = String::new();
    while session.server.read_line(&mut line).map(|n| n > 0).unwrap_or(false) {
        assert!(!line.starts_with("updatevalue"), "unexpected reply: {line}");
        line.clear();
    }

    let (code, client) = session.finish();
    assert_eq!(code, 0);

    // The task is still marked undone locally.
    let tree = client.tree();
    let node = tree.row(0).unwrap().node(0).unwrap();
    assert_eq!(node.depth(), Depth::NONE);
}

#[test]
fn stale_commands_leave_tree_unmodified() {
    let backend = Box::new(ScriptedBackend::new(vec![completed(0, &[])]));
    let abort = Arc::new(AtomicBool::new(false));
    let mut session = start_session(backend, abort);

    assert_eq!(session.read_line(), "login kakiage 0 100");

    session.send("setposition 1 startpos");
    session.send("setpv 1 2 7g7f");
    // Wrong position id, wrong iteration depth, unknown packet: all dropped.
    session.send("notify 99 2 0 50");
    session.send("start 1 5 0 -100 100");
    session.send("loginresult welcome");
    session.send("quit");

    let (code, client) = session.finish();
    assert_eq!(code, 0);

    let tree = client.tree();
    assert_eq!(tree.position_id(), 1);
    assert_eq!(tree.iteration_depth(), 2);
    let row = tree.row(0).unwrap();
    assert_eq!(row.alpha(), -Value::INFINITE);
    assert_eq!(row.beta(), Value::INFINITE);
}

#[test]
fn server_disconnect_ends_the_loop() {
    let backend = Box::new(ScriptedBackend::new(vec![completed(0, &[])]));
    let abort = Arc::new(AtomicBool::new(false));
    let mut session = start_session(backend, abort);

    assert_eq!(session.read_line(), "login kakiage 0 100");
    session.send("setposition 3 startpos");

    // Kill the connection without a quit.
    session.server.get_mut().shutdown(std::net::Shutdown::Both).unwrap();

    let (code, client) = session.finish();
    assert_eq!(code, 0);
    assert!(!client.is_available());
    assert_eq!(client.tree().position_id(), 3);
}
