//! One TCP connection to the server, line-framed in both directions.
//!
//! A reader thread turns inbound bytes into [`LinkEvent`]s on a channel
//! the dispatch loop drains; a writer thread drains a mutex-protected
//! outbound deque with a single in-flight slot. Any transport error is
//! fatal for the link: both threads funnel into a disconnect that is
//! delivered to the listener exactly once.
//!
//! Preempting packets (`stop`, `quit`) additionally flip a shared abort
//! flag the moment the reader sees them, so an in-flight search observes
//! the preemption without waiting for the dispatch loop.

use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use crossbeam_channel::Sender;
use thiserror::Error;

use orcinus_rsi::{PRIORITY_PREEMPT, line_priority};

/// Delay between connection attempts at startup.
pub const CONNECT_RETRY: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("link is closed")]
    Closed,
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// What the reader thread reports to the listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// One received line, frame delimiter stripped.
    Line(String),
    /// The connection is gone, by either side's doing. Sent once.
    Disconnected,
}

#[derive(Debug)]
struct SendData {
    text: String,
    log_flag: bool,
}

#[derive(Debug, Default)]
struct Outbound {
    queue: VecDeque<SendData>,
    in_flight: bool,
    shutdown: bool,
}

struct Shared {
    outbound: Mutex<Outbound>,
    ready: Condvar,
    disconnected: AtomicBool,
    events: Sender<LinkEvent>,
}

impl Shared {
    /// Funnel for every failure path. The first caller wins; later calls
    /// are no-ops.
    fn signal_disconnect(&self) {
        if self.disconnected.swap(true, Ordering::AcqRel) {
            return;
        }
        {
            let mut outbound = self.outbound.lock().expect("outbound mutex");
            outbound.queue.clear();
            outbound.shutdown = true;
        }
        self.ready.notify_all();
        let _ = self.events.send(LinkEvent::Disconnected);
    }
}

/// The client's owned connection.
pub struct Link {
    shared: Arc<Shared>,
    stream: TcpStream,
}

impl Link {
    /// Connect to `host:port`, re-resolving and retrying every
    /// [`CONNECT_RETRY`] until a socket is established. Resolution failure
    /// is fatal; connection failure retries.
    pub fn connect(
        host: &str,
        port: u16,
        events: Sender<LinkEvent>,
        preempt: Arc<AtomicBool>,
    ) -> Result<Link, LinkError> {
        log::info!("connecting to {host}:{port}");
        loop {
            let addrs: Vec<_> = (host, port).to_socket_addrs()?.collect();
            let mut last_err = None;
            for addr in &addrs {
                match TcpStream::connect(addr) {
                    Ok(stream) => {
                        log::info!("connected to {addr}");
                        return Link::from_stream(stream, events, preempt);
                    }
                    Err(e) => last_err = Some(e),
                }
            }
            match last_err {
                Some(e) => log::warn!("connect failed ({e}), retrying"),
                None => log::warn!("{host}:{port} resolved to no addresses, retrying"),
            }
            thread::sleep(CONNECT_RETRY);
        }
    }

    /// Wrap an already-established socket (the accept side uses this, and
    /// so do the tests).
    pub fn from_stream(
        stream: TcpStream,
        events: Sender<LinkEvent>,
        preempt: Arc<AtomicBool>,
    ) -> Result<Link, LinkError> {
        let shared = Arc::new(Shared {
            outbound: Mutex::new(Outbound::default()),
            ready: Condvar::new(),
            disconnected: AtomicBool::new(false),
            events,
        });

        let reader_stream = stream.try_clone()?;
        let reader_shared = shared.clone();
        thread::Builder::new()
            .name("rsi-link-reader".into())
            .spawn(move || reader_loop(reader_stream, reader_shared, preempt))?;

        let writer_stream = stream.try_clone()?;
        let writer_shared = shared.clone();
        thread::Builder::new()
            .name("rsi-link-writer".into())
            .spawn(move || writer_loop(writer_stream, writer_shared))?;

        Ok(Link { shared, stream })
    }

    /// Queue one line for sending. `log_flag` controls whether the send is
    /// worth a log line (bulk `updatevalue` traffic is not).
    pub fn send(&self, text: impl Into<String>, log_flag: bool) -> Result<(), LinkError> {
        let text = text.into();
        {
            let mut outbound = self.shared.outbound.lock().expect("outbound mutex");
            if outbound.shutdown || self.shared.disconnected.load(Ordering::Acquire) {
                return Err(LinkError::Closed);
            }
            outbound.queue.push_back(SendData { text, log_flag });
        }
        self.shared.ready.notify_one();
        Ok(())
    }

    /// Half-shut the write side and drop anything still queued. Inbound
    /// keeps draining until the peer closes, which then raises the
    /// disconnect event.
    pub fn close(&self) {
        {
            let mut outbound = self.shared.outbound.lock().expect("outbound mutex");
            outbound.queue.clear();
            outbound.shutdown = true;
        }
        self.shared.ready.notify_all();
        let _ = self.stream.shutdown(Shutdown::Write);
    }

    /// Has the disconnect event fired?
    pub fn is_disconnected(&self) -> bool {
        self.shared.disconnected.load(Ordering::Acquire)
    }

    /// Is a line currently being written to the socket?
    pub fn is_sending(&self) -> bool {
        let outbound = self.shared.outbound.lock().expect("outbound mutex");
        outbound.in_flight || !outbound.queue.is_empty()
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        // Unblock both threads; they exit on their own.
        {
            let mut outbound = self.shared.outbound.lock().expect("outbound mutex");
            outbound.shutdown = true;
        }
        self.shared.ready.notify_all();
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

fn reader_loop(stream: TcpStream, shared: Arc<Shared>, preempt: Arc<AtomicBool>) {
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) => {
                log::info!("peer closed the connection");
                break;
            }
            Ok(_) => {
                let text = line.trim_end_matches(['\n', '\r']);
                if text.is_empty() {
                    continue;
                }
                log::debug!("recv: {text}");
                if line_priority(text) == PRIORITY_PREEMPT {
                    preempt.store(true, Ordering::Release);
                }
                if shared.events.send(LinkEvent::Line(text.to_string())).is_err() {
                    // Listener is gone; nothing left to read for.
                    break;
                }
            }
            Err(e) => {
                if !shared.disconnected.load(Ordering::Acquire) {
                    log::error!("read error: {e}");
                }
                break;
            }
        }
    }
    shared.signal_disconnect();
}

fn writer_loop(stream: TcpStream, shared: Arc<Shared>) {
    let mut stream = stream;
    loop {
        // Claim the next outgoing line into the in-flight slot.
        let data = {
            let mut outbound = shared.outbound.lock().expect("outbound mutex");
            loop {
                if outbound.shutdown {
                    return;
                }
                if let Some(data) = outbound.queue.pop_front() {
                    outbound.in_flight = true;
                    break data;
                }
                outbound = shared.ready.wait(outbound).expect("outbound mutex");
            }
        };

        if data.log_flag {
            log::debug!("send: {}", data.text);
        }
        let mut text = data.text;
        if !text.ends_with('\n') {
            text.push('\n');
        }

        let result = stream.write_all(text.as_bytes()).and_then(|()| stream.flush());
        {
            let mut outbound = shared.outbound.lock().expect("outbound mutex");
            outbound.in_flight = false;
        }
        if let Err(e) = result {
            log::error!("write error: {e}");
            shared.signal_disconnect();
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use std::net::TcpListener;

    fn pair() -> (Link, crossbeam_channel::Receiver<LinkEvent>, TcpStream, Arc<AtomicBool>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();

        let (tx, rx) = unbounded();
        let preempt = Arc::new(AtomicBool::new(false));
        let link = Link::from_stream(client, tx, preempt.clone()).unwrap();
        (link, rx, server, preempt)
    }

    #[test]
    fn receives_lines_and_flags_preempts() {
        let (_link, rx, mut server, preempt) = pair();

        server.write_all(b"notify 1 6 2 30\nstop\n").unwrap();
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            LinkEvent::Line("notify 1 6 2 30".into())
        );
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            LinkEvent::Line("stop".into())
        );
        assert!(preempt.load(Ordering::Acquire));
    }

    #[test]
    fn sends_append_newline() {
        let (link, _rx, server, _) = pair();
        link.send("login kakiage 0 100", true).unwrap();
        link.send("searchdone 1 6 2", false).unwrap();

        let mut reader = BufReader::new(server);
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        assert_eq!(line, "login kakiage 0 100\n");
        line.clear();
        reader.read_line(&mut line).unwrap();
        assert_eq!(line, "searchdone 1 6 2\n");
        // Both lines are on the wire; the in-flight slot drains shortly
        // after.
        for _ in 0..100 {
            if !link.is_sending() {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(!link.is_sending());
    }

    #[test]
    fn peer_close_raises_disconnect_once() {
        let (link, rx, server, _) = pair();
        drop(server);

        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            LinkEvent::Disconnected
        );
        assert!(link.is_disconnected());
        // No duplicate event follows.
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
        // Sends now fail.
        assert!(matches!(link.send("late", false), Err(LinkError::Closed)));
    }

    #[test]
    fn close_rejects_further_sends() {
        let (link, _rx, _server, _) = pair();
        link.close();
        assert!(matches!(link.send("x", false), Err(LinkError::Closed)));
    }

    #[test]
    fn empty_lines_are_skipped() {
        let (_link, rx, mut server, _) = pair();
        server.write_all(b"\n\nquit\n").unwrap();
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            LinkEvent::Line("quit".into())
        );
    }
}
