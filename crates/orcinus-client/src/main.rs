//! `rsi_client`: a distributed-search worker process.
//!
//! Connects to the coordinating server, logs in, and contributes CPU to
//! the shared game-tree search until the server says `quit`.

use std::process::exit;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use clap::Parser;
use crossbeam_channel::unbounded;

use orcinus_client::{Client, ClientConfig, EngineBackend, Link};

#[derive(Parser, Debug)]
#[command(name = "rsi_client", about = "Distributed shogi search worker")]
struct Args {
    /// Server host name or address.
    host: String,
    /// Server TCP port.
    port: u16,
    /// Login name this worker reports to the server.
    name: String,

    /// Search threads to report to the server.
    #[arg(long, default_value_t = 2)]
    threads: u32,

    /// Transposition table size in megabytes.
    #[arg(long, default_value_t = 100)]
    hash: u32,

    /// Enable debug logging.
    #[arg(long)]
    debug: bool,
}

fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            let code = match e.kind() {
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            exit(code);
        }
    };

    let default_level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, default_level),
    )
    .init();

    log::info!(
        "starting worker '{}' (server {}:{}, threads={}, hash={}MB)",
        args.name,
        args.host,
        args.port,
        args.threads,
        args.hash
    );

    let (events_tx, events_rx) = unbounded();
    let abort = Arc::new(AtomicBool::new(false));

    let link = match Link::connect(&args.host, args.port, events_tx, abort.clone()) {
        Ok(link) => link,
        Err(e) => {
            log::error!("could not reach {}:{}: {e}", args.host, args.port);
            exit(1);
        }
    };

    let backend = EngineBackend::new(args.hash as usize, abort.clone());
    let mut config = ClientConfig::new(args.name);
    config.hash_size = args.hash as i32;
    config.threads = args.threads;

    let mut client = Client::new(link, events_rx, abort, backend, config);
    if let Err(e) = client.login() {
        log::error!("login failed: {e}");
        exit(1);
    }

    exit(client.run());
}
