//! Standalone driver for `learner [conf]` (§6 CLI surface): a pure
//! observer with no acceptor or proposer role of its own. It dials
//! every configured acceptor exactly as a replica's proposer side
//! would, periodically polling gaps with `Repeat` (§4.4's catch-up
//! path) and printing each delivered value as it completes.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use paxos::learner::Learner;
use paxos::message::{Frame, ProtocolMessage};
use paxos::net::Peers;

/// Id reserved for the standalone learner's peer connections, clear of
/// any id a deployer would plausibly assign to a real acceptor.
const LEARNER_PEER_ID: u32 = u32::MAX;
const REPEAT_INTERVAL: Duration = Duration::from_millis(100);
const REPEAT_BATCH: u32 = 10;

#[derive(Parser)]
#[command(name = "learner")]
struct Opt {
    /// Path to the configuration file
    conf: Option<PathBuf>,
}

fn main() {
    let opt = Opt::parse();
    let config = samples::load_config(opt.conf.as_deref()).unwrap_or_else(|e| samples::fail("config", e));
    samples::init_logging("learner", config.verbosity, false);

    if config.acceptors.is_empty() {
        samples::fail("startup", "config lists no acceptors to learn from");
    }

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build().unwrap_or_else(|e| samples::fail("runtime", e));
    runtime.block_on(async move {
        let (peers, mut inbound) = Peers::new(LEARNER_PEER_ID, config.tcp_nodelay);
        peers.connect_to_acceptors(&config.acceptors);

        let mut learner = Learner::new(config.acceptor_count(), 1, config.learner_catch_up);
        let mut tick = tokio::time::interval(REPEAT_INTERVAL);

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    log::info!("received SIGINT, shutting down");
                    peers.shutdown().await;
                    return;
                }

                Some((_src, frame)) = inbound.recv() => {
                    if let ProtocolMessage::Accepted { aid, iid, ballot, value, .. } = frame.message {
                        learner.on_accepted(aid, iid, ballot, value);
                        while let Some((iid, value)) = learner.deliver_next() {
                            println!("{}\t{}", iid, String::from_utf8_lossy(&value));
                        }
                    }
                }

                _ = tick.tick() => {
                    if let Some((from, to)) = learner.has_holes() {
                        let to = to.min(from + REPEAT_BATCH);
                        peers.broadcast_acceptors(Frame { tracer: 0, message: ProtocolMessage::Repeat { from_iid: from, to_iid: to } });
                    }
                }
            }
        }
    });
}
