//! Standalone driver for `proposer ID [conf]` (§6 CLI surface). A
//! proposer needs a colocated acceptor to store its own promises
//! against (§4.7 ties one Proposer to one Peers set and one Acceptor),
//! so `ID` must appear in both the proposer and acceptor lists; this
//! matches how the multi-replica driver already resolves the proposer
//! role (`driver::spawn_replicas`).

use std::path::PathBuf;

use clap::Parser;
use paxos::storage::MemoryStorage;
use paxos::{Aid, Replica};

#[derive(Parser)]
#[command(name = "proposer")]
struct Opt {
    /// This node's id (must be listed as both an acceptor and a proposer)
    id: Aid,

    /// Path to the configuration file
    conf: Option<PathBuf>,
}

fn main() {
    let opt = Opt::parse();
    let config = samples::load_config(opt.conf.as_deref()).unwrap_or_else(|e| samples::fail("config", e));
    samples::init_logging(&format!("proposer {}", opt.id), config.verbosity, false);

    if !config.proposers.iter().any(|p| p.id == opt.id) {
        samples::fail("startup", format!("id {} is not a configured proposer", opt.id));
    }
    let Some(entry) = config.acceptors.iter().find(|a| a.id == opt.id) else {
        samples::fail("startup", format!("id {} has no colocated acceptor entry", opt.id));
    };
    let port = entry.address.port();

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build().unwrap_or_else(|e| samples::fail("runtime", e));
    runtime.block_on(async move {
        let replica = Replica::new(opt.id, MemoryStorage::new(), &config, true);
        let (deliveries_tx, mut deliveries_rx) = tokio::sync::mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

        let drain = tokio::spawn(async move { while deliveries_rx.recv().await.is_some() {} });
        let run = tokio::spawn(async move { replica.run(port, &config, deliveries_tx, shutdown_rx).await });

        tokio::select! {
            result = run => {
                match result {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => samples::fail("proposer", e),
                    Err(e) => samples::fail("proposer", e),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                log::info!("received SIGINT, shutting down");
                shutdown_tx.send(()).ok();
            }
        }
        drain.abort();
    });
}
