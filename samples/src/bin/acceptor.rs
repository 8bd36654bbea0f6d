//! Standalone driver for `acceptor ID [conf]` (§6 CLI surface): runs
//! this node's acceptor and learner roles only, even if the config also
//! lists `ID` as a proposer — a deployer who wants the proposer role
//! too should run the `replica` binary instead. Thin wrapper around the
//! same `Replica` composition the `replica` binary uses, since roles
//! share one peer set and one storage instance by design (§4.7).

use std::path::PathBuf;

use clap::Parser;
use paxos::storage::MemoryStorage;
use paxos::{Aid, Replica};

#[derive(Parser)]
#[command(name = "acceptor")]
struct Opt {
    /// This node's acceptor id
    id: Aid,

    /// Path to the configuration file
    conf: Option<PathBuf>,
}

fn main() {
    let opt = Opt::parse();
    let config = samples::load_config(opt.conf.as_deref()).unwrap_or_else(|e| samples::fail("config", e));
    samples::init_logging(&format!("acceptor {}", opt.id), config.verbosity, false);

    let Some(entry) = config.acceptors.iter().find(|a| a.id == opt.id) else {
        samples::fail("startup", format!("id {} is not a configured acceptor", opt.id));
    };
    let port = entry.address.port();

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build().unwrap_or_else(|e| samples::fail("runtime", e));
    runtime.block_on(async move {
        let replica = Replica::new(opt.id, MemoryStorage::new(), &config, false);
        let (deliveries_tx, mut deliveries_rx) = tokio::sync::mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

        let drain = tokio::spawn(async move { while deliveries_rx.recv().await.is_some() {} });
        let run = tokio::spawn(async move { replica.run(port, &config, deliveries_tx, shutdown_rx).await });

        tokio::select! {
            result = run => {
                match result {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => samples::fail("acceptor", e),
                    Err(e) => samples::fail("acceptor", e),
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
