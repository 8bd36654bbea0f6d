//! Standalone driver for `replica ID [conf] [-v]` (§6 CLI surface): runs
//! one acceptor, plus a proposer iff `ID` also appears in the config's
//! proposer list, plus one learner, all sharing a single peer set.
//! Mirrors the teacher's `chatroom-server` binary's role as the one
//! process a deployer actually runs in production.

use std::path::PathBuf;

use clap::Parser;
use paxos::storage::{AnyStorage, MemoryStorage};
use paxos::{config::StorageBackend, Aid, Replica};

#[cfg(feature = "disk-storage")]
use paxos::storage::DiskStorage;

#[derive(Parser)]
#[command(name = "replica")]
struct Opt {
    /// This node's acceptor id
    id: Aid,

    /// Path to the configuration file
    conf: Option<PathBuf>,

    /// Raise logging to trace regardless of the config's verbosity option
    #[arg(short = 'v', long)]
    verbose: bool,
}

fn main() {
    let opt = Opt::parse();
    let config = samples::load_config(opt.conf.as_deref()).unwrap_or_else(|e| samples::fail("config", e));
    samples::init_logging(&format!("replica {}", opt.id), config.verbosity, opt.verbose);

    let Some(entry) = config.acceptors.iter().find(|a| a.id == opt.id) else {
        samples::fail("startup", format!("id {} is not a configured acceptor", opt.id));
    };
    let port = entry.address.port();
    let is_proposer = config.proposers.iter().any(|p| p.id == opt.id);
    let storage = open_storage(&config, opt.id);

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build().unwrap_or_else(|e| samples::fail("runtime", e));
    runtime.block_on(async move {
        let replica = Replica::new(opt.id, storage, &config, is_proposer);
        let (deliveries_tx, mut deliveries_rx) = tokio::sync::mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

        let drain = tokio::spawn(async move {
            while let Some((iid, value)) = deliveries_rx.recv().await {
                log::info!("delivered iid {} ({} bytes)", iid, value.len());
            }
        });

        let run = tokio::spawn(async move { replica.run(port, &config, deliveries_tx, shutdown_rx).await });

        tokio::select! {
            result = run => {
                match result {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => samples::fail("replica", e),
                    Err(e) => samples::fail("replica", e),
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

#[cfg(feature = "disk-storage")]
fn open_storage(config: &paxos::Config, id: Aid) -> AnyStorage {
    match config.storage_backend {
        StorageBackend::Memory => AnyStorage::Memory(MemoryStorage::new()),
        StorageBackend::Disk => {
            let path = format!("{}-{}", config.lmdb_env_path, id);
            DiskStorage::open(&path, config.acceptor_trash_files).map(AnyStorage::Disk).unwrap_or_else(|e| samples::fail("storage", e))
        }
    }
}

#[cfg(not(feature = "disk-storage"))]
fn open_storage(config: &paxos::Config, _id: Aid) -> AnyStorage {
    if config.storage_backend == StorageBackend::Disk {
        samples::fail("storage", "disk backend selected but the disk-storage feature is not enabled");
    }
    AnyStorage::Memory(MemoryStorage::new())
}
