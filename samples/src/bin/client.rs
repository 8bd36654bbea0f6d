//! Standalone driver for `client [conf] [-p proposer_id] [-o outstanding]
//! [-v value_size]` (§6 CLI surface): a load generator that opens one
//! connection to a proposer and fires a pipelined burst of random
//! `ClientValue` submissions, mirroring the original's benchmarking
//! client without the harness's subprocess orchestration.

use std::path::PathBuf;

use clap::Parser;
use futures::SinkExt;
use rand::RngCore;
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use paxos::{message, Aid, Frame, ProtocolMessage};

#[derive(Parser)]
#[command(name = "client")]
struct Opt {
    /// Path to the configuration file
    conf: Option<PathBuf>,

    /// Id of the proposer to submit to; defaults to the first configured one
    #[arg(short = 'p', long)]
    proposer_id: Option<Aid>,

    /// Number of values to submit
    #[arg(short = 'o', long, default_value_t = 100)]
    outstanding: u32,

    /// Size in bytes of each submitted value
    #[arg(short = 'v', long, default_value_t = 64)]
    value_size: usize,
}

fn main() {
    let opt = Opt::parse();
    let config = samples::load_config(opt.conf.as_deref()).unwrap_or_else(|e| samples::fail("config", e));
    samples::init_logging("client", config.verbosity, false);

    let target = match opt.proposer_id {
        Some(id) => config.proposers.iter().find(|p| p.id == id),
        None => config.proposers.first(),
    };
    let Some(target) = target else {
        samples::fail("startup", "config lists no matching proposer to submit to");
    };
    let addr = target.address;

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build().unwrap_or_else(|e| samples::fail("runtime", e));
    runtime.block_on(async move {
        let stream = match TcpStream::connect(addr).await {
            Ok(stream) => stream,
            Err(e) => samples::fail("connect", e),
        };
        stream.set_nodelay(config.tcp_nodelay).ok();
        let mut framed = Framed::new(stream, LengthDelimitedCodec::new());

        let mut rng = rand::thread_rng();
        for n in 0..opt.outstanding {
            let mut value = vec![0u8; opt.value_size];
            rng.fill_bytes(&mut value);
            let frame = Frame { tracer: n, message: ProtocolMessage::ClientValue { value } };
            let bytes = match message::encode(&frame) {
                Ok(bytes) => bytes,
                Err(e) => samples::fail("encode", e),
            };
            if let Err(e) = framed.send(bytes.into()).await {
                samples::fail("send", e);
            }
        }
        log::info!("submitted {} values to proposer {}", opt.outstanding, target.id);
    });
}
