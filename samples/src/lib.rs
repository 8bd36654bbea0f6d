//! # Summary
//!
//! Shared plumbing for the standalone command-line drivers (§6 CLI
//! surface): config loading and the `fern`-over-`log` setup the
//! teacher's `chatroom` binary used, generalized to tag lines with a
//! caller-supplied component name instead of a fixed server id.

use std::path::{Path, PathBuf};

use log::LevelFilter;
use paxos::{Config, ConfigError};

pub const DEFAULT_CONFIG_PATH: &str = "paxos.conf";

pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    Config::from_file(path)
}

/// Installs a `fern::Dispatch` matching the teacher's `chatroom` binary:
/// every line tagged with the component name, level taken from the
/// config's `verbosity` option unless `extra_verbose` raises it.
pub fn init_logging(name: &str, base: LevelFilter, extra_verbose: bool) {
    let level = if extra_verbose { LevelFilter::Trace } else { base };
    fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!("[{}][{}][{}]: {}", name, record.level(), record.target(), message))
        })
        .level_for("paxos", level)
        .level_for("mio", LevelFilter::Off)
        .chain(std::io::stdout())
        .apply()
        .ok();
}

/// Exit codes per §6: 0 on clean shutdown, 1 on startup failure.
pub fn fail(context: &str, error: impl std::fmt::Display) -> ! {
    eprintln!("{}: {}", context, error);
    std::process::exit(1);
}
