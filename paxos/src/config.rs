//! # Summary
//!
//! Line-oriented configuration parser (SPEC_FULL.md §A.3), modeled on
//! `evpaxos/config.c`: whitespace-separated tokens per line, `#`
//! comments and blank lines ignored. Three directive kinds —
//! `acceptor`/`a`, `proposer`/`p`, and `option` — populate a static
//! [`Config`] record. Never panics on malformed input; every failure
//! mode is a [`ConfigError`].

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use log::LevelFilter;
use thiserror::Error;

use crate::message::Aid;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Unreadable { path: String, #[source] source: std::io::Error },
    #[error("line {line}: {reason}")]
    MalformedLine { line: usize, reason: String },
    #[error("line {line}: unknown option {name:?}")]
    UnknownOption { line: usize, name: String },
    #[error("line {line}: invalid value {value:?} for option {name:?}: {reason}")]
    InvalidValue { line: usize, name: String, value: String, reason: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    Disk,
}

#[derive(Clone, Debug)]
pub struct AcceptorEntry {
    pub id: Aid,
    pub address: SocketAddr,
    pub group_id: Aid,
    pub parent_id: Aid,
}

#[derive(Clone, Debug)]
pub struct ProposerEntry {
    pub id: Aid,
    pub address: SocketAddr,
}

/// A fully parsed configuration record, read once at startup and
/// thereafter treated as read-only (§5 "Shared resources").
#[derive(Clone, Debug)]
pub struct Config {
    pub acceptors: Vec<AcceptorEntry>,
    pub proposers: Vec<ProposerEntry>,
    pub verbosity: LevelFilter,
    pub tcp_nodelay: bool,
    pub learner_catch_up: bool,
    pub proposer_timeout: Duration,
    pub proposer_preexec_window: usize,
    pub storage_backend: StorageBackend,
    pub acceptor_trash_files: bool,
    pub lmdb_sync: bool,
    pub lmdb_env_path: String,
    pub lmdb_mapsize: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            acceptors: Vec::new(),
            proposers: Vec::new(),
            verbosity: LevelFilter::Error,
            tcp_nodelay: true,
            learner_catch_up: true,
            proposer_timeout: Duration::from_secs(1),
            proposer_preexec_window: 32,
            storage_backend: StorageBackend::Memory,
            acceptor_trash_files: false,
            lmdb_sync: true,
            lmdb_env_path: String::from("./paxos-storage"),
            lmdb_mapsize: 10 * 1024 * 1024,
        }
    }
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut config = Config::default();
        for (index, raw_line) in text.lines().enumerate() {
            let line_number = index + 1;
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            parse_line(&mut config, line, line_number)?;
        }
        Ok(config)
    }

    pub fn acceptor_count(&self) -> usize {
        self.acceptors.len()
    }
}

fn parse_line(config: &mut Config, line: &str, line_number: usize) -> Result<(), ConfigError> {
    let mut tokens = line.split_whitespace();
    let directive = tokens.next().ok_or_else(|| ConfigError::MalformedLine {
        line: line_number,
        reason: "empty directive".into(),
    })?;

    match directive {
        "a" | "acceptor" => {
            let rest: Vec<&str> = tokens.collect();
            if rest.len() != 5 {
                return Err(ConfigError::MalformedLine {
                    line: line_number,
                    reason: "expected: acceptor <id> <ip> <port> <group_id> <parent_id>".into(),
                });
            }
            let id = parse_u32(rest[0], line_number, "acceptor id")?;
            let address = parse_address(rest[1], rest[2], line_number)?;
            let group_id = parse_u32(rest[3], line_number, "group id")?;
            let parent_id = parse_u32(rest[4], line_number, "parent id")?;
            config.acceptors.push(AcceptorEntry { id, address, group_id, parent_id });
        }
        "p" | "proposer" => {
            let rest: Vec<&str> = tokens.collect();
            if rest.len() != 3 {
                return Err(ConfigError::MalformedLine {
                    line: line_number,
                    reason: "expected: proposer <id> <ip> <port>".into(),
                });
            }
            let id = parse_u32(rest[0], line_number, "proposer id")?;
            let address = parse_address(rest[1], rest[2], line_number)?;
            config.proposers.push(ProposerEntry { id, address });
        }
        "option" => {
            let name = tokens.next().ok_or_else(|| ConfigError::MalformedLine {
                line: line_number,
                reason: "option directive missing a name".into(),
            })?;
            let value = tokens.next().ok_or_else(|| ConfigError::MalformedLine {
                line: line_number,
                reason: "option directive missing a value".into(),
            })?;
            apply_option(config, name, value, line_number)?;
        }
        other => {
            return Err(ConfigError::MalformedLine {
                line: line_number,
                reason: format!("unknown directive {:?}", other),
            })
        }
    }
    Ok(())
}

fn apply_option(config: &mut Config, name: &str, value: &str, line: usize) -> Result<(), ConfigError> {
    match name {
        "verbosity" => config.verbosity = parse_verbosity(value, line)?,
        "tcp-nodelay" | "tcp_nodelay" => config.tcp_nodelay = parse_boolean(value, name, line)?,
        "learner-catch-up" | "learner_catch_up" => config.learner_catch_up = parse_boolean(value, name, line)?,
        "proposer-timeout" | "proposer_timeout" => {
            let seconds = parse_u32(value, line, "proposer-timeout")?;
            config.proposer_timeout = Duration::from_secs(seconds as u64);
        }
        "proposer-preexec-window" | "proposer_preexec_window" => {
            config.proposer_preexec_window = parse_u32(value, line, "proposer-preexec-window")? as usize;
        }
        "storage-backend" | "storage_backend" => {
            config.storage_backend = match value.to_ascii_lowercase().as_str() {
                "memory" => StorageBackend::Memory,
                "disk" | "lmdb" => StorageBackend::Disk,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        line,
                        name: name.into(),
                        value: value.into(),
                        reason: "expected memory or disk".into(),
                    })
                }
            };
        }
        "acceptor-trash-files" | "acceptor_trash_files" => {
            config.acceptor_trash_files = parse_boolean(value, name, line)?
        }
        "lmdb-sync" | "lmdb_sync" => config.lmdb_sync = parse_boolean(value, name, line)?,
        "lmdb-env-path" | "lmdb_env_path" => config.lmdb_env_path = value.to_string(),
        "lmdb-mapsize" | "lmdb_mapsize" => config.lmdb_mapsize = parse_bytes(value, line)?,
        other => return Err(ConfigError::UnknownOption { line, name: other.into() }),
    }
    Ok(())
}

fn parse_u32(token: &str, line: usize, what: &str) -> Result<u32, ConfigError> {
    token.parse().map_err(|_| ConfigError::InvalidValue {
        line,
        name: what.into(),
        value: token.into(),
        reason: "expected an integer".into(),
    })
}

fn parse_address(ip: &str, port: &str, line: usize) -> Result<SocketAddr, ConfigError> {
    let port: u16 = port.parse().map_err(|_| ConfigError::InvalidValue {
        line,
        name: "port".into(),
        value: port.into(),
        reason: "expected a 16-bit port number".into(),
    })?;
    format!("{}:{}", ip, port).parse().map_err(|_| ConfigError::InvalidValue {
        line,
        name: "address".into(),
        value: format!("{}:{}", ip, port),
        reason: "not a valid socket address".into(),
    })
}

fn parse_boolean(value: &str, name: &str, line: usize) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "yes" => Ok(true),
        "no" => Ok(false),
        _ => Err(ConfigError::InvalidValue { line, name: name.into(), value: value.into(), reason: "expected yes or no".into() }),
    }
}

fn parse_verbosity(value: &str, line: usize) -> Result<LevelFilter, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "quiet" => Ok(LevelFilter::Off),
        "error" => Ok(LevelFilter::Error),
        "info" => Ok(LevelFilter::Info),
        "debug" => Ok(LevelFilter::Debug),
        _ => Err(ConfigError::InvalidValue {
            line,
            name: "verbosity".into(),
            value: value.into(),
            reason: "expected quiet, error, info, or debug".into(),
        }),
    }
}

/// Parses a byte count with an optional `kb`/`mb`/`gb` suffix
/// (`evpaxos/config.c::parse_bytes`), supplementing the field list
/// spec.md's distillation dropped (SPEC_FULL.md §"Supplemented
/// features").
fn parse_bytes(value: &str, line: usize) -> Result<u64, ConfigError> {
    let trimmed = value.trim();
    let split_at = trimmed.find(|c: char| !c.is_ascii_digit()).unwrap_or(trimmed.len());
    let (digits, suffix) = trimmed.split_at(split_at);
    let base: u64 = digits.parse().map_err(|_| ConfigError::InvalidValue {
        line,
        name: "lmdb-mapsize".into(),
        value: value.into(),
        reason: "expected a number of bytes".into(),
    })?;
    let multiplier = match suffix.trim().to_ascii_lowercase().as_str() {
        "" => 1,
        "kb" => 1024,
        "mb" => 1024 * 1024,
        "gb" => 1024 * 1024 * 1024,
        _ => {
            return Err(ConfigError::InvalidValue {
                line,
                name: "lmdb-mapsize".into(),
                value: value.into(),
                reason: "expected a kb/mb/gb suffix".into(),
            })
        }
    };
    Ok(base * multiplier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_acceptors_proposers_and_options() {
        let text = "\
acceptor 0 127.0.0.1 5000 0 0
a 1 127.0.0.1 5001 0 0
proposer 0 127.0.0.1 6000
option verbosity debug
option proposer-preexec-window 64
# a comment

option lmdb-mapsize 10mb
";
        let config = Config::parse(text).unwrap();
        assert_eq!(config.acceptors.len(), 2);
        assert_eq!(config.proposers.len(), 1);
        assert_eq!(config.verbosity, LevelFilter::Debug);
        assert_eq!(config.proposer_preexec_window, 64);
        assert_eq!(config.lmdb_mapsize, 10 * 1024 * 1024);
    }

    #[test]
    fn defaults_match_the_original_when_options_are_absent() {
        let config = Config::parse("acceptor 0 127.0.0.1 5000 0 0\n").unwrap();
        assert_eq!(config.proposer_preexec_window, 32);
        assert_eq!(config.proposer_timeout, Duration::from_secs(1));
        assert_eq!(config.verbosity, LevelFilter::Error);
    }

    #[test]
    fn unknown_option_is_an_error_not_a_panic() {
        let err = Config::parse("option not-a-real-option yes\n").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownOption { .. }));
    }

    #[test]
    fn malformed_acceptor_line_is_an_error() {
        let err = Config::parse("acceptor 0 127.0.0.1\n").unwrap_err();
        assert!(matches!(err, ConfigError::MalformedLine { .. }));
    }

    #[test]
    fn bytes_suffixes_are_case_insensitive() {
        assert_eq!(parse_bytes("4KB", 1).unwrap(), 4096);
        assert_eq!(parse_bytes("2gb", 1).unwrap(), 2 * 1024 * 1024 * 1024);
        assert_eq!(parse_bytes("128", 1).unwrap(), 128);
    }

}
