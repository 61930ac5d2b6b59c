//! Environment-driven configuration shared by the sigtail binaries.

use std::env;

use thiserror::Error;

use crate::model::{AddressFormatError, MonitoredProgram, ProgramAddress, SECP_VERIFY_PROGRAM};

/// Poll cadence used when `POLL_INTERVAL_MS` is absent, matching the
/// reference listener's 3-second sleep.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 3_000;

/// Per-request timeout used when `RPC_TIMEOUT_MS` is absent.
pub const DEFAULT_RPC_TIMEOUT_MS: u64 = 10_000;

/// Key configuration derived from `.env`/process variables so binaries can
/// share a deterministic environment contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapConfig {
    ledger_rpc_url: String,
    programs: Vec<MonitoredProgram>,
    secp_program: ProgramAddress,
    poll_interval_ms: u64,
    rpc_timeout_ms: u64,
}

impl BootstrapConfig {
    /// Loads configuration by hydrating `.env` (if present) and reading the
    /// required process variables. Missing or malformed entries surface as
    /// `ConfigError` so binaries can respond gracefully; nothing here is
    /// retried at runtime.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        hydrate_env_file()?;

        let ledger_rpc_url = get_required_var("LEDGER_RPC_URL")?;

        let programs_raw = get_required_var("MONITORED_PROGRAMS")?;
        let mut programs = Vec::new();
        for entry in programs_raw.split(',') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            programs.push(MonitoredProgram::parse(entry).map_err(|source| {
                ConfigError::InvalidProgram {
                    key: "MONITORED_PROGRAMS",
                    entry: entry.to_owned(),
                    source,
                }
            })?);
        }
        if programs.is_empty() {
            return Err(ConfigError::MissingVar {
                key: "MONITORED_PROGRAMS",
            });
        }

        let secp_program = match get_optional_var("SECP_PROGRAM") {
            Some(address) => {
                ProgramAddress::parse(&address).map_err(|source| ConfigError::InvalidProgram {
                    key: "SECP_PROGRAM",
                    entry: address,
                    source,
                })?
            }
            None => ProgramAddress::parse(SECP_VERIFY_PROGRAM)
                .expect("built-in secp program address is valid"),
        };

        Ok(Self {
            ledger_rpc_url,
            programs,
            secp_program,
            poll_interval_ms: get_numeric_var("POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS)?,
            rpc_timeout_ms: get_numeric_var("RPC_TIMEOUT_MS", DEFAULT_RPC_TIMEOUT_MS)?,
        })
    }

    pub fn ledger_rpc_url(&self) -> &str {
        &self.ledger_rpc_url
    }

    pub fn programs(&self) -> &[MonitoredProgram] {
        &self.programs
    }

    pub fn secp_program(&self) -> &ProgramAddress {
        &self.secp_program
    }

    pub fn poll_interval_ms(&self) -> u64 {
        self.poll_interval_ms
    }

    pub fn rpc_timeout_ms(&self) -> u64 {
        self.rpc_timeout_ms
    }
}

fn get_required_var(key: &'static str) -> Result<String, ConfigError> {
    match env::var(key) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                Err(ConfigError::MissingVar { key })
            } else {
                Ok(trimmed.to_string())
            }
        }
        Err(_) => Err(ConfigError::MissingVar { key }),
    }
}

fn get_optional_var(key: &'static str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn get_numeric_var(key: &'static str, default: u64) -> Result<u64, ConfigError> {
    match get_optional_var(key) {
        Some(value) => value
            .parse()
            .map_err(|source| ConfigError::InvalidNumber { key, source }),
        None => Ok(default),
    }
}

pub fn hydrate_env_file() -> Result<(), ConfigError> {
    if env::var_os("SIGTAIL_SKIP_DOTENV").is_some() {
        return Ok(());
    }
    match dotenvy::dotenv() {
        Ok(_) => {}
        Err(dotenvy::Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(ConfigError::Dotenv { source: err }),
    }

    Ok(())
}

/// Errors emitted when `.env` hydration or environment parsing fails. These
/// are the only fatal errors in the system; everything past startup is
/// reported and skipped.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable `{key}`")]
    MissingVar { key: &'static str },
    #[error("invalid integer in `{key}`: {source}")]
    InvalidNumber {
        key: &'static str,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("invalid program entry `{entry}` in `{key}`: {source}")]
    InvalidProgram {
        key: &'static str,
        entry: String,
        #[source]
        source: AddressFormatError,
    },
    #[error("failed to load .env file: {source}")]
    Dotenv {
        #[from]
        source: dotenvy::Error,
    },
}
