//! Domain-level building blocks shared by the sigtail binaries.
//!
//! Holds the environment-driven configuration contract, the telemetry
//! bootstrap, and the model types describing which on-chain programs are
//! watched. Everything here is I/O-free apart from environment reads so the
//! monitor crate can unit-test against it without a running endpoint.

pub mod config;
pub mod model;
pub mod services;

pub use config::{BootstrapConfig, ConfigError};
pub use model::{
    AddressFormatError, MonitoredProgram, PayloadFormat, ProgramAddress, ProgramKind,
    SECP_VERIFY_PROGRAM,
};
