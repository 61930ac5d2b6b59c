//! Library entrypoint for embedding the monitor inside other binaries or
//! integration harnesses. The binary in `main.rs` remains the production
//! entry point; everything it wires together is reachable from here.

pub mod cursor;
pub mod decoder;
pub mod event;
pub mod filter;
pub mod pipeline;
pub mod rpc;
pub mod sink;
pub mod worker;

pub use cursor::SignatureCursor;
pub use decoder::{decode, DecodeError, DecodedMessage};
pub use event::LedgerEvent;
pub use rpc::{HttpLedgerSource, LedgerSource, RawInstruction, RawTransaction, SignatureEntry};
pub use worker::{poll_program_once, run_program_monitor, MonitorError};
