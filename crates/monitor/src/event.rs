//! Event-sink records emitted by the polling pipeline.

use chrono::{DateTime, Utc};

use sigtail_domain::model::ProgramAddress;

use crate::decoder::{DecodeError, DecodedMessage};

/// One observation pushed onto the event channel: either a successfully
/// decoded payload or the decode failure that replaced it. Order is
/// preserved per program; nothing is retained after the sink consumes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEvent {
    pub program: ProgramAddress,
    pub signature: String,
    pub slot: u64,
    pub detected_at: DateTime<Utc>,
    pub payload: Result<DecodedMessage, DecodeError>,
}
