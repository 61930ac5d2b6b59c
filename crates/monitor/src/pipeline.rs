//! Per-transaction processing: co-signature filter, then payload decode,
//! then event emission. Decode failures become failure events so one bad
//! instruction never hides its neighbours.

use chrono::Utc;
use metrics::counter;
use tracing::{debug, warn};

use sigtail_domain::model::{MonitoredProgram, ProgramAddress};

use crate::decoder;
use crate::event::LedgerEvent;
use crate::filter;
use crate::rpc::RawTransaction;

/// Runs one fetched transaction through the filter and decoder, returning
/// the events to emit. Empty when the transaction is not an application
/// event (no co-signature, or no instruction addressed to the program).
pub fn process_transaction(
    program: &MonitoredProgram,
    secp_program: &ProgramAddress,
    tx: &RawTransaction,
) -> Vec<LedgerEvent> {
    let Some(program_index) = filter::co_signed_program_index(tx, secp_program, &program.address)
    else {
        debug!(
            program = %program.address,
            signature = %tx.signature,
            "skipping transaction without co-signature"
        );
        return Vec::new();
    };

    let format = program.kind.payload_format();
    let mut events = Vec::new();

    for instruction in filter::matching_instructions(tx, program_index) {
        let payload = decoder::decode_wire_data(&instruction.data)
            .and_then(|data| decoder::decode(&data, format));

        match &payload {
            Ok(_) => {
                counter!("monitor_payloads_total", "result" => "decoded").increment(1);
            }
            Err(err) => {
                warn!(
                    program = %program.address,
                    signature = %tx.signature,
                    %err,
                    "skipping undecodable instruction payload"
                );
                counter!("monitor_payloads_total", "result" => "decode_error").increment(1);
            }
        }

        events.push(LedgerEvent {
            program: program.address.clone(),
            signature: tx.signature.clone(),
            slot: tx.slot,
            detected_at: Utc::now(),
            payload,
        });
    }

    events
}
