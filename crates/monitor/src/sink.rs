//! Presentation task for the event channel.
//!
//! One consumer drains everything the program workers emit, renders it
//! through `tracing`, and counts outcomes. It exits once every worker has
//! dropped its sender.

use metrics::counter;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::event::LedgerEvent;

pub async fn run_event_sink(mut events: mpsc::Receiver<LedgerEvent>) {
    while let Some(event) = events.recv().await {
        match &event.payload {
            Ok(message) => {
                counter!("monitor_events_total", "result" => "decoded").increment(1);
                info!(
                    program = %event.program,
                    signature = %event.signature,
                    slot = event.slot,
                    detected_at = %event.detected_at,
                    %message,
                    "payload decoded"
                );
            }
            Err(err) => {
                counter!("monitor_events_total", "result" => "decode_error").increment(1);
                warn!(
                    program = %event.program,
                    signature = %event.signature,
                    slot = event.slot,
                    %err,
                    "payload rejected"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::{DecodeError, DecodedMessage};
    use chrono::Utc;
    use sigtail_domain::model::ProgramAddress;

    #[tokio::test]
    async fn sink_drains_and_exits_when_senders_drop() {
        let (tx, rx) = mpsc::channel(4);
        let handle = tokio::spawn(run_event_sink(rx));

        let program = ProgramAddress::parse("11111111111111111111111111111111")
            .expect("test address is valid");
        let event = LedgerEvent {
            program: program.clone(),
            signature: "sig".to_owned(),
            slot: 1,
            detected_at: Utc::now(),
            payload: Ok(DecodedMessage::SignedText {
                message: "hello".to_owned(),
            }),
        };
        tx.send(event.clone()).await.expect("sink is listening");
        tx.send(LedgerEvent {
            payload: Err(DecodeError::Truncated {
                expected: 5,
                actual: 2,
            }),
            ..event
        })
        .await
        .expect("sink is listening");

        drop(tx);
        handle.await.expect("sink task exits cleanly");
    }
}
