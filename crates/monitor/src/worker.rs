//! Per-program polling workers.
//!
//! Each monitored program runs as its own task owning its cursor; tasks
//! share nothing but the outbound event channel. Transient ledger failures
//! are logged and retried at the normal cadence, never busy-looped.

use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, gauge};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use sigtail_domain::{
    config::ConfigError,
    model::{MonitoredProgram, ProgramAddress},
    services::telemetry::TelemetryError,
};

use crate::cursor::SignatureCursor;
use crate::event::LedgerEvent;
use crate::pipeline::process_transaction;
use crate::rpc::LedgerSource;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("rpc error: {0}")]
    Rpc(String),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
}

impl From<reqwest::Error> for MonitorError {
    fn from(value: reqwest::Error) -> Self {
        Self::Rpc(value.to_string())
    }
}

/// Polls one program until shutdown is signalled.
///
/// Starts uninitialized: the cursor is seeded from the first successful
/// slot query so transactions from before startup are never replayed, then
/// every tick runs one [`poll_program_once`] cycle.
pub async fn run_program_monitor<S>(
    source: Arc<S>,
    program: MonitoredProgram,
    secp_program: ProgramAddress,
    poll_interval: Duration,
    events: mpsc::Sender<LedgerEvent>,
    mut shutdown: watch::Receiver<bool>,
) where
    S: LedgerSource + ?Sized,
{
    info!(program = %program.address, kind = %program.kind, "listening for transactions");

    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut cursor: Option<SignatureCursor> = None;

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => match cursor {
                None => match source.current_slot().await {
                    Ok(slot) => {
                        counter!("monitor_rpc_calls_total", "result" => "ok").increment(1);
                        info!(program = %program.address, slot, "cursor initialized");
                        cursor = Some(SignatureCursor::initialize(slot));
                    }
                    Err(err) => {
                        counter!("monitor_rpc_calls_total", "result" => "error").increment(1);
                        warn!(program = %program.address, ?err, "slot query failed");
                    }
                },
                Some(current) => {
                    cursor = Some(
                        poll_program_once(
                            source.as_ref(),
                            &program,
                            &secp_program,
                            current,
                            &events,
                        )
                        .await,
                    );
                }
            },
        }
    }

    debug!(program = %program.address, "program monitor stopped");
}

/// Runs one polling cycle for one program and returns the cursor to carry
/// forward. The cursor only advances once the newest transaction has been
/// fetched and processed (or is known to have failed on-chain), so a
/// transient failure is retried on the next cycle.
pub async fn poll_program_once<S>(
    source: &S,
    program: &MonitoredProgram,
    secp_program: &ProgramAddress,
    cursor: SignatureCursor,
    events: &mpsc::Sender<LedgerEvent>,
) -> SignatureCursor
where
    S: LedgerSource + ?Sized,
{
    let entry = match source.latest_signature(&program.address).await {
        Ok(Some(entry)) => {
            counter!("monitor_rpc_calls_total", "result" => "ok").increment(1);
            entry
        }
        Ok(None) => {
            counter!("monitor_rpc_calls_total", "result" => "empty").increment(1);
            debug!(program = %program.address, "no signatures for program yet");
            return cursor;
        }
        Err(err) => {
            counter!("monitor_rpc_calls_total", "result" => "error").increment(1);
            warn!(program = %program.address, ?err, "signature query failed");
            return cursor;
        }
    };

    let (is_new, advanced) = cursor.observe(entry.slot);
    if !is_new {
        return cursor;
    }

    if entry.err.is_some() {
        // A failed transaction still advances the cursor; its payload never
        // executed so there is nothing to decode.
        debug!(
            program = %program.address,
            signature = %entry.signature,
            slot = entry.slot,
            "skipping failed transaction"
        );
        return advanced;
    }

    let tx = match source.fetch_transaction(&entry.signature).await {
        Ok(tx) => {
            counter!("monitor_rpc_calls_total", "result" => "ok").increment(1);
            tx
        }
        Err(err) => {
            counter!("monitor_rpc_calls_total", "result" => "error").increment(1);
            warn!(
                program = %program.address,
                signature = %entry.signature,
                ?err,
                "transaction fetch failed"
            );
            return cursor;
        }
    };

    gauge!("monitor_last_slot", "program" => program.address.as_str().to_owned())
        .set(entry.slot as f64);

    for event in process_transaction(program, secp_program, &tx) {
        if events.send(event).await.is_err() {
            // Sink is gone; the process is shutting down.
            return advanced;
        }
    }

    advanced
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::encode_track_data;
    use crate::rpc::{RawInstruction, RawTransaction, SignatureEntry};
    use async_trait::async_trait;
    use sigtail_domain::model::ProgramKind;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const SECP: &str = "KeccakSecp256k11111111111111111111111111111";
    const TARGET: &str = "3QqhXLvBgPZ4DCV3YjyzpiQWfeR4Lf2bSKqSnj5c8wkE";
    const OTHER_TARGET: &str = "11111111111111111111111111111111";

    /// Scripted ledger: each `poll_program_once` call pops the next
    /// signature response; transactions come from a fixed map.
    #[derive(Default)]
    struct ScriptedLedger {
        signatures: Mutex<VecDeque<Result<Option<SignatureEntry>, ()>>>,
        transactions: HashMap<String, RawTransaction>,
        fetches: AtomicUsize,
    }

    impl ScriptedLedger {
        fn push_signature(&self, response: Result<Option<SignatureEntry>, ()>) {
            self.signatures.lock().unwrap().push_back(response);
        }

        fn insert_transaction(&mut self, tx: RawTransaction) {
            self.transactions.insert(tx.signature.clone(), tx);
        }
    }

    #[async_trait]
    impl LedgerSource for ScriptedLedger {
        async fn current_slot(&self) -> Result<u64, MonitorError> {
            Ok(100)
        }

        async fn latest_signature(
            &self,
            _program: &ProgramAddress,
        ) -> Result<Option<SignatureEntry>, MonitorError> {
            match self.signatures.lock().unwrap().pop_front() {
                Some(Ok(entry)) => Ok(entry),
                Some(Err(())) => Err(MonitorError::Rpc("scripted failure".to_owned())),
                None => Ok(None),
            }
        }

        async fn fetch_transaction(
            &self,
            signature: &str,
        ) -> Result<RawTransaction, MonitorError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.transactions
                .get(signature)
                .cloned()
                .ok_or_else(|| MonitorError::Rpc(format!("transaction {signature} not found")))
        }
    }

    fn entry(signature: &str, slot: u64) -> SignatureEntry {
        SignatureEntry {
            signature: signature.to_owned(),
            slot,
            err: None,
        }
    }

    fn failed_entry(signature: &str, slot: u64) -> SignatureEntry {
        SignatureEntry {
            err: Some(serde_json::json!({ "InstructionError": [0, "Custom"] })),
            ..entry(signature, slot)
        }
    }

    fn track_transaction(signature: &str, slot: u64, target: &str) -> RawTransaction {
        RawTransaction {
            signature: signature.to_owned(),
            slot,
            account_keys: vec![SECP.to_owned(), target.to_owned()],
            instructions: vec![RawInstruction {
                program_id_index: 1,
                data: bs58::encode(encode_track_data(b"ab", b"cd", b"ef")).into_string(),
            }],
        }
    }

    fn registry_program(address: &str) -> MonitoredProgram {
        MonitoredProgram::new(
            ProgramAddress::parse(address).expect("test address is valid"),
            ProgramKind::Registry,
        )
    }

    fn secp_address() -> ProgramAddress {
        ProgramAddress::parse(SECP).expect("secp address is valid")
    }

    #[tokio::test]
    async fn repeated_latest_signature_emits_only_once() {
        let mut ledger = ScriptedLedger::default();
        ledger.insert_transaction(track_transaction("sig-1", 101, TARGET));
        ledger.push_signature(Ok(Some(entry("sig-1", 101))));
        ledger.push_signature(Ok(Some(entry("sig-1", 101))));

        let (tx, mut rx) = mpsc::channel(16);
        let program = registry_program(TARGET);
        let cursor = SignatureCursor::initialize(100);

        let cursor = poll_program_once(&ledger, &program, &secp_address(), cursor, &tx).await;
        assert_eq!(cursor.last_slot(), 101);
        assert!(rx.try_recv().is_ok());

        let cursor = poll_program_once(&ledger, &program, &secp_address(), cursor, &tx).await;
        assert_eq!(cursor.last_slot(), 101);
        assert!(rx.try_recv().is_err());
        assert_eq!(ledger.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transient_failure_skips_cycle_and_resumes() {
        let mut ledger = ScriptedLedger::default();
        ledger.insert_transaction(track_transaction("sig-2", 102, TARGET));
        ledger.push_signature(Err(()));
        ledger.push_signature(Ok(Some(entry("sig-2", 102))));

        let (tx, mut rx) = mpsc::channel(16);
        let program = registry_program(TARGET);
        let cursor = SignatureCursor::initialize(100);

        let cursor = poll_program_once(&ledger, &program, &secp_address(), cursor, &tx).await;
        assert_eq!(cursor.last_slot(), 100);
        assert!(rx.try_recv().is_err());

        let cursor = poll_program_once(&ledger, &program, &secp_address(), cursor, &tx).await;
        assert_eq!(cursor.last_slot(), 102);
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn failure_for_one_program_leaves_another_unaffected() {
        let mut failing = ScriptedLedger::default();
        failing.push_signature(Err(()));

        let mut healthy = ScriptedLedger::default();
        healthy.insert_transaction(track_transaction("sig-3", 103, OTHER_TARGET));
        healthy.push_signature(Ok(Some(entry("sig-3", 103))));

        let (tx, mut rx) = mpsc::channel(16);
        let secp = secp_address();

        let cursor_p = SignatureCursor::initialize(100);
        let cursor_p =
            poll_program_once(&failing, &registry_program(TARGET), &secp, cursor_p, &tx).await;
        assert_eq!(cursor_p.last_slot(), 100);

        let cursor_q = SignatureCursor::initialize(100);
        let cursor_q = poll_program_once(
            &healthy,
            &registry_program(OTHER_TARGET),
            &secp,
            cursor_q,
            &tx,
        )
        .await;
        assert_eq!(cursor_q.last_slot(), 103);

        let event = rx.try_recv().expect("healthy program still emits");
        assert_eq!(event.program.as_str(), OTHER_TARGET);
    }

    #[tokio::test]
    async fn failed_transactions_advance_without_fetching() {
        let ledger = ScriptedLedger::default();
        ledger.push_signature(Ok(Some(failed_entry("sig-4", 104))));

        let (tx, mut rx) = mpsc::channel(16);
        let program = registry_program(TARGET);
        let cursor = SignatureCursor::initialize(100);

        let cursor = poll_program_once(&ledger, &program, &secp_address(), cursor, &tx).await;
        assert_eq!(cursor.last_slot(), 104);
        assert!(rx.try_recv().is_err());
        assert_eq!(ledger.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn fetch_failure_leaves_cursor_for_retry() {
        let ledger = ScriptedLedger::default();
        ledger.push_signature(Ok(Some(entry("sig-missing", 105))));

        let (tx, mut rx) = mpsc::channel(16);
        let program = registry_program(TARGET);
        let cursor = SignatureCursor::initialize(100);

        let cursor = poll_program_once(&ledger, &program, &secp_address(), cursor, &tx).await;
        assert_eq!(cursor.last_slot(), 100);
        assert!(rx.try_recv().is_err());
        assert_eq!(ledger.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn shutdown_stops_the_monitor_loop() {
        let ledger = Arc::new(ScriptedLedger::default());
        let (event_tx, _event_rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(run_program_monitor(
            ledger,
            registry_program(TARGET),
            secp_address(),
            Duration::from_millis(10),
            event_tx,
            shutdown_rx,
        ));

        shutdown_tx.send(true).expect("monitor is listening");
        handle.await.expect("monitor task exits cleanly");
    }
}
