//! Ledger RPC collaborator: the `LedgerSource` seam plus the JSON-RPC
//! implementation used in production. Query failures and empty results are
//! surfaced as values so the worker can treat them as transient.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;

use sigtail_domain::model::ProgramAddress;

use crate::worker::MonitorError;

mod types;

pub use types::{RawInstruction, RawTransaction, SignatureEntry};

use types::{JsonRpcRequest, JsonRpcResponse, TransactionEnvelope};

/// The three ledger queries the poller needs. Implemented over JSON-RPC in
/// production and by scripted mocks in tests.
#[async_trait]
pub trait LedgerSource: Send + Sync {
    /// Current slot at the endpoint's confirmed commitment.
    async fn current_slot(&self) -> Result<u64, MonitorError>;

    /// Most recent signature addressed to `program`, or `None` when the
    /// program has no history yet.
    async fn latest_signature(
        &self,
        program: &ProgramAddress,
    ) -> Result<Option<SignatureEntry>, MonitorError>;

    /// Full transaction for a signature returned by `latest_signature`.
    async fn fetch_transaction(&self, signature: &str) -> Result<RawTransaction, MonitorError>;
}

pub struct HttpLedgerSource {
    http: reqwest::Client,
    endpoint: String,
    next_id: AtomicU64,
}

impl HttpLedgerSource {
    /// Builds a source over `endpoint` with every request bounded by
    /// `timeout`; a timed-out call surfaces as a transient `Rpc` error.
    pub fn new(endpoint: String, timeout: Duration) -> Result<Self, MonitorError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            endpoint,
            next_id: AtomicU64::new(1),
        })
    }

    async fn call<P, R>(&self, method: &'static str, params: P) -> Result<Option<R>, MonitorError>
    where
        P: Serialize + Send,
        R: DeserializeOwned,
    {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        let response: JsonRpcResponse<R> = self
            .http
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(err) = response.error {
            return Err(MonitorError::Rpc(format!(
                "{method} failed: {} (code {})",
                err.message, err.code
            )));
        }

        Ok(response.result)
    }
}

#[async_trait]
impl LedgerSource for HttpLedgerSource {
    async fn current_slot(&self) -> Result<u64, MonitorError> {
        self.call("getSlot", json!([{ "commitment": "confirmed" }]))
            .await?
            .ok_or_else(|| MonitorError::Rpc("getSlot returned no result".to_owned()))
    }

    async fn latest_signature(
        &self,
        program: &ProgramAddress,
    ) -> Result<Option<SignatureEntry>, MonitorError> {
        let entries: Option<Vec<SignatureEntry>> = self
            .call(
                "getSignaturesForAddress",
                json!([program.as_str(), { "limit": 1, "commitment": "confirmed" }]),
            )
            .await?;

        Ok(entries.unwrap_or_default().into_iter().next())
    }

    async fn fetch_transaction(&self, signature: &str) -> Result<RawTransaction, MonitorError> {
        let envelope: Option<TransactionEnvelope> = self
            .call(
                "getTransaction",
                json!([
                    signature,
                    {
                        "encoding": "json",
                        "commitment": "confirmed",
                        "maxSupportedTransactionVersion": 0
                    }
                ]),
            )
            .await?;

        let envelope = envelope
            .ok_or_else(|| MonitorError::Rpc(format!("transaction {signature} not found")))?;
        Ok(convert_transaction(signature, envelope))
    }
}

fn convert_transaction(requested_signature: &str, envelope: TransactionEnvelope) -> RawTransaction {
    let TransactionEnvelope { slot, transaction } = envelope;
    let signature = transaction
        .signatures
        .into_iter()
        .next()
        .unwrap_or_else(|| requested_signature.to_owned());

    RawTransaction {
        signature,
        slot,
        account_keys: transaction.message.account_keys,
        instructions: transaction
            .message
            .instructions
            .into_iter()
            .map(|ix| RawInstruction {
                program_id_index: ix.program_id_index,
                data: ix.data,
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_envelope_into_raw_transaction() {
        let envelope: TransactionEnvelope = serde_json::from_value(json!({
            "slot": 4353,
            "blockTime": 1_620_000_000,
            "transaction": {
                "signatures": ["5SPe1BNm4jVHa6w5sVKxXkBEEE9GDAFF63UGYuSJZZ7z"],
                "message": {
                    "accountKeys": [
                        "KeccakSecp256k11111111111111111111111111111",
                        "3QqhXLvBgPZ4DCV3YjyzpiQWfeR4Lf2bSKqSnj5c8wkE"
                    ],
                    "recentBlockhash": "EkSnNWid2cvwEVnVx9aBqawnmiCNiDgp3gUdkDPTKN1N",
                    "instructions": [
                        { "programIdIndex": 1, "accounts": [0], "data": "3yZe7d" }
                    ]
                }
            }
        }))
        .expect("envelope deserializes");

        let tx = convert_transaction("requested", envelope);
        assert_eq!(tx.slot, 4353);
        assert_eq!(tx.signature, "5SPe1BNm4jVHa6w5sVKxXkBEEE9GDAFF63UGYuSJZZ7z");
        assert_eq!(tx.account_keys.len(), 2);
        assert_eq!(tx.instructions.len(), 1);
        assert_eq!(tx.instructions[0].program_id_index, 1);
        assert_eq!(tx.instructions[0].data, "3yZe7d");
    }

    #[test]
    fn missing_signature_list_falls_back_to_requested() {
        let envelope: TransactionEnvelope = serde_json::from_value(json!({
            "slot": 1,
            "transaction": {
                "signatures": [],
                "message": { "accountKeys": [], "instructions": [] }
            }
        }))
        .expect("envelope deserializes");

        let tx = convert_transaction("requested", envelope);
        assert_eq!(tx.signature, "requested");
    }

    #[test]
    fn signature_entry_carries_failure_marker() {
        let entry: SignatureEntry = serde_json::from_value(json!({
            "signature": "sig",
            "slot": 7,
            "err": { "InstructionError": [0, "Custom"] },
            "memo": null
        }))
        .expect("entry deserializes");

        assert_eq!(entry.slot, 7);
        assert!(entry.err.is_some());
    }
}
