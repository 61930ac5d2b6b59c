use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct JsonRpcRequest<T> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'static str,
    pub params: T,
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct JsonRpcResponse<T> {
    #[serde(default)]
    pub result: Option<T>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

/// One entry of a `getSignaturesForAddress` response. `err` is set when the
/// transaction failed on-chain; such entries are seen but never decoded.
#[derive(Debug, Clone, Deserialize)]
pub struct SignatureEntry {
    pub signature: String,
    pub slot: u64,
    #[serde(default)]
    pub err: Option<serde_json::Value>,
}

/// `getTransaction` response envelope with the `json` encoding.
#[derive(Debug, Deserialize)]
pub struct TransactionEnvelope {
    pub slot: u64,
    pub transaction: TransactionPayload,
}

#[derive(Debug, Deserialize)]
pub struct TransactionPayload {
    pub signatures: Vec<String>,
    pub message: TransactionMessage,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionMessage {
    pub account_keys: Vec<String>,
    pub instructions: Vec<CompiledInstruction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledInstruction {
    pub program_id_index: usize,
    pub data: String,
}

/// A fetched transaction reduced to what the pipeline needs: ordered
/// account keys and ordered instructions referencing them by index. Owned
/// by the poller for the duration of one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTransaction {
    pub signature: String,
    pub slot: u64,
    pub account_keys: Vec<String>,
    pub instructions: Vec<RawInstruction>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawInstruction {
    pub program_id_index: usize,
    /// Base58 wire form as returned by the endpoint.
    pub data: String,
}
