//! JSON Errors.
//! Contains the RPC server error model and the error codes the notifier
//! distinguishes.

/// Returned by the server when the requested transaction is not present in
/// the transaction index, or the index is disabled.
pub const ERR_RPC_NO_TX_INFO: i32 = -5;

/// Models the error field of a JSON-RPC response returned to a client by the
/// server.
#[derive(serde::Deserialize, Default, Clone)]
#[serde(default)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

impl RpcError {
    /// Returns a new RPC error with the passed code and message.
    pub fn new(code: i32, message: String) -> Self {
        RpcError { code, message }
    }

    /// Reports whether the error is the distinguishable *no transaction
    /// info* code, which callers treat as "fall back to a manual scan"
    /// rather than a failure.
    pub fn is_no_tx_info(&self) -> bool {
        self.code == ERR_RPC_NO_TX_INFO
    }
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RPC error code {}: {}", self.code, self.message)
    }
}

impl std::fmt::Debug for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RpcError(code: {}, message: {})", self.code, self.message)
    }
}
