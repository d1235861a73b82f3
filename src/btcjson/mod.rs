//! Package btcjson models the JSON-RPC results and error codes of a
//! bitcoin-like RPC server that the notifier consults during historical
//! lookups.  Only the commands the notifier issues are modelled.

mod errors;
mod result_types;

pub use errors::{RpcError, ERR_RPC_NO_TX_INFO};
pub use result_types::{
    GetBlockVerboseResult, GetTxOutResult, ScriptPubKeyResult, TxRawResult,
};
