/// Models part of the scriptPubKey field of getrawtransaction and gettxout
/// results.
#[derive(serde::Deserialize, Default, Debug, Clone)]
#[serde(default)]
pub struct ScriptPubKeyResult {
    pub asm: String,
    pub hex: String,
    #[serde(rename = "reqSigs")]
    pub req_sigs: i32,
    #[serde(rename = "type")]
    pub script_type: String,
    pub addresses: Vec<String>,
}

/// Models the data from the getrawtransaction command when the verbose flag
/// is set.  When the transaction is not yet mined, `block_hash` is empty.
#[derive(serde::Deserialize, Default, Debug, Clone)]
#[serde(default)]
pub struct TxRawResult {
    pub hex: String,
    pub txid: String,
    pub version: i32,
    #[serde(rename = "locktime")]
    pub lock_time: u32,
    #[serde(rename = "blockhash")]
    pub block_hash: String,
    pub confirmations: u64,
    pub time: i64,
    #[serde(rename = "blocktime")]
    pub block_time: i64,
}

/// Models the data from the getblock command when the verbose flag is set.
/// The tx field holds the ids of the block's transactions in block order.
#[derive(serde::Deserialize, Default, Debug, Clone)]
#[serde(default)]
pub struct GetBlockVerboseResult {
    pub hash: String,
    pub confirmations: i64,
    pub height: i64,
    pub time: i64,
    pub tx: Vec<String>,
    #[serde(rename = "previousblockhash")]
    pub previous_hash: String,
    #[serde(rename = "nextblockhash")]
    pub next_hash: String,
}

/// Models the data from the gettxout command.  A missing result (spent or
/// unknown output) is represented by the caller as `None`, not by this type.
#[derive(serde::Deserialize, Default, Debug, Clone)]
#[serde(default)]
pub struct GetTxOutResult {
    #[serde(rename = "bestblock")]
    pub best_block: String,
    pub confirmations: i64,
    pub value: f64,
    #[serde(rename = "scriptPubKey")]
    pub script_pub_key: ScriptPubKeyResult,
    pub coinbase: bool,
}
