//! Package chain defines the interface between the notifier and the chain
//! backend driver: the capabilities the notifier consumes over RPC and the
//! asynchronous event stream the backend produces.  Concrete drivers (RPC
//! transport, ZMQ streaming, block deserialization) live outside this crate.

mod error;

pub use error::ChainClientError;

use {
    crate::{
        btcjson::{GetBlockVerboseResult, GetTxOutResult, TxRawResult},
        chaincfg::chainhash::Hash,
        wire::{MsgBlock, MsgTx, OutPoint},
    },
    async_trait::async_trait,
    std::time::SystemTime,
    tokio::sync::mpsc,
};

/// Represents the unmined or mined transaction record a backend surfaces for
/// a transaction relevant to a watched object.
#[derive(Clone, Debug)]
pub struct TxRecord {
    pub msg_tx: MsgTx,
    pub hash: Hash,
    pub received: SystemTime,
}

/// Describes the block that contains a relevant transaction.
#[derive(Copy, Clone, Debug)]
pub struct BlockMeta {
    pub hash: Hash,
    pub height: i32,
    pub time: SystemTime,
}

/// A transaction the backend surfaced because it touches something a client
/// asked to watch.  `block` is `None` for mempool transactions.
#[derive(Clone, Debug)]
pub struct RelevantTx {
    pub tx_record: TxRecord,
    pub block: Option<BlockMeta>,
}

/// The events a chain backend streams to its consumer, in chain order.
#[derive(Clone, Debug)]
pub enum ChainNotification {
    BlockConnected { hash: Hash, height: i32 },
    BlockDisconnected { hash: Hash, height: i32 },
    RelevantTx(RelevantTx),
}

/// The capabilities the notifier consumes from a chain backend.  All methods
/// may be called concurrently from the facade (caller tasks) and the
/// dispatcher task; implementations must be safe for shared use.
#[async_trait]
pub trait ChainBackend: Send + Sync {
    /// Establishes the connection to the backing node.
    async fn start(&self) -> Result<(), ChainClientError>;

    /// Disconnects from the backing node and releases related resources.
    async fn stop(&self);

    /// Registers for block connected and disconnected notifications.
    async fn notify_blocks(&self) -> Result<(), ChainClientError>;

    /// Requests the backend to watch the passed outpoints for spends.  A
    /// backend that already watches everything may treat this as a no-op.
    async fn notify_spent(&self, outpoints: &[OutPoint]) -> Result<(), ChainClientError>;

    /// Returns the hash and height of the block at the tip of the main chain.
    async fn get_best_block(&self) -> Result<(Hash, i32), ChainClientError>;

    /// Returns the hash of the main chain block at the given height.
    async fn get_block_hash(&self, height: i64) -> Result<Hash, ChainClientError>;

    /// Returns the main chain height of the block with the given hash.
    async fn get_block_height(&self, hash: &Hash) -> Result<i32, ChainClientError>;

    /// Returns the raw block with the given hash.
    async fn get_block(&self, hash: &Hash) -> Result<MsgBlock, ChainClientError>;

    /// Returns the verbose block result with the given hash, carrying the
    /// block's transaction id list.
    async fn get_block_verbose(&self, hash: &Hash)
        -> Result<GetBlockVerboseResult, ChainClientError>;

    /// Returns the verbose transaction result for the given transaction id.
    /// When the node's transaction index does not know the transaction, the
    /// error satisfies [`ChainClientError::is_no_tx_info`].
    async fn get_raw_transaction_verbose(
        &self,
        txid: &Hash,
    ) -> Result<TxRawResult, ChainClientError>;

    /// Returns details about an unspent transaction output, or `None` when
    /// the output is spent or unknown.
    async fn get_tx_out(
        &self,
        txid: &Hash,
        index: u32,
        include_mempool: bool,
    ) -> Result<Option<GetTxOutResult>, ChainClientError>;

    /// Yields the backend's event stream.  The stream can be claimed once;
    /// subsequent calls return `None`.
    fn notifications(&self) -> Option<mpsc::UnboundedReceiver<ChainNotification>>;
}
