use crate::{
    chain::ChainClientError,
    chaincfg::chainhash::{ChainHashError, Hash},
};

/// Chain notifier errors.
pub enum ChainNtfnError {
    /// The notifier received a quit signal while attempting to register a
    /// subscription.
    ShuttingDown,

    /// A confirmation subscription requested zero confirmations.
    NumConfsOutOfRange(u32),

    /// A block connection arrived at an unexpected height.
    OutOfOrderConnectTip { current: u32, new: u32 },

    /// A block disconnection arrived at an unexpected height.
    OutOfOrderDisconnectTip { current: u32, disconnected: u32 },

    /// The backend reported a containing block that does not actually hold
    /// the transaction.
    TxNotFoundInBlock { txid: Hash, block_hash: Hash },

    /// Error returned by the chain backend during a historical lookup.
    Chain(ChainClientError),

    /// The backend returned a malformed hash string.
    Hash(ChainHashError),
}

impl From<ChainClientError> for ChainNtfnError {
    fn from(e: ChainClientError) -> Self {
        ChainNtfnError::Chain(e)
    }
}

impl From<ChainHashError> for ChainNtfnError {
    fn from(e: ChainHashError) -> Self {
        ChainNtfnError::Hash(e)
    }
}

impl std::fmt::Display for ChainNtfnError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            ChainNtfnError::ShuttingDown => write!(
                f,
                "System interrupt while attempting to register for notification."
            ),
            ChainNtfnError::NumConfsOutOfRange(n) => write!(
                f,
                "Number of confirmations must be greater than zero, got {}.",
                n
            ),
            ChainNtfnError::OutOfOrderConnectTip { current, new } => write!(
                f,
                "Received blocks out of order: current height={}, new height={}.",
                current, new
            ),
            ChainNtfnError::OutOfOrderDisconnectTip {
                current,
                disconnected,
            } => write!(
                f,
                "Received blocks out of order: current height={}, disconnected height={}.",
                current, disconnected
            ),
            ChainNtfnError::TxNotFoundInBlock {
                ref txid,
                ref block_hash,
            } => write!(f, "Unable to locate tx {} in block {}.", txid, block_hash),
            ChainNtfnError::Chain(ref e) => write!(f, "Chain client error: {}", e),
            ChainNtfnError::Hash(ref e) => write!(f, "Hash error: {}", e),
        }
    }
}

impl std::fmt::Debug for ChainNtfnError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            ChainNtfnError::ShuttingDown => write!(
                f,
                "ChainNtfnError(system interrupt while attempting to register for notification)"
            ),
            ChainNtfnError::NumConfsOutOfRange(n) => write!(
                f,
                "ChainNtfnError(number of confirmations must be greater than zero, got {})",
                n
            ),
            ChainNtfnError::OutOfOrderConnectTip { current, new } => write!(
                f,
                "ChainNtfnError(received blocks out of order: current height={}, new height={})",
                current, new
            ),
            ChainNtfnError::OutOfOrderDisconnectTip {
                current,
                disconnected,
            } => write!(
                f,
                "ChainNtfnError(received blocks out of order: current height={}, disconnected height={})",
                current, disconnected
            ),
            ChainNtfnError::TxNotFoundInBlock {
                ref txid,
                ref block_hash,
            } => write!(
                f,
                "ChainNtfnError(unable to locate tx {} in block {})",
                txid, block_hash
            ),
            ChainNtfnError::Chain(ref e) => write!(f, "ChainNtfnError(chain client error: {})", e),
            ChainNtfnError::Hash(ref e) => write!(f, "ChainNtfnError(hash error: {})", e),
        }
    }
}
