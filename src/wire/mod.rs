//! Package wire implements the subset of the bitcoin wire protocol types the
//! notifier operates on: outpoints, transactions and blocks, along with the
//! serialization needed to derive their hashes.  Parsing node-provided data
//! into these types is the chain client's concern, not this package's.

mod msg_block;
mod msg_tx;

pub use msg_block::{BlockHeader, MsgBlock};
pub use msg_tx::{MsgTx, TxIn, TxOut};

use {
    crate::chaincfg::chainhash::{Hash, HASH_SIZE},
    ring::digest,
};

/// Defines a bitcoin data type that can be used to refer to a particular
/// transaction output.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Default, Debug)]
pub struct OutPoint {
    pub hash: Hash,
    pub index: u32,
}

impl OutPoint {
    pub fn new(hash: Hash, index: u32) -> Self {
        OutPoint { hash, index }
    }
}

impl std::fmt::Display for OutPoint {
    // Returns the OutPoint in the human-readable form "hash:index".
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.hash, self.index)
    }
}

/// Serializes `value` to `buf` using a variable number of bytes depending on
/// its value.
pub(crate) fn write_var_int(buf: &mut Vec<u8>, value: u64) {
    if value < 0xfd {
        buf.push(value as u8);
    } else if value <= 0xffff {
        buf.push(0xfd);
        buf.extend_from_slice(&(value as u16).to_le_bytes());
    } else if value <= 0xffff_ffff {
        buf.push(0xfe);
        buf.extend_from_slice(&(value as u32).to_le_bytes());
    } else {
        buf.push(0xff);
        buf.extend_from_slice(&value.to_le_bytes());
    }
}

/// Returns the double SHA-256 of `data` as a chain hash.
pub(crate) fn double_sha256(data: &[u8]) -> Hash {
    let first = digest::digest(&digest::SHA256, data);
    let second = digest::digest(&digest::SHA256, first.as_ref());

    let mut bytes = [0u8; HASH_SIZE];
    bytes.copy_from_slice(second.as_ref());

    Hash::from_bytes(bytes)
}
