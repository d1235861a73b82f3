use {
    super::{double_sha256, MsgTx},
    crate::chaincfg::chainhash::Hash,
};

/// Defines information about a block and is used in the bitcoin block (MsgBlock)
/// message.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct BlockHeader {
    pub version: i32,
    pub prev_block: Hash,
    pub merkle_root: Hash,
    pub timestamp: u32,
    pub bits: u32,
    pub nonce: u32,
}

impl BlockHeader {
    /// Serializes the header to the 80 byte bitcoin wire encoding.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(80);

        buf.extend_from_slice(&self.version.to_le_bytes());
        buf.extend_from_slice(self.prev_block.bytes());
        buf.extend_from_slice(self.merkle_root.bytes());
        buf.extend_from_slice(&self.timestamp.to_le_bytes());
        buf.extend_from_slice(&self.bits.to_le_bytes());
        buf.extend_from_slice(&self.nonce.to_le_bytes());

        buf
    }

    /// Computes the block identifier hash for the header.
    pub fn block_hash(&self) -> Hash {
        double_sha256(&self.serialize())
    }
}

impl Default for BlockHeader {
    fn default() -> Self {
        BlockHeader {
            version: 1,
            prev_block: Hash::default(),
            merkle_root: Hash::default(),
            timestamp: 0,
            bits: 0,
            nonce: 0,
        }
    }
}

/// Implements the bitcoin block message.  Only the pieces the notifier walks
/// are modelled: the header and the ordered transaction list.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct MsgBlock {
    pub header: BlockHeader,
    pub transactions: Vec<MsgTx>,
}

impl MsgBlock {
    pub fn new(header: BlockHeader) -> Self {
        MsgBlock {
            header,
            transactions: Vec::new(),
        }
    }

    /// Adds a transaction to the message.
    pub fn add_transaction(&mut self, tx: MsgTx) {
        self.transactions.push(tx);
    }

    /// Computes the block identifier hash for the block.
    pub fn block_hash(&self) -> Hash {
        self.header.block_hash()
    }
}
