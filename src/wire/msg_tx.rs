use {
    super::{double_sha256, write_var_int, OutPoint},
    crate::chaincfg::chainhash::Hash,
};

/// Defines a bitcoin transaction input.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct TxIn {
    pub previous_out_point: OutPoint,
    pub signature_script: Vec<u8>,
    pub sequence: u32,
}

impl TxIn {
    pub fn new(previous_out_point: OutPoint, signature_script: Vec<u8>) -> Self {
        TxIn {
            previous_out_point,
            signature_script,
            sequence: u32::MAX,
        }
    }
}

/// Defines a bitcoin transaction output.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct TxOut {
    pub value: i64,
    pub pk_script: Vec<u8>,
}

impl TxOut {
    pub fn new(value: i64, pk_script: Vec<u8>) -> Self {
        TxOut { value, pk_script }
    }
}

/// Implements the bitcoin tx message which is used to transmit transactions.
/// Use the add_tx_in and add_tx_out functions to build up the list of
/// transaction inputs and outputs.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct MsgTx {
    pub version: i32,
    pub tx_in: Vec<TxIn>,
    pub tx_out: Vec<TxOut>,
    pub lock_time: u32,
}

impl MsgTx {
    /// Returns a new bitcoin tx message with no transaction inputs or outputs.
    pub fn new() -> Self {
        MsgTx {
            version: 1,
            tx_in: Vec::new(),
            tx_out: Vec::new(),
            lock_time: 0,
        }
    }

    /// Adds a transaction input to the message.
    pub fn add_tx_in(&mut self, tx_in: TxIn) {
        self.tx_in.push(tx_in);
    }

    /// Adds a transaction output to the message.
    pub fn add_tx_out(&mut self, tx_out: TxOut) {
        self.tx_out.push(tx_out);
    }

    /// Serializes the transaction to the bitcoin wire encoding.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();

        buf.extend_from_slice(&self.version.to_le_bytes());

        write_var_int(&mut buf, self.tx_in.len() as u64);
        for tx_in in self.tx_in.iter() {
            buf.extend_from_slice(tx_in.previous_out_point.hash.bytes());
            buf.extend_from_slice(&tx_in.previous_out_point.index.to_le_bytes());
            write_var_int(&mut buf, tx_in.signature_script.len() as u64);
            buf.extend_from_slice(&tx_in.signature_script);
            buf.extend_from_slice(&tx_in.sequence.to_le_bytes());
        }

        write_var_int(&mut buf, self.tx_out.len() as u64);
        for tx_out in self.tx_out.iter() {
            buf.extend_from_slice(&tx_out.value.to_le_bytes());
            write_var_int(&mut buf, tx_out.pk_script.len() as u64);
            buf.extend_from_slice(&tx_out.pk_script);
        }

        buf.extend_from_slice(&self.lock_time.to_le_bytes());

        buf
    }

    /// Generates the hash of the transaction serialized with the bitcoin wire
    /// encoding.  This is the transaction id used to reference transactions
    /// in outpoints and RPC results.
    pub fn tx_hash(&self) -> Hash {
        double_sha256(&self.serialize())
    }
}

impl Default for MsgTx {
    fn default() -> Self {
        Self::new()
    }
}
