//! Chain configuration primitives shared by every layer of the crate.

pub mod chainhash;
