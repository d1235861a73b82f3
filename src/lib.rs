//! btcnotify provides subscription based notifications for on-chain events
//! of a bitcoin-like full node: spends of a watched outpoint, transaction
//! confirmations with reorg-aware counting, and an ordered stream of blocks
//! connected to the main chain.
//!
//! The node itself is reached through the [`chain::ChainBackend`] trait; the
//! notification machinery lives in [`chainntnfs`].

pub mod btcjson;
pub mod chain;
pub mod chaincfg;
pub mod chainntnfs;
pub mod helper;
pub mod wire;
