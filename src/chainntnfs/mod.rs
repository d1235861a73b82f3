//! Package chainntnfs implements the chain notifier: a subscription based
//! event dispatch system exposing spend notifications, confirmation
//! notifications with reorg aware counting, and ordered block epoch streams.
//!
//! All state is owned by a single dispatcher task; callers communicate with
//! it exclusively through channels.  Nothing is persisted: on restart every
//! client re-registers.

mod error;
mod notifier;
pub mod queue;
mod txconfnotifier;

pub use error::ChainNtfnError;
pub use notifier::ChainNotifier;
pub use txconfnotifier::{ConfNtfn, TxConfNotifier};

use {
    crate::{
        chaincfg::chainhash::Hash,
        chainntnfs::notifier::{CancelMsg, EpochCancel, SpendCancel},
        wire::{MsgTx, OutPoint},
    },
    tokio::sync::mpsc,
    triggered::Listener,
};

/// Assumed maximum depth of a chain reorganization.  After this many
/// confirmations, transaction confirmation info will be pruned.
pub const REORG_SAFETY_LIMIT: u32 = 100;

/// Represents a block connected to the active main chain.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct BlockEpoch {
    pub height: i32,
    pub hash: Hash,
}

/// Describes the block that included a transaction, produced when a
/// confirmation subscription resolves.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct TxConfirmation {
    pub block_hash: Hash,
    pub block_height: u32,
    pub tx_index: u32,
}

/// Contains the details of a confirmed spend of a watched outpoint.
/// Produced exactly once per fulfilled spend subscription.
#[derive(Clone, PartialEq, Debug)]
pub struct SpendDetail {
    pub spent_outpoint: OutPoint,
    pub spender_tx_hash: Hash,
    pub spending_tx: MsgTx,
    pub spender_input_index: u32,
    pub spending_height: i32,
}

/// Handle returned from a spend registration.  The `spend` channel yields
/// the single [`SpendDetail`] once the outpoint is spent on-chain, then
/// reports closed.
pub struct SpendEvent {
    /// Receives the spend details once the registered outpoint is spent by
    /// a transaction included in the main chain.
    pub spend: mpsc::Receiver<SpendDetail>,

    pub(crate) op: OutPoint,
    pub(crate) spend_id: u64,
    pub(crate) cancels: mpsc::Sender<CancelMsg>,
    pub(crate) quit: Listener,
}

impl SpendEvent {
    /// Cancels the subscription.  After this returns, the `spend` channel
    /// has been drained and no further event will ever be observed on it.
    pub async fn cancel(&mut self) {
        let cancel = CancelMsg::Spend(SpendCancel {
            op: self.op,
            spend_id: self.spend_id,
        });

        // Submit spend cancellation to notification dispatcher.
        tokio::select! {
            result = self.cancels.send(cancel) => {
                if result.is_err() {
                    // Dispatcher gone; its teardown closes the channel.
                    return;
                }
            }

            _ = self.quit.clone() => return,
        }

        // Cancellation is being handled, drain the spend channel until it is
        // closed before yielding to the caller.
        loop {
            tokio::select! {
                item = self.spend.recv() => {
                    if item.is_none() {
                        return;
                    }
                }

                _ = self.quit.clone() => return,
            }
        }
    }
}

/// Handle returned from a confirmation registration.
///
/// `updates` yields the running confirmation count each time the watched
/// transaction gains a confirmation short of the requested depth;
/// `confirmed` yields the final [`TxConfirmation`] exactly once; and
/// `negative_conf` signals that the transaction was reorged out past the
/// point this notifier models.  Each channel reports closed once its
/// subscription reaches a terminal state.
pub struct ConfirmationEvent {
    pub confirmed: mpsc::Receiver<TxConfirmation>,
    pub updates: mpsc::UnboundedReceiver<u32>,
    pub negative_conf: mpsc::Receiver<i32>,
}

/// Handle returned from a block epoch registration.  The `epochs` channel
/// yields every block connected to the main chain, in connect order.
pub struct BlockEpochEvent {
    /// Receives each new block connected to the main chain.
    pub epochs: mpsc::Receiver<BlockEpoch>,

    pub(crate) epoch_id: u64,
    pub(crate) cancels: mpsc::Sender<CancelMsg>,
    pub(crate) quit: Listener,
}

impl BlockEpochEvent {
    /// Cancels the subscription.  After this returns, the `epochs` channel
    /// has been drained and no further event will ever be observed on it.
    pub async fn cancel(&mut self) {
        let cancel = CancelMsg::Epoch(EpochCancel {
            epoch_id: self.epoch_id,
        });

        // Submit epoch cancellation to notification dispatcher.
        tokio::select! {
            result = self.cancels.send(cancel) => {
                if result.is_err() {
                    return;
                }
            }

            _ = self.quit.clone() => return,
        }

        // Cancellation is being handled, drain the epoch channel until it is
        // closed before yielding to the caller.
        loop {
            tokio::select! {
                item = self.epochs.recv() => {
                    if item.is_none() {
                        return;
                    }
                }

                _ = self.quit.clone() => return,
            }
        }
    }
}
