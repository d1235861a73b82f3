use {
    crate::{
        chaincfg::chainhash::Hash,
        chainntnfs::{ChainNtfnError, ConfirmationEvent, TxConfirmation},
        wire::MsgTx,
    },
    log::{debug, info, warn},
    std::collections::{HashMap, HashSet},
    tokio::sync::mpsc,
};

/// Represents a client's intent to receive a notification once the target
/// transaction id reaches `num_confirmations` confirmations on the main
/// chain.  The sending halves of the event channels live here; the caller
/// holds the [`ConfirmationEvent`] with the receiving halves.
pub struct ConfNtfn {
    /// Unique identifier of the subscription within the notifier lifetime.
    pub conf_id: u64,

    /// Hash of the transaction for which a confirmation notification is
    /// requested.
    pub tx_id: Hash,

    /// Number of confirmations once which the notification is dispatched.
    pub num_confirmations: u32,

    confirmed_tx: mpsc::Sender<TxConfirmation>,
    updates_tx: mpsc::UnboundedSender<u32>,

    // Never written while the dispatch protocol holds: delivering a
    // confirmation removes the subscription from every index, so a rolled
    // back block can only ever find undelivered subscriptions.  Held so the
    // channel stays open until the subscription reaches a terminal state.
    #[allow(dead_code)]
    negative_conf_tx: mpsc::Sender<i32>,

    /// The confirmation details of the transaction once it has been seen in
    /// a connected block.  Cleared again when that block is disconnected.
    details: Option<TxConfirmation>,
}

impl ConfNtfn {
    /// Returns a new confirmation subscription along with the event handle
    /// holding the receiving halves of its channels.
    pub fn new(conf_id: u64, tx_id: Hash, num_confirmations: u32) -> (Self, ConfirmationEvent) {
        let (confirmed_tx, confirmed) = mpsc::channel(1);
        let (updates_tx, updates) = mpsc::unbounded_channel();
        let (negative_conf_tx, negative_conf) = mpsc::channel(1);

        let ntfn = ConfNtfn {
            conf_id,
            tx_id,
            num_confirmations,
            confirmed_tx,
            updates_tx,
            negative_conf_tx,
            details: None,
        };

        let event = ConfirmationEvent {
            confirmed,
            updates,
            negative_conf,
        };

        (ntfn, event)
    }

    // Sends the running confirmation count on the updates channel.  Failure
    // only means the subscriber dropped its handle.
    fn send_update(&self, num_confs_left: u32) {
        if self.updates_tx.send(num_confs_left).is_err() {
            debug!(
                "confirmation update for txid={} dropped, subscriber gone",
                self.tx_id
            );
        }
    }
}

/// Organizes pending confirmation subscriptions in height indexed buckets,
/// advancing them as blocks connect and rolling them back as blocks
/// disconnect, so that confirmation counting stays correct across reorgs up
/// to `reorg_safety_limit` blocks deep.
///
/// The notifier's dispatcher task is the sole caller of every method, so no
/// internal locking is required.
pub struct TxConfNotifier {
    /// The height of the block most recently connected to the main chain.
    current_height: u32,

    /// Maximum depth of chain reorganization tolerated; per-block rollback
    /// bookkeeping older than this is pruned.
    reorg_safety_limit: u32,

    /// All live subscriptions by their id.  Removal from this map is
    /// terminal and closes the subscription's channels.
    ntfns: HashMap<u64, ConfNtfn>,

    /// Subscriptions awaiting the first sighting of their transaction,
    /// keyed by transaction id.
    ntfns_by_tx: HashMap<Hash, Vec<u64>>,

    /// Subscriptions keyed by the future height at which their final
    /// confirmation would occur.
    ntfns_by_confirm_height: HashMap<u32, HashSet<u64>>,

    /// Subscriptions whose transaction was included by the block at the
    /// keyed height; consulted to roll back on disconnect.
    confirmed_txs_by_height: HashMap<u32, Vec<u64>>,
}

impl TxConfNotifier {
    /// Returns a TxConfNotifier tracking confirmations from the passed
    /// starting height.
    pub fn new(start_height: u32, reorg_safety_limit: u32) -> Self {
        TxConfNotifier {
            current_height: start_height,
            reorg_safety_limit,
            ntfns: HashMap::new(),
            ntfns_by_tx: HashMap::new(),
            ntfns_by_confirm_height: HashMap::new(),
            confirmed_txs_by_height: HashMap::new(),
        }
    }

    /// Adds a new confirmation subscription.  If `conf_details` carries a
    /// confirmation already at the requested depth, the notification is
    /// dispatched immediately; if the transaction is confirmed but not yet
    /// at depth, the initial confirmation count is emitted on the updates
    /// channel and the subscription is indexed by its confirm height;
    /// otherwise the subscription waits for the first sighting of its
    /// transaction in a connected block.
    pub fn register(
        &mut self,
        mut ntfn: ConfNtfn,
        conf_details: Option<TxConfirmation>,
    ) -> Result<(), ChainNtfnError> {
        if ntfn.num_confirmations == 0 {
            return Err(ChainNtfnError::NumConfsOutOfRange(0));
        }

        let details = match conf_details {
            Some(details) => details,

            None => {
                // Not yet mined as far as the caller knows; wait for the
                // transaction to show up in a connected block.
                self.ntfns_by_tx
                    .entry(ntfn.tx_id)
                    .or_default()
                    .push(ntfn.conf_id);
                self.ntfns.insert(ntfn.conf_id, ntfn);

                return Ok(());
            }
        };

        let confirm_height = details.block_height + ntfn.num_confirmations - 1;
        if confirm_height <= self.current_height {
            // Already at the requested depth, dispatch without indexing.
            info!(
                "Dispatching {} conf notification for txid={} on registration",
                ntfn.num_confirmations, ntfn.tx_id
            );

            if ntfn.confirmed_tx.try_send(details).is_err() {
                warn!(
                    "unable to deliver confirmation for txid={}, subscriber gone",
                    ntfn.tx_id
                );
            }

            return Ok(());
        }

        // Confirmed but not yet at depth: emit the current count and wait
        // for the remaining blocks.
        if self.current_height >= details.block_height {
            ntfn.send_update(self.current_height - details.block_height + 1);
        }

        ntfn.details = Some(details);
        self.ntfns_by_confirm_height
            .entry(confirm_height)
            .or_default()
            .insert(ntfn.conf_id);
        self.confirmed_txs_by_height
            .entry(details.block_height)
            .or_default()
            .push(ntfn.conf_id);
        self.ntfns.insert(ntfn.conf_id, ntfn);

        Ok(())
    }

    /// Processes the block at `block_height` being connected to the main
    /// chain: records first sightings of watched transactions, dispatches
    /// subscriptions that reached their requested depth, prunes rollback
    /// bookkeeping past the reorg horizon, and emits intermediate
    /// confirmation updates on everything still pending.
    ///
    /// The caller must hand blocks over strictly in order.
    pub fn connect_tip(
        &mut self,
        block_hash: &Hash,
        block_height: u32,
        txns: &[MsgTx],
    ) -> Result<(), ChainNtfnError> {
        if block_height != self.current_height + 1 {
            return Err(ChainNtfnError::OutOfOrderConnectTip {
                current: self.current_height,
                new: block_height,
            });
        }

        // Record every watched transaction included by this block under the
        // height its final confirmation would occur at.
        for (tx_index, tx) in txns.iter().enumerate() {
            let tx_id = tx.tx_hash();

            let ids = match self.ntfns_by_tx.remove(&tx_id) {
                Some(ids) => ids,
                None => continue,
            };

            debug!("txid={} included in block height={}", tx_id, block_height);

            for id in ids {
                let ntfn = match self.ntfns.get_mut(&id) {
                    Some(ntfn) => ntfn,
                    None => continue,
                };

                ntfn.details = Some(TxConfirmation {
                    block_hash: *block_hash,
                    block_height,
                    tx_index: tx_index as u32,
                });

                let confirm_height = block_height + ntfn.num_confirmations - 1;
                self.ntfns_by_confirm_height
                    .entry(confirm_height)
                    .or_default()
                    .insert(id);
                self.confirmed_txs_by_height
                    .entry(block_height)
                    .or_default()
                    .push(id);
            }
        }

        self.current_height = block_height;

        // Dispatch everything whose final confirmation occurs at this
        // height.  Removal from the live map closes the channels and is
        // terminal: a dispatched subscription can never produce further
        // updates nor be rolled back.
        if let Some(ids) = self.ntfns_by_confirm_height.remove(&block_height) {
            for id in ids {
                let ntfn = match self.ntfns.remove(&id) {
                    Some(ntfn) => ntfn,
                    None => continue,
                };

                let details = match ntfn.details {
                    Some(details) => details,

                    None => {
                        warn!(
                            "confirmation subscription for txid={} reached depth without details",
                            ntfn.tx_id
                        );
                        continue;
                    }
                };

                info!(
                    "Dispatching {} conf notification for txid={}",
                    ntfn.num_confirmations, ntfn.tx_id
                );

                if ntfn.confirmed_tx.try_send(details).is_err() {
                    warn!(
                        "unable to deliver confirmation for txid={}, subscriber gone",
                        ntfn.tx_id
                    );
                }

                if let Some(ids_at_height) =
                    self.confirmed_txs_by_height.get_mut(&details.block_height)
                {
                    ids_at_height.retain(|recorded| *recorded != id);
                    if ids_at_height.is_empty() {
                        self.confirmed_txs_by_height.remove(&details.block_height);
                    }
                }
            }
        }

        // Beyond the reorg horizon, reorgs are no longer modelled; drop the
        // per-block rollback bookkeeping.
        if let Some(horizon) = block_height.checked_sub(self.reorg_safety_limit) {
            self.confirmed_txs_by_height.retain(|height, _| *height > horizon);
        }

        // Emit the running confirmation count on every still-pending
        // subscription that has been sighted.
        for (&confirm_height, ids) in self.ntfns_by_confirm_height.iter() {
            if confirm_height <= block_height {
                continue;
            }

            for id in ids {
                if let Some(ntfn) = self.ntfns.get(id) {
                    // A historically registered subscription may name a
                    // containing block the tracker has not reached yet; it
                    // has no confirmations to report until then.
                    let remaining = confirm_height - block_height;
                    if remaining < ntfn.num_confirmations {
                        ntfn.send_update(ntfn.num_confirmations - remaining);
                    }
                }
            }
        }

        Ok(())
    }

    /// Processes the block at `block_height` being disconnected from the
    /// main chain: every subscription whose transaction was included by the
    /// disconnected block is rolled back to await re-inclusion.
    pub fn disconnect_tip(&mut self, block_height: u32) -> Result<(), ChainNtfnError> {
        if block_height != self.current_height {
            return Err(ChainNtfnError::OutOfOrderDisconnectTip {
                current: self.current_height,
                disconnected: block_height,
            });
        }

        if let Some(ids) = self.confirmed_txs_by_height.remove(&block_height) {
            for id in ids {
                let ntfn = match self.ntfns.get_mut(&id) {
                    Some(ntfn) => ntfn,

                    None => {
                        // Dispatch removes a subscription from every index,
                        // so a recorded id without a live subscription means
                        // a confirmed notification was rolled back from
                        // under its subscriber.
                        warn!(
                            "disconnect of height={} rolled back an already \
                             dispatched confirmation",
                            block_height
                        );
                        continue;
                    }
                };

                if let Some(details) = ntfn.details.take() {
                    let confirm_height = details.block_height + ntfn.num_confirmations - 1;

                    if let Some(ids_at_height) =
                        self.ntfns_by_confirm_height.get_mut(&confirm_height)
                    {
                        ids_at_height.remove(&id);
                        if ids_at_height.is_empty() {
                            self.ntfns_by_confirm_height.remove(&confirm_height);
                        }
                    }
                }

                // Await re-inclusion of the transaction in a future block.
                self.ntfns_by_tx.entry(ntfn.tx_id).or_default().push(id);
            }
        }

        self.current_height -= 1;

        Ok(())
    }

    /// Closes the channels of every remaining subscription to signal
    /// shutdown to their subscribers.
    pub fn teardown(self) {
        info!(
            "tearing down confirmation notifier with {} subscriptions pending",
            self.ntfns.len()
        );

        // Dropping the subscriptions drops the sending halves, which the
        // subscribers observe as closed channels.
        drop(self.ntfns);
    }

    /// Returns the number of live subscriptions, used by the dispatcher for
    /// shutdown logging.
    pub fn num_subscriptions(&self) -> usize {
        self.ntfns.len()
    }
}

#[cfg(test)]
mod test {
    use {
        super::{ConfNtfn, TxConfNotifier},
        crate::{
            chaincfg::chainhash::Hash,
            chainntnfs::TxConfirmation,
            wire::{MsgTx, TxOut},
        },
    };

    // Returns a unique transaction whose content depends on the seed.
    fn test_tx(seed: u32) -> MsgTx {
        let mut tx = MsgTx::new();
        tx.add_tx_out(TxOut::new(seed as i64, vec![0x51]));
        tx
    }

    // Returns a unique block hash derived from the seed.
    fn test_block_hash(seed: u8) -> Hash {
        Hash::from_bytes([seed; 32])
    }

    // Registering, then connecting blocks until the requested depth, must
    // produce the intermediate updates followed by the final confirmation.
    #[tokio::test]
    async fn test_simple_confirmation() {
        let mut tcn = TxConfNotifier::new(99, 100);

        let tx = test_tx(1);
        let (ntfn, mut event) = ConfNtfn::new(1, tx.tx_hash(), 3);
        tcn.register(ntfn, None).expect("register failed");

        let hash_100 = test_block_hash(100);
        tcn.connect_tip(&hash_100, 100, &[tx.clone()])
            .expect("connect 100 failed");
        tcn.connect_tip(&test_block_hash(101), 101, &[])
            .expect("connect 101 failed");

        assert_eq!(Some(1), event.updates.recv().await);
        assert_eq!(Some(2), event.updates.recv().await);
        assert!(
            event.confirmed.try_recv().is_err(),
            "confirmation must not fire before the requested depth"
        );

        tcn.connect_tip(&test_block_hash(102), 102, &[])
            .expect("connect 102 failed");

        let conf = event.confirmed.recv().await.expect("confirmation missing");
        assert_eq!(hash_100, conf.block_hash);
        assert_eq!(100, conf.block_height);
        assert_eq!(0, conf.tx_index);

        // Terminal: the channel must now report closed.
        assert_eq!(None, event.confirmed.recv().await);
        assert_eq!(None, event.updates.recv().await);
    }

    // A reorg before the requested depth rolls the subscription back; the
    // replacement chain must produce the final confirmation with the new
    // containing block.
    #[tokio::test]
    async fn test_confirmation_across_reorg() {
        let mut tcn = TxConfNotifier::new(99, 100);

        let tx = test_tx(2);
        let (ntfn, mut event) = ConfNtfn::new(1, tx.tx_hash(), 3);
        tcn.register(ntfn, None).expect("register failed");

        tcn.connect_tip(&test_block_hash(100), 100, &[tx.clone()])
            .expect("connect 100 failed");
        tcn.connect_tip(&test_block_hash(101), 101, &[])
            .expect("connect 101 failed");

        tcn.disconnect_tip(101).expect("disconnect 101 failed");
        tcn.disconnect_tip(100).expect("disconnect 100 failed");

        // Replacement chain with a different block including the tx.
        let hash_100b = test_block_hash(200);
        tcn.connect_tip(&hash_100b, 100, &[tx.clone()])
            .expect("connect 100' failed");
        tcn.connect_tip(&test_block_hash(201), 101, &[])
            .expect("connect 101' failed");
        tcn.connect_tip(&test_block_hash(202), 102, &[])
            .expect("connect 102' failed");

        let conf = event.confirmed.recv().await.expect("confirmation missing");
        assert_eq!(hash_100b, conf.block_hash, "confirmation must name the new block");
        assert_eq!(100, conf.block_height);
    }

    // A fully unwound connect/disconnect sequence must leave the tracker in
    // its starting state.
    #[tokio::test]
    async fn test_reorg_symmetry() {
        let mut tcn = TxConfNotifier::new(99, 100);

        let tx = test_tx(3);
        let (ntfn, mut event) = ConfNtfn::new(1, tx.tx_hash(), 5);
        tcn.register(ntfn, None).expect("register failed");

        for height in 100..103u32 {
            let included: Vec<MsgTx> = if height == 100 { vec![tx.clone()] } else { vec![] };
            tcn.connect_tip(&test_block_hash(height as u8), height, &included)
                .expect("connect failed");
        }
        for height in (100..103u32).rev() {
            tcn.disconnect_tip(height).expect("disconnect failed");
        }

        assert_eq!(99, tcn.current_height);
        assert!(tcn.ntfns_by_confirm_height.is_empty());
        assert!(tcn.confirmed_txs_by_height.is_empty());
        assert_eq!(
            1,
            tcn.ntfns_by_tx.get(&tx.tx_hash()).map(Vec::len).unwrap_or(0),
            "subscription must be back awaiting first sighting"
        );

        // The subscriber saw only intermediate updates, no confirmation.
        assert!(event.confirmed.try_recv().is_err());
    }

    // Registration with a historical confirmation already at depth must
    // dispatch immediately.
    #[tokio::test]
    async fn test_register_historical_at_depth() {
        let mut tcn = TxConfNotifier::new(110, 100);

        let tx = test_tx(4);
        let (ntfn, mut event) = ConfNtfn::new(1, tx.tx_hash(), 3);
        let details = TxConfirmation {
            block_hash: test_block_hash(9),
            block_height: 100,
            tx_index: 2,
        };

        tcn.register(ntfn, Some(details)).expect("register failed");

        let conf = event.confirmed.recv().await.expect("confirmation missing");
        assert_eq!(100, conf.block_height);
        assert_eq!(2, conf.tx_index);
        assert_eq!(0, tcn.num_subscriptions());
    }

    // Registration with a historical confirmation short of depth must emit
    // the current count and finish at the right height.
    #[tokio::test]
    async fn test_register_historical_below_depth() {
        let mut tcn = TxConfNotifier::new(101, 100);

        let tx = test_tx(5);
        let (ntfn, mut event) = ConfNtfn::new(1, tx.tx_hash(), 5);
        let details = TxConfirmation {
            block_hash: test_block_hash(9),
            block_height: 100,
            tx_index: 0,
        };

        tcn.register(ntfn, Some(details)).expect("register failed");

        // Two blocks down (100 and 101), three to go.
        assert_eq!(Some(2), event.updates.recv().await);

        tcn.connect_tip(&test_block_hash(102), 102, &[]).expect("connect failed");
        tcn.connect_tip(&test_block_hash(103), 103, &[]).expect("connect failed");
        assert_eq!(Some(3), event.updates.recv().await);
        assert_eq!(Some(4), event.updates.recv().await);

        tcn.connect_tip(&test_block_hash(104), 104, &[]).expect("connect failed");
        let conf = event.confirmed.recv().await.expect("confirmation missing");
        assert_eq!(100, conf.block_height);
    }

    // Zero requested confirmations is meaningless and must be rejected
    // without enqueueing anything.
    #[tokio::test]
    async fn test_register_zero_confs_rejected() {
        let mut tcn = TxConfNotifier::new(100, 100);

        let (ntfn, _event) = ConfNtfn::new(1, test_tx(6).tx_hash(), 0);
        assert!(tcn.register(ntfn, None).is_err());
        assert_eq!(0, tcn.num_subscriptions());
    }

    // Multiple subscriptions on one txid are independent.
    #[tokio::test]
    async fn test_multiple_subscriptions_same_tx() {
        let mut tcn = TxConfNotifier::new(99, 100);

        let tx = test_tx(7);
        let (ntfn_a, mut event_a) = ConfNtfn::new(1, tx.tx_hash(), 1);
        let (ntfn_b, mut event_b) = ConfNtfn::new(2, tx.tx_hash(), 2);
        tcn.register(ntfn_a, None).expect("register a failed");
        tcn.register(ntfn_b, None).expect("register b failed");

        tcn.connect_tip(&test_block_hash(100), 100, &[tx.clone()])
            .expect("connect 100 failed");

        assert!(
            event_a.confirmed.recv().await.is_some(),
            "single conf subscription must resolve on inclusion"
        );
        assert!(
            event_b.confirmed.try_recv().is_err(),
            "two conf subscription must still be pending"
        );

        tcn.connect_tip(&test_block_hash(101), 101, &[])
            .expect("connect 101 failed");
        assert!(event_b.confirmed.recv().await.is_some());
    }

    // Rollback bookkeeping must not be retained past the reorg horizon.
    #[tokio::test]
    async fn test_reorg_horizon_pruning() {
        let safety_limit = 5;
        let mut tcn = TxConfNotifier::new(0, safety_limit);

        let tx = test_tx(8);
        // Deep subscription that stays pending the whole test.
        let (ntfn, _event) = ConfNtfn::new(1, tx.tx_hash(), 50);
        tcn.register(ntfn, None).expect("register failed");

        tcn.connect_tip(&test_block_hash(1), 1, &[tx.clone()])
            .expect("connect 1 failed");
        assert!(tcn.confirmed_txs_by_height.contains_key(&1));

        for height in 2..=(1 + safety_limit) {
            tcn.connect_tip(&test_block_hash(height as u8), height, &[])
                .expect("connect failed");
        }

        assert!(
            !tcn.confirmed_txs_by_height.contains_key(&1),
            "bookkeeping past the reorg horizon must be pruned"
        );
        // The subscription itself stays pending.
        assert_eq!(1, tcn.num_subscriptions());
    }

    // Teardown must close the channels of pending subscriptions.
    #[tokio::test]
    async fn test_teardown_closes_channels() {
        let mut tcn = TxConfNotifier::new(100, 100);

        let tx = test_tx(9);
        let (ntfn, mut event) = ConfNtfn::new(1, tx.tx_hash(), 3);
        tcn.register(ntfn, None).expect("register failed");

        tcn.teardown();

        assert_eq!(None, event.confirmed.recv().await);
        assert_eq!(None, event.updates.recv().await);
        assert_eq!(None, event.negative_conf.recv().await);
    }

    // Out of order blocks are rejected with typed errors.
    #[tokio::test]
    async fn test_out_of_order_tips_rejected() {
        let mut tcn = TxConfNotifier::new(100, 100);

        assert!(tcn.connect_tip(&test_block_hash(1), 102, &[]).is_err());
        assert!(tcn.disconnect_tip(99).is_err());
    }
}
