use {
    crate::{
        chain::{BlockMeta, ChainBackend, ChainNotification, RelevantTx, TxRecord},
        chaincfg::chainhash::Hash,
        chainntnfs::{
            queue::ConcurrentQueue, BlockEpoch, BlockEpochEvent, ChainNtfnError, ConfNtfn,
            ConfirmationEvent, SpendDetail, SpendEvent, TxConfNotifier, TxConfirmation,
            REORG_SAFETY_LIMIT,
        },
        helper::waitgroup::{self, WaitGroup},
        wire::{MsgBlock, MsgTx, OutPoint},
    },
    log::{debug, error, info, warn},
    std::{
        collections::HashMap,
        sync::{
            atomic::{AtomicBool, AtomicU64, Ordering},
            Arc, Mutex,
        },
        time::{Duration, UNIX_EPOCH},
    },
    tokio::sync::mpsc,
    triggered::{Listener, Trigger},
};

/// Buffer size of the per-client epoch queues and outbound epoch channels.
const EPOCH_BUFFER_SIZE: usize = 20;

/// Number of attempts to fetch a freshly connected block from the backend
/// before the dispatcher halts.
const BLOCK_FETCH_RETRIES: u32 = 3;

/// Delay between block fetch attempts.
const BLOCK_FETCH_BACKOFF: Duration = Duration::from_millis(200);

/// Couples a target outpoint along with the channel used for notifications
/// once a spend of the outpoint has been detected.
struct SpendNotification {
    target_outpoint: OutPoint,

    spend_tx: mpsc::Sender<SpendDetail>,

    spend_id: u64,
}

/// Represents a client's intent to receive a notification with each newly
/// connected block, as held by the dispatcher.
struct BlockEpochRegistration {
    epoch_id: u64,

    /// Producer side of the client's ordered queue.
    queue_in: mpsc::Sender<BlockEpoch>,

    /// The client's ordered queue; stopped on cancellation and shutdown.
    queue: ConcurrentQueue<BlockEpoch>,

    /// Signals the client's forwarder task to exit.
    cancel_trigger: Trigger,
    cancel: Listener,

    /// Tracks the forwarder task so the outbound channel is only observed
    /// closed after the forwarder has fully exited.
    wg: WaitGroup,
}

/// Sent to the dispatcher when a client wishes to cancel an outstanding
/// spend notification that has yet to be dispatched.
pub(crate) struct SpendCancel {
    /// The target outpoint of the notification to be cancelled.
    pub(crate) op: OutPoint,

    /// The ID of the notification to cancel.
    pub(crate) spend_id: u64,
}

/// Sent to the dispatcher when a client wishes to cancel an outstanding
/// epoch notification.
pub(crate) struct EpochCancel {
    pub(crate) epoch_id: u64,
}

/// The messages accepted on the dispatcher's cancellation inbox.
pub(crate) enum CancelMsg {
    Spend(SpendCancel),
    Epoch(EpochCancel),
}

/// The messages accepted on the dispatcher's registration inbox.
enum RegistrationMsg {
    Spend(SpendNotification),
    Conf {
        ntfn: ConfNtfn,
        conf_details: Option<TxConfirmation>,
    },
    Epoch(BlockEpochRegistration),
    RelevantTx(RelevantTx),
}

/// Implements on-chain notifications on top of a chain backend.  Multiple
/// concurrent clients are supported.  All notifications are achieved via
/// non-blocking sends on client channels; every piece of subscription state
/// is owned by a single dispatcher task fed through the registration and
/// cancellation inboxes.
pub struct ChainNotifier {
    spend_client_counter: AtomicU64,
    epoch_client_counter: AtomicU64,
    conf_client_counter: AtomicU64,

    started: AtomicBool,
    stopped: AtomicBool,

    chain_conn: Arc<dyn ChainBackend>,

    notification_cancels: mpsc::Sender<CancelMsg>,
    notification_registry: mpsc::Sender<RegistrationMsg>,

    /// Receiving halves of the inboxes, handed to the dispatcher on start.
    inboxes: Mutex<Option<(mpsc::Receiver<CancelMsg>, mpsc::Receiver<RegistrationMsg>)>>,

    quit_trigger: Trigger,
    quit: Listener,
    wg: WaitGroup,
}

impl ChainNotifier {
    /// Returns a new ChainNotifier instance backed by the passed chain
    /// backend.  This function assumes the backend is ready to accept
    /// requests; the connection itself is established by `start`.
    pub fn new(chain_conn: Arc<dyn ChainBackend>) -> Self {
        let (notification_cancels, cancels_rx) = mpsc::channel(1);
        let (notification_registry, registry_rx) = mpsc::channel(1);
        let (quit_trigger, quit) = triggered::trigger();

        ChainNotifier {
            spend_client_counter: AtomicU64::new(0),
            epoch_client_counter: AtomicU64::new(0),
            conf_client_counter: AtomicU64::new(0),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            chain_conn,
            notification_cancels,
            notification_registry,
            inboxes: Mutex::new(Some((cancels_rx, registry_rx))),
            quit_trigger,
            quit,
            wg: waitgroup::new(),
        }
    }

    /// Connects to the chain backend, registers for block notifications, and
    /// launches the notification dispatcher task.  Calling `start` more than
    /// once is a no-op.
    pub async fn start(&self) -> Result<(), ChainNtfnError> {
        // Already started?
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        // Connect to the backend, and register for notifications on
        // connected and disconnected blocks.
        self.chain_conn.start().await?;
        self.chain_conn.notify_blocks().await?;

        let (_, current_height) = self.chain_conn.get_best_block().await?;

        let chain_notifications = match self.chain_conn.notifications() {
            Some(stream) => stream,

            None => {
                return Err(ChainNtfnError::Chain(
                    crate::chain::ChainClientError::InvalidResponse(
                        "notification stream already claimed".to_string(),
                    ),
                ))
            }
        };

        let (cancels, registry) = match self.inboxes.lock() {
            Ok(mut guard) => match guard.take() {
                Some(inboxes) => inboxes,

                None => {
                    warn!("notification dispatcher already launched");
                    return Ok(());
                }
            },

            Err(_) => return Err(ChainNtfnError::ShuttingDown),
        };

        let dispatcher = NotificationDispatcher {
            chain_conn: Arc::clone(&self.chain_conn),
            cancels: Some(cancels),
            registry: Some(registry),
            chain_notifications: Some(chain_notifications),
            best_height: current_height,
            spend_notifications: HashMap::new(),
            block_epoch_clients: HashMap::new(),
            tx_conf_notifier: TxConfNotifier::new(current_height as u32, REORG_SAFETY_LIMIT),
            quit_trigger: self.quit_trigger.clone(),
            quit: self.quit.clone(),
            wg: self.wg.clone(),
        };

        self.wg.add(1);
        tokio::spawn(dispatcher.run());

        Ok(())
    }

    /// Shuts down the ChainNotifier.  All pending clients are notified of
    /// the shutdown by the closure of their notification channels.
    pub async fn stop(&self) {
        // Already shutting down?
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        // Shut down the chain backend; this gracefully disconnects from the
        // node and cleans up related resources.
        self.chain_conn.stop().await;

        self.quit_trigger.trigger();
        self.wg.wait().await;
    }

    /// Registers an intent to be notified once the target outpoint has been
    /// spent by a transaction on-chain.  Once a spend of the target outpoint
    /// has been detected, the details of the spending event are sent across
    /// the `spend` channel.  `height_hint` should represent the earliest
    /// height in the chain where the output could have been spent.
    ///
    /// If the output has already been spent at registration time, the chain
    /// is rescanned from the point where the output was created and the
    /// notification is dispatched from the rescan.
    pub async fn register_spend_ntfn(
        &self,
        outpoint: &OutPoint,
        height_hint: u32,
    ) -> Result<SpendEvent, ChainNtfnError> {
        let (spend_tx, spend_rx) = mpsc::channel(1);
        let spend_id = self.spend_client_counter.fetch_add(1, Ordering::SeqCst) + 1;

        let ntfn = SpendNotification {
            target_outpoint: *outpoint,
            spend_tx,
            spend_id,
        };

        tokio::select! {
            _ = self.quit.clone() => return Err(ChainNtfnError::ShuttingDown),

            result = self.notification_registry.send(RegistrationMsg::Spend(ntfn)) => {
                if result.is_err() {
                    return Err(ChainNtfnError::ShuttingDown);
                }
            }
        }

        self.chain_conn.notify_spent(&[*outpoint]).await?;

        // Ensure that the output hasn't already been spent.  If the output
        // is no longer in the UTXO set, the chain is rescanned from the
        // point where the output was created; the rescan dispatches the
        // notification.
        let tx_out = self
            .chain_conn
            .get_tx_out(&outpoint.hash, outpoint.index, true)
            .await?;

        if tx_out.is_none() {
            self.dispatch_spend_from_rescan(outpoint, height_hint).await?;
        }

        Ok(SpendEvent {
            spend: spend_rx,
            op: *outpoint,
            spend_id,
            cancels: self.notification_cancels.clone(),
            quit: self.quit.clone(),
        })
    }

    // Locates the transaction spending `outpoint` in the chain and injects
    // it into the dispatcher as a relevant transaction.  The scan starts at
    // the block that created the output when the backend's transaction
    // index knows it, falling back to the caller's height hint.
    async fn dispatch_spend_from_rescan(
        &self,
        outpoint: &OutPoint,
        height_hint: u32,
    ) -> Result<(), ChainNtfnError> {
        // First, attempt to retrieve the funding transaction's block hash
        // using the backend's transaction index.
        let block_hash = match self.chain_conn.get_raw_transaction_verbose(&outpoint.hash).await {
            Ok(tx) if !tx.block_hash.is_empty() => Some(tx.block_hash.parse::<Hash>()?),

            Ok(_) => None,

            // Avoid returning an error if the transaction was not found, to
            // proceed with the fallback method.
            Err(e) if e.is_no_tx_info() => None,

            Err(e) => return Err(ChainNtfnError::Chain(e)),
        };

        let block_hash = match block_hash {
            Some(hash) => hash,

            // Otherwise, attempt to retrieve the hash for the block at the
            // height hint.
            None => self.chain_conn.get_block_hash(height_hint as i64).await?,
        };

        // Rescan all the blocks until the current one.
        let start_height = self.chain_conn.get_block_height(&block_hash).await?;
        let (_, end_height) = self.chain_conn.get_best_block().await?;

        for height in start_height..=end_height {
            let hash = self.chain_conn.get_block_hash(height as i64).await?;
            let block = self.chain_conn.get_block(&hash).await?;

            let spender = block.transactions.iter().find(|tx| {
                tx.tx_in
                    .iter()
                    .any(|tx_in| tx_in.previous_out_point == *outpoint)
            });

            if let Some(tx) = spender {
                let timestamp = UNIX_EPOCH + Duration::from_secs(block.header.timestamp as u64);
                let rel_tx = RelevantTx {
                    tx_record: TxRecord {
                        msg_tx: tx.clone(),
                        hash: tx.tx_hash(),
                        received: timestamp,
                    },
                    block: Some(BlockMeta {
                        hash: block.block_hash(),
                        height,
                        time: timestamp,
                    }),
                };

                tokio::select! {
                    _ = self.quit.clone() => return Err(ChainNtfnError::ShuttingDown),

                    result = self.notification_registry.send(RegistrationMsg::RelevantTx(rel_tx)) => {
                        if result.is_err() {
                            return Err(ChainNtfnError::ShuttingDown);
                        }
                    }
                }

                break;
            }
        }

        Ok(())
    }

    /// Registers a notification which triggers once `txid` reaches
    /// `num_confs` confirmations on the main chain.  The historical lookup
    /// for an already mined transaction happens on the caller's task before
    /// the subscription is handed to the dispatcher.
    pub async fn register_confirmations_ntfn(
        &self,
        txid: &Hash,
        num_confs: u32,
        height_hint: u32,
    ) -> Result<ConfirmationEvent, ChainNtfnError> {
        if num_confs == 0 {
            return Err(ChainNtfnError::NumConfsOutOfRange(num_confs));
        }

        let (_, current_height) = self.chain_conn.get_best_block().await?;

        // Look up whether the transaction is already included in the active
        // chain.
        let conf_details = self
            .historical_conf_details(txid, height_hint, current_height as u32)
            .await?;

        let conf_id = self.conf_client_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let (ntfn, event) = ConfNtfn::new(conf_id, *txid, num_confs);

        tokio::select! {
            _ = self.quit.clone() => Err(ChainNtfnError::ShuttingDown),

            result = self.notification_registry.send(RegistrationMsg::Conf { ntfn, conf_details }) => {
                if result.is_err() {
                    return Err(ChainNtfnError::ShuttingDown);
                }

                Ok(event)
            }
        }
    }

    // Looks up whether a transaction is already included in a block in the
    // active chain and, if so, returns details about the confirmation.
    async fn historical_conf_details(
        &self,
        txid: &Hash,
        height_hint: u32,
        current_height: u32,
    ) -> Result<Option<TxConfirmation>, ChainNtfnError> {
        // First, attempt to retrieve the confirmation details using the
        // backend's transaction index.
        if let Some(conf) = self.conf_details_from_tx_index(txid).await? {
            return Ok(Some(conf));
        }

        // If the backend's transaction index could not place the
        // transaction, fall back to manually scanning the chain's blocks.
        self.conf_details_manually(txid, height_hint, current_height)
            .await
    }

    // Looks up confirmation details through the backend's transaction
    // index.  Returns `None` when the index does not know the transaction
    // or the transaction is not yet mined.
    async fn conf_details_from_tx_index(
        &self,
        txid: &Hash,
    ) -> Result<Option<TxConfirmation>, ChainNtfnError> {
        let tx = match self.chain_conn.get_raw_transaction_verbose(txid).await {
            Ok(tx) => tx,

            // Avoid returning an error if the transaction index is not
            // enabled, to proceed with fallback methods.
            Err(e) if e.is_no_tx_info() => return Ok(None),

            Err(e) => return Err(ChainNtfnError::Chain(e)),
        };

        // Without a containing block there are no confirmation details to
        // retrieve.
        if tx.block_hash.is_empty() {
            return Ok(None);
        }

        // Grab the block in which the transaction was confirmed to locate
        // its exact index within the block.
        let block_hash = tx.block_hash.parse::<Hash>()?;
        let block = self.chain_conn.get_block_verbose(&block_hash).await?;

        let target_txid = txid.to_string();
        for (tx_index, tx_hash) in block.tx.iter().enumerate() {
            if *tx_hash == target_txid {
                return Ok(Some(TxConfirmation {
                    block_hash,
                    block_height: block.height as u32,
                    tx_index: tx_index as u32,
                }));
            }
        }

        // The transaction should have been found within its purported
        // containing block.
        Err(ChainNtfnError::TxNotFoundInBlock {
            txid: *txid,
            block_hash,
        })
    }

    // Looks up confirmation details by scanning the chain's blocks from the
    // earliest height the transaction could have been included in to the
    // current tip.  Returns `None` when the transaction is not found.
    async fn conf_details_manually(
        &self,
        txid: &Hash,
        height_hint: u32,
        current_height: u32,
    ) -> Result<Option<TxConfirmation>, ChainNtfnError> {
        let target_txid = txid.to_string();

        for height in height_hint..=current_height {
            let block_hash = self.chain_conn.get_block_hash(height as i64).await?;
            let block = self.chain_conn.get_block_verbose(&block_hash).await?;

            for (tx_index, tx_hash) in block.tx.iter().enumerate() {
                if *tx_hash == target_txid {
                    return Ok(Some(TxConfirmation {
                        block_hash,
                        block_height: height,
                        tx_index: tx_index as u32,
                    }));
                }
            }
        }

        Ok(None)
    }

    /// Returns a [`BlockEpochEvent`] which subscribes the caller to receive
    /// a notification for each new block connected to the main chain, in
    /// connect order.
    pub async fn register_block_epoch_ntfn(&self) -> Result<BlockEpochEvent, ChainNtfnError> {
        let epoch_id = self.epoch_client_counter.fetch_add(1, Ordering::SeqCst) + 1;

        let mut queue = ConcurrentQueue::new(EPOCH_BUFFER_SIZE);
        let queue_out = match queue.chan_out() {
            Some(queue_out) => queue_out,

            None => {
                warn!("epoch queue constructed without an output channel");
                return Err(ChainNtfnError::ShuttingDown);
            }
        };
        queue.start();

        let (epoch_tx, epoch_rx) = mpsc::channel(EPOCH_BUFFER_SIZE);
        let (cancel_trigger, cancel) = triggered::trigger();
        let wg = waitgroup::new();

        // Launch a task to proxy items added to the queue to the client
        // itself, ensuring all notifications are received in order.
        wg.add(1);
        let forwarder_wg = wg.clone();
        let forwarder_cancel = cancel.clone();
        let forwarder_quit = self.quit.clone();
        let mut forwarder_queue_out = queue_out;

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    item = forwarder_queue_out.recv() => match item {
                        Some(epoch) => {
                            tokio::select! {
                                result = epoch_tx.send(epoch) => {
                                    // Subscriber dropped its handle.
                                    if result.is_err() {
                                        break;
                                    }
                                }

                                _ = forwarder_cancel.clone() => break,

                                _ = forwarder_quit.clone() => break,
                            }
                        }

                        None => break,
                    },

                    _ = forwarder_cancel.clone() => break,

                    _ = forwarder_quit.clone() => break,
                }
            }

            forwarder_wg.done();
        });

        let reg = BlockEpochRegistration {
            epoch_id,
            queue_in: queue.chan_in(),
            queue,
            cancel_trigger,
            cancel,
            wg,
        };

        // The dispatcher always exits on quit and drops its inbox, so a
        // send raced by shutdown resolves as an error rather than blocking.
        match self.notification_registry.send(RegistrationMsg::Epoch(reg)).await {
            Ok(_) => Ok(BlockEpochEvent {
                epochs: epoch_rx,
                epoch_id,
                cancels: self.notification_cancels.clone(),
                quit: self.quit.clone(),
            }),

            Err(mpsc::error::SendError(msg)) => {
                // Exiting before the registration could be handled; stop
                // the queue now ourselves.
                if let RegistrationMsg::Epoch(reg) = msg {
                    reg.queue.stop().await;
                }

                Err(ChainNtfnError::ShuttingDown)
            }
        }
    }
}

/// The primary task which handles client notification registrations and
/// cancellations, consumes the backend's chain events, and dispatches
/// notifications.  Owning every index structure on one task serializes all
/// mutation without explicit locks.
struct NotificationDispatcher {
    chain_conn: Arc<dyn ChainBackend>,

    cancels: Option<mpsc::Receiver<CancelMsg>>,
    registry: Option<mpsc::Receiver<RegistrationMsg>>,
    chain_notifications: Option<mpsc::UnboundedReceiver<ChainNotification>>,

    /// Height of the best known block on the main chain, advanced by
    /// connects and decremented by disconnects.
    best_height: i32,

    spend_notifications: HashMap<OutPoint, HashMap<u64, SpendNotification>>,

    block_epoch_clients: HashMap<u64, BlockEpochRegistration>,

    tx_conf_notifier: TxConfNotifier,

    quit_trigger: Trigger,
    quit: Listener,
    wg: WaitGroup,
}

impl NotificationDispatcher {
    // The dispatcher event loop.  Reads from the cancellation inbox, the
    // registration inbox, the chain event stream and the quit signal; events
    // are processed strictly one at a time.
    async fn run(mut self) {
        let (mut cancels, mut registry, mut chain_notifications) = match (
            self.cancels.take(),
            self.registry.take(),
            self.chain_notifications.take(),
        ) {
            (Some(c), Some(r), Some(n)) => (c, r, n),

            _ => {
                warn!("notification dispatcher launched without its inboxes");
                self.wg.done();
                return;
            }
        };

        loop {
            // Biased polling keeps the inboxes ahead of the chain stream:
            // a registration accepted before a block event was emitted is
            // always indexed before that block is processed.
            tokio::select! {
                biased;

                cancel_msg = cancels.recv() => match cancel_msg {
                    Some(msg) => self.handle_cancel(msg).await,

                    None => {
                        warn!("cancellation inbox closed abruptly");
                        break;
                    }
                },

                register_msg = registry.recv() => match register_msg {
                    Some(msg) => self.handle_registration(msg).await,

                    None => {
                        warn!("registration inbox closed abruptly");
                        break;
                    }
                },

                ntfn = chain_notifications.recv() => match ntfn {
                    Some(ntfn) => {
                        let halt = self.handle_chain_notification(ntfn).await;
                        if halt {
                            break;
                        }
                    }

                    None => {
                        warn!("chain notification stream closed abruptly");
                        break;
                    }
                },

                _ = self.quit.clone() => break,
            }
        }

        self.cleanup().await;
    }

    // Removes a cancelled subscription from the indexes.  For epoch clients
    // the outbound channel is only observed closed after the forwarder task
    // has exited, so no stale event can race the cancellation.
    async fn handle_cancel(&mut self, msg: CancelMsg) {
        match msg {
            CancelMsg::Spend(cancel) => {
                info!(
                    "Cancelling spend notification for out_point={}, spend_id={}",
                    cancel.op, cancel.spend_id
                );

                // Ensure the notification hasn't already been dispatched;
                // removing the subscription closes its channel.
                if let Some(out_point_clients) = self.spend_notifications.get_mut(&cancel.op) {
                    out_point_clients.remove(&cancel.spend_id);
                    if out_point_clients.is_empty() {
                        self.spend_notifications.remove(&cancel.op);
                    }
                }
            }

            CancelMsg::Epoch(cancel) => {
                info!("Cancelling epoch notification, epoch_id={}", cancel.epoch_id);

                if let Some(reg) = self.block_epoch_clients.remove(&cancel.epoch_id) {
                    // First stop the active queue, then signal the
                    // forwarder and wait for it to exit.  The outbound
                    // channel closes once the forwarder drops its sender,
                    // never before the forwarder is done writing.
                    reg.queue.stop().await;
                    reg.cancel_trigger.trigger();
                    reg.wg.wait().await;
                }
            }
        }
    }

    // Adds a new subscription to the indexes, or processes a relevant
    // transaction manufactured by a rescan.
    async fn handle_registration(&mut self, msg: RegistrationMsg) {
        match msg {
            RegistrationMsg::Spend(ntfn) => {
                info!("New spend subscription: utxo={}", ntfn.target_outpoint);

                let op = ntfn.target_outpoint;
                self.spend_notifications
                    .entry(op)
                    .or_default()
                    .insert(ntfn.spend_id, ntfn);

                if let Err(e) = self.chain_conn.notify_spent(&[op]).await {
                    warn!("unable to request spend watch for {}, error: {}", op, e);
                }
            }

            RegistrationMsg::Conf { ntfn, conf_details } => {
                info!(
                    "New confirmation subscription: txid={}, numconfs={}",
                    ntfn.tx_id, ntfn.num_confirmations
                );

                if let Err(e) = self.tx_conf_notifier.register(ntfn, conf_details) {
                    warn!("unable to register confirmation subscription, error: {}", e);
                }
            }

            RegistrationMsg::Epoch(reg) => {
                info!("New block epoch subscription");
                self.block_epoch_clients.insert(reg.epoch_id, reg);
            }

            RegistrationMsg::RelevantTx(tx) => self.handle_relevant_tx(tx),
        }
    }

    // Processes one chain event.  Returns true when the dispatcher must
    // halt because the backend could not serve a connected block.
    async fn handle_chain_notification(&mut self, ntfn: ChainNotification) -> bool {
        match ntfn {
            ChainNotification::BlockConnected { hash, height } => {
                if height != self.best_height + 1 {
                    warn!(
                        "Received blocks out of order: current height={}, new height={}",
                        self.best_height, height
                    );
                    return false;
                }

                let raw_block = match self.fetch_block(&hash).await {
                    Some(block) => block,

                    None => {
                        // Skipping the block would leave the confirmation
                        // tracker with a permanent gap; surface the failure
                        // and halt instead.
                        error!(
                            "unable to fetch connected block {} after {} attempts, \
                             halting notifier",
                            hash, BLOCK_FETCH_RETRIES
                        );
                        self.quit_trigger.trigger();
                        return true;
                    }
                };

                self.best_height = height;

                info!("New block: height={}, sha={}", height, hash);

                self.notify_block_epochs(height, &hash).await;

                // Consult the spend index on every transaction carried by
                // the block, then advance the confirmation tracker.
                for tx in raw_block.transactions.iter() {
                    self.dispatch_spends(tx, height);
                }

                if let Err(e) =
                    self.tx_conf_notifier
                        .connect_tip(&hash, height as u32, &raw_block.transactions)
                {
                    warn!("unable to connect tip, error: {}", e);
                }
            }

            ChainNotification::BlockDisconnected { hash, height } => {
                if height != self.best_height {
                    warn!(
                        "Received blocks out of order: current height={}, disconnected height={}",
                        self.best_height, height
                    );
                    return false;
                }

                self.best_height = height - 1;

                info!(
                    "Block disconnected from main chain: height={}, sha={}",
                    height, hash
                );

                if let Err(e) = self.tx_conf_notifier.disconnect_tip(height as u32) {
                    warn!("unable to disconnect tip, error: {}", e);
                }
            }

            ChainNotification::RelevantTx(tx) => self.handle_relevant_tx(tx),
        }

        false
    }

    // Notifies any interested clients of a relevant transaction.  Mempool
    // transactions are ignored: subscribers only receive confirmed spends.
    fn handle_relevant_tx(&mut self, tx: RelevantTx) {
        let block = match tx.block {
            Some(block) => block,

            None => return,
        };

        self.dispatch_spends(&tx.tx_record.msg_tx, block.height);
    }

    // Checks every input of `msg_tx` against the spend index and dispatches
    // the spend details to all subscribers of a spent outpoint.  Each
    // subscription receives exactly one send before its channel closes.
    fn dispatch_spends(&mut self, msg_tx: &MsgTx, height: i32) {
        for (input_index, tx_in) in msg_tx.tx_in.iter().enumerate() {
            let prev_out = tx_in.previous_out_point;

            let clients = match self.spend_notifications.remove(&prev_out) {
                Some(clients) => clients,
                None => continue,
            };

            let spender_tx_hash = msg_tx.tx_hash();

            for (_, ntfn) in clients {
                info!(
                    "Dispatching confirmed spend notification for outpoint={} at height {}",
                    ntfn.target_outpoint, height
                );

                let spend_details = SpendDetail {
                    spent_outpoint: prev_out,
                    spender_tx_hash,
                    spending_tx: msg_tx.clone(),
                    spender_input_index: input_index as u32,
                    spending_height: height,
                };

                // The channel has capacity one and is written exactly once,
                // so the send cannot be rejected by a full buffer; dropping
                // the subscription afterwards closes the channel.
                if ntfn.spend_tx.try_send(spend_details).is_err() {
                    debug!(
                        "spend notification for outpoint={} dropped, subscriber gone",
                        prev_out
                    );
                }
            }
        }
    }

    // Notifies all registered epoch clients of the newly connected block.
    // The enqueue is a multi-way select against the client's cancellation
    // and the global quit, so no client can hold up another.
    async fn notify_block_epochs(&self, new_height: i32, new_sha: &Hash) {
        let epoch = BlockEpoch {
            height: new_height,
            hash: *new_sha,
        };

        for reg in self.block_epoch_clients.values() {
            tokio::select! {
                result = reg.queue_in.send(epoch) => {
                    if result.is_err() {
                        debug!("epoch queue for client {} already stopped", reg.epoch_id);
                    }
                }

                _ = reg.cancel.clone() => {}

                _ = self.quit.clone() => {}
            }
        }
    }

    // Fetches a connected block from the backend with bounded retries.
    async fn fetch_block(&self, hash: &Hash) -> Option<MsgBlock> {
        for attempt in 1..=BLOCK_FETCH_RETRIES {
            match self.chain_conn.get_block(hash).await {
                Ok(block) => return Some(block),

                Err(e) => {
                    warn!(
                        "Unable to get block {}, error: {} (attempt {} of {})",
                        hash, e, attempt, BLOCK_FETCH_RETRIES
                    );

                    if attempt < BLOCK_FETCH_RETRIES {
                        tokio::time::sleep(BLOCK_FETCH_BACKOFF).await;
                    }
                }
            }
        }

        None
    }

    // Notifies all still registered clients of the shutdown by closing
    // their notification channels, then tears down the confirmation
    // tracker.
    async fn cleanup(mut self) {
        info!(
            "notification dispatcher exiting: {} spend, {} epoch, {} confirmation \
             subscriptions pending",
            self.spend_notifications.len(),
            self.block_epoch_clients.len(),
            self.tx_conf_notifier.num_subscriptions()
        );

        // Dropping the spend subscriptions closes their channels.
        self.spend_notifications.clear();

        for (_, reg) in self.block_epoch_clients.drain() {
            reg.queue.stop().await;
            reg.cancel_trigger.trigger();
            reg.wg.wait().await;
        }

        self.tx_conf_notifier.teardown();

        self.wg.done();
    }
}
