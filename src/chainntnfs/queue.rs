use {
    crate::helper::waitgroup::{self, WaitGroup},
    log::warn,
    std::collections::VecDeque,
    tokio::sync::mpsc,
    triggered::{Listener, Trigger},
};

/// A concurrent-safe FIFO queue with unbounded capacity.  Clients interact
/// with the queue by sending on `chan_in` and receiving from `chan_out`.
/// Between the two sits an internal buffer drained by a dedicated forwarder
/// task, so producers are never blocked by a slow consumer and items are
/// never dropped while the queue runs.  Items are delivered in the order
/// produced.
///
/// On `stop`, items still held in the internal buffer are discarded, and
/// `chan_out` yields any items already handed off before reporting closed,
/// so consumers can always drain without deadlock.
pub struct ConcurrentQueue<T> {
    chan_in: mpsc::Sender<T>,
    in_rx: Option<mpsc::Receiver<T>>,
    out_tx: Option<mpsc::Sender<T>>,
    out_rx: Option<mpsc::Receiver<T>>,
    quit_trigger: Trigger,
    quit: Listener,
    wg: WaitGroup,
}

impl<T: Send + 'static> ConcurrentQueue<T> {
    /// Constructs a ConcurrentQueue.  `buffer_size` is the capacity of the
    /// in and out channels used to hand items to and from the forwarder.
    pub fn new(buffer_size: usize) -> Self {
        let (chan_in, in_rx) = mpsc::channel(buffer_size);
        let (out_tx, out_rx) = mpsc::channel(buffer_size);
        let (quit_trigger, quit) = triggered::trigger();

        ConcurrentQueue {
            chan_in,
            in_rx: Some(in_rx),
            out_tx: Some(out_tx),
            out_rx: Some(out_rx),
            quit_trigger,
            quit,
            wg: waitgroup::new(),
        }
    }

    /// Returns a sender for pushing items into the queue.
    pub fn chan_in(&self) -> mpsc::Sender<T> {
        self.chan_in.clone()
    }

    /// Takes the single receiver for reading items out of the queue.
    /// Returns `None` if the receiver was already taken.
    pub fn chan_out(&mut self) -> Option<mpsc::Receiver<T>> {
        self.out_rx.take()
    }

    /// Begins the forwarder task which moves items from the inbound channel
    /// through the internal buffer to the outbound channel.  Starting an
    /// already started queue is a logged no-op.
    pub fn start(&mut self) {
        let (mut in_rx, out_tx) = match (self.in_rx.take(), self.out_tx.take()) {
            (Some(in_rx), Some(out_tx)) => (in_rx, out_tx),

            _ => {
                warn!("concurrent queue started more than once");
                return;
            }
        };

        let quit = self.quit.clone();
        let wg = self.wg.clone();
        wg.add(1);

        tokio::spawn(async move {
            let mut buffer: VecDeque<T> = VecDeque::new();
            let mut producers_done = false;

            loop {
                if buffer.is_empty() {
                    if producers_done {
                        break;
                    }

                    tokio::select! {
                        item = in_rx.recv() => match item {
                            Some(item) => buffer.push_back(item),

                            None => producers_done = true,
                        },

                        _ = quit.clone() => break,
                    }
                } else if producers_done {
                    tokio::select! {
                        permit = out_tx.reserve() => match permit {
                            Ok(permit) => {
                                if let Some(item) = buffer.pop_front() {
                                    permit.send(item);
                                }
                            }

                            // Consumer gone, nothing left to forward to.
                            Err(_) => break,
                        },

                        _ = quit.clone() => break,
                    }
                } else {
                    tokio::select! {
                        item = in_rx.recv() => match item {
                            Some(item) => buffer.push_back(item),

                            None => producers_done = true,
                        },

                        permit = out_tx.reserve() => match permit {
                            Ok(permit) => {
                                if let Some(item) = buffer.pop_front() {
                                    permit.send(item);
                                }
                            }

                            Err(_) => break,
                        },

                        _ = quit.clone() => break,
                    }
                }
            }

            // Dropping out_tx closes chan_out once already queued items are
            // drained.
            wg.done();
        });
    }

    /// Signals the forwarder task to exit and waits for it.  Items still in
    /// the internal buffer are discarded.
    pub async fn stop(&self) {
        self.quit_trigger.trigger();
        self.wg.wait().await;
    }
}

#[cfg(test)]
mod test {
    use super::ConcurrentQueue;

    // Items pushed while nobody reads must all come back out, in order.
    #[tokio::test]
    async fn test_queue_preserves_order_under_slow_consumer() {
        let mut queue: ConcurrentQueue<u32> = ConcurrentQueue::new(20);
        queue.start();

        let chan_in = queue.chan_in();
        for i in 0..50u32 {
            chan_in.send(i).await.expect("queue closed unexpectedly");
        }

        let mut chan_out = queue.chan_out().expect("chan_out already taken");
        for want in 0..50u32 {
            let got = chan_out.recv().await.expect("queue closed early");
            assert_eq!(want, got, "items must arrive in order");
        }
    }

    // After stop, the outbound channel must drain and then report closed
    // without deadlock.
    #[tokio::test]
    async fn test_queue_stop_drains() {
        let mut queue: ConcurrentQueue<u32> = ConcurrentQueue::new(4);
        queue.start();

        let chan_in = queue.chan_in();
        for i in 0..3u32 {
            chan_in.send(i).await.expect("queue closed unexpectedly");
        }

        let mut chan_out = queue.chan_out().expect("chan_out already taken");
        assert_eq!(Some(0), chan_out.recv().await);

        queue.stop().await;

        // Remaining items either arrive in order or the channel reports
        // closed; it must never hang.
        let mut last = 0;
        while let Some(item) = chan_out.recv().await {
            assert!(item > last, "items must stay ordered across stop");
            last = item;
        }
    }

    // Dropping all producers flushes the buffer and closes the outbound
    // channel.
    #[tokio::test]
    async fn test_queue_close_on_producers_gone() {
        let mut queue: ConcurrentQueue<u32> = ConcurrentQueue::new(4);
        queue.start();

        let chan_in = queue.chan_in();
        chan_in.send(1).await.expect("queue closed unexpectedly");
        chan_in.send(2).await.expect("queue closed unexpectedly");

        let mut chan_out = queue.chan_out().expect("chan_out already taken");

        // Dropping the queue and every cloned sender ends production.
        drop(chan_in);
        drop(queue);
        assert_eq!(Some(1), chan_out.recv().await);
        assert_eq!(Some(2), chan_out.recv().await);
        assert_eq!(None, chan_out.recv().await);
    }
}
