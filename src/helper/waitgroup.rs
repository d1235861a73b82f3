use {std::sync::Arc, tokio::sync::watch};

/// A Go style wait group for tracking task exits.  `add` before spawning,
/// `done` when the task exits, and `wait` suspends until the count reaches
/// zero.  Unlike a condvar based implementation, `wait` is awaitable so
/// shutdown paths can block without parking a runtime thread.
#[derive(Clone)]
pub struct WaitGroup(Arc<watch::Sender<usize>>);

pub fn new() -> WaitGroup {
    let (tx, _rx) = watch::channel(0);

    WaitGroup(Arc::new(tx))
}

impl WaitGroup {
    pub fn add(&self, delta: usize) {
        self.0.send_modify(|count| *count += delta);
    }

    pub fn done(&self) {
        self.0.send_modify(|count| {
            if *count > 0 {
                *count -= 1;
            }
        });
    }

    pub async fn wait(&self) {
        let mut rx = self.0.subscribe();

        loop {
            if *rx.borrow_and_update() == 0 {
                return;
            }

            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl std::fmt::Debug for WaitGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "WaitGroup {{ count {:?} }}", *self.0.borrow())
    }
}

#[cfg(test)]
mod test {
    use super::new;

    #[tokio::test]
    async fn test_wait_group() {
        let wg = new();

        wg.add(2);

        let worker = wg.clone();
        tokio::spawn(async move {
            worker.done();
            worker.done();
        });

        wg.wait().await;
    }

    #[tokio::test]
    async fn test_wait_group_empty() {
        // Waiting on an untouched group must not block.
        new().wait().await;
    }
}
