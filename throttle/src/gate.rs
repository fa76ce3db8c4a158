/// Continue-signal hand-off between a producer and its consumer.
///
/// Starts closed. Every `open` lets exactly one `pass` through, so a producer that calls
/// `pass` after each item can never be more than one item ahead of the consumer.
#[derive(Debug)]
pub struct Gate {
    sem: tokio::sync::Semaphore,
}

impl Gate {
    pub fn new() -> Self {
        Self {
            sem: tokio::sync::Semaphore::const_new(0),
        }
    }

    pub fn open(&self) {
        self.sem.add_permits(1);
    }

    /// Wait for the next `open`. Fails once the gate is closed.
    pub async fn pass(&self) -> Result<(), crate::Error> {
        let permit = self
            .sem
            .acquire()
            .await
            .map_err(|_| crate::Error::GateClosed)?;
        permit.forget();
        Ok(())
    }

    /// Wake any waiter with an error and refuse further passes.
    pub fn close(&self) {
        self.sem.close();
    }
}

impl Default for Gate {
    fn default() -> Self {
        Self::new()
    }
}
