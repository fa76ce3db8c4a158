use tokio::sync::{mpsc, oneshot};
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::speed::{Snapshot, TransferState};

// the single writer never has more than a couple of requests outstanding
const REQUEST_QUEUE: usize = 16;

#[derive(Debug)]
enum Request {
    Update(u64),
    Delay(oneshot::Sender<Duration>),
    Snapshot(oneshot::Sender<Snapshot>),
}

/// Task owning the [`TransferState`]. All access goes through a [`KeeperHandle`].
#[derive(Debug)]
pub struct SpeedKeeper {
    state: TransferState,
    requests: mpsc::Receiver<Request>,
    cancel: CancellationToken,
}

/// Cloneable message-passing front end of a running [`SpeedKeeper`].
#[derive(Debug, Clone)]
pub struct KeeperHandle {
    sender: mpsc::Sender<Request>,
}

impl SpeedKeeper {
    pub fn new(state: TransferState, cancel: CancellationToken) -> (Self, KeeperHandle) {
        let (sender, requests) = mpsc::channel(REQUEST_QUEUE);
        (
            Self {
                state,
                requests,
                cancel,
            },
            KeeperHandle { sender },
        )
    }

    /// Serve requests until cancelled or every handle is dropped. Returns the final state.
    pub async fn run(mut self) -> TransferState {
        tracing::debug!(
            "speed keeper started, target rate: {} B/s, total size: {}",
            self.state.target_rate(),
            self.state.total_size()
        );
        while let Some(request) = tokio::select! {
            biased;
            request = self.requests.recv() => request,
            _ = self.cancel.cancelled() => None,
        } {
            match request {
                Request::Update(total) => self.state.update(total),
                Request::Delay(reply) => {
                    // requester may have given up, nothing to do then
                    let _ = reply.send(self.state.throttle_delay());
                }
                Request::Snapshot(reply) => {
                    let _ = reply.send(self.state.snapshot());
                }
            }
        }
        tracing::debug!("speed keeper done at {} bytes", self.state.transferred());
        self.state
    }
}

impl KeeperHandle {
    async fn request(&self, request: Request) -> Result<(), crate::Error> {
        self.sender
            .send(request)
            .await
            .map_err(|_| crate::Error::Stopped)
    }

    /// Report the new cumulative byte count.
    pub async fn update(&self, total: u64) -> Result<(), crate::Error> {
        self.request(Request::Update(total)).await
    }

    /// Pause owed after the most recent update.
    pub async fn throttle_delay(&self) -> Result<Duration, crate::Error> {
        let (reply, response) = oneshot::channel();
        self.request(Request::Delay(reply)).await?;
        response.await.map_err(|_| crate::Error::Stopped)
    }

    pub async fn snapshot(&self) -> Result<Snapshot, crate::Error> {
        let (reply, response) = oneshot::channel();
        self.request(Request::Snapshot(reply)).await?;
        response.await.map_err(|_| crate::Error::Stopped)
    }
}
