//! Transfer rate keeping and chunk hand-off for the vpipe throttled pipe
//!
//! This crate holds the pieces of the pipe that decide *when* the next chunk may move:
//!
//! 1. **[`TransferState`]** - the cumulative byte counter plus the rate math built on it
//! 2. **[`SpeedKeeper`]** - a task that owns a `TransferState` and answers requests about it
//! 3. **[`Gate`]** - the continue-signal a reader waits on after handing off each chunk
//!
//! # Catch-up throttling
//!
//! The keeper does not meter individual chunks. After each update it computes how long the
//! transfer *should* have taken so far at the target rate and returns the difference to the
//! wall-clock time since start:
//!
//! ```text
//! target  = transferred * 1000 / target_rate   (milliseconds)
//! elapsed = now - start
//! delay   = max(0, target - elapsed)
//! ```
//!
//! A burst is paid back by a longer pause on the next iteration. A transfer running slower than
//! the target simply gets no pause; it is never sped up. A target rate of 0 disables throttling.
//!
//! # Single writer
//!
//! The counter is never shared behind a lock. Its owner (the pipe's event loop) sends updates
//! through a [`KeeperHandle`] and every reader of the state asks for a [`Snapshot`] the same
//! way, so a snapshot always reflects every update sent before it.
//!
//! ```rust,no_run
//! use throttle::{SpeedKeeper, TransferState};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), throttle::Error> {
//! let cancel = CancellationToken::new();
//! let state = TransferState::new(tokio::time::Instant::now(), 10 * 1024, 0);
//! let (keeper, handle) = SpeedKeeper::new(state, cancel.clone());
//! let task = tokio::spawn(keeper.run());
//!
//! handle.update(4096).await?;
//! tokio::time::sleep(handle.throttle_delay().await?).await;
//!
//! cancel.cancel();
//! let _ = task.await;
//! # Ok(())
//! # }
//! ```

mod gate;
mod keeper;
mod speed;

pub use gate::Gate;
pub use keeper::{KeeperHandle, SpeedKeeper};
pub use speed::{Snapshot, TransferState};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("speed keeper is no longer running")]
    Stopped,
    #[error("gate closed")]
    GateClosed,
}
