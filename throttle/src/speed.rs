use tokio::time::{Duration, Instant};

/// Point-in-time view of a transfer, as handed to the progress monitor.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// Bytes written to the output so far
    pub transferred: u64,
    /// Expected total bytes (0 = unknown)
    pub total_size: u64,
    /// Average speed since start, bytes per second
    pub speed: u64,
}

/// Running state of a rate-limited transfer.
///
/// `transferred` only moves forward; the owner of the keeper is the single writer.
#[derive(Debug, Clone)]
pub struct TransferState {
    start: Instant,
    target_rate: u64,
    total_size: u64,
    transferred: u64,
}

impl TransferState {
    /// `target_rate` is in bytes per second, 0 means unlimited. `total_size` of 0 means unknown.
    pub fn new(start: Instant, target_rate: u64, total_size: u64) -> Self {
        Self {
            start,
            target_rate,
            total_size,
            transferred: 0,
        }
    }

    pub fn target_rate(&self) -> u64 {
        self.target_rate
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn transferred(&self) -> u64 {
        self.transferred
    }

    /// Record a new cumulative byte count.
    pub fn update(&mut self, new_total: u64) {
        if new_total < self.transferred {
            tracing::warn!(
                "ignoring backwards progress update: {} < {}",
                new_total,
                self.transferred
            );
            return;
        }
        if self.total_size > 0 && new_total > self.total_size {
            tracing::debug!(
                "transferred {} bytes, more than the expected {}",
                new_total,
                self.total_size
            );
        }
        self.transferred = new_total;
    }

    /// How long the caller has to pause so the average rate stays at or below the target.
    ///
    /// The schedule is anchored at the transfer start: a transfer that is already behind is
    /// never sped up, it just gets no pause.
    pub fn throttle_delay_at(&self, now: Instant) -> Duration {
        if self.target_rate == 0 {
            return Duration::ZERO;
        }
        let target_ms = u128::from(self.transferred) * 1000 / u128::from(self.target_rate);
        let target = Duration::from_millis(u64::try_from(target_ms).unwrap_or(u64::MAX));
        let elapsed = now.saturating_duration_since(self.start);
        let wait = target.saturating_sub(elapsed);
        tracing::trace!("target={:?} elapsed={:?} wait={:?}", target, elapsed, wait);
        wait
    }

    pub fn throttle_delay(&self) -> Duration {
        self.throttle_delay_at(Instant::now())
    }

    /// Average bytes per second since start; 0 when no time has elapsed yet.
    pub fn current_speed_at(&self, now: Instant) -> u64 {
        let elapsed_ns = now.saturating_duration_since(self.start).as_nanos();
        if elapsed_ns == 0 {
            return 0;
        }
        let speed = u128::from(self.transferred) * 1_000_000_000 / elapsed_ns;
        u64::try_from(speed).unwrap_or(u64::MAX)
    }

    pub fn current_speed(&self) -> u64 {
        self.current_speed_at(Instant::now())
    }

    pub fn snapshot_at(&self, now: Instant) -> Snapshot {
        Snapshot {
            transferred: self.transferred,
            total_size: self.total_size,
            speed: self.current_speed_at(now),
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        self.snapshot_at(Instant::now())
    }
}
