use anyhow::Context;
use bytes::Bytes;
use std::sync::Arc;
use throttle::{Gate, KeeperHandle, SpeedKeeper, TransferState};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::monitor::{DisplaySink, Monitor, MonitorEvent, MonitorMode};
use crate::reader::ReaderEvent;

/// Cadence of progress renders.
pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Copy, Clone, Debug)]
pub struct PipeSettings {
    /// Bytes per second, 0 = unlimited
    pub target_rate: u64,
    /// Expected input size, 0 = unknown
    pub total_size: u64,
    pub mode: MonitorMode,
    /// Copy every chunk to the display as well
    pub echo: bool,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub bytes_copied: u64,
    pub chunks: u64,
    pub elapsed: Duration,
    /// Stopped by cancellation before the end of input
    pub interrupted: bool,
}

impl Summary {
    pub fn average_speed(&self) -> u64 {
        let nanos = self.elapsed.as_nanos();
        if nanos == 0 {
            return 0;
        }
        u64::try_from(u128::from(self.bytes_copied) * 1_000_000_000 / nanos).unwrap_or(u64::MAX)
    }
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "bytes copied: {}\n\
            chunks: {}\n\
            elapsed: {:.3}s\n\
            average speed: {}/s",
            bytesize::ByteSize(self.bytes_copied),
            self.chunks,
            self.elapsed.as_secs_f64(),
            bytesize::ByteSize(self.average_speed()),
        )
    }
}

/// Failed transfer, with whatever was copied before the failure.
///
/// Use `{:#}` or `{:?}` when logging to see the full context chain.
#[derive(Debug, thiserror::Error)]
#[error("{source:#}")]
pub struct Error {
    #[source]
    pub source: anyhow::Error,
    pub summary: Summary,
}

struct Orchestrator {
    chunks: mpsc::Receiver<ReaderEvent>,
    gate: Arc<Gate>,
    speed: KeeperHandle,
    progress: mpsc::Sender<MonitorEvent>,
    echo: bool,
    cancel: CancellationToken,
    summary: Summary,
}

impl Orchestrator {
    async fn forward<W>(&mut self, chunk: Bytes, output: &mut W) -> anyhow::Result<Duration>
    where
        W: AsyncWrite + Unpin,
    {
        output.write_all(&chunk).await.context("File Write Error")?;
        self.summary.bytes_copied += chunk.len() as u64;
        self.summary.chunks += 1;
        if self.echo && self.progress.send(MonitorEvent::Data(chunk)).await.is_err() {
            tracing::debug!("monitor is gone, dropping echoed data");
        }
        self.speed.update(self.summary.bytes_copied).await?;
        self.gate.open();
        let delay = self.speed.throttle_delay().await?;
        tracing::trace!(
            "chunk {} done, {} bytes total, sleeping {:?}",
            self.summary.chunks,
            self.summary.bytes_copied,
            delay
        );
        Ok(delay)
    }

    // a busy monitor just misses this tick
    async fn tick(&mut self) -> anyhow::Result<()> {
        let snapshot = self.speed.snapshot().await?;
        match self.progress.try_send(MonitorEvent::Progress(snapshot)) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(_)) => {}
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!("monitor is gone, skipping progress");
            }
        }
        Ok(())
    }

    async fn finish(&mut self) -> anyhow::Result<()> {
        let snapshot = self.speed.snapshot().await?;
        if self
            .progress
            .send(MonitorEvent::Progress(snapshot))
            .await
            .is_err()
        {
            tracing::debug!("monitor is gone, skipping final progress");
        }
        Ok(())
    }

    async fn run<W>(&mut self, output: &mut W, start: Instant) -> anyhow::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let mut ticker = tokio::time::interval_at(start + PROGRESS_INTERVAL, PROGRESS_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // no new chunk is taken while the throttle delay runs, ticks and cancellation still are
        let delay = tokio::time::sleep(Duration::ZERO);
        tokio::pin!(delay);
        let mut waiting = false;
        let cancel = self.cancel.clone();
        loop {
            tokio::select! {
                event = self.chunks.recv(), if !waiting => match event {
                    Some(ReaderEvent::Chunk(chunk)) => {
                        let wait = self.forward(chunk, output).await?;
                        if !wait.is_zero() {
                            delay.as_mut().reset(Instant::now() + wait);
                            waiting = true;
                        }
                    }
                    Some(ReaderEvent::Failed(error)) => {
                        return Err(error).context("File Read Error");
                    }
                    Some(ReaderEvent::End) | None => {
                        self.finish().await?;
                        return Ok(());
                    }
                },
                () = &mut delay, if waiting => {
                    waiting = false;
                }
                _ = ticker.tick() => {
                    self.tick().await?;
                }
                _ = cancel.cancelled() => {
                    tracing::info!("transfer cancelled");
                    self.summary.interrupted = true;
                    return Ok(());
                }
            }
        }
    }
}

/// Copy `input` to `output`, keeping to `settings.target_rate` and reporting progress to
/// `display`.
///
/// Runs the reader, speed keeper and monitor as separate tasks and returns only after all of
/// them have stopped. Cancelling `cancel` stops the transfer early; that is not an error, the
/// returned summary is marked `interrupted`.
#[instrument(skip_all, fields(target_rate = settings.target_rate, total_size = settings.total_size))]
pub async fn limited_pipe<R, W>(
    input: R,
    output: &mut W,
    settings: &PipeSettings,
    display: Option<DisplaySink>,
    cancel: &CancellationToken,
) -> Result<Summary, Error>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin,
{
    let start = Instant::now();
    let cancel = cancel.child_token();
    let gate = Arc::new(Gate::new());
    let (chunk_sender, chunks) = mpsc::channel(1);
    let reader = tokio::spawn(crate::reader::read(
        input,
        chunk_sender,
        gate.clone(),
        cancel.clone(),
    ));
    let (keeper, speed) = SpeedKeeper::new(
        TransferState::new(start, settings.target_rate, settings.total_size),
        cancel.clone(),
    );
    let keeper = tokio::spawn(keeper.run());
    let (monitor, progress) = Monitor::new(settings.mode, display, cancel.clone());
    let monitor = tokio::spawn(monitor.run());
    let mut orchestrator = Orchestrator {
        chunks,
        gate: gate.clone(),
        speed,
        progress,
        echo: settings.echo,
        cancel: cancel.clone(),
        summary: Summary::default(),
    };
    let mut res = orchestrator.run(output, start).await;
    // the keeper may see cancellation before answering a request that was already in flight
    let keeper_stopped = matches!(&res, Err(error) if error.is::<throttle::Error>());
    if cancel.is_cancelled() && keeper_stopped {
        tracing::debug!("speed keeper stopped by cancellation");
        orchestrator.summary.interrupted = true;
        res = Ok(());
    }
    tracing::debug!("shutting down pipe");
    cancel.cancel();
    gate.close();
    let (reader_res, keeper_res, monitor_res) = tokio::join!(reader, keeper, monitor);
    if let Err(error) = reader_res {
        tracing::error!("reader task failed: {}", error);
    }
    if let Err(error) = monitor_res {
        tracing::error!("monitor task failed: {}", error);
    }
    match keeper_res {
        Ok(state) => tracing::debug!("speed keeper final count: {}", state.transferred()),
        Err(error) => tracing::error!("speed keeper task failed: {}", error),
    }
    if res.is_ok() {
        res = output.flush().await.context("File Write Error");
    }
    let mut summary = orchestrator.summary;
    summary.elapsed = start.elapsed();
    match res {
        Ok(()) => Ok(summary),
        Err(source) => Err(Error { source, summary }),
    }
}
