use bytes::Bytes;
use throttle::Snapshot;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Where progress lines and echoed data go; independent of the primary output.
pub type DisplaySink = Box<dyn AsyncWrite + Send + Unpin>;

// progress requests beyond this are dropped rather than queued
const EVENT_QUEUE: usize = 4;

/// How progress is shown, fixed for the whole run.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MonitorMode {
    Silent,
    Standard,
    /// Standard line plus a bar `width` cells wide
    Graph { width: usize },
}

impl MonitorMode {
    /// Silent wins over graph. A bar needs a known total, so graph without one falls back to
    /// the standard line. `width` is only probed when the graph is actually used.
    pub fn select(
        silent: bool,
        graph: bool,
        total_size: u64,
        width: impl FnOnce() -> usize,
    ) -> Self {
        if silent {
            return MonitorMode::Silent;
        }
        if graph {
            if total_size > 0 {
                return MonitorMode::Graph { width: width() };
            }
            tracing::info!("graph mode needs a known input size, showing standard progress");
        }
        MonitorMode::Standard
    }

    /// Decide which sink the mode keeps for the run.
    pub fn init(&self, sink: Option<DisplaySink>) -> Option<DisplaySink> {
        match self {
            MonitorMode::Silent => None,
            MonitorMode::Standard | MonitorMode::Graph { .. } => {
                if sink.is_none() {
                    tracing::warn!("no progress display available, continuing without one");
                }
                sink
            }
        }
    }

    pub fn render(&self, snapshot: &Snapshot, timestamp: &str) -> Option<String> {
        match self {
            MonitorMode::Silent => None,
            MonitorMode::Standard => Some(crate::progress::render_standard(snapshot, timestamp)),
            MonitorMode::Graph { width } => {
                Some(crate::progress::render_graph(snapshot, timestamp, *width))
            }
        }
    }

    pub fn teardown(&self) -> Option<&'static str> {
        match self {
            MonitorMode::Silent => None,
            MonitorMode::Standard | MonitorMode::Graph { .. } => Some("\n"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum MonitorEvent {
    /// Draw the given state
    Progress(Snapshot),
    /// Echo transferred bytes verbatim
    Data(Bytes),
}

pub struct Monitor {
    mode: MonitorMode,
    sink: Option<DisplaySink>,
    events: mpsc::Receiver<MonitorEvent>,
    cancel: CancellationToken,
}

impl Monitor {
    pub fn new(
        mode: MonitorMode,
        sink: Option<DisplaySink>,
        cancel: CancellationToken,
    ) -> (Self, mpsc::Sender<MonitorEvent>) {
        let (sender, events) = mpsc::channel(EVENT_QUEUE);
        (
            Self {
                mode,
                sink,
                events,
                cancel,
            },
            sender,
        )
    }

    // display problems never reach the data path, the display is just dropped
    async fn emit(&mut self, bytes: &[u8]) {
        let Some(sink) = self.sink.as_mut() else {
            return;
        };
        let res = match sink.write_all(bytes).await {
            Ok(()) => sink.flush().await,
            Err(error) => Err(error),
        };
        if let Err(error) = res {
            tracing::warn!("progress display failed, disabling it: {}", error);
            self.sink = None;
        }
    }

    /// Handle events until cancelled, then finish the display.
    ///
    /// Events already queued when cancellation fires are still handled, so the final render
    /// requested at end of stream is always drawn.
    pub async fn run(mut self) {
        self.sink = self.mode.init(self.sink.take());
        tracing::debug!("monitor started in {:?} mode", self.mode);
        let mut renders = 0u64;
        while let Some(event) = tokio::select! {
            biased;
            event = self.events.recv() => event,
            _ = self.cancel.cancelled() => None,
        } {
            match event {
                MonitorEvent::Progress(snapshot) => {
                    let timestamp = crate::progress::local_timestamp();
                    if let Some(line) = self.mode.render(&snapshot, &timestamp) {
                        self.emit(line.as_bytes()).await;
                        renders += 1;
                    }
                }
                MonitorEvent::Data(chunk) => self.emit(&chunk).await,
            }
        }
        if let Some(tail) = self.mode.teardown() {
            self.emit(tail.as_bytes()).await;
        }
        tracing::debug!("monitor done after {} renders", renders);
    }
}
