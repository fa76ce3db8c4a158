//! Shared pieces of the vpipe throttled pipe
//!
//! A run is made of four concurrent parts talking only through channels:
//!
//! - the **reader** ([`reader`]) pulls 4 KiB chunks from the input and waits after each one
//!   until it is told to continue
//! - the **speed keeper** (the `throttle` crate) owns the byte counter and computes how long to
//!   pause to stay at the target rate
//! - the **monitor** ([`monitor`]) draws a progress line or bar, and can echo the data itself,
//!   on a display device separate from the output
//! - the **orchestrator** ([`pipe::limited_pipe`]) moves chunks from the reader to the output,
//!   feeds the keeper, waits out the throttle delay and drives the monitor every 50 ms
//!
//! ```rust,no_run
//! use common::{MonitorMode, PipeSettings};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let settings = PipeSettings {
//!     target_rate: common::prefix::parse_binary_prefix("512K")?,
//!     total_size: 0,
//!     mode: MonitorMode::Standard,
//!     echo: false,
//! };
//! let display = common::tty::open_display(std::path::Path::new("/dev/tty")).await?;
//! let summary = common::limited_pipe(
//!     tokio::io::stdin(),
//!     &mut tokio::io::stdout(),
//!     &settings,
//!     Some(Box::new(display)),
//!     &tokio_util::sync::CancellationToken::new(),
//! )
//! .await?;
//! println!("{summary}");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod monitor;
pub mod pipe;
pub mod prefix;
pub mod progress;
pub mod reader;
pub mod tty;

#[cfg(test)]
mod testutils;

pub use config::{OutputConfig, PipeOptions, RuntimeConfig};
pub use error::Error;
pub use monitor::{DisplaySink, MonitorMode};
pub use pipe::{PipeSettings, Summary, limited_pipe};

fn init_logging(output: &OutputConfig) {
    let level = if output.quiet {
        "off"
    } else {
        match output.verbose {
            0 => "error",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    // a subscriber may already be installed (e.g. in tests)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Set up logging and the tokio runtime, then run `func` to completion.
///
/// `func` receives a cancellation token that is triggered on Ctrl-C. Errors are logged (unless
/// quiet) and returned so the caller can pick the exit status.
pub fn run<Fut, T>(
    output: OutputConfig,
    runtime: RuntimeConfig,
    func: impl FnOnce(tokio_util::sync::CancellationToken) -> Fut,
) -> Result<T, Error>
where
    Fut: std::future::Future<Output = Result<T, Error>>,
    T: std::fmt::Display,
{
    init_logging(&output);
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if runtime.max_workers > 0 {
        builder.worker_threads(runtime.max_workers);
    }
    let runtime = builder.build().map_err(|error| {
        Error::Setup(anyhow::Error::from(error).context("failed to start runtime"))
    })?;
    let cancel = tokio_util::sync::CancellationToken::new();
    let res = runtime.block_on(async {
        let interrupt = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("received interrupt, stopping transfer");
                    cancel.cancel();
                }
            })
        };
        let res = func(cancel).await;
        interrupt.abort();
        res
    });
    // a blocking stdin read must not hold up exit, every pipe task has already finished
    runtime.shutdown_background();
    match &res {
        Ok(summary) => {
            if output.print_summary {
                eprintln!("{summary}");
            }
        }
        Err(error) => {
            tracing::error!("{:#}", error);
            if output.print_summary {
                match error {
                    Error::Transfer(failure) => eprintln!("{}", failure.summary),
                    Error::Interrupted(summary) => eprintln!("{summary}"),
                    _ => {}
                }
            }
        }
    }
    res
}
