use anyhow::Context;
use clap::Parser;
use common::{Error, MonitorMode, PipeOptions, PipeSettings, Summary, tty};
use tokio::io::AsyncRead;
use tracing::instrument;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "vpipe",
    version,
    about = "Copy a file or stdin to stdout at a capped rate, showing progress on a terminal",
    long_about = "`vpipe` copies its input to stdout, holding the average rate at or below a target and
drawing progress on a terminal device so the data stream itself stays clean.

EXAMPLE:
    # Send a disk image over the network at 10 MiB/s with a progress bar
    vpipe -b 10M -g disk.img | nc backup-host 9000

    # Throttle a stream and watch it on another terminal
    producer | vpipe -b 512K -t pts/3 | consumer"
)]
struct Args {
    // Transfer
    /// Target rate in bytes per second, e.g. 512K, 10M, 1GiB (unlimited if not given)
    #[arg(
        short = 'b',
        long = "bandwidth",
        value_name = "SIZE",
        help_heading = "Transfer"
    )]
    bandwidth: Option<String>,

    // Progress & output
    /// Terminal device for the progress display, always resolved under /dev
    #[arg(
        short = 't',
        long = "tty",
        default_value = tty::DEFAULT_DEVICE,
        value_name = "DEVICE",
        help_heading = "Progress & output"
    )]
    tty: String,

    /// No progress display
    #[arg(short = 's', long = "silent", help_heading = "Progress & output")]
    silent: bool,

    /// Add a bar graph to the progress line (needs a file input of known size)
    #[arg(short = 'g', long = "graph", help_heading = "Progress & output")]
    graph: bool,

    /// Copy the transferred data to the progress terminal as well
    #[arg(short = 'a', long = "show-data", help_heading = "Progress & output")]
    show_data: bool,

    /// Debug logging, same as -vv
    #[arg(short = 'd', long = "debug", help_heading = "Progress & output")]
    debug: bool,

    /// Verbose level: -v INFO / -vv DEBUG / -vvv TRACE (default: ERROR)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, help_heading = "Progress & output")]
    verbose: u8,

    /// Print summary at the end
    #[arg(long, help_heading = "Progress & output")]
    summary: bool,

    /// Quiet mode, don't report errors
    #[arg(short = 'q', long = "quiet", help_heading = "Progress & output")]
    quiet: bool,

    // Advanced settings
    /// Number of worker threads, 0 means number of cores
    #[arg(
        long,
        default_value = "0",
        value_name = "N",
        help_heading = "Advanced settings"
    )]
    max_workers: usize,

    // ARGUMENTS
    /// File to read, standard input when omitted
    #[arg()]
    files: Vec<std::path::PathBuf>,
}

impl Args {
    fn pipe_options(&self) -> Result<(PipeOptions, Option<std::path::PathBuf>), Error> {
        let target_rate = match self.bandwidth.as_deref() {
            None | Some("") => 0,
            Some(text) => match text.parse::<common::prefix::BinarySize>() {
                Ok(size) => size.0,
                Err(error) => {
                    return Err(Error::Parameter(format!("(bandwidth:{text}) {error:#}")));
                }
            },
        };
        if self.files.len() > 1 {
            return Err(Error::Parameter(format!(
                "expected at most one file, got {}",
                self.files.len()
            )));
        }
        let options = PipeOptions {
            target_rate,
            tty: tty::device_path(&self.tty),
            silent: self.silent,
            graph: self.graph,
            show_data: self.show_data,
        };
        Ok((options, self.files.first().cloned()))
    }

    fn verbosity(&self) -> u8 {
        if self.debug {
            self.verbose.max(2)
        } else {
            self.verbose
        }
    }
}

type Input = Box<dyn AsyncRead + Send + Unpin>;

async fn open_input(path: &std::path::Path) -> anyhow::Result<(Input, u64)> {
    let path = std::path::absolute(path)
        .with_context(|| format!("File Open Error: {}", path.display()))?;
    let metadata = tokio::fs::metadata(&path)
        .await
        .with_context(|| format!("File Open Error: {}", path.display()))?;
    let file = tokio::fs::File::open(&path)
        .await
        .with_context(|| format!("File Open Error: {}", path.display()))?;
    tracing::debug!("reading {} ({} bytes)", path.display(), metadata.len());
    Ok((Box::new(file), metadata.len()))
}

#[instrument(skip(cancel))]
async fn async_main(
    options: PipeOptions,
    file: Option<std::path::PathBuf>,
    cancel: tokio_util::sync::CancellationToken,
) -> Result<Summary, Error> {
    let (input, total_size) = match file {
        Some(path) => open_input(&path).await.map_err(Error::Setup)?,
        None => {
            if tty::stdin_is_terminal() {
                return Err(Error::AmbiguousInput);
            }
            let stdin: Input = Box::new(tokio::io::stdin());
            (stdin, 0)
        }
    };
    let mode = MonitorMode::select(options.silent, options.graph, total_size, tty::graph_width);
    let display: Option<common::DisplaySink> = if mode == MonitorMode::Silent {
        None
    } else {
        match tty::open_display(&options.tty).await {
            Ok(device) => Some(Box::new(device)),
            Err(error) => {
                // progress is optional, the data still flows
                tracing::error!("{:#}", error);
                None
            }
        }
    };
    let settings = PipeSettings {
        target_rate: options.target_rate,
        total_size,
        mode,
        echo: options.show_data,
    };
    let mut stdout = tokio::io::stdout();
    let pipe = common::limited_pipe(input, &mut stdout, &settings, display, &cancel);
    let summary = pipe.await?;
    if summary.interrupted {
        return Err(Error::Interrupted(summary));
    }
    Ok(summary)
}

fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(error) => {
            let code = match error.kind() {
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => 0,
                _ => 9,
            };
            let _ = error.print();
            std::process::exit(code);
        }
    };
    let (options, file) = match args.pipe_options() {
        Ok(parsed) => parsed,
        Err(error) => {
            if !args.quiet {
                eprintln!("{error}");
            }
            std::process::exit(error.exit_code());
        }
    };
    let output = common::OutputConfig {
        quiet: args.quiet,
        verbose: args.verbosity(),
        print_summary: args.summary,
    };
    let runtime = common::RuntimeConfig {
        max_workers: args.max_workers,
    };
    if let Err(error) = common::run(output, runtime, |cancel| async_main(options, file, cancel)) {
        std::process::exit(error.exit_code());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("vpipe").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn defaults() {
        let (options, file) = parse(&[]).pipe_options().unwrap();
        assert_eq!(options, PipeOptions::default());
        assert!(file.is_none());
    }

    #[test]
    fn bandwidth_and_device() {
        let (options, file) = parse(&["-b", "10KiB", "-t", "pts/3", "-g", "-a", "data.bin"])
            .pipe_options()
            .unwrap();
        assert_eq!(options.target_rate, 10240);
        assert_eq!(options.tty, std::path::PathBuf::from("/dev/3"));
        assert!(options.graph);
        assert!(options.show_data);
        assert_eq!(file, Some(std::path::PathBuf::from("data.bin")));
    }

    #[test]
    fn empty_bandwidth_is_unlimited() {
        let (options, _) = parse(&["-b", ""]).pipe_options().unwrap();
        assert_eq!(options.target_rate, 0);
    }

    #[test]
    fn bad_bandwidth_is_parameter_error() {
        let error = parse(&["-b", "fast"]).pipe_options().unwrap_err();
        assert!(matches!(error, Error::Parameter(_)));
        assert!(error.to_string().contains("bandwidth:fast"));
        assert_eq!(error.exit_code(), 9);
    }

    #[test]
    fn two_files_rejected() {
        let error = parse(&["a", "b"]).pipe_options().unwrap_err();
        assert_eq!(error.exit_code(), 9);
    }

    #[test]
    fn debug_raises_verbosity() {
        assert_eq!(parse(&["-d"]).verbosity(), 2);
        assert_eq!(parse(&["-d", "-vvv"]).verbosity(), 3);
        assert_eq!(parse(&["-v"]).verbosity(), 1);
    }
}
