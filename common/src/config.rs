//! Configuration types for runtime and execution settings

/// Runtime configuration for tokio
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeConfig {
    /// Number of worker threads (0 = number of CPU cores)
    pub max_workers: usize,
}

/// Output and logging configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputConfig {
    /// Suppress error output
    pub quiet: bool,
    /// Verbosity level: 0=ERROR, 1=INFO, 2=DEBUG, 3=TRACE
    pub verbose: u8,
    /// Print summary statistics at the end
    pub print_summary: bool,
}

/// Options for a single pipe run, fixed once the pipe starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipeOptions {
    /// Target rate in bytes per second (0 = unlimited)
    pub target_rate: u64,
    /// Device receiving the progress display
    pub tty: std::path::PathBuf,
    /// No progress display at all
    pub silent: bool,
    /// Draw a bar graph next to the progress line
    pub graph: bool,
    /// Copy every transferred chunk to the display device
    pub show_data: bool,
}

impl Default for PipeOptions {
    fn default() -> Self {
        Self {
            target_rate: 0,
            tty: std::path::PathBuf::from(crate::tty::DEFAULT_DEVICE),
            silent: false,
            graph: false,
            show_data: false,
        }
    }
}
