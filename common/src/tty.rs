//! Terminal helpers for the progress display

use anyhow::Context;
use std::io::IsTerminal;
use std::os::fd::AsRawFd;

pub const DEFAULT_DEVICE: &str = "/dev/tty";

const FALLBACK_COLUMNS: usize = 80;

/// Display devices always live under `/dev`: `pts/3`, `tty1` or `/dev/tty1` all map to
/// `/dev/<last component>`.
pub fn device_path(name: &str) -> std::path::PathBuf {
    let trimmed = name.trim_end_matches('/');
    match trimmed.rsplit('/').next() {
        Some(base) if !base.is_empty() => std::path::Path::new("/dev").join(base),
        _ => std::path::PathBuf::from("/dev/."),
    }
}

pub async fn open_display(path: &std::path::Path) -> anyhow::Result<tokio::fs::File> {
    tokio::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .await
        .with_context(|| format!("File Open Error device:{}", path.display()))
}

fn columns_of(fd: std::os::fd::RawFd) -> Option<usize> {
    let mut size = libc::winsize {
        ws_row: 0,
        ws_col: 0,
        ws_xpixel: 0,
        ws_ypixel: 0,
    };
    // SAFETY: TIOCGWINSZ only writes into the winsize struct we pass in
    let rc = unsafe { libc::ioctl(fd, libc::TIOCGWINSZ, &mut size as *mut libc::winsize) };
    if rc == -1 || size.ws_col == 0 {
        return None;
    }
    Some(usize::from(size.ws_col))
}

/// Terminal columns, probed on stdin then stderr.
pub fn terminal_width() -> usize {
    let stdin = std::io::stdin();
    let stderr = std::io::stderr();
    columns_of(stdin.as_raw_fd())
        .or_else(|| columns_of(stderr.as_raw_fd()))
        .unwrap_or_else(|| {
            tracing::debug!(
                "could not probe terminal width, assuming {} columns",
                FALLBACK_COLUMNS
            );
            FALLBACK_COLUMNS
        })
}

/// Width of the graph bar: half the terminal.
pub fn graph_width() -> usize {
    terminal_width() / 2
}

pub fn stdin_is_terminal() -> bool {
    std::io::stdin().is_terminal()
}
