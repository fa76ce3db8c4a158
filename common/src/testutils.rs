use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Cloneable in-memory sink; every clone appends to the same buffer.
#[derive(Clone, Debug, Default)]
pub struct SharedBuffer {
    data: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> Vec<u8> {
        self.data.lock().unwrap().clone()
    }

    pub fn contents_string(&self) -> String {
        String::from_utf8_lossy(&self.contents()).into_owned()
    }
}

impl AsyncWrite for SharedBuffer {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        self.data.lock().unwrap().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Returns its data on the first read and an error on the next one.
pub struct FailingReader {
    data: Option<Vec<u8>>,
}

impl FailingReader {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data: Some(data) }
    }
}

impl AsyncRead for FailingReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.data.take() {
            Some(data) => {
                buf.put_slice(&data);
                Poll::Ready(Ok(()))
            }
            None => Poll::Ready(Err(std::io::Error::other("injected read failure"))),
        }
    }
}

/// Sink whose writes always fail.
pub struct FailingWriter;

impl AsyncWrite for FailingWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Poll::Ready(Err(std::io::Error::other("injected write failure")))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Counts chunks read on one side and chunks written on the other.
#[derive(Debug, Default)]
pub struct HandoffProbe {
    reads: AtomicU64,
    writes: AtomicU64,
    max_in_flight: AtomicU64,
}

impl HandoffProbe {
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Largest number of chunks read but not yet written, seen at any write.
    pub fn max_in_flight(&self) -> u64 {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

/// Serves `data` in reads of at most `step` bytes, recording each on the probe.
pub struct ProbeReader {
    data: Vec<u8>,
    pos: usize,
    step: usize,
    probe: Arc<HandoffProbe>,
}

impl ProbeReader {
    pub fn new(data: Vec<u8>, step: usize, probe: Arc<HandoffProbe>) -> Self {
        Self {
            data,
            pos: 0,
            step,
            probe,
        }
    }
}

impl AsyncRead for ProbeReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let end = std::cmp::min(self.data.len(), self.pos + self.step);
        let n = std::cmp::min(end - self.pos, buf.remaining());
        if n > 0 {
            let pos = self.pos;
            buf.put_slice(&self.data[pos..pos + n]);
            self.pos += n;
            self.probe.reads.fetch_add(1, Ordering::SeqCst);
        }
        Poll::Ready(Ok(()))
    }
}

/// Sink that checks how far the reader got ahead before each write.
pub struct ProbeWriter {
    out: Vec<u8>,
    probe: Arc<HandoffProbe>,
}

impl ProbeWriter {
    pub fn new(probe: Arc<HandoffProbe>) -> Self {
        Self {
            out: Vec::new(),
            probe,
        }
    }

    pub fn contents(&self) -> &[u8] {
        &self.out
    }
}

impl AsyncWrite for ProbeWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        let in_flight = self.probe.reads() - self.probe.writes();
        self.probe
            .max_in_flight
            .fetch_max(in_flight, Ordering::SeqCst);
        self.probe.writes.fetch_add(1, Ordering::SeqCst);
        self.out.extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Repeat `text` until at least `len` bytes.
pub fn repeated(text: &str, len: usize) -> Vec<u8> {
    text.as_bytes().iter().copied().cycle().take(len).collect()
}
