use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Largest block handed downstream in one piece.
pub const CHUNK_SIZE: usize = 4096;

#[derive(Debug)]
pub enum ReaderEvent {
    Chunk(Bytes),
    /// Source exhausted, every chunk was already acknowledged
    End,
    /// Read failed; the reader has stopped
    Failed(std::io::Error),
}

/// Pull chunks from `input` until end of source, error or cancellation.
///
/// After each chunk the reader blocks on `gate` until the consumer opens it, so at most one
/// chunk is ever in flight.
#[tracing::instrument(skip_all)]
pub async fn read<R>(
    mut input: R,
    events: mpsc::Sender<ReaderEvent>,
    gate: std::sync::Arc<throttle::Gate>,
    cancel: CancellationToken,
) where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut chunks = 0u64;
    loop {
        let res = tokio::select! {
            res = input.read(&mut buf) => res,
            _ = cancel.cancelled() => {
                tracing::debug!("reader cancelled after {} chunks", chunks);
                return;
            }
        };
        let event = match res {
            Ok(0) => {
                tracing::debug!("end of input after {} chunks", chunks);
                // consumer may already be gone on shutdown
                let _ = events.send(ReaderEvent::End).await;
                return;
            }
            Ok(n) => ReaderEvent::Chunk(Bytes::copy_from_slice(&buf[..n])),
            Err(error) => {
                tracing::debug!("read failed after {} chunks: {}", chunks, error);
                let _ = events.send(ReaderEvent::Failed(error)).await;
                return;
            }
        };
        if events.send(event).await.is_err() {
            return;
        }
        chunks += 1;
        tokio::select! {
            res = gate.pass() => {
                if res.is_err() {
                    return;
                }
            }
            _ = cancel.cancelled() => {
                tracing::debug!("reader cancelled while waiting on chunk {}", chunks);
                return;
            }
        }
    }
}
