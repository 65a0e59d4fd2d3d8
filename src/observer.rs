//! Observer cursors over a live stream.
//!
//! An [`Observer`] is one consumer's view of the stream, bounded by the byte
//! range it asked for. It pulls chunks with [`next_chunk`], copies itself to
//! an async sink with [`write_to`], or turns into a chunk stream with
//! [`into_stream`] for use as an HTTP response body.
//!
//! [`next_chunk`]: Observer::next_chunk
//! [`write_to`]: Observer::write_to
//! [`into_stream`]: Observer::into_stream

use std::sync::Arc;

use bytes::Bytes;
use futures::Stream;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;

use crate::error::Result;
use crate::range::{ByteRange, Stop};
use crate::stream::{Shared, StreamState};

/// A cursor over `[start, stop)` of a stream.
///
/// The cursor's position only moves forward, and bytes come out in strict
/// offset order with no gaps or duplicates. When the cursor has caught up
/// with the producer on a still-open stream it waits; it completes once its
/// bounded stop is reached, or once the stream has closed and every
/// remaining committed byte has been delivered.
///
/// Dropping an observer deregisters it from the stream, whichever way the
/// consumer went away.
pub struct Observer {
    shared: Arc<Shared>,
    state_rx: watch::Receiver<StreamState>,
    id: u64,
    position: u64,
    stop: Stop,
}

impl Observer {
    pub(crate) fn new(
        shared: Arc<Shared>,
        state_rx: watch::Receiver<StreamState>,
        id: u64,
        range: ByteRange,
    ) -> Self {
        Self {
            shared,
            state_rx,
            id,
            position: range.start,
            stop: range.stop,
        }
    }

    /// The next offset this observer will deliver.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Returns the next chunk in range, waiting for the producer if the
    /// cursor has caught up on an open stream.
    ///
    /// Returns `Ok(None)` exactly once, when the cursor is complete.
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        loop {
            // Mark the current state seen before inspecting it, so an
            // append between the check and the wait still wakes us.
            let state = *self.state_rx.borrow_and_update();

            let readable = match self.stop {
                Stop::Bounded(stop) => state.length.min(stop),
                Stop::Open => state.length,
            };
            if self.position < readable {
                let chunk = self
                    .shared
                    .buffer
                    .read_at(self.position, (readable - self.position) as usize);
                self.position += chunk.len() as u64;
                return Ok(Some(chunk));
            }

            let complete = match self.stop {
                Stop::Bounded(stop) => self.position >= stop || state.closed,
                Stop::Open => state.closed,
            };
            if complete {
                return Ok(None);
            }

            if self.state_rx.changed().await.is_err() {
                // Sender gone means no producer can ever append again.
                return Ok(None);
            }
        }
    }

    /// Copies the observer's slice of the stream to `sink`.
    ///
    /// Bytes are flushed after every chunk so live tails reach the consumer
    /// promptly. A sink failure surfaces as [`Error::Sink`] and stops
    /// delivery; the stream and other observers are unaffected. Returns the
    /// total number of bytes delivered.
    ///
    /// [`Error::Sink`]: crate::Error::Sink
    pub async fn write_to<W>(&mut self, sink: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let mut delivered = 0u64;
        while let Some(chunk) = self.next_chunk().await? {
            sink.write_all(&chunk).await?;
            sink.flush().await?;
            delivered += chunk.len() as u64;
        }
        Ok(delivered)
    }

    /// Converts the observer into a stream of chunks.
    ///
    /// Dropping the returned stream deregisters the observer, which is what
    /// ties response-body teardown to cleanup when the consumer disconnects.
    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes>> + Send + 'static {
        futures::stream::try_unfold(self, |mut observer| async move {
            Ok(observer.next_chunk().await?.map(|chunk| (chunk, observer)))
        })
    }
}

impl Drop for Observer {
    fn drop(&mut self) {
        self.shared.deregister(self.id);
    }
}
