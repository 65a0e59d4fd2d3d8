//! The live stream: single-producer ingestion with many-reader fan-out.
//!
//! A [`LogStream`] is built from a producer source (normally an upload
//! request body) and drives it to completion with [`consume`]. Readers come
//! from the other side: a cheap, clonable [`StreamReader`] hands out
//! [`Observer`] cursors that each walk their own byte range of the shared
//! buffer, blocking while they are caught up and waking when the producer
//! appends or closes.
//!
//! Progress is published through a `tokio::sync::watch` channel carrying the
//! committed [`StreamState`]. A watch channel is a broadcast watermark, not
//! a queue: every observer rechecks the state after each wakeup, so slow
//! observers never block the producer and wakeups cannot be lost.
//!
//! [`consume`]: LogStream::consume

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::sync::watch;

use crate::buffer::ChunkBuffer;
use crate::error::{Error, Result};
use crate::observer::Observer;
use crate::range::ByteRange;

/// Committed stream progress, broadcast to observers on every change.
///
/// `length` only grows, and once `closed` is true it never changes again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamState {
    /// Bytes committed to the backing buffer so far.
    pub length: u64,
    /// Whether ingestion has terminated (end of stream or producer error).
    pub closed: bool,
}

/// State shared between the ingest side and all readers.
pub(crate) struct Shared {
    pub(crate) buffer: ChunkBuffer,
    state_tx: watch::Sender<StreamState>,
    observers: Mutex<HashSet<u64>>,
    next_observer_id: AtomicU64,
}

impl Shared {
    fn new() -> Self {
        Self {
            buffer: ChunkBuffer::new(),
            state_tx: watch::channel(StreamState {
                length: 0,
                closed: false,
            })
            .0,
            observers: Mutex::new(HashSet::new()),
            next_observer_id: AtomicU64::new(0),
        }
    }

    pub(crate) fn state(&self) -> StreamState {
        *self.state_tx.borrow()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<StreamState> {
        self.state_tx.subscribe()
    }

    /// Commits a chunk and wakes observers. The buffer write completes
    /// before the watch send, so any observer that sees the new length can
    /// read every byte below it.
    fn append(&self, chunk: Bytes) {
        let length = self.buffer.append(chunk);
        self.state_tx.send_modify(|state| state.length = length);
    }

    /// Transitions to closed. Idempotent; fires the notifier only on the
    /// first call.
    fn close(&self) {
        self.state_tx.send_if_modified(|state| {
            if state.closed {
                false
            } else {
                state.closed = true;
                true
            }
        });
    }

    pub(crate) fn deregister(&self, id: u64) {
        self.observers.lock().expect("observer lock poisoned").remove(&id);
    }

    fn register(&self) -> u64 {
        let id = self.next_observer_id.fetch_add(1, Ordering::Relaxed);
        self.observers.lock().expect("observer lock poisoned").insert(id);
        id
    }

    fn observer_count(&self) -> usize {
        self.observers.lock().expect("observer lock poisoned").len()
    }
}

/// A live byte stream fed by a single producer source.
///
/// `LogStream` owns the producer side. Call [`reader`](Self::reader) to get
/// the shared read handle before handing the stream to [`consume`], which
/// takes ownership and runs ingestion to completion.
///
/// Dropping a `LogStream` whose `consume` never finished closes the stream,
/// so observers are never left waiting on a producer that went away.
pub struct LogStream<S> {
    source: S,
    shared: Arc<Shared>,
}

impl<S, E> LogStream<S>
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Unpin,
    E: std::fmt::Display,
{
    /// Prepares a stream for the given producer source.
    ///
    /// The in-memory buffer cannot fail to prepare, but callers must treat
    /// failure as possible and report it without serving observers.
    pub fn open(source: S) -> Result<Self> {
        Ok(Self {
            source,
            shared: Arc::new(Shared::new()),
        })
    }

    /// A clonable read-only handle onto this stream.
    pub fn reader(&self) -> StreamReader {
        StreamReader {
            shared: self.shared.clone(),
        }
    }

    /// Drives ingestion until the producer source ends.
    ///
    /// Each chunk is committed to the buffer and broadcast to observers.
    /// On end of stream the stream closes and the total byte count is
    /// returned; on a producer error the stream closes all the same and the
    /// error is returned to the driver. Observers cannot tell the two
    /// closures apart.
    pub async fn consume(mut self) -> Result<u64> {
        let mut total = 0u64;
        while let Some(chunk) = self.source.next().await {
            match chunk {
                Ok(chunk) => {
                    if chunk.is_empty() {
                        continue;
                    }
                    total += chunk.len() as u64;
                    self.shared.append(chunk);
                }
                Err(err) => {
                    self.shared.close();
                    return Err(Error::Producer(err.to_string()));
                }
            }
        }
        self.shared.close();
        Ok(total)
    }
}

impl<S> Drop for LogStream<S> {
    fn drop(&mut self) {
        // Reached early only if consume was dropped mid-flight (producer
        // connection torn down); observers then drain what was buffered.
        self.shared.close();
    }
}

/// Read-only handle onto a [`LogStream`].
///
/// Clonable and shareable across tasks; all methods take `&self`.
#[derive(Clone)]
pub struct StreamReader {
    shared: Arc<Shared>,
}

impl StreamReader {
    /// Registers a new observer over `range`.
    ///
    /// Callable at any point in the stream's life, concurrently with
    /// ingestion and with other observers. Each call yields a cursor with
    /// its own identity; duplicate ranges are legal.
    pub fn observe(&self, range: ByteRange) -> Observer {
        let id = self.shared.register();
        Observer::new(self.shared.clone(), self.shared.subscribe(), id, range)
    }

    /// Deregisters an observer.
    ///
    /// Observers also deregister themselves on drop, so this is a no-op
    /// wrapper kept for symmetry with [`observe`](Self::observe).
    pub fn unobserve(&self, observer: Observer) {
        drop(observer);
    }

    /// Snapshot of the committed stream state.
    pub fn state(&self) -> StreamState {
        self.shared.state()
    }

    /// Number of currently registered observers.
    pub fn observer_count(&self) -> usize {
        self.shared.observer_count()
    }
}
