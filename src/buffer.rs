//! Append-only backing buffer for a stream.
//!
//! [`ChunkBuffer`] holds every byte the producer has written, addressable by
//! absolute offset. Chunks are kept as the [`Bytes`] segments the producer
//! delivered, so appends and reads are zero-copy: a read returns a slice of
//! one retained segment.
//!
//! The buffer is unbounded. The relay is built to run one job per process,
//! and process termination is the eviction mechanism; a reader that lags
//! costs memory, never producer stalls.

use std::sync::RwLock;

use bytes::Bytes;

/// A producer chunk and the absolute offset of its first byte.
struct Segment {
    start: u64,
    data: Bytes,
}

/// Append-only byte log addressable by absolute offset.
///
/// All methods take `&self`; interior locking makes the buffer safe to share
/// between the ingest task and any number of observers. Bytes at a given
/// offset never change once written.
pub struct ChunkBuffer {
    segments: RwLock<Vec<Segment>>,
}

impl ChunkBuffer {
    pub fn new() -> Self {
        Self {
            segments: RwLock::new(Vec::new()),
        }
    }

    /// Appends a chunk and returns the new total length.
    ///
    /// The chunk is visible to `read_at` as soon as this returns; callers
    /// publish the new length to waiting observers afterwards.
    pub fn append(&self, data: Bytes) -> u64 {
        let mut segments = self.segments.write().expect("buffer lock poisoned");
        let start = next_offset(&segments);
        let end = start + data.len() as u64;
        if !data.is_empty() {
            segments.push(Segment { start, data });
        }
        end
    }

    /// Total bytes appended so far.
    pub fn len(&self) -> u64 {
        let segments = self.segments.read().expect("buffer lock poisoned");
        next_offset(&segments)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads up to `max_len` bytes starting at `offset`.
    ///
    /// Returns a zero-copy slice of the single segment containing `offset`,
    /// so the result may be shorter than `max_len` even when more bytes
    /// exist (callers loop). Returns an empty `Bytes` at or past the end.
    pub fn read_at(&self, offset: u64, max_len: usize) -> Bytes {
        let segments = self.segments.read().expect("buffer lock poisoned");
        if max_len == 0 || offset >= next_offset(&segments) {
            return Bytes::new();
        }

        // Index of the segment containing `offset`: the last one starting
        // at or before it.
        let idx = segments.partition_point(|seg| seg.start <= offset) - 1;
        let seg = &segments[idx];
        let skip = (offset - seg.start) as usize;
        let take = max_len.min(seg.data.len() - skip);
        seg.data.slice(skip..skip + take)
    }
}

impl Default for ChunkBuffer {
    fn default() -> Self {
        Self::new()
    }
}

fn next_offset(segments: &[Segment]) -> u64 {
    segments
        .last()
        .map(|seg| seg.start + seg.data.len() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer_with(chunks: &[&[u8]]) -> ChunkBuffer {
        let buffer = ChunkBuffer::new();
        for chunk in chunks {
            buffer.append(Bytes::copy_from_slice(chunk));
        }
        buffer
    }

    #[test]
    fn should_start_empty() {
        let buffer = ChunkBuffer::new();

        assert!(buffer.is_empty());
        assert_eq!(buffer.len(), 0);
        assert_eq!(buffer.read_at(0, 16), Bytes::new());
    }

    #[test]
    fn should_track_length_across_appends() {
        // given
        let buffer = ChunkBuffer::new();

        // when
        let after_first = buffer.append(Bytes::from_static(b"abc"));
        let after_second = buffer.append(Bytes::from_static(b"defgh"));

        // then
        assert_eq!(after_first, 3);
        assert_eq!(after_second, 8);
        assert_eq!(buffer.len(), 8);
    }

    #[test]
    fn should_read_within_a_segment() {
        // given
        let buffer = buffer_with(&[b"0123456789"]);

        // when
        let read = buffer.read_at(3, 4);

        // then
        assert_eq!(read, Bytes::from_static(b"3456"));
    }

    #[test]
    fn should_read_across_segment_boundaries_in_pieces() {
        // given - "abc" at [0,3), "defgh" at [3,8)
        let buffer = buffer_with(&[b"abc", b"defgh"]);

        // when - a read spanning the boundary stops at it
        let first = buffer.read_at(1, 10);
        let second = buffer.read_at(1 + first.len() as u64, 10);

        // then - looping yields the full contents
        assert_eq!(first, Bytes::from_static(b"bc"));
        assert_eq!(second, Bytes::from_static(b"defgh"));
    }

    #[test]
    fn should_respect_max_len() {
        let buffer = buffer_with(&[b"0123456789"]);

        assert_eq!(buffer.read_at(0, 4), Bytes::from_static(b"0123"));
    }

    #[test]
    fn should_return_empty_read_past_the_end() {
        let buffer = buffer_with(&[b"abc"]);

        assert_eq!(buffer.read_at(3, 8), Bytes::new());
        assert_eq!(buffer.read_at(100, 8), Bytes::new());
    }

    #[test]
    fn should_ignore_empty_appends() {
        // given
        let buffer = buffer_with(&[b"abc"]);

        // when
        let len = buffer.append(Bytes::new());

        // then
        assert_eq!(len, 3);
        assert_eq!(buffer.read_at(0, 8), Bytes::from_static(b"abc"));
    }

    #[test]
    fn should_keep_committed_bytes_stable() {
        // given
        let buffer = buffer_with(&[b"stable"]);
        let before = buffer.read_at(0, 6);

        // when - more data arrives
        buffer.append(Bytes::from_static(b" and more"));

        // then - earlier offsets still read the same bytes
        assert_eq!(buffer.read_at(0, 6), before);
    }
}
