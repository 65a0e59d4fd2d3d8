//! Byte-range parsing for consumer requests.
//!
//! Consumers may ask for a slice of the stream with a standard `Range`
//! header. Only a single `bytes=` range is accepted, and because the stream
//! may still be growing when the request arrives, suffix ranges (`bytes=-n`,
//! "the last n bytes") cannot be resolved and are rejected outright.

/// The exclusive upper bound of a byte range.
///
/// `Open` means "until the stream closes": the effective stop is whatever
/// the stream's final length turns out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stop {
    /// Read up to (but not including) this absolute offset.
    Bounded(u64),
    /// Tail the stream until it closes.
    Open,
}

/// A parsed byte range: start offset plus an optional exclusive stop.
///
/// A missing `Range` header parses to the whole stream, `(0, Open)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub stop: Stop,
}

impl ByteRange {
    /// The whole stream: start at zero, tail until close.
    pub const fn whole() -> Self {
        Self {
            start: 0,
            stop: Stop::Open,
        }
    }

    /// Parses a `Range` header value, `None` meaning the header was absent.
    ///
    /// Accepted forms:
    /// - `bytes=a-b` → `[a, b+1)`, rejected when `a > b`
    /// - `bytes=a-` → `[a, open)`
    ///
    /// Everything else (suffix ranges, multiple ranges, non-`bytes` units,
    /// non-decimal offsets) is a [`RangeError`].
    pub fn parse(header: Option<&str>) -> Result<Self, RangeError> {
        let Some(header) = header else {
            return Ok(Self::whole());
        };

        let spec = header
            .strip_prefix("bytes=")
            .ok_or(RangeError::UnsupportedUnit)?;
        if spec.is_empty() {
            return Err(RangeError::Malformed);
        }
        if spec.contains(',') {
            return Err(RangeError::MultipleRanges);
        }

        let (first, last) = spec.split_once('-').ok_or(RangeError::Malformed)?;
        if first.is_empty() {
            // bytes=-n means "the last n bytes", which has no fixed answer
            // while the stream is still being written.
            return Err(RangeError::SuffixUnsupported);
        }

        let start = parse_offset(first)?;
        let stop = if last.is_empty() {
            Stop::Open
        } else {
            let last = parse_offset(last)?;
            if start > last {
                return Err(RangeError::StartAfterEnd { start, end: last });
            }
            // The header's last offset is inclusive; stop is exclusive.
            Stop::Bounded(last.saturating_add(1))
        };

        Ok(Self { start, stop })
    }
}

fn parse_offset(digits: &str) -> Result<u64, RangeError> {
    if digits.bytes().all(|b| b.is_ascii_digit()) {
        digits.parse().map_err(|_| RangeError::Malformed)
    } else {
        Err(RangeError::Malformed)
    }
}

/// Error returned for a range header the relay cannot satisfy.
///
/// The `Display` rendering is sent verbatim as the body of a
/// `416 Range Not Satisfiable` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeError {
    /// The header does not follow `bytes=<first>-<last>`.
    Malformed,
    /// A unit other than `bytes` was requested.
    UnsupportedUnit,
    /// More than one range was requested.
    MultipleRanges,
    /// A suffix range (`bytes=-n`) was requested.
    SuffixUnsupported,
    /// The first offset is past the last offset.
    StartAfterEnd { start: u64, end: u64 },
}

impl std::error::Error for RangeError {}

impl std::fmt::Display for RangeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RangeError::Malformed => write!(f, "malformed range header"),
            RangeError::UnsupportedUnit => write!(f, "only byte ranges are supported"),
            RangeError::MultipleRanges => write!(f, "multiple ranges are not supported"),
            RangeError::SuffixUnsupported => {
                write!(f, "suffix ranges are not supported for live streams")
            }
            RangeError::StartAfterEnd { start, end } => {
                write!(f, "range start {} is past range end {}", start, end)
            }
        }
    }
}
