use std::fmt;

/// Error returned by a [`FrameSink`](crate::FrameSink), propagated verbatim.
pub type SinkError = Box<dyn std::error::Error + Send + Sync>;

/// Top-level error type for the cqtscope-core public API.
///
/// Everything except `Sink` can only occur during initialization; once a
/// renderer is built, the per-frame path is infallible on its own.
#[derive(Debug)]
pub enum CqtError {
    /// An option is out of range, or the sample rate is not divisible
    /// by `fps * count`.
    Config(String),
    /// Sample rate or channel layout outside the supported set.
    Format(String),
    /// Buffer or kernel table allocation failure.
    Resource(String),
    /// Error returned by the frame sink (host back-pressure or I/O).
    Sink(SinkError),
}

impl fmt::Display for CqtError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CqtError::Config(msg) => write!(f, "configuration error: {}", msg),
            CqtError::Format(msg) => write!(f, "unsupported format: {}", msg),
            CqtError::Resource(msg) => write!(f, "allocation failure: {}", msg),
            CqtError::Sink(e) => write!(f, "frame sink error: {}", e),
        }
    }
}

impl std::error::Error for CqtError {}

/// Convenience alias so callers can write `Result<T>` instead of `Result<T, CqtError>`.
pub type Result<T> = std::result::Result<T, CqtError>;

/// Fallible buffer allocation. The kernel table and the frame-sized buffers
/// are large enough that exhaustion is reported as [`CqtError::Resource`]
/// instead of aborting the process.
pub(crate) fn try_alloc<T: Clone>(len: usize, fill: T, what: &str) -> Result<Vec<T>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| CqtError::Resource(format!("{} ({} elements)", what, len)))?;
    buf.resize(len, fill);
    Ok(buf)
}
