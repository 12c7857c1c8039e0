//! Progress reporting for transfers.
//!
//! Send and receive accept an optional progress sink that is called with
//! `(transferred, total)` while bytes flow. Totals are plaintext sizes in
//! both directions. Updates arrive on whichever worker thread is driving
//! the I/O, at whatever granularity the pipeline reads; a final update at
//! completion is guaranteed by the caller. Passing no sink disables
//! reporting.
//!
//! Graphical frontends typically forward updates into a bounded channel
//! and drain it on the UI thread; [`ChannelSink`] packages that pattern.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use tokio::sync::mpsc;

/// Receiver of transfer progress updates.
///
/// Implementations must tolerate being called from I/O worker threads.
pub trait ProgressSink: Send + Sync {
    /// Reports that `transferred` of `total` bytes have been moved.
    fn update(&self, transferred: u64, total: u64);
}

/// Shared handle to a progress sink.
pub type SharedSink = Arc<dyn ProgressSink>;

/// Progress sink that forwards updates into a bounded channel.
///
/// Updates that arrive while the channel is full are dropped rather than
/// blocking the transfer; the final completion update is re-sent by the
/// pipeline, so a consumer always observes the terminal state.
pub struct ChannelSink {
    tx: mpsc::Sender<(u64, u64)>,
}

impl ChannelSink {
    /// Channel capacity used by [`ChannelSink::new`].
    pub const CAPACITY: usize = 100;

    /// Creates a sink and the receiver that drains it.
    #[must_use]
    pub fn new() -> (Self, mpsc::Receiver<(u64, u64)>) {
        let (tx, rx) = mpsc::channel(Self::CAPACITY);
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelSink {
    fn update(&self, transferred: u64, total: u64) {
        // Dropping a stale intermediate update is harmless.
        let _ = self.tx.try_send((transferred, total));
    }
}

/// `Read` adapter that reports bytes as they pass through.
///
/// Wraps the reader driving a transfer and invokes the sink after every
/// successful read. Used with the plaintext side of the pipeline so the
/// reported counts match the advertised totals.
pub struct CountingReader<R> {
    inner: R,
    sink: Option<SharedSink>,
    transferred: u64,
    total: u64,
}

impl<R> CountingReader<R> {
    /// Wraps `inner`, reporting against `total` expected bytes.
    pub fn new(inner: R, total: u64, sink: Option<SharedSink>) -> Self {
        Self {
            inner,
            sink,
            transferred: 0,
            total,
        }
    }

    /// Bytes read through this adapter so far.
    #[must_use]
    pub fn transferred(&self) -> u64 {
        self.transferred
    }
}

impl<R> std::io::Read for CountingReader<R>
where
    R: std::io::Read,
{
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n > 0 {
            self.transferred += n as u64;
            if let Some(sink) = &self.sink {
                sink.update(self.transferred, self.total);
            }
        }
        Ok(n)
    }
}

/// Atomic progress counter for tests and simple frontends.
///
/// A ready-made sink that just remembers the most recent update.
#[derive(Default)]
pub struct LatestProgress {
    transferred: AtomicU64,
    total: AtomicU64,
}

impl LatestProgress {
    /// Creates a zeroed counter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recently reported `(transferred, total)` pair.
    #[must_use]
    pub fn latest(&self) -> (u64, u64) {
        (
            self.transferred.load(Ordering::Acquire),
            self.total.load(Ordering::Acquire),
        )
    }
}

impl ProgressSink for LatestProgress {
    fn update(&self, transferred: u64, total: u64) {
        self.transferred.store(transferred, Ordering::Release);
        self.total.store(total, Ordering::Release);
    }
}
