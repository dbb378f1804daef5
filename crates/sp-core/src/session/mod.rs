//! Event stream sessions.
//!
//! An [`EventStream`] owns the broker, a producer thread that ingests one
//! reader into it, and a done signal that fires once the reader is
//! exhausted. Clients open time-boxed subscriptions with
//! [`EventStream::listen_to`] or aggregate one directly with
//! [`EventStream::gather`].
//!
//! # Lifecycle
//!
//! 1. `new` creates an idle stream. Subscriptions made now see every point.
//! 2. `attach` starts the producer. It can only happen once.
//! 3. When the reader ends, the producer records the read error (if any),
//!    closes the broker so every subscriber drains and closes, and only then
//!    fires the done signal. A window that ends because the stream ended has
//!    therefore already received every point, and can already see the error.

use sp_common::{DataPoint, Dimension, Error, Result, Statistics};
use std::io::{self, BufReader, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::aggregate;
use crate::logging::event_names;
use crate::publish::DEFAULT_CAPACITY;
use crate::source::{
    run_source, PointBroker, SourceCounters, SourceSnapshot, DEFAULT_MAX_LINE_BYTES,
};

#[derive(Debug, Default)]
struct DoneState {
    done: bool,
    error: Option<Arc<io::Error>>,
}

/// One-shot completion flag that threads can wait on with a timeout.
#[derive(Debug, Default)]
struct DoneSignal {
    state: Mutex<DoneState>,
    cond: Condvar,
}

impl DoneSignal {
    fn lock(&self) -> MutexGuard<'_, DoneState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the error that ended the stream. Done later by `fire`.
    fn fail(&self, error: io::Error) {
        self.lock().error = Some(Arc::new(error));
    }

    fn fire(&self) {
        self.lock().done = true;
        self.cond.notify_all();
    }

    fn is_done(&self) -> bool {
        self.lock().done
    }

    fn wait(&self) {
        let guard = self.lock();
        let _guard = self
            .cond
            .wait_while(guard, |state| !state.done)
            .unwrap_or_else(PoisonError::into_inner);
    }

    /// Returns true when the signal fired before `timeout` elapsed.
    fn wait_timeout(&self, timeout: Duration) -> bool {
        let guard = self.lock();
        let (state, _) = self
            .cond
            .wait_timeout_while(guard, timeout, |state| !state.done)
            .unwrap_or_else(PoisonError::into_inner);
        state.done
    }

    fn error(&self) -> Option<Arc<io::Error>> {
        self.lock().error.clone()
    }
}

/// A feed of events fanned out per dimension.
pub struct EventStream {
    broker: Arc<PointBroker>,
    counters: Arc<SourceCounters>,
    done: Arc<DoneSignal>,
    attached: AtomicBool,
    max_line: usize,
    producer: Mutex<Option<JoinHandle<()>>>,
}

impl EventStream {
    /// Idle stream whose subscriber channels buffer `capacity` points.
    pub fn new(capacity: usize) -> Self {
        EventStream {
            broker: Arc::new(PointBroker::with_capacity(capacity)),
            counters: Arc::new(SourceCounters::new()),
            done: Arc::new(DoneSignal::default()),
            attached: AtomicBool::new(false),
            max_line: DEFAULT_MAX_LINE_BYTES,
            producer: Mutex::new(None),
        }
    }

    /// Fail the stream on feed lines longer than `bytes`.
    pub fn with_max_line_bytes(mut self, bytes: usize) -> Self {
        self.max_line = bytes;
        self
    }

    /// Create a stream with the default capacity and attach `reader`.
    pub fn open<R: Read + Send + 'static>(reader: R) -> Result<Self> {
        let stream = Self::new(DEFAULT_CAPACITY);
        stream.attach(reader)?;
        Ok(stream)
    }

    /// Start ingesting `reader` on a background thread.
    ///
    /// Fails with [`Error::AlreadyAttached`] on the second call.
    pub fn attach<R: Read + Send + 'static>(&self, reader: R) -> Result<()> {
        if self.attached.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyAttached);
        }

        let broker = Arc::clone(&self.broker);
        let counters = Arc::clone(&self.counters);
        let done = Arc::clone(&self.done);
        let max_line = self.max_line;

        let spawned = thread::Builder::new()
            .name("sp-source".to_string())
            .spawn(move || {
                let started = Instant::now();
                let result = run_source(BufReader::new(reader), &broker, &counters, max_line);
                let snapshot = counters.snapshot();
                match result {
                    Ok(()) => {
                        info!(
                            event = event_names::STREAM_FINISHED,
                            lines = snapshot.lines,
                            events = snapshot.events,
                            rejected = snapshot.rejected,
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            "event stream ended"
                        );
                    }
                    Err(e) => {
                        error!(
                            event = event_names::STREAM_FAILED,
                            error = %e,
                            events = snapshot.events,
                            "event stream failed"
                        );
                        // Visible before subscribers see their channel close.
                        done.fail(e);
                    }
                }
                broker.close();
                done.fire();
            });

        match spawned {
            Ok(handle) => {
                *self.producer.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
                debug!(event = event_names::STREAM_OPENED, "event stream attached");
                Ok(())
            }
            Err(e) => {
                // Nothing will ever be ingested; end the stream now.
                self.done.fail(io::Error::new(e.kind(), e.to_string()));
                self.broker.close();
                self.done.fire();
                Err(Error::Io(e))
            }
        }
    }

    /// Subscribe to `dimension` for at most `duration`.
    ///
    /// The channel closes when `duration` elapses or the stream ends,
    /// whichever comes first. Check [`EventStream::error`] after it closed
    /// to tell a clean end from a failed one.
    pub fn listen_to(&self, dimension: Dimension, duration: Duration) -> Receiver<DataPoint> {
        let (rx, cancel) = self.broker.subscribe(&dimension);
        if self.done.is_done() {
            cancel.cancel();
            return rx;
        }

        let done = Arc::clone(&self.done);
        let timer_cancel = cancel.clone();
        let spawned = thread::Builder::new()
            .name("sp-window".to_string())
            .spawn(move || {
                done.wait_timeout(duration);
                timer_cancel.cancel();
            });
        if let Err(e) = spawned {
            warn!(error = %e, dimension = %dimension, "window timer unavailable, closing subscription");
            cancel.cancel();
        }
        rx
    }

    /// Aggregate `dimension` over a window of `duration`.
    ///
    /// Blocks the calling thread until the window closes.
    pub fn gather(&self, dimension: Dimension, duration: Duration) -> Statistics {
        debug!(
            event = event_names::GATHER_STARTED,
            dimension = %dimension,
            duration_ms = duration.as_millis() as u64,
            "window opened"
        );
        let started = Instant::now();
        let stats = aggregate::collect(self.listen_to(dimension, duration));
        debug!(
            event = event_names::GATHER_FINISHED,
            dimension = %dimension,
            total_posts = stats.total_posts,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "window closed"
        );
        stats
    }

    /// Whether the reader has been exhausted.
    pub fn is_done(&self) -> bool {
        self.done.is_done()
    }

    /// Block until the reader has been exhausted.
    pub fn wait(&self) {
        self.done.wait();
    }

    /// Block until the reader has been exhausted or `timeout` elapses.
    /// Returns whether the stream is done.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.done.wait_timeout(timeout)
    }

    /// Read error that ended the stream.
    ///
    /// Set before subscriber channels close, so a window that just ended
    /// because the stream failed already observes it.
    pub fn error(&self) -> Option<Arc<io::Error>> {
        self.done.error()
    }

    /// The read error as [`Error::StreamTerminated`], for reporting through
    /// the unified error type.
    pub fn termination(&self) -> Option<Error> {
        self.error().map(|e| Error::StreamTerminated(e.to_string()))
    }

    /// Ingestion counters so far.
    pub fn counters(&self) -> SourceSnapshot {
        self.counters.snapshot()
    }

    /// Subscribers currently attached to `dimension`.
    pub fn subscribers(&self, dimension: Dimension) -> usize {
        self.broker.subscribers(&dimension)
    }

    /// Wait for the producer thread to exit. Returns immediately when no
    /// reader was attached.
    pub fn join(&self) {
        let handle = self
            .producer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("event source thread panicked");
            }
        }
    }
}

impl Default for EventStream {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl std::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream")
            .field("attached", &self.attached.load(Ordering::Relaxed))
            .field("max_line", &self.max_line)
            .field("done", &self.is_done())
            .field("counters", &self.counters())
            .finish()
    }
}
