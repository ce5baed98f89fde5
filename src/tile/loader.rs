//! Background tile decoding.
//!
//! The loader pool is a fixed set of OS threads. Each thread owns nothing but
//! a handle to its [`TaskQueue`]; the loop itself ([`run_worker`]) is a plain
//! function over the queue, a [`TileDecoder`] and a [`TileSink`]:
//!
//! ```text
//!   TileManager ──submit(key)──► TaskQueue[i] (round-robin)
//!                                    │ pop (FIFO, 100 ms wait)
//!                                    ▼
//!                               run_worker ──decode──► SlideReader::read_region
//!                                    │
//!                                    ▼
//!                         TileSink::tile_loaded / tile_failed
//! ```
//!
//! Completion order is unspecified. Shutdown is cooperative: closing a queue
//! drops its pending tasks and the worker exits after the task it is already
//! decoding.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use image::DynamicImage;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::error::{SlideError, TileError};
use crate::geometry::tile_origin;
use crate::slide::SlideReader;

use super::cache::{TileImage, TileKey};

/// Default number of loader threads.
pub const DEFAULT_WORKER_COUNT: usize = 4;

/// How long an idle worker waits before re-checking for shutdown.
pub const WORKER_POLL_INTERVAL: Duration = Duration::from_millis(100);

// =============================================================================
// Sink
// =============================================================================

/// Receives the outcome of every decoded task.
///
/// Called on loader threads; implementations must be cheap and must not
/// block on the render thread.
pub trait TileSink: Send + Sync {
    /// A tile was decoded.
    fn tile_loaded(&self, key: TileKey, image: TileImage);

    /// A tile could not be decoded. It will not be retried automatically.
    fn tile_failed(&self, key: TileKey, error: &SlideError);
}

// =============================================================================
// Task Queue
// =============================================================================

/// Result of waiting on a [`TaskQueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pop {
    /// A task was dequeued
    Task(TileKey),
    /// The wait timed out with nothing to do
    Empty,
    /// The queue was closed
    Closed,
}

struct QueueState {
    pending: VecDeque<TileKey>,
    closed: bool,
}

/// FIFO queue of load tasks for one worker.
///
/// Pushing a key that is already pending is a no-op.
pub struct TaskQueue {
    state: Mutex<QueueState>,
    available: Condvar,
}

impl TaskQueue {
    /// Create an empty, open queue.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                pending: VecDeque::new(),
                closed: false,
            }),
            available: Condvar::new(),
        }
    }

    /// Enqueue a task.
    ///
    /// Returns `false` if the key is already pending or the queue is closed.
    pub fn push(&self, key: TileKey) -> bool {
        let mut state = self.state.lock();
        if state.closed || state.pending.contains(&key) {
            return false;
        }
        state.pending.push_back(key);
        self.available.notify_one();
        true
    }

    /// Dequeue the oldest task, waiting up to `timeout` for one to arrive.
    pub fn pop_timeout(&self, timeout: Duration) -> Pop {
        let mut state = self.state.lock();
        if state.closed {
            return Pop::Closed;
        }
        if let Some(key) = state.pending.pop_front() {
            return Pop::Task(key);
        }

        self.available.wait_for(&mut state, timeout);

        if state.closed {
            return Pop::Closed;
        }
        match state.pending.pop_front() {
            Some(key) => Pop::Task(key),
            None => Pop::Empty,
        }
    }

    /// Close the queue, drop pending tasks and wake any waiting worker.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.pending.clear();
        self.available.notify_all();
    }

    /// Number of pending tasks.
    pub fn len(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Check if no task is pending.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check if the queue has been closed.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Decoder
// =============================================================================

/// Reads one tile-sized region and converts it to the display format.
pub struct TileDecoder {
    reader: Arc<dyn SlideReader>,
    tile_size: u32,
}

impl TileDecoder {
    /// Create a decoder for `tile_size x tile_size` tiles.
    pub fn new(reader: Arc<dyn SlideReader>, tile_size: u32) -> Self {
        Self { reader, tile_size }
    }

    /// Tile edge length in pixels.
    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    /// Decode the tile for `key` into an RGB image.
    ///
    /// The region origin is `tile * tile_size * downsample` in level-0 pixels;
    /// the region size is one tile at the key's level.
    pub fn decode(&self, key: TileKey) -> Result<TileImage, SlideError> {
        let level = key.level as usize;
        let downsample = self
            .reader
            .level_downsample(level)
            .ok_or(SlideError::InvalidLevel {
                level,
                level_count: self.reader.level_count(),
            })?;

        let (x, y) = tile_origin(key.tile_x, key.tile_y, self.tile_size, downsample);
        let region =
            self.reader
                .read_region(x as i64, y as i64, level, self.tile_size, self.tile_size)?;

        Ok(Arc::new(DynamicImage::ImageRgba8(region).into_rgb8()))
    }
}

// =============================================================================
// Worker Loop
// =============================================================================

/// Worker loop: pop, decode, report, until the queue is closed.
pub fn run_worker(id: usize, queue: &TaskQueue, decoder: &TileDecoder, sink: &dyn TileSink) {
    debug!("Tile worker {} started", id);
    loop {
        match queue.pop_timeout(WORKER_POLL_INTERVAL) {
            Pop::Task(key) => match decoder.decode(key) {
                Ok(image) => sink.tile_loaded(key, image),
                Err(err) => {
                    warn!(
                        "Tile ({}, {}) level {} failed to load: {}",
                        key.tile_x, key.tile_y, key.level, err
                    );
                    sink.tile_failed(key, &err);
                }
            },
            Pop::Empty => {}
            Pop::Closed => break,
        }
    }
    debug!("Tile worker {} exiting", id);
}

// =============================================================================
// Loader Pool
// =============================================================================

/// Fixed pool of tile decoding threads.
///
/// Dropping the pool shuts it down and joins every thread.
pub struct LoaderPool {
    queues: Vec<Arc<TaskQueue>>,
    handles: Vec<JoinHandle<()>>,
    next: AtomicUsize,
}

impl LoaderPool {
    /// Start `worker_count` threads (at least one).
    pub fn spawn(
        worker_count: usize,
        decoder: TileDecoder,
        sink: Arc<dyn TileSink>,
    ) -> Result<Self, TileError> {
        let worker_count = worker_count.max(1);
        let decoder = Arc::new(decoder);

        let mut pool = Self {
            queues: Vec::with_capacity(worker_count),
            handles: Vec::with_capacity(worker_count),
            next: AtomicUsize::new(0),
        };

        for id in 0..worker_count {
            let queue = Arc::new(TaskQueue::new());
            let worker_queue = Arc::clone(&queue);
            let worker_decoder = Arc::clone(&decoder);
            let worker_sink = Arc::clone(&sink);

            let handle = thread::Builder::new()
                .name(format!("tile-worker-{id}"))
                .spawn(move || {
                    run_worker(id, &worker_queue, &worker_decoder, worker_sink.as_ref())
                })
                .map_err(|e| TileError::WorkerSpawn(e.to_string()))?;

            pool.queues.push(queue);
            pool.handles.push(handle);
        }

        debug!("Started {} tile workers", worker_count);
        Ok(pool)
    }

    /// Dispatch a task to the next worker in round-robin order.
    ///
    /// Returns `false` if that worker already had the key pending or the pool
    /// is shut down.
    pub fn submit(&self, key: TileKey) -> bool {
        if self.queues.is_empty() {
            return false;
        }
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.queues.len();
        self.queues[idx].push(key)
    }

    /// Dispatch a task to a specific worker.
    pub fn submit_to(&self, worker: usize, key: TileKey) -> bool {
        self.queues
            .get(worker)
            .is_some_and(|queue| queue.push(key))
    }

    /// Number of workers.
    pub fn worker_count(&self) -> usize {
        self.queues.len()
    }

    /// Tasks waiting in all queues.
    pub fn pending(&self) -> usize {
        self.queues.iter().map(|q| q.len()).sum()
    }

    /// Check if the pool has been shut down.
    pub fn is_shut_down(&self) -> bool {
        self.handles.is_empty()
    }

    /// Stop every worker and wait for it to exit.
    ///
    /// Pending tasks are dropped; tasks already being decoded finish first.
    pub fn shutdown(&mut self) {
        for queue in &self.queues {
            queue.close();
        }
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                warn!("A tile worker panicked before shutdown");
            }
        }
    }
}

impl Drop for LoaderPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// =============================================================================
// Tests
// =============================================================================
