use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, TryRecvError, bounded};
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};
use umbra_geom::Vec3;

use crate::handler::{Completion, HandlerId, HandlerPool, Operation};
use crate::{Occluder, RayQuery};

#[derive(Clone, Copy, Debug)]
pub struct SchedulerConfig {
    /// Queries per batch; in-flight memory is bounded to twice this.
    pub batch_capacity: usize,
    /// Worker threads for batch execution; 0 picks the available parallelism.
    pub worker_threads: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            batch_capacity: 4096,
            worker_threads: 0,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub rays: u64,
    pub batches: u64,
    /// Submits that had to wait for the previous batch.
    pub stalls: u64,
    pub wait_ms: u64,
}

#[derive(Clone, Copy, Debug)]
struct Ticket {
    handler: HandlerId,
    tag: u8,
}

/// Query, handler-reference and result buffers that travel together between
/// the producer and the worker pool.
struct RayBatch {
    queries: Vec<RayQuery>,
    tickets: Vec<Ticket>,
    hits: Vec<Option<Vec3>>,
}

impl RayBatch {
    fn with_capacity(n: usize) -> Self {
        Self {
            queries: Vec::with_capacity(n),
            tickets: Vec::with_capacity(n),
            hits: Vec::with_capacity(n),
        }
    }

    fn clear(&mut self) {
        self.queries.clear();
        self.tickets.clear();
        self.hits.clear();
    }
}

struct InFlight {
    slot: usize,
    rx: Receiver<RayBatch>,
}

/// Double-buffered ray batch pipeline.
///
/// Queries accumulate in `buffers[active]`. A full accumulator is swapped with
/// the idle buffer by toggling `active` and handed to the worker pool, after the
/// previous batch (if any) has been drained. Results are turned into handler
/// [`Completion`]s on the producer thread; collect them with
/// [`drain_completions`](Self::drain_completions).
///
/// Dropping the scheduler with a batch in flight panics; call
/// [`flush`](Self::flush) first.
pub struct VisibilityScheduler {
    occluder: Arc<dyn Occluder>,
    pool: Arc<ThreadPool>,
    buffers: [Option<RayBatch>; 2],
    active: usize,
    in_flight: Option<InFlight>,
    capacity: usize,
    handlers: HandlerPool,
    completions: Vec<Completion>,
    stats: SchedulerStats,
}

impl VisibilityScheduler {
    pub fn new(
        occluder: Arc<dyn Occluder>,
        cfg: SchedulerConfig,
    ) -> Result<Self, ThreadPoolBuildError> {
        let workers = if cfg.worker_threads > 0 {
            cfg.worker_threads
        } else {
            thread::available_parallelism().map(|n| n.get()).unwrap_or(8)
        };
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("umbra-ray-{i}"))
            .build()?;
        log::debug!(
            target: "scheduler",
            "ray pool: {} workers, batch capacity {}",
            workers,
            cfg.batch_capacity
        );
        Ok(Self::with_pool(occluder, Arc::new(pool), cfg.batch_capacity))
    }

    pub fn with_pool(occluder: Arc<dyn Occluder>, pool: Arc<ThreadPool>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            occluder,
            pool,
            buffers: [
                Some(RayBatch::with_capacity(capacity)),
                Some(RayBatch::with_capacity(capacity)),
            ],
            active: 0,
            in_flight: None,
            capacity,
            handlers: HandlerPool::new(),
            completions: Vec::new(),
            stats: SchedulerStats::default(),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    #[inline]
    pub fn handlers(&self) -> &HandlerPool {
        &self.handlers
    }

    #[inline]
    pub fn has_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Queries waiting in the accumulator.
    pub fn pending(&self) -> usize {
        self.buffers[self.active]
            .as_ref()
            .map_or(0, |b| b.queries.len())
    }

    pub fn begin(&mut self, op: Operation) -> HandlerId {
        self.handlers.acquire(op)
    }

    /// Enqueue one query for `handler`; `tag` is the channel bit the result
    /// sets. Blocks only when the accumulator is full and the previous batch is
    /// still running.
    pub fn submit(&mut self, query: RayQuery, handler: HandlerId, tag: u8) {
        debug_assert!((tag as u32) < u32::BITS);
        self.handlers.expect_query(handler);
        let acc = self.buffers[self.active]
            .as_mut()
            .expect("accumulator buffer is never in flight");
        acc.queries.push(query);
        acc.tickets.push(Ticket { handler, tag });
        self.stats.rays += 1;
        if acc.queries.len() >= self.capacity {
            self.dispatch();
        }
    }

    /// Mark `handler` as complete on the producer side.
    pub fn arm(&mut self, handler: HandlerId) {
        if let Some(done) = self.handlers.arm(handler) {
            self.completions.push(done);
        }
    }

    /// Process the in-flight batch if it already finished, without blocking.
    pub fn poll(&mut self) {
        let Some(f) = self.in_flight.as_ref() else {
            return;
        };
        match f.rx.try_recv() {
            Ok(batch) => {
                let slot = f.slot;
                self.in_flight = None;
                self.retire(slot, batch);
            }
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => panic!("ray batch worker exited without a result"),
        }
    }

    /// Submit the partial accumulator and wait for every outstanding batch.
    pub fn flush(&mut self) {
        if self.pending() > 0 {
            self.dispatch();
        }
        self.wait_in_flight();
    }

    /// Completions produced so far, oldest first.
    pub fn drain_completions(&mut self) -> std::vec::Drain<'_, Completion> {
        self.completions.drain(..)
    }

    /// Flush and tear down, returning the run statistics.
    pub fn finish(mut self) -> (SchedulerStats, Vec<Completion>) {
        self.flush();
        let rest = std::mem::take(&mut self.completions);
        (self.stats, rest)
    }

    fn dispatch(&mut self) {
        if self.in_flight.is_some() {
            self.stats.stalls += 1;
            self.wait_in_flight();
        }
        let slot = self.active;
        self.active ^= 1;
        let mut batch = self.buffers[slot]
            .take()
            .expect("accumulator buffer present at dispatch");
        debug_assert!(self.buffers[self.active].is_some());

        let (tx, rx) = bounded(1);
        let occluder = Arc::clone(&self.occluder);
        log::trace!(target: "scheduler", "dispatch batch of {} rays", batch.queries.len());
        self.pool.spawn(move || {
            let RayBatch { queries, hits, .. } = &mut batch;
            occluder.intersect_batch(queries, hits);
            let _ = tx.send(batch);
        });
        self.stats.batches += 1;
        self.in_flight = Some(InFlight { slot, rx });
    }

    fn wait_in_flight(&mut self) {
        let Some(f) = self.in_flight.take() else {
            return;
        };
        let t0 = Instant::now();
        let batch = match f.rx.recv() {
            Ok(batch) => batch,
            Err(_) => panic!("ray batch worker exited without a result"),
        };
        self.stats.wait_ms += duration_ms(t0.elapsed());
        self.retire(f.slot, batch);
    }

    fn retire(&mut self, slot: usize, mut batch: RayBatch) {
        assert_eq!(
            batch.hits.len(),
            batch.queries.len(),
            "occluder returned a short batch"
        );
        for (ticket, hit) in batch.tickets.iter().zip(batch.hits.iter()) {
            if let Some(done) = self.handlers.record(ticket.handler, ticket.tag, *hit) {
                self.completions.push(done);
            }
        }
        batch.clear();
        self.buffers[slot] = Some(batch);
    }
}

impl Drop for VisibilityScheduler {
    fn drop(&mut self) {
        if thread::panicking() {
            return;
        }
        if self.in_flight.is_some() {
            panic!("visibility scheduler dropped with a ray batch in flight; flush before teardown");
        }
        let pending = self.pending();
        if pending > 0 {
            log::warn!(
                target: "scheduler",
                "visibility scheduler dropped with {} unsubmitted queries",
                pending
            );
        }
    }
}

#[inline]
fn duration_ms(d: Duration) -> u64 {
    d.as_millis().min(u128::from(u64::MAX)) as u64
}
