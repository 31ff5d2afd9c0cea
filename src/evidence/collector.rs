//! Layer score collector
//!
//! Fans out one thread per evidence source and joins on every slot or its
//! deadline. Results are placed by slot position, so output order never
//! depends on which layer finished first.
//!
//! Anything that goes wrong inside a layer (error, panic, timeout, invalid
//! score, wrong layer) is absorbed here and becomes an unavailable marker.
//! The collector never retries.
//!
//! Producers still running when collection ends get their token cancelled
//! and one grace period to exit. Threads that outlive it are kept as
//! stragglers and joined once they finish; none is ever detached.

use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::{LayerKind, LayerResult};
use crate::cancel::CancelToken;
use crate::timeout::LayerTimeouts;

/// How often the collector re-checks the caller's cancel token.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Errors an evidence producer may report.
#[derive(Debug, Error)]
pub enum EvidenceError {
    #[error("evidence producer failed: {0}")]
    Failed(String),

    #[error("evidence producer observed cancellation")]
    Cancelled,

    #[error("evidence producer panicked")]
    Panicked,
}

/// An external evidence producer for one layer.
///
/// Producers run on their own thread and receive a token that is cancelled
/// once the collector stops waiting for them; long-running producers should
/// check it and return early.
pub trait EvidenceSource: Send + 'static {
    /// The layer this source produces.
    fn layer(&self) -> LayerKind;

    /// Produce the layer result.
    fn produce(self: Box<Self>, cancel: CancelToken) -> Result<LayerResult, EvidenceError>;
}

struct FnSource<F> {
    layer: LayerKind,
    produce: F,
}

impl<F> EvidenceSource for FnSource<F>
where
    F: FnOnce(CancelToken) -> Result<LayerResult, EvidenceError> + Send + 'static,
{
    fn layer(&self) -> LayerKind {
        self.layer
    }

    fn produce(self: Box<Self>, cancel: CancelToken) -> Result<LayerResult, EvidenceError> {
        (self.produce)(cancel)
    }
}

/// Wrap a closure as an evidence source.
pub fn evidence_fn<F>(layer: LayerKind, produce: F) -> Box<dyn EvidenceSource>
where
    F: FnOnce(CancelToken) -> Result<LayerResult, EvidenceError> + Send + 'static,
{
    Box::new(FnSource { layer, produce })
}

/// How a layer slot was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerOutcome {
    /// The producer delivered valid evidence.
    Completed,
    /// The producer reported an error, panicked, or itself reported the
    /// layer unavailable.
    Unavailable,
    /// The producer delivered evidence that failed validation.
    Rejected,
    /// The layer deadline passed first.
    TimedOut,
    /// The request was cancelled and the grace period ran out.
    Cancelled,
    /// No source was supplied for the layer.
    Missing,
}

/// Per-layer timing, kept for observability only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerTiming {
    pub layer: LayerKind,
    pub elapsed_ms: u64,
    pub outcome: LayerOutcome,
}

/// Output of one collection.
#[derive(Debug, Clone)]
pub struct Collection {
    /// One result per layer, in slot order.
    pub results: Vec<LayerResult>,
    /// One timing per layer, in slot order.
    pub timings: Vec<LayerTiming>,
    /// Whether the caller cancelled before every slot resolved.
    pub cancelled: bool,
}

impl Collection {
    /// Number of layers that produced usable evidence.
    pub fn available_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_available()).count()
    }
}

struct Slot {
    layer: LayerKind,
    deadline: Instant,
    resolved: Option<(LayerResult, LayerTiming)>,
}

type TaskMessage = (usize, Result<LayerResult, EvidenceError>, Duration);

/// A producer thread that ignored cancellation past the grace period.
#[derive(Debug)]
struct Straggler {
    layer: LayerKind,
    handle: JoinHandle<()>,
}

/// Collects evidence layers concurrently with per-layer timeouts.
#[derive(Debug, Clone)]
pub struct LayerCollector {
    timeouts: LayerTimeouts,
    stragglers: Arc<Mutex<Vec<Straggler>>>,
}

impl LayerCollector {
    /// Create a collector with the given timeouts.
    pub fn new(timeouts: LayerTimeouts) -> Self {
        Self {
            timeouts,
            stragglers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Get the timeouts
    pub fn timeouts(&self) -> &LayerTimeouts {
        &self.timeouts
    }

    /// Number of producer threads from earlier collections still running.
    ///
    /// Finished stragglers are joined first.
    pub fn straggler_count(&self) -> usize {
        self.join_finished_stragglers();
        self.stragglers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Wait up to `wait` for stragglers to exit, joining each one that does.
    ///
    /// Returns how many are still running.
    pub fn reap(&self, wait: Duration) -> usize {
        let deadline = Instant::now() + wait;
        loop {
            let remaining = self.straggler_count();
            if remaining == 0 || Instant::now() >= deadline {
                return remaining;
            }
            thread::sleep(CANCEL_POLL_INTERVAL);
        }
    }

    fn join_finished_stragglers(&self) {
        let mut stragglers = self.stragglers.lock().unwrap_or_else(PoisonError::into_inner);
        let (finished, running): (Vec<_>, Vec<_>) = stragglers.drain(..).partition(|s| s.handle.is_finished());
        *stragglers = running;
        drop(stragglers);

        for straggler in finished {
            debug!(layer = %straggler.layer, "straggling evidence producer exited");
            let _ = straggler.handle.join();
        }
    }

    /// Join producers within one grace period; keep the rest as stragglers.
    fn join_producers(&self, handles: Vec<(LayerKind, JoinHandle<()>)>) {
        let deadline = Instant::now() + self.timeouts.grace();
        let mut running = handles;
        loop {
            let (finished, rest): (Vec<_>, Vec<_>) = running.into_iter().partition(|(_, h)| h.is_finished());
            for (_, handle) in finished {
                let _ = handle.join();
            }
            running = rest;
            if running.is_empty() || Instant::now() >= deadline {
                break;
            }
            thread::sleep(CANCEL_POLL_INTERVAL.min(deadline.saturating_duration_since(Instant::now())));
        }

        if running.is_empty() {
            return;
        }
        let mut stragglers = self.stragglers.lock().unwrap_or_else(PoisonError::into_inner);
        for (layer, handle) in running {
            warn!(
                %layer,
                grace_ms = self.timeouts.grace_ms,
                "evidence producer ignored cancellation and outlived the grace period"
            );
            stragglers.push(Straggler { layer, handle });
        }
    }

    /// Run every source and collect one result per layer.
    ///
    /// Blocks until every layer has resolved, timed out, or (after the
    /// caller cancels) the grace period has run out.
    pub fn collect(&self, sources: Vec<Box<dyn EvidenceSource>>, cancel: &CancelToken) -> Collection {
        self.join_finished_stragglers();

        let start = Instant::now();
        let task_cancel = CancelToken::new();
        let (tx, rx) = mpsc::channel::<TaskMessage>();

        let mut slots: Vec<Slot> = LayerKind::ALL
            .iter()
            .map(|layer| Slot {
                layer: *layer,
                deadline: start + self.timeouts.for_layer(*layer),
                resolved: None,
            })
            .collect();
        let mut spawned = [false; 5];
        let mut handles: Vec<(LayerKind, JoinHandle<()>)> = Vec::new();

        for source in sources {
            let layer = source.layer();
            let index = layer.position();
            if spawned[index] {
                warn!(%layer, "duplicate evidence source ignored");
                continue;
            }
            spawned[index] = true;

            let tx = tx.clone();
            let token = task_cancel.clone();
            let spawn_result = thread::Builder::new()
                .name(format!("evidence-{}", layer))
                .spawn(move || {
                    let task_start = Instant::now();
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| source.produce(token)))
                        .unwrap_or(Err(EvidenceError::Panicked));
                    // The collector may have stopped listening; nothing to do then.
                    let _ = tx.send((index, outcome, task_start.elapsed()));
                });

            match spawn_result {
                Ok(handle) => handles.push((layer, handle)),
                Err(e) => {
                    warn!(%layer, error = %e, "could not start evidence task");
                    slots[index].resolved = Some(resolution(
                        layer,
                        LayerResult::unavailable(layer, format!("could not start evidence task: {}", e)),
                        Duration::ZERO,
                        LayerOutcome::Unavailable,
                    ));
                }
            }
        }
        drop(tx);

        for (index, slot) in slots.iter_mut().enumerate() {
            if !spawned[index] && slot.resolved.is_none() {
                slot.resolved = Some(resolution(
                    slot.layer,
                    LayerResult::unavailable(slot.layer, "no evidence source configured"),
                    Duration::ZERO,
                    LayerOutcome::Missing,
                ));
            }
        }

        let mut grace_deadline: Option<Instant> = None;
        let mut cancelled = false;

        while slots.iter().any(|s| s.resolved.is_none()) {
            if grace_deadline.is_none() && cancel.is_cancelled() {
                cancelled = true;
                grace_deadline = Some(Instant::now() + self.timeouts.grace());
                info!(grace_ms = self.timeouts.grace_ms, "verification cancelled, waiting out grace period");
            }

            let now = Instant::now();
            let next_deadline = slots
                .iter()
                .filter(|s| s.resolved.is_none())
                .map(|s| s.deadline)
                .chain(grace_deadline)
                .min()
                .unwrap_or(now);
            let wait = next_deadline
                .saturating_duration_since(now)
                .min(CANCEL_POLL_INTERVAL);

            match rx.recv_timeout(wait) {
                Ok((index, outcome, elapsed)) => {
                    let slot = &mut slots[index];
                    if slot.resolved.is_none() {
                        slot.resolved = Some(finish(slot.layer, outcome, elapsed));
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    // Every task has reported or died; whatever is left never will.
                    for slot in slots.iter_mut().filter(|s| s.resolved.is_none()) {
                        slot.resolved = Some(resolution(
                            slot.layer,
                            LayerResult::unavailable(slot.layer, "evidence task exited without a result"),
                            start.elapsed(),
                            LayerOutcome::Unavailable,
                        ));
                    }
                }
            }

            let now = Instant::now();
            for slot in slots.iter_mut().filter(|s| s.resolved.is_none()) {
                if now >= slot.deadline {
                    let timeout_ms = self.timeouts.millis_for(slot.layer);
                    warn!(layer = %slot.layer, timeout_ms, "evidence layer timed out");
                    slot.resolved = Some(resolution(
                        slot.layer,
                        LayerResult::unavailable(slot.layer, format!("timed out after {} ms", timeout_ms)),
                        now.duration_since(start),
                        LayerOutcome::TimedOut,
                    ));
                }
            }

            if grace_deadline.is_some_and(|grace| now >= grace) {
                for slot in slots.iter_mut().filter(|s| s.resolved.is_none()) {
                    debug!(layer = %slot.layer, "evidence layer abandoned after cancellation");
                    slot.resolved = Some(resolution(
                        slot.layer,
                        LayerResult::unavailable(slot.layer, "cancelled"),
                        now.duration_since(start),
                        LayerOutcome::Cancelled,
                    ));
                }
            }
        }

        // Tell producers still running that nobody is listening any more.
        task_cancel.cancel();
        self.join_producers(handles);

        let (results, timings): (Vec<_>, Vec<_>) = slots
            .into_iter()
            .filter_map(|slot| slot.resolved)
            .unzip();

        debug!(
            elapsed_ms = millis(start.elapsed()),
            available = results.iter().filter(|r: &&LayerResult| r.is_available()).count(),
            cancelled,
            "evidence collection finished"
        );

        Collection {
            results,
            timings,
            cancelled,
        }
    }
}

/// Whole milliseconds, saturating at `u64::MAX`.
pub(crate) fn millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

fn resolution(
    layer: LayerKind,
    result: LayerResult,
    elapsed: Duration,
    outcome: LayerOutcome,
) -> (LayerResult, LayerTiming) {
    (
        result,
        LayerTiming {
            layer,
            elapsed_ms: millis(elapsed),
            outcome,
        },
    )
}

fn finish(
    layer: LayerKind,
    outcome: Result<LayerResult, EvidenceError>,
    elapsed: Duration,
) -> (LayerResult, LayerTiming) {
    match outcome {
        Ok(result) if result.layer() != layer => {
            warn!(%layer, returned = %result.layer(), "evidence source returned the wrong layer");
            resolution(
                layer,
                LayerResult::unavailable(
                    layer,
                    format!("evidence source for {} returned {}", layer, result.layer()),
                ),
                elapsed,
                LayerOutcome::Rejected,
            )
        }
        Ok(result) => match result.validate() {
            Ok(()) if result.is_available() => {
                debug!(%layer, elapsed_ms = millis(elapsed), "evidence layer completed");
                resolution(layer, result, elapsed, LayerOutcome::Completed)
            }
            Ok(()) => resolution(layer, result, elapsed, LayerOutcome::Unavailable),
            Err(reason) => {
                warn!(%layer, %reason, "evidence rejected");
                resolution(
                    layer,
                    LayerResult::unavailable(layer, reason),
                    elapsed,
                    LayerOutcome::Rejected,
                )
            }
        },
        Err(e) => {
            warn!(%layer, error = %e, "evidence layer failed");
            resolution(
                layer,
                LayerResult::unavailable(layer, e.to_string()),
                elapsed,
                LayerOutcome::Unavailable,
            )
        }
    }
}
