//! Stage scheduler.
//!
//! One coordination task per stage owns all bookkeeping: the pending queue,
//! the occupancy set, the launch chain and the output resolvers. Workers run
//! as their own tokio tasks; the coordinator only reacts to two events, an
//! item admitted from upstream or an in-flight task finishing, and after each
//! one tries to dispatch more work. Because every state transition happens on
//! this single task, none of the state needs a lock.
//!
//! ```text
//! upstream futures ─→ Admission ─→ pending queue ─→ [≤ K in flight] ─→ output slot[idx]
//!                                                      │
//!                                        launch chain spaces worker starts
//! ```

use std::any::Any;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use futures::future::{self, BoxFuture, FutureExt};
use futures::stream::{FuturesUnordered, StreamExt};
use pararray_shared::errors::PipelineError;
use tokio::task::JoinError;
use tokio::time::Instant;

use super::admission::Admission;
use super::metrics::StageMetricsStorage;
use super::slot::Resolvers;
use super::tagged::{PipelineItem, Reason, Tagged};
use super::task::Worker;

/// Opaque handle for one dispatched task in the occupancy set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct TaskToken(u64);

/// How a dispatched item finished.
enum Outcome<V> {
    Succeeded(Tagged<V>),
    Failed(Tagged<V>),
    Panicked(Tagged<V>),
    PassedThrough(Tagged<V>),
}

impl<V> Outcome<V> {
    fn into_tagged(self) -> Tagged<V> {
        match self {
            Outcome::Succeeded(t)
            | Outcome::Failed(t)
            | Outcome::Panicked(t)
            | Outcome::PassedThrough(t) => t,
        }
    }
}

/// Serialized release points for worker starts.
///
/// Release points are handed out in dispatch order. Each one is no earlier
/// than the moment it is handed out and no earlier than `interval` after the
/// previous one, so successive worker starts across the whole stage are at
/// least `interval` apart regardless of how many slots are free.
#[derive(Debug)]
pub(crate) struct LaunchChain {
    interval: Duration,
    next_release: Option<Instant>,
}

impl LaunchChain {
    pub(crate) fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_release: None,
        }
    }

    /// Reserve the next release point.
    pub(crate) fn next_start(&mut self, now: Instant) -> Instant {
        let start = match self.next_release {
            Some(release) if release > now => release,
            _ => now,
        };
        self.next_release = Some(start + self.interval);
        start
    }
}

type InFlight<V> = FuturesUnordered<BoxFuture<'static, (TaskToken, Outcome<V>)>>;

/// Dispatch-side state of a running stage.
struct Dispatcher<In, Out, W> {
    stage: usize,
    worker: Arc<W>,
    capacity: usize,
    pending: VecDeque<Tagged<In>>,
    occupancy: HashSet<TaskToken>,
    in_flight: InFlight<Out>,
    chain: LaunchChain,
    next_token: u64,
    metrics: Arc<StageMetricsStorage>,
}

impl<In, Out, W> Dispatcher<In, Out, W>
where
    In: PipelineItem,
    Out: PipelineItem,
    W: Worker<In, Out>,
{
    /// Launch queued items while slots are free.
    fn dispatch(&mut self) {
        while self.occupancy.len() < self.capacity {
            let Some(item) = self.pending.pop_front() else {
                return;
            };
            self.launch(item);
        }
    }

    fn launch(&mut self, item: Tagged<In>) {
        let token = TaskToken(self.next_token);
        self.next_token += 1;
        self.occupancy.insert(token);
        debug_assert!(self.occupancy.len() <= self.capacity);
        self.metrics.record_dispatch(self.occupancy.len());

        // Every dispatch takes a link in the chain, forwarded failures too.
        let start_at = self.chain.next_start(Instant::now());

        match item.forward_err::<Out>() {
            Err(forwarded) => {
                tracing::trace!(
                    stage = self.stage,
                    idx = forwarded.idx(),
                    "forwarding upstream failure"
                );
                let outcome = Outcome::PassedThrough(forwarded);
                self.in_flight.push(future::ready((token, outcome)).boxed());
            }
            Ok((idx, value)) => {
                tracing::trace!(
                    stage = self.stage,
                    idx,
                    occupancy = self.occupancy.len(),
                    "dispatching item"
                );
                let worker = Arc::clone(&self.worker);
                let metrics = Arc::clone(&self.metrics);
                let handle = tokio::spawn(async move {
                    if start_at > Instant::now() {
                        tokio::time::sleep_until(start_at).await;
                    }
                    metrics.record_invoked();
                    worker.work(idx, value).await
                });
                let stage = self.stage;
                self.in_flight.push(
                    async move {
                        let outcome = match handle.await {
                            Ok(Ok(value)) => Outcome::Succeeded(Tagged::Ok { idx, value }),
                            Ok(Err(reason)) => Outcome::Failed(Tagged::Err { idx, reason }),
                            Err(err) => join_error_outcome(stage, idx, err),
                        };
                        (token, outcome)
                    }
                    .boxed(),
                );
            }
        }
    }

    /// Free the finished task's slot and refill it from the queue.
    fn release(&mut self, token: TaskToken) {
        self.occupancy.remove(&token);
        self.dispatch();
    }

    fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.occupancy.is_empty()
    }
}

/// Outcome of a worker task that did not return normally.
///
/// Only a panic counts as panicked; a cancelled task is an ordinary failure.
fn join_error_outcome<V>(stage: usize, idx: usize, err: JoinError) -> Outcome<V> {
    if err.is_panic() {
        let message = panic_message(err.into_panic());
        let reason = Reason::from(PipelineError::WorkerPanicked { idx, message });
        tracing::warn!(stage, idx, error = %reason, "worker panicked");
        Outcome::Panicked(Tagged::Err { idx, reason })
    } else {
        let message = format!("worker task for index {} was cancelled", idx);
        let reason = Reason::from(PipelineError::Runtime(message));
        tracing::warn!(stage, idx, "worker task cancelled");
        Outcome::Failed(Tagged::Err { idx, reason })
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// A configured stage, ready to be spawned as its coordination task.
pub(crate) struct StageScheduler<In, Out, W> {
    pub(crate) stage: usize,
    pub(crate) admission: Admission<In>,
    pub(crate) worker: Arc<W>,
    pub(crate) capacity: usize,
    pub(crate) min_start_interval: Duration,
    pub(crate) resolvers: Resolvers<Tagged<Out>>,
    pub(crate) metrics: Arc<StageMetricsStorage>,
}

impl<In, Out, W> StageScheduler<In, Out, W>
where
    In: PipelineItem,
    Out: PipelineItem,
    W: Worker<In, Out>,
{
    /// Drive the stage until every output slot is settled.
    pub(crate) async fn run(self) {
        let StageScheduler {
            stage,
            mut admission,
            worker,
            capacity,
            min_start_interval,
            mut resolvers,
            metrics,
        } = self;

        let started = Instant::now();
        let items = admission.remaining();
        tracing::debug!(
            stage,
            items,
            capacity,
            admission = %admission.order(),
            min_start_interval_ms = min_start_interval.as_millis() as u64,
            "stage started"
        );

        let mut dispatcher = Dispatcher {
            stage,
            worker,
            capacity,
            pending: VecDeque::new(),
            occupancy: HashSet::with_capacity(capacity.min(items)),
            in_flight: FuturesUnordered::new(),
            chain: LaunchChain::new(min_start_interval),
            next_token: 0,
            metrics: Arc::clone(&metrics),
        };
        let mut admission_done = false;

        loop {
            tokio::select! {
                biased;

                Some((token, outcome)) = dispatcher.in_flight.next(), if !dispatcher.in_flight.is_empty() => {
                    match &outcome {
                        Outcome::Succeeded(_) => metrics.record_succeeded(),
                        Outcome::Failed(_) => metrics.record_failed(),
                        Outcome::Panicked(_) => metrics.record_panicked(),
                        Outcome::PassedThrough(_) => metrics.record_passed_through(),
                    }
                    dispatcher.release(token);

                    let tagged = outcome.into_tagged();
                    let idx = tagged.idx();
                    tracing::trace!(stage, idx, ok = tagged.is_ok(), "item settled");
                    if !resolvers.resolve(idx, tagged) {
                        tracing::warn!(stage, idx, "output slot already settled or out of range");
                    }
                }

                next = admission.next(), if !admission_done => match next {
                    Some(item) => {
                        dispatcher.pending.push_back(item);
                        dispatcher.dispatch();
                    }
                    None => admission_done = true,
                },

                else => break,
            }
        }

        debug_assert!(dispatcher.is_idle());
        let unsettled = resolvers.unsettled();
        if unsettled > 0 {
            tracing::warn!(
                stage,
                unsettled,
                "stage drained with unsettled output slots"
            );
        }

        metrics.record_drained(started.elapsed());
        let snapshot = metrics.snapshot();
        tracing::debug!(
            stage,
            succeeded = snapshot.succeeded,
            failed = snapshot.failed,
            passed_through = snapshot.passed_through,
            peak_occupancy = snapshot.peak_occupancy,
            duration_ms = snapshot.duration_ms.unwrap_or_default() as u64,
            "stage drained"
        );
    }
}
