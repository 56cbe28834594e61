//! The pipeline container.

use std::fmt;
use std::sync::Arc;

use futures::future::join_all;
use pararray_shared::errors::{PipelineError, PipelineResult};

use super::admission::{Admission, AdmissionOrder};
use super::metrics::{PipelineMetrics, StageMetrics, StageMetricsStorage};
use super::scheduler::StageScheduler;
use super::slot::{SettledFuture, settled, tagged_slots};
use super::stage::StageOptions;
use super::tagged::{PipelineItem, Reason, Settled, Tagged};
use super::task::Worker;

/// Fixed-length, immutable handle over N result futures.
///
/// Slot `i` always settles to the result for original input `i`. The array
/// does no work itself: each `async_map` spawns a stage that settles the
/// futures of the array it returns. Cloning is cheap and shares the same
/// futures; awaiting them from several places never re-runs any work.
pub struct ParArray<V> {
    slots: Arc<[SettledFuture<V>]>,
    lineage: Arc<[Arc<StageMetricsStorage>]>,
}

impl<V> Clone for ParArray<V> {
    fn clone(&self) -> Self {
        Self {
            slots: Arc::clone(&self.slots),
            lineage: Arc::clone(&self.lineage),
        }
    }
}

impl<V: PipelineItem> ParArray<V> {
    /// Build an array whose items are already settled as successes.
    ///
    /// # Example
    ///
    /// ```
    /// # tokio_test_block_on(async {
    /// use pararray::ParArray;
    ///
    /// let values = ParArray::from_items(vec![1, 2, 3]).all().await.unwrap();
    /// assert_eq!(values, vec![1, 2, 3]);
    /// # });
    /// # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
    /// #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
    /// # }
    /// ```
    pub fn from_items<I>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
    {
        let slots: Vec<_> = items
            .into_iter()
            .enumerate()
            .map(|(idx, value)| settled(Tagged::Ok { idx, value }))
            .collect();
        Self {
            slots: slots.into(),
            lineage: Vec::new().into(),
        }
    }

    /// Number of items, fixed for the lifetime of the array.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Read-only view of the underlying futures, in index order.
    ///
    /// Handles can be cloned and awaited or peeked; they cannot be resolved
    /// from outside the stage that owns them.
    pub fn raw(&self) -> &[SettledFuture<V>] {
        &self.slots
    }

    /// Run `worker` over every item as a new stage.
    ///
    /// Returns immediately with an array of the same length; the stage runs
    /// on a spawned coordination task of the current tokio runtime. Upstream
    /// failures are forwarded without calling the worker, and worker errors
    /// or panics become the item's [`Reason`].
    ///
    /// # Errors
    ///
    /// - `Config` if `options` are invalid (e.g. `max_concurrency == 0`)
    /// - `Runtime` if called outside a tokio runtime
    ///
    /// # Example
    ///
    /// ```ignore
    /// let doubled = ParArray::from_items(1..=5)
    ///     .async_map(
    ///         |_idx, x: i32| async move { Ok::<_, BoxError>(x * 2) },
    ///         StageOptions::default(),
    ///     )?
    ///     .async_map(
    ///         |_idx, x: i32| async move { Ok::<_, BoxError>(x + 1) },
    ///         StageOptions::default().max_concurrency(2).in_index_order(),
    ///     )?
    ///     .all()
    ///     .await?;
    /// ```
    pub fn async_map<U, W>(&self, worker: W, options: StageOptions) -> PipelineResult<ParArray<U>>
    where
        U: PipelineItem,
        W: Worker<V, U>,
    {
        options.sanitize()?;
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                let message = format!("async_map requires a tokio runtime: {}", e);
                return Err(PipelineError::Runtime(message));
            }
        };

        let len = self.len();
        let stage = self.lineage.len();
        let capacity = options.capacity_for(len);
        let metrics = Arc::new(StageMetricsStorage::new(
            stage,
            len,
            capacity,
            options.admission,
            options.min_start_interval,
        ));
        let (resolvers, slots) = tagged_slots::<U>(len);

        let scheduler = StageScheduler {
            stage,
            admission: Admission::new(options.admission, &self.slots),
            worker: Arc::new(worker),
            capacity,
            min_start_interval: options.min_start_interval,
            resolvers,
            metrics: Arc::clone(&metrics),
        };
        runtime.spawn(scheduler.run());

        let lineage: Vec<_> = self
            .lineage
            .iter()
            .cloned()
            .chain(std::iter::once(metrics))
            .collect();
        Ok(ParArray {
            slots: slots.into(),
            lineage: lineage.into(),
        })
    }

    /// Wait for every item; fail with the reason of the lowest failed index.
    pub async fn all(&self) -> Result<Vec<V>, Reason> {
        self.settle_all()
            .await
            .into_iter()
            .map(Tagged::into_result)
            .collect()
    }

    /// Wait for every item and report each outcome in index order.
    ///
    /// Never fails itself.
    pub async fn all_settled(&self) -> Vec<Settled<V>> {
        self.settle_all()
            .await
            .into_iter()
            .map(Settled::from)
            .collect()
    }

    /// Wait for every item and return the raw tagged results in index order.
    pub async fn settle_all(&self) -> Vec<Tagged<V>> {
        join_all(self.slots.iter().cloned()).await
    }

    /// Stream this array's items in the order they settle.
    pub fn completion_order(&self) -> Admission<V> {
        Admission::new(AdmissionOrder::Completion, &self.slots)
    }

    /// Stream this array's items in ascending index order.
    pub fn index_order(&self) -> Admission<V> {
        Admission::new(AdmissionOrder::Index, &self.slots)
    }

    /// Counters of the stage that produced this array; `None` for arrays
    /// built with [`ParArray::from_items`].
    pub fn metrics(&self) -> Option<StageMetrics> {
        self.lineage.last().map(|storage| storage.snapshot())
    }

    /// Counters of every stage that led to this array, first stage first.
    pub fn pipeline_metrics(&self) -> PipelineMetrics {
        PipelineMetrics {
            stages: self.lineage.iter().map(|stage| stage.snapshot()).collect(),
        }
    }
}

impl<V: PipelineItem> FromIterator<V> for ParArray<V> {
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        Self::from_items(iter)
    }
}

impl<V> fmt::Debug for ParArray<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParArray")
            .field("len", &self.slots.len())
            .field("stages", &self.lineage.len())
            .finish()
    }
}

// Arrays are handed across tasks and threads freely.
const _: () = {
    const fn assert_send_sync<T: Send + Sync>() {}
    let _ = assert_send_sync::<ParArray<String>>;
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::tagged::BoxError;

    #[tokio::test]
    async fn test_from_items_settles_in_order() {
        let array = ParArray::from_items(vec!["a", "b", "c"]);
        assert_eq!(array.len(), 3);
        assert!(array.metrics().is_none());

        for (idx, future) in array.raw().iter().enumerate() {
            assert_eq!(future.clone().await.idx(), idx);
        }
        assert_eq!(array.all().await.unwrap(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_empty_array() {
        let array: ParArray<u32> = ParArray::from_items(Vec::new());
        assert!(array.is_empty());

        let mapped = array
            .async_map(
                |_idx, x: u32| async move { Ok::<_, BoxError>(x + 1) },
                StageOptions::default().max_concurrency(4),
            )
            .unwrap();
        assert!(mapped.all().await.unwrap().is_empty());
        assert!(mapped.all_settled().await.is_empty());
    }

    #[tokio::test]
    async fn test_zero_concurrency_fails_before_spawning() {
        let array = ParArray::from_items(0..4u32);
        let err = array
            .async_map(
                |_idx, x: u32| async move { Ok::<_, BoxError>(x) },
                StageOptions::default().max_concurrency(0),
            )
            .unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn test_async_map_outside_runtime() {
        let array = ParArray::from_items(0..4u32);
        let err = array
            .async_map(
                |_idx, x: u32| async move { Ok::<_, BoxError>(x) },
                StageOptions::default(),
            )
            .unwrap_err();
        assert!(matches!(err, PipelineError::Runtime(_)));
    }

    #[tokio::test]
    async fn test_all_reports_lowest_failed_index() {
        let array = ParArray::from_items(0..10usize)
            .async_map(
                |idx, x: usize| async move {
                    if idx == 7 || idx == 3 {
                        return Err(BoxError::from(format!("failed {}", idx)));
                    }
                    Ok(x)
                },
                StageOptions::default(),
            )
            .unwrap();

        let reason = array.all().await.unwrap_err();
        assert_eq!(reason.to_string(), "failed 3");
    }

    #[tokio::test]
    async fn test_clones_share_results() {
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let array = ParArray::from_items(0..5u32)
            .async_map(
                move |_idx, x: u32| {
                    let counter = Arc::clone(&counter);
                    async move {
                        counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                        Ok::<_, BoxError>(x * 10)
                    }
                },
                StageOptions::default(),
            )
            .unwrap();
        let copy = array.clone();

        assert_eq!(array.all().await.unwrap(), vec![0, 10, 20, 30, 40]);
        assert_eq!(copy.all().await.unwrap(), vec![0, 10, 20, 30, 40]);
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_branching_from_one_array() {
        let base = ParArray::from_items(1..=4i64);
        let double = |_idx: usize, x: i64| async move { Ok::<_, BoxError>(x * 2) };
        let negate = |_idx: usize, x: i64| async move { Ok::<_, BoxError>(-x) };
        let doubled = base.async_map(double, StageOptions::default()).unwrap();
        let negated = base.async_map(negate, StageOptions::sequential()).unwrap();

        assert_eq!(doubled.all().await.unwrap(), vec![2, 4, 6, 8]);
        assert_eq!(negated.all().await.unwrap(), vec![-1, -2, -3, -4]);
        assert_eq!(base.all().await.unwrap(), vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_pipeline_metrics_follow_lineage() {
        let array = ParArray::from_items(0..6u32)
            .async_map(
                |_idx, x: u32| async move { Ok::<_, BoxError>(x) },
                StageOptions::default(),
            )
            .unwrap()
            .async_map(
                |_idx, x: u32| async move { Ok::<_, BoxError>(x + 1) },
                StageOptions::sequential().in_index_order(),
            )
            .unwrap();
        array.all().await.unwrap();

        let metrics = array.pipeline_metrics();
        assert_eq!(metrics.stages.len(), 2);
        assert_eq!(metrics.stages[0].index, 0);
        assert_eq!(metrics.stages[0].capacity, 6);
        assert_eq!(metrics.stages[1].capacity, 1);
        assert_eq!(metrics.stages[1].admission, AdmissionOrder::Index);
        assert_eq!(metrics.stages[1].peak_occupancy, 1);
        assert_eq!(array.metrics().unwrap().index, 1);
    }

    #[tokio::test]
    async fn test_debug_output() {
        let array = ParArray::from_items(vec![1u8, 2]);
        assert_eq!(format!("{:?}", array), "ParArray { len: 2, stages: 0 }");
    }
}
