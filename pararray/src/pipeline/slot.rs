//! Result slots: paired (future, single-use resolver) units.
//!
//! A stage allocates one slot per item up front. The futures go into the
//! container it returns; the resolvers stay with the stage's coordination
//! task, which settles each slot exactly once as its item completes.

use futures::future::{BoxFuture, FutureExt, Shared};
use pararray_shared::errors::PipelineError;
use tokio::sync::oneshot;

use super::tagged::{PipelineItem, Reason, Tagged};

/// A container future: shareable, settles once to a [`Tagged`] result.
pub type SettledFuture<V> = Shared<BoxFuture<'static, Tagged<V>>>;

/// Wrap an already-known result as a container future.
pub(crate) fn settled<V: PipelineItem>(tagged: Tagged<V>) -> SettledFuture<V> {
    futures::future::ready(tagged).boxed().shared()
}

/// Resolver half of a slot store.
///
/// `resolve` takes the sender out of its slot, so a slot can only ever be
/// settled once.
pub(crate) struct Resolvers<T> {
    slots: Vec<Option<oneshot::Sender<T>>>,
}

impl<T> Resolvers<T> {
    /// Settle slot `idx`.
    ///
    /// Returns `false` when the slot does not exist or was already settled.
    /// A dropped receiver is not an error: nobody is listening any more.
    pub(crate) fn resolve(&mut self, idx: usize, value: T) -> bool {
        match self.slots.get_mut(idx).and_then(Option::take) {
            Some(tx) => {
                let _ = tx.send(value);
                true
            }
            None => false,
        }
    }

    /// Number of slots not yet settled.
    pub(crate) fn unsettled(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }
}

/// Allocate `len` slots, returning the resolvers and the raw receivers in
/// slot order.
pub(crate) fn slot_store<T>(len: usize) -> (Resolvers<T>, Vec<oneshot::Receiver<T>>) {
    let (senders, receivers): (Vec<_>, Vec<_>) = (0..len)
        .map(|_| {
            let (tx, rx) = oneshot::channel();
            (Some(tx), rx)
        })
        .unzip();
    (Resolvers { slots: senders }, receivers)
}

/// Allocate `len` tagged-result slots and turn the receivers into container
/// futures.
///
/// If a resolver is dropped without settling (the coordination task was torn
/// down), its future settles to a `SlotDropped` failure instead of hanging.
pub(crate) fn tagged_slots<V: PipelineItem>(
    len: usize,
) -> (Resolvers<Tagged<V>>, Vec<SettledFuture<V>>) {
    let (resolvers, receivers) = slot_store(len);
    let futures = receivers
        .into_iter()
        .enumerate()
        .map(|(idx, rx)| {
            async move {
                match rx.await {
                    Ok(tagged) => tagged,
                    Err(_) => {
                        tracing::warn!(idx, "result slot dropped before it settled");
                        Tagged::Err {
                            idx,
                            reason: Reason::from(PipelineError::SlotDropped(idx)),
                        }
                    }
                }
            }
            .boxed()
            .shared()
        })
        .collect();
    (resolvers, futures)
}
