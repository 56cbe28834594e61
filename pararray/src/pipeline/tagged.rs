//! Tagged per-item results.
//!
//! Every container future settles to a [`Tagged`] value that carries the
//! item's original index, so stages can reorder work freely and still write
//! each result back to the right slot.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use pararray_shared::errors::PipelineError;

/// Boxed error accepted from workers.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Bound for values carried through a container.
///
/// Container futures are shared handles, so their outputs are cloned for
/// every consumer that awaits them.
pub trait PipelineItem: Clone + Send + Sync + 'static {}

impl<T> PipelineItem for T where T: Clone + Send + Sync + 'static {}

/// Why an item failed.
///
/// Type-erased and cheap to clone: the same reason is forwarded untouched
/// through every later stage. Use [`Reason::downcast_ref`] to get the
/// worker's concrete error back.
#[derive(Clone)]
pub struct Reason(Arc<dyn StdError + Send + Sync + 'static>);

impl Reason {
    pub fn new(err: impl Into<BoxError>) -> Self {
        let boxed: BoxError = err.into();
        Self(Arc::from(boxed))
    }

    pub fn downcast_ref<T: StdError + 'static>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    /// The pipeline fault behind this reason, if the failure came from the
    /// scheduler rather than the worker.
    pub fn as_pipeline_error(&self) -> Option<&PipelineError> {
        self.downcast_ref::<PipelineError>()
    }

    /// Whether two reasons are the same shared error value.
    pub fn ptr_eq(&self, other: &Reason) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl From<PipelineError> for Reason {
    fn from(err: PipelineError) -> Self {
        Self::new(err)
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Debug for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Reason").field(&self.0).finish()
    }
}

impl StdError for Reason {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.0.source()
    }
}

/// A settled item: its original index plus either a value or a reason.
#[derive(Debug, Clone)]
pub enum Tagged<V> {
    Ok { idx: usize, value: V },
    Err { idx: usize, reason: Reason },
}

impl<V> Tagged<V> {
    pub fn idx(&self) -> usize {
        match self {
            Tagged::Ok { idx, .. } | Tagged::Err { idx, .. } => *idx,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Tagged::Ok { .. })
    }

    pub fn is_err(&self) -> bool {
        matches!(self, Tagged::Err { .. })
    }

    pub fn into_result(self) -> Result<V, Reason> {
        match self {
            Tagged::Ok { value, .. } => Ok(value),
            Tagged::Err { reason, .. } => Err(reason),
        }
    }

    /// Re-tag a failure for a stage with a different value type.
    ///
    /// Returns `self` back unchanged on the `Ok` side so the caller can run
    /// the worker on it.
    pub(crate) fn forward_err<U>(self) -> Result<(usize, V), Tagged<U>> {
        match self {
            Tagged::Ok { idx, value } => Ok((idx, value)),
            Tagged::Err { idx, reason } => Err(Tagged::Err { idx, reason }),
        }
    }
}

/// One entry of [`ParArray::all_settled`](crate::ParArray::all_settled).
#[derive(Debug, Clone)]
pub enum Settled<V> {
    Fulfilled(V),
    Rejected(Reason),
}

impl<V> Settled<V> {
    pub fn is_fulfilled(&self) -> bool {
        matches!(self, Settled::Fulfilled(_))
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Settled::Rejected(_))
    }

    pub fn value(&self) -> Option<&V> {
        match self {
            Settled::Fulfilled(value) => Some(value),
            Settled::Rejected(_) => None,
        }
    }

    pub fn reason(&self) -> Option<&Reason> {
        match self {
            Settled::Fulfilled(_) => None,
            Settled::Rejected(reason) => Some(reason),
        }
    }

    pub fn into_result(self) -> Result<V, Reason> {
        match self {
            Settled::Fulfilled(value) => Ok(value),
            Settled::Rejected(reason) => Err(reason),
        }
    }
}

impl<V> From<Tagged<V>> for Settled<V> {
    fn from(tagged: Tagged<V>) -> Self {
        match tagged {
            Tagged::Ok { value, .. } => Settled::Fulfilled(value),
            Tagged::Err { reason, .. } => Settled::Rejected(reason),
        }
    }
}
