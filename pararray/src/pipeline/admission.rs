//! Admission sequencing.
//!
//! Turns the futures of an upstream container into a lazy, single-pass stream
//! of settled items. The order decides when a stage gets to consider each
//! item, never where its result lands.

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::{self, BoxStream, FuturesUnordered, Stream, StreamExt};
use serde::{Deserialize, Serialize};

use super::slot::SettledFuture;
use super::tagged::{PipelineItem, Tagged};

/// Order in which a stage admits upstream items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdmissionOrder {
    /// First settled upstream, first admitted.
    #[default]
    #[serde(alias = "come")]
    Completion,
    /// Strictly ascending original index; waits for each index in turn.
    Index,
}

impl fmt::Display for AdmissionOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdmissionOrder::Completion => write!(f, "completion"),
            AdmissionOrder::Index => write!(f, "index"),
        }
    }
}

impl std::str::FromStr for AdmissionOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "completion" | "come" => Ok(AdmissionOrder::Completion),
            "index" => Ok(AdmissionOrder::Index),
            other => Err(format!(
                "unknown admission order '{}', expected 'completion' or 'index'",
                other
            )),
        }
    }
}

/// Single-pass stream of settled upstream items.
///
/// Yields exactly one item per upstream future, then ends. Nothing is
/// buffered ahead of the consumer: completion order reads straight off the
/// upstream futures as they settle, index order awaits one index at a time.
pub struct Admission<V> {
    order: AdmissionOrder,
    remaining: usize,
    inner: BoxStream<'static, Tagged<V>>,
}

impl<V: PipelineItem> Admission<V> {
    pub(crate) fn new(order: AdmissionOrder, upstream: &[SettledFuture<V>]) -> Self {
        let remaining = upstream.len();
        let inner = match order {
            AdmissionOrder::Completion => upstream
                .iter()
                .cloned()
                .collect::<FuturesUnordered<_>>()
                .boxed(),
            AdmissionOrder::Index => stream::iter(upstream.to_vec()).then(|slot| slot).boxed(),
        };
        Self {
            order,
            remaining,
            inner,
        }
    }

    pub fn order(&self) -> AdmissionOrder {
        self.order
    }

    /// Items not yet yielded.
    pub fn remaining(&self) -> usize {
        self.remaining
    }
}

impl<V> Stream for Admission<V> {
    type Item = Tagged<V>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let polled = self.inner.poll_next_unpin(cx);
        if let Poll::Ready(Some(_)) = &polled {
            self.remaining = self.remaining.saturating_sub(1);
        }
        polled
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<V> fmt::Debug for Admission<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Admission")
            .field("order", &self.order)
            .field("remaining", &self.remaining)
            .finish_non_exhaustive()
    }
}
