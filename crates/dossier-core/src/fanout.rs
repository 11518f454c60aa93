//! Ordered bounded scatter/gather
//!
//! Per-item work in the writer, critic and router runs at most `limit` futures
//! at a time; results come back in input order regardless of completion order.

use futures::stream::{self, StreamExt, TryStreamExt};
use std::future::Future;

/// Run every future with at most `limit` in flight, collecting in input order
pub async fn gather_ordered<I, F, T>(futures: I, limit: usize) -> Vec<T>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = T>,
{
    stream::iter(futures)
        .buffered(limit.max(1))
        .collect()
        .await
}

/// Like [`gather_ordered`] but stops at the first error
///
/// Futures not yet started are never polled once an error is seen.
pub async fn try_gather_ordered<I, F, T, E>(futures: I, limit: usize) -> Result<Vec<T>, E>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<T, E>>,
{
    stream::iter(futures)
        .buffered(limit.max(1))
        .try_collect()
        .await
}
