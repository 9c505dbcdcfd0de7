//! Hot, replayable futures
//!
//! Every asynchronous outcome handed out by this crate is an [`Operation`]: a
//! [`Shared`] boxed future. Clones observe the same single settlement, and
//! awaiting after settlement replays the cached outcome.
//!
//! Futures in Rust are lazy, but a pending network call has to make progress
//! (and apply its result) whether or not anyone is awaiting it. [`drive`]
//! spawns a watcher onto the ambient tokio runtime; without a runtime the
//! operation simply runs when it is first awaited.

use futures::future::{self, BoxFuture, FutureExt, Shared};
use std::future::Future;

use crate::error::Result;

/// A boxed, not-yet-shared fallible future
pub type Pending<T> = BoxFuture<'static, Result<T>>;

/// A cloneable handle on one in-flight (or settled) fallible computation
pub type Operation<T> = Shared<Pending<T>>;

/// Wrap a future as an [`Operation`] without starting it
pub fn share<T, F>(future: F) -> Operation<T>
where
    T: Clone + Send + Sync + 'static,
    F: Future<Output = Result<T>> + Send + 'static,
{
    future.boxed().shared()
}

/// Wrap a future as an [`Operation`] and start driving it immediately
pub fn start<T, F>(future: F) -> Operation<T>
where
    T: Clone + Send + Sync + 'static,
    F: Future<Output = Result<T>> + Send + 'static,
{
    let operation = share(future);
    drive(&operation);
    operation
}

/// An operation that has already settled with `outcome`
pub fn settled<T>(outcome: Result<T>) -> Operation<T>
where
    T: Clone + Send + Sync + 'static,
{
    future::ready(outcome).boxed().shared()
}

/// Make `operation` progress in the background if a tokio runtime is present
pub fn drive<T>(operation: &Operation<T>)
where
    T: Clone + Send + Sync + 'static,
{
    if operation.peek().is_some() {
        return;
    }
    if let Ok(handle) = tokio::runtime::Handle::try_current() {
        let operation = operation.clone();
        handle.spawn(async move {
            let _ = operation.await;
        });
    }
}
