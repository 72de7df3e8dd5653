//! Live queries: a push-based subscription republished into a [`Signal`].
//!
//! A [`LiveQuery`] holds at most one subscription at a time.  Each change of
//! the effective arguments closes the current subscription and opens a new one;
//! [`QueryArgs::Skip`] closes it without opening another.  Every subscription
//! is tagged with a generation number, and pushes that arrive for an older
//! generation, or after the query is closed, are dropped.

use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use serde_json::Value;
use tokio::sync::watch;

use crate::client::{PlatformClient, Unsubscribe};
use crate::error::{Error, Result};
use crate::function::{QueryArgs, QueryFunction};
use crate::observability::{
    QUERY_ERRORS, QUERY_PUSHES, QUERY_STALE_PUSHES, QUERY_SUBSCRIBES, QUERY_UNSUBSCRIBES,
};
use crate::reactive::{Scope, Signal, effect};

/// The latest outcome of a subscription.
#[derive(Clone, Debug)]
pub struct QueryState<T> {
    /// The most recently pushed value.
    pub data: Option<T>,
    /// The most recent failure, cleared by the next pushed value.
    pub error: Option<Error>,
}

impl<T> Default for QueryState<T> {
    fn default() -> Self {
        Self {
            data: None,
            error: None,
        }
    }
}

impl<T: Clone> QueryState<T> {
    /// The error if one is recorded, otherwise the value, if any.
    pub fn read(&self) -> Result<Option<T>> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        Ok(self.data.clone())
    }
}

#[derive(Default)]
struct Subscription {
    generation: u64,
    // Outer `None`: never activated.  Inner `None`: skipped.
    args: Option<Option<Value>>,
    active: Option<Unsubscribe>,
    closed: bool,
}

struct Inner<Q: QueryFunction> {
    client: Arc<dyn PlatformClient>,
    cell: Signal<QueryState<Q::Output>>,
    subscription: Mutex<Subscription>,
    _query: PhantomData<fn() -> Q>,
}

impl<Q: QueryFunction> Inner<Q> {
    fn lock(&self) -> MutexGuard<'_, Subscription> {
        self.subscription.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn activate(self: &Arc<Self>, args: Option<Value>) {
        let (previous, generation) = {
            let mut sub = self.lock();
            if sub.closed || sub.args.as_ref() == Some(&args) {
                return;
            }
            sub.args = Some(args.clone());
            sub.generation += 1;
            (sub.active.take(), sub.generation)
        };
        if let Some(previous) = previous {
            QUERY_UNSUBSCRIBES.click();
            tracing::debug!(path = Q::PATH, generation, "closing replaced subscription");
            previous.unsubscribe();
        }

        let Some(args) = args else {
            tracing::debug!(path = Q::PATH, generation, "query skipped");
            self.cell.set(QueryState::default());
            return;
        };

        QUERY_SUBSCRIBES.click();
        tracing::debug!(path = Q::PATH, generation, %args, "subscribing");
        let weak = Arc::downgrade(self);
        let on_result = {
            let weak: Weak<Self> = weak.clone();
            Box::new(move |value: Value| {
                if let Some(inner) = weak.upgrade() {
                    inner.push_result(generation, value);
                }
            })
        };
        let on_error = Box::new(move |err: Error| {
            if let Some(inner) = weak.upgrade() {
                inner.push_error(generation, err);
            }
        });
        let unsubscribe = self.client.on_update(Q::PATH, args, on_result, on_error);

        let mut sub = self.lock();
        if sub.closed || sub.generation != generation {
            // Closed or replaced while the client was subscribing.
            drop(sub);
            QUERY_UNSUBSCRIBES.click();
            unsubscribe.unsubscribe();
            return;
        }
        sub.active = Some(unsubscribe);
    }

    fn is_current(sub: &Subscription, generation: u64) -> bool {
        !sub.closed && sub.generation == generation
    }

    fn push_result(&self, generation: u64, value: Value) {
        let sub = self.lock();
        if !Self::is_current(&sub, generation) {
            QUERY_STALE_PUSHES.click();
            tracing::debug!(path = Q::PATH, generation, "dropping stale result");
            return;
        }
        match serde_json::from_value::<Q::Output>(value) {
            Ok(data) => {
                QUERY_PUSHES.click();
                self.cell.set(QueryState {
                    data: Some(data),
                    error: None,
                });
            }
            Err(e) => {
                let err = Error::serialization(
                    format!("Failed to decode result of {}: {}", Q::PATH, e),
                    Some(Box::new(e)),
                );
                self.record_error(err);
            }
        }
    }

    fn push_error(&self, generation: u64, err: Error) {
        let sub = self.lock();
        if !Self::is_current(&sub, generation) {
            QUERY_STALE_PUSHES.click();
            tracing::debug!(path = Q::PATH, generation, "dropping stale error");
            return;
        }
        self.record_error(err);
    }

    fn record_error(&self, err: Error) {
        QUERY_ERRORS.click();
        tracing::warn!(path = Q::PATH, error = %err, "query failed");
        self.cell.update(|state| state.error = Some(err));
    }

    fn close(&self) {
        let active = {
            let mut sub = self.lock();
            if sub.closed {
                return;
            }
            sub.closed = true;
            sub.active.take()
        };
        if let Some(active) = active {
            QUERY_UNSUBSCRIBES.click();
            tracing::debug!(path = Q::PATH, "closing subscription");
            active.unsubscribe();
        }
    }
}

impl<Q: QueryFunction> Drop for Inner<Q> {
    fn drop(&mut self) {
        let sub = self
            .subscription
            .get_mut()
            .unwrap_or_else(|e| e.into_inner());
        if sub.closed {
            return;
        }
        sub.closed = true;
        if let Some(active) = sub.active.take() {
            QUERY_UNSUBSCRIBES.click();
            active.unsubscribe();
        }
    }
}

/// A live, typed view of one query.
///
/// Clones share the same subscription.  The subscription closes when the
/// owning [`Scope`] is disposed, when [`LiveQuery::close`] is called, or when
/// the last handle is dropped, whichever comes first.  The scope holds the
/// query weakly.
pub struct LiveQuery<Q: QueryFunction> {
    inner: Arc<Inner<Q>>,
}

impl<Q: QueryFunction> LiveQuery<Q> {
    /// Subscribes with fixed arguments.
    pub fn new(
        client: Arc<dyn PlatformClient>,
        scope: &Scope,
        args: QueryArgs<Q::Args>,
    ) -> Result<Self> {
        let inner = Arc::new(Inner {
            client,
            cell: Signal::new(QueryState::default()),
            subscription: Mutex::new(Subscription::default()),
            _query: PhantomData,
        });
        let owned = Arc::downgrade(&inner);
        scope.on_cleanup(move || {
            if let Some(inner) = owned.upgrade() {
                inner.close();
            }
        });
        let query = Self { inner };
        query.set_args(args)?;
        Ok(query)
    }

    /// Subscribes with the arguments held by `args`, resubscribing whenever
    /// they change.
    pub fn tracking(
        client: Arc<dyn PlatformClient>,
        scope: &Scope,
        args: &Signal<QueryArgs<Q::Args>>,
    ) -> Result<Self>
    where
        Q::Args: Clone,
    {
        let query = Self::new(client, scope, args.get())?;
        let weak = Arc::downgrade(&query.inner);
        effect(scope, args, move |args| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if let Err(err) = (LiveQuery { inner: Arc::clone(&inner) }).set_args(args) {
                inner.record_error(err);
            }
        });
        Ok(query)
    }

    /// Changes the arguments.  Equal arguments leave the subscription alone.
    pub fn set_args(&self, args: QueryArgs<Q::Args>) -> Result<()> {
        let encoded = match &args {
            QueryArgs::Args(args) => Some(serde_json::to_value(args)?),
            QueryArgs::Skip => None,
        };
        self.inner.activate(encoded);
        Ok(())
    }

    /// Reads the latest value.
    ///
    /// Returns the recorded error if the last event was a failure, `Ok(None)`
    /// before the first result or while skipped.
    pub fn get(&self) -> Result<Option<Q::Output>> {
        self.inner.cell.with(QueryState::read)
    }

    /// A copy of the full state.
    pub fn state(&self) -> QueryState<Q::Output> {
        self.inner.cell.get()
    }

    /// The cell the query publishes into.
    pub fn signal(&self) -> Signal<QueryState<Q::Output>> {
        self.inner.cell.clone()
    }

    /// A receiver notified on every published change.
    pub fn watch(&self) -> watch::Receiver<QueryState<Q::Output>> {
        self.inner.cell.subscribe()
    }

    /// Closes the subscription.  Later calls do nothing.
    pub fn close(&self) {
        self.inner.close();
    }

    /// Returns true once the query is closed.
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }
}

impl<Q: QueryFunction> Clone for LiveQuery<Q> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<Q: QueryFunction> fmt::Debug for LiveQuery<Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveQuery")
            .field("path", &Q::PATH)
            .field("closed", &self.is_closed())
            .finish()
    }
}
