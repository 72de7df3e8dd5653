use std::fmt;
use std::sync::Arc;

use crate::client::PlatformClient;
use crate::error::Result;
use crate::function::{ActionFunction, MutationFunction, QueryArgs, QueryFunction};
use crate::mutation::{ActionFn, MutationFn};
use crate::query::LiveQuery;
use crate::reactive::{Scope, Signal};

/// Shared handle to the platform client, and the entry point for creating
/// live queries, mutations and actions.
///
/// Cloning is cheap; every clone talks through the same client.
#[derive(Clone)]
pub struct Convex {
    client: Arc<dyn PlatformClient>,
}

impl Convex {
    /// Wraps a client.
    pub fn new(client: impl PlatformClient + 'static) -> Self {
        Self {
            client: Arc::new(client),
        }
    }

    /// Wraps an already shared client.
    pub fn from_arc(client: Arc<dyn PlatformClient>) -> Self {
        Self { client }
    }

    /// The underlying client.
    pub fn client(&self) -> &Arc<dyn PlatformClient> {
        &self.client
    }

    /// Subscribes to `Q` with no arguments for the lifetime of `scope`.
    pub fn create_query<Q>(&self, scope: &Scope) -> Result<LiveQuery<Q>>
    where
        Q: QueryFunction,
        Q::Args: Default,
    {
        LiveQuery::new(Arc::clone(&self.client), scope, QueryArgs::default())
    }

    /// Subscribes to `Q` with fixed arguments, or not at all for
    /// [`QueryArgs::Skip`].
    pub fn create_query_with<Q: QueryFunction>(
        &self,
        scope: &Scope,
        args: impl Into<QueryArgs<Q::Args>>,
    ) -> Result<LiveQuery<Q>> {
        LiveQuery::new(Arc::clone(&self.client), scope, args.into())
    }

    /// Subscribes to `Q`, resubscribing whenever `args` changes.
    pub fn create_query_tracking<Q>(
        &self,
        scope: &Scope,
        args: &Signal<QueryArgs<Q::Args>>,
    ) -> Result<LiveQuery<Q>>
    where
        Q: QueryFunction,
        Q::Args: Clone,
    {
        LiveQuery::tracking(Arc::clone(&self.client), scope, args)
    }

    /// A callable for the mutation `M`.
    pub fn create_mutation<M: MutationFunction>(&self) -> MutationFn<M> {
        MutationFn::new(Arc::clone(&self.client))
    }

    /// A callable for the action `A`.
    pub fn create_action<A: ActionFunction>(&self) -> ActionFn<A> {
        ActionFn::new(Arc::clone(&self.client))
    }
}

impl fmt::Debug for Convex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Convex").finish_non_exhaustive()
    }
}
