//! Typed references to backend functions.
//!
//! A backend function is named by a path such as `chat:getMessages`: the module
//! file, a colon, then the exported function.  Implementors of [`Function`]
//! bind that path to Rust argument and return types so the adapters can encode
//! and decode values without the caller touching JSON.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// The three kinds of backend function.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FunctionKind {
    /// Read-only and live-updating.
    Query,
    /// One-shot transactional write.
    Mutation,
    /// One-shot request that may reach outside the platform.
    Action,
}

impl FunctionKind {
    /// The route segment used by the HTTP API.
    pub fn as_str(&self) -> &'static str {
        match self {
            FunctionKind::Query => "query",
            FunctionKind::Mutation => "mutation",
            FunctionKind::Action => "action",
        }
    }
}

impl std::fmt::Display for FunctionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reference to one backend function.
pub trait Function: 'static {
    /// What kind of function this is.
    const KIND: FunctionKind;
    /// The function path, e.g. `chat:getMessages`.
    const PATH: &'static str;
    /// Arguments, encoded as a JSON object.
    type Args: Serialize + Send + Sync + 'static;
    /// Decoded return value.
    type Output: DeserializeOwned + Clone + Send + Sync + 'static;
}

/// Marker for functions that can be subscribed to.
pub trait QueryFunction: Function {}

/// Marker for functions invoked as mutations.
pub trait MutationFunction: Function {}

/// Marker for functions invoked as actions.
pub trait ActionFunction: Function {}

/// Arguments for a function that takes none.  Encodes as `{}`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoArgs {}

/// Arguments for a live query, or a request not to subscribe at all.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueryArgs<A> {
    /// Subscribe with these arguments.
    Args(A),
    /// Hold no subscription.
    Skip,
}

impl<A> QueryArgs<A> {
    /// Returns true for [`QueryArgs::Skip`].
    pub fn is_skip(&self) -> bool {
        matches!(self, QueryArgs::Skip)
    }
}

impl<A: Default> Default for QueryArgs<A> {
    fn default() -> Self {
        QueryArgs::Args(A::default())
    }
}

impl<A> From<A> for QueryArgs<A> {
    fn from(args: A) -> Self {
        QueryArgs::Args(args)
    }
}

impl<A> From<Option<A>> for QueryArgs<A> {
    fn from(args: Option<A>) -> Self {
        match args {
            Some(args) => QueryArgs::Args(args),
            None => QueryArgs::Skip,
        }
    }
}
