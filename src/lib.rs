//! A real-time chat client over a reactive backend platform.
//!
//! The platform owns storage and pushes fresh query results to subscribers.
//! This crate binds those pushes into observable cells ([`LiveQuery`]), wraps
//! one-shot writes ([`MutationFn`], [`ActionFn`]), and builds a small chat view
//! on top ([`chat::ChatView`]).

// Public modules
pub mod api;
pub mod chat;
pub mod client;
pub mod client_logger;
pub mod convex;
pub mod error;
pub mod function;
pub mod identity;
pub mod mutation;
pub mod query;
pub mod reactive;
pub mod render;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

mod observability;

// Re-exports
pub use client::{ConvexHttpClient, PlatformClient, Unsubscribe};
pub use client_logger::{ClientLogger, TracingClientLogger};
pub use convex::Convex;
pub use error::{Error, Result};
pub use function::{
    ActionFunction, Function, FunctionKind, MutationFunction, NoArgs, QueryArgs, QueryFunction,
};
pub use identity::{
    FileSessionStorage, MemorySessionStorage, NameGenerator, RandomNames, SessionStorage,
    get_or_set_fake_name,
};
pub use mutation::{ActionFn, MutationFn};
pub use observability::register_biometrics;
pub use query::{LiveQuery, QueryState};
pub use reactive::{Scope, Signal, defer, effect};
