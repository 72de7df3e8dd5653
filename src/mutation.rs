//! One-shot calls: mutations and actions.
//!
//! Each call issues exactly one request through the client.  Retrying,
//! queuing and deduplication are left to the platform.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;

use crate::client::PlatformClient;
use crate::error::{Error, Result};
use crate::function::{ActionFunction, Function, MutationFunction};
use crate::observability::{
    ACTION_CALLS, ACTION_ERRORS, MUTATION_CALLS, MUTATION_DURATION, MUTATION_ERRORS,
};

fn decode<F: Function>(value: Value) -> Result<F::Output> {
    serde_json::from_value(value).map_err(|e| {
        Error::serialization(
            format!("Failed to decode result of {}: {}", F::PATH, e),
            Some(Box::new(e)),
        )
    })
}

/// A callable handle for one mutation.
pub struct MutationFn<M: MutationFunction> {
    client: Arc<dyn PlatformClient>,
    _mutation: PhantomData<fn() -> M>,
}

impl<M: MutationFunction> MutationFn<M> {
    /// Wraps `client`.
    pub fn new(client: Arc<dyn PlatformClient>) -> Self {
        Self {
            client,
            _mutation: PhantomData,
        }
    }

    /// Runs the mutation once with `args`.
    ///
    /// ```
    /// # use livechat::Convex;
    /// # use livechat::api::chat::{SendMessage, SendMessageArgs};
    /// # use livechat::test_support::ScriptedClient;
    /// # tokio_test::block_on(async {
    /// let client = ScriptedClient::new();
    /// let send = Convex::new(client.clone()).create_mutation::<SendMessage>();
    /// send.call(SendMessageArgs {
    ///     user: "Ann".to_string(),
    ///     body: "hi".to_string(),
    /// })
    /// .await
    /// .unwrap();
    /// assert_eq!(client.mutations().len(), 1);
    /// # });
    /// ```
    pub async fn call(&self, args: M::Args) -> Result<M::Output> {
        let args = serde_json::to_value(&args)?;
        MUTATION_CALLS.click();
        tracing::debug!(path = M::PATH, "calling mutation");
        let start = Instant::now();
        let result = self.client.mutation(M::PATH, args).await;
        MUTATION_DURATION.add(start.elapsed().as_secs_f64());
        match result {
            Ok(value) => decode::<M>(value),
            Err(err) => {
                MUTATION_ERRORS.click();
                tracing::debug!(path = M::PATH, error = %err, "mutation failed");
                Err(err)
            }
        }
    }
}

impl<M: MutationFunction> Clone for MutationFn<M> {
    fn clone(&self) -> Self {
        Self::new(Arc::clone(&self.client))
    }
}

impl<M: MutationFunction> fmt::Debug for MutationFn<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationFn").field("path", &M::PATH).finish()
    }
}

/// A callable handle for one action.
pub struct ActionFn<A: ActionFunction> {
    client: Arc<dyn PlatformClient>,
    _action: PhantomData<fn() -> A>,
}

impl<A: ActionFunction> ActionFn<A> {
    /// Wraps `client`.
    pub fn new(client: Arc<dyn PlatformClient>) -> Self {
        Self {
            client,
            _action: PhantomData,
        }
    }

    /// Runs the action once with `args`.
    pub async fn call(&self, args: A::Args) -> Result<A::Output> {
        let args = serde_json::to_value(&args)?;
        ACTION_CALLS.click();
        tracing::debug!(path = A::PATH, "calling action");
        match self.client.action(A::PATH, args).await {
            Ok(value) => decode::<A>(value),
            Err(err) => {
                ACTION_ERRORS.click();
                Err(err)
            }
        }
    }
}

impl<A: ActionFunction> Clone for ActionFn<A> {
    fn clone(&self) -> Self {
        Self::new(Arc::clone(&self.client))
    }
}

impl<A: ActionFunction> fmt::Debug for ActionFn<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionFn").field("path", &A::PATH).finish()
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    use super::*;
    use crate::function::FunctionKind;
    use crate::test_support::{CallRecord, ScriptedClient};

    #[derive(Clone, Debug, Serialize, Deserialize)]
    struct Amount {
        amount: i64,
    }

    struct Deposit;

    impl Function for Deposit {
        const KIND: FunctionKind = FunctionKind::Mutation;
        const PATH: &'static str = "bank:deposit";
        type Args = Amount;
        type Output = i64;
    }

    impl MutationFunction for Deposit {}

    struct Notify;

    impl Function for Notify {
        const KIND: FunctionKind = FunctionKind::Action;
        const PATH: &'static str = "bank:notify";
        type Args = Amount;
        type Output = Value;
    }

    impl ActionFunction for Notify {}

    #[tokio::test]
    async fn mutation_forwards_once() {
        let client = ScriptedClient::new();
        client.reply_to_mutation(Ok(json!(150)));
        let deposit: MutationFn<Deposit> = MutationFn::new(Arc::new(client.clone()));
        let balance = deposit.call(Amount { amount: 50 }).await.unwrap();
        assert_eq!(balance, 150);
        assert_eq!(
            client.mutations(),
            vec![CallRecord {
                path: "bank:deposit".to_string(),
                args: json!({"amount": 50}),
            }]
        );
    }

    #[tokio::test]
    async fn mutation_failure_is_returned_without_retry() {
        let client = ScriptedClient::new();
        client.reply_to_mutation(Err(Error::function("bank:deposit", "closed", None)));
        let deposit: MutationFn<Deposit> = MutationFn::new(Arc::new(client.clone()));
        let err = deposit.call(Amount { amount: 1 }).await.unwrap_err();
        assert!(err.is_function());
        assert_eq!(client.mutations().len(), 1);
    }

    #[tokio::test]
    async fn mutation_result_must_decode() {
        let client = ScriptedClient::new();
        client.reply_to_mutation(Ok(json!("lots")));
        let deposit: MutationFn<Deposit> = MutationFn::new(Arc::new(client.clone()));
        let err = deposit.call(Amount { amount: 1 }).await.unwrap_err();
        assert!(err.is_serialization());
    }

    #[tokio::test]
    async fn action_forwards_once() {
        let client = ScriptedClient::new();
        let notify: ActionFn<Notify> = ActionFn::new(Arc::new(client.clone()));
        let out = notify.call(Amount { amount: 7 }).await.unwrap();
        assert_eq!(out, Value::Null);
        assert_eq!(client.actions().len(), 1);
        assert_eq!(client.actions()[0].path, "bank:notify");
        assert!(client.mutations().is_empty());
    }
}
