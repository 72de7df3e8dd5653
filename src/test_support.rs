//! An in-process [`PlatformClient`] driven by the test.
//!
//! [`ScriptedClient`] records every subscription, mutation and action it is
//! asked for.  Tests decide when results arrive by calling
//! [`ScriptedClient::push`] or [`ScriptedClient::fail`], and can hold
//! mutations in flight with [`ScriptedClient::hold_mutations`].
//!
//! # Example
//!
//! ```
//! use livechat::test_support::ScriptedClient;
//! use livechat::api::chat::GetMessages;
//! use livechat::{Convex, Scope};
//!
//! let client = ScriptedClient::new();
//! let convex = Convex::new(client.clone());
//! let scope = Scope::new();
//! let messages = convex.create_query::<GetMessages>(&scope).unwrap();
//! client.push_to("chat:getMessages", serde_json::json!([{"user": "Ann", "body": "hi"}]));
//! assert_eq!(messages.get().unwrap().unwrap().len(), 1);
//! scope.dispose();
//! assert_eq!(client.unsubscribe_count(), 1);
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use tokio::sync::Semaphore;

use crate::client::{OnError, OnResult, PlatformClient, Unsubscribe};
use crate::error::{Error, Result};

/// One subscription as seen by the client.
#[derive(Clone, Debug, PartialEq)]
pub struct SubscriptionInfo {
    /// Identifier assigned in subscribe order, starting at 0.
    pub id: usize,
    /// Query path.
    pub path: String,
    /// Arguments the subscription was opened with.
    pub args: Value,
    /// How many times its `Unsubscribe` ran.
    pub unsubscribes: usize,
}

impl SubscriptionInfo {
    /// Returns true while no unsubscribe has run.
    pub fn is_open(&self) -> bool {
        self.unsubscribes == 0
    }
}

/// One mutation or action call.
#[derive(Clone, Debug, PartialEq)]
pub struct CallRecord {
    /// Function path.
    pub path: String,
    /// Arguments it was called with.
    pub args: Value,
}

struct Subscription {
    info: SubscriptionInfo,
    on_result: Option<OnResult>,
    on_error: Option<OnError>,
}

#[derive(Default)]
struct Script {
    subscriptions: Vec<Subscription>,
    initial: HashMap<String, Value>,
    mutations: Vec<CallRecord>,
    actions: Vec<CallRecord>,
    mutation_replies: VecDeque<Result<Value>>,
    action_replies: VecDeque<Result<Value>>,
    mutation_gate: Option<Arc<Semaphore>>,
}

/// A scripted, in-memory platform client.  Clones share one script.
#[derive(Clone, Default)]
pub struct ScriptedClient {
    script: Arc<Mutex<Script>>,
}

enum Delivery {
    Result(Value),
    Error(Error),
}

impl ScriptedClient {
    /// Creates a client with nothing scripted.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Every new subscription to `path` receives `value` before `on_update`
    /// returns.
    pub fn with_initial_result(self, path: &str, value: Value) -> Self {
        self.lock().initial.insert(path.to_string(), value);
        self
    }

    /// All subscriptions opened so far, in order.
    pub fn subscriptions(&self) -> Vec<SubscriptionInfo> {
        self.lock()
            .subscriptions
            .iter()
            .map(|s| s.info.clone())
            .collect()
    }

    /// Subscriptions that have not been closed.
    pub fn open_subscriptions(&self) -> Vec<SubscriptionInfo> {
        self.subscriptions()
            .into_iter()
            .filter(SubscriptionInfo::is_open)
            .collect()
    }

    /// Number of `on_update` calls.
    pub fn subscribe_count(&self) -> usize {
        self.lock().subscriptions.len()
    }

    /// Number of unsubscribe calls across all subscriptions.
    pub fn unsubscribe_count(&self) -> usize {
        self.lock()
            .subscriptions
            .iter()
            .map(|s| s.info.unsubscribes)
            .sum()
    }

    /// Delivers `value` to subscription `id`, open or not.
    pub fn push(&self, id: usize, value: Value) {
        self.deliver(id, Delivery::Result(value));
    }

    /// Delivers `error` to subscription `id`, open or not.
    pub fn fail(&self, id: usize, error: Error) {
        self.deliver(id, Delivery::Error(error));
    }

    /// Delivers `value` to every open subscription of `path`.
    pub fn push_to(&self, path: &str, value: Value) {
        for id in self.open_ids(path) {
            self.push(id, value.clone());
        }
    }

    /// Delivers `error` to every open subscription of `path`.
    pub fn fail_to(&self, path: &str, error: Error) {
        for id in self.open_ids(path) {
            self.fail(id, error.clone());
        }
    }

    fn open_ids(&self, path: &str) -> Vec<usize> {
        self.lock()
            .subscriptions
            .iter()
            .filter(|s| s.info.is_open() && s.info.path == path)
            .map(|s| s.info.id)
            .collect()
    }

    // Callbacks run without the script lock so they may call back into the
    // client, for instance by unsubscribing.
    fn deliver(&self, id: usize, delivery: Delivery) {
        match delivery {
            Delivery::Result(value) => {
                let callback = self
                    .lock()
                    .subscriptions
                    .get_mut(id)
                    .and_then(|s| s.on_result.take());
                if let Some(mut callback) = callback {
                    callback(value);
                    if let Some(s) = self.lock().subscriptions.get_mut(id) {
                        s.on_result = Some(callback);
                    }
                }
            }
            Delivery::Error(error) => {
                let callback = self
                    .lock()
                    .subscriptions
                    .get_mut(id)
                    .and_then(|s| s.on_error.take());
                if let Some(mut callback) = callback {
                    callback(error);
                    if let Some(s) = self.lock().subscriptions.get_mut(id) {
                        s.on_error = Some(callback);
                    }
                }
            }
        }
    }

    /// Mutation calls so far, in order.
    pub fn mutations(&self) -> Vec<CallRecord> {
        self.lock().mutations.clone()
    }

    /// Action calls so far, in order.
    pub fn actions(&self) -> Vec<CallRecord> {
        self.lock().actions.clone()
    }

    /// Queues the outcome of the next unanswered mutation.  Mutations with
    /// nothing queued return `null`.
    pub fn reply_to_mutation(&self, reply: Result<Value>) {
        self.lock().mutation_replies.push_back(reply);
    }

    /// Queues the outcome of the next unanswered action.
    pub fn reply_to_action(&self, reply: Result<Value>) {
        self.lock().action_replies.push_back(reply);
    }

    /// Makes every later mutation wait for [`ScriptedClient::release_mutation`]
    /// after it is recorded.
    pub fn hold_mutations(&self) {
        self.lock().mutation_gate = Some(Arc::new(Semaphore::new(0)));
    }

    /// Lets one held mutation complete.
    pub fn release_mutation(&self) {
        if let Some(gate) = &self.lock().mutation_gate {
            gate.add_permits(1);
        }
    }
}

#[async_trait::async_trait]
impl PlatformClient for ScriptedClient {
    fn on_update(
        &self,
        path: &str,
        args: Value,
        mut on_result: OnResult,
        on_error: OnError,
    ) -> Unsubscribe {
        let (id, initial) = {
            let mut script = self.lock();
            let id = script.subscriptions.len();
            let initial = script.initial.get(path).cloned();
            script.subscriptions.push(Subscription {
                info: SubscriptionInfo {
                    id,
                    path: path.to_string(),
                    args,
                    unsubscribes: 0,
                },
                on_result: None,
                on_error: Some(on_error),
            });
            (id, initial)
        };
        if let Some(value) = initial {
            on_result(value);
        }
        if let Some(s) = self.lock().subscriptions.get_mut(id) {
            s.on_result = Some(on_result);
        }

        let script = Arc::clone(&self.script);
        Unsubscribe::new(move || {
            let mut script = script.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(s) = script.subscriptions.get_mut(id) {
                s.info.unsubscribes += 1;
            }
        })
    }

    async fn mutation(&self, path: &str, args: Value) -> Result<Value> {
        let gate = {
            let mut script = self.lock();
            script.mutations.push(CallRecord {
                path: path.to_string(),
                args,
            });
            script.mutation_gate.clone()
        };
        if let Some(gate) = gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|_| Error::connection("scripted client shut down", None))?;
            permit.forget();
        }
        self.lock()
            .mutation_replies
            .pop_front()
            .unwrap_or(Ok(Value::Null))
    }

    async fn action(&self, path: &str, args: Value) -> Result<Value> {
        let mut script = self.lock();
        script.actions.push(CallRecord {
            path: path.to_string(),
            args,
        });
        script.action_replies.pop_front().unwrap_or(Ok(Value::Null))
    }
}
