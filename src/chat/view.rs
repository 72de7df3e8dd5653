//! The chat view: the message list, the compose draft and submission.
//!
//! The view owns no I/O of its own.  Messages arrive through a live query,
//! submissions go out through a mutation, and "scroll to bottom" is delegated
//! to a [`ScrollTarget`] so a terminal, a test, or anything else can decide
//! what it means.

use std::fmt;
use std::sync::Arc;

use tokio::sync::Notify;

use crate::api::chat::{ChatMessage, GetMessages, SendMessage, SendMessageArgs};
use crate::convex::Convex;
use crate::error::Result;
use crate::mutation::MutationFn;
use crate::query::LiveQuery;
use crate::reactive::{Scope, Signal, defer, effect};
use crate::render::Renderer;

/// Something that can be scrolled to its newest content.
pub trait ScrollTarget: Send + Sync {
    /// Bring the newest message into view.
    fn scroll_to_bottom(&self);
}

/// A notify-based target: each scroll wakes one waiter, or leaves a permit for
/// the next one.
impl ScrollTarget for Notify {
    fn scroll_to_bottom(&self) {
        self.notify_one();
    }
}

/// Whether a submission is in flight.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ViewState {
    /// Ready to submit.
    #[default]
    Idle,
    /// Waiting for the send mutation to settle.
    Submitting,
}

// Returns the view to Idle however the submit future ends, including when it
// is dropped mid-flight.
struct IdleOnDrop(Signal<ViewState>);

impl Drop for IdleOnDrop {
    fn drop(&mut self) {
        self.0.set(ViewState::Idle);
    }
}

/// One mounted chat view.
///
/// Clones share the same draft, state and subscription.
#[derive(Clone)]
pub struct ChatView {
    name: Arc<str>,
    messages: LiveQuery<GetMessages>,
    send: MutationFn<SendMessage>,
    draft: Signal<String>,
    state: Signal<ViewState>,
}

impl ChatView {
    /// Mounts the view under `scope`.
    ///
    /// Subscribes to the message list and arranges for `scroll` to be asked to
    /// scroll once after mounting and once after every change to the list,
    /// each time on a later turn of the runtime.  Disposing `scope` closes the
    /// subscription and stops the scrolling.
    ///
    /// Must be called from within a tokio runtime.
    pub fn mount(
        convex: &Convex,
        scope: &Scope,
        name: impl Into<String>,
        scroll: Arc<dyn ScrollTarget>,
    ) -> Result<Self> {
        let name: Arc<str> = Arc::from(name.into());
        let messages = convex.create_query::<GetMessages>(scope)?;
        let send = convex.create_mutation::<SendMessage>();
        effect(scope, &messages.signal(), move |_| {
            let scroll = Arc::clone(&scroll);
            defer(move || scroll.scroll_to_bottom());
        });
        tracing::debug!(name = %name, "chat view mounted");
        Ok(Self {
            name,
            messages,
            send,
            draft: Signal::new(String::new()),
            state: Signal::new(ViewState::Idle),
        })
    }

    /// The identity this view posts as.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The current message list, oldest first.  Empty until the first result
    /// arrives; the subscription's error if the last event was a failure.
    pub fn messages(&self) -> Result<Vec<ChatMessage>> {
        Ok(self.messages.get()?.unwrap_or_default())
    }

    /// The underlying live query.
    pub fn messages_query(&self) -> &LiveQuery<GetMessages> {
        &self.messages
    }

    pub fn draft(&self) -> String {
        self.draft.get()
    }

    pub fn set_draft(&self, text: impl Into<String>) {
        self.draft.set(text.into());
    }

    /// The draft as an observable cell.
    pub fn draft_signal(&self) -> Signal<String> {
        self.draft.clone()
    }

    pub fn state(&self) -> ViewState {
        self.state.get()
    }

    /// True when idle with a non-empty draft.
    pub fn can_submit(&self) -> bool {
        self.state() == ViewState::Idle && self.draft.with(|d| !d.is_empty())
    }

    /// Sends the draft as a message from this view's identity.
    ///
    /// Returns `Ok(false)` without sending when [`ChatView::can_submit`] is
    /// false.  Otherwise the view is `Submitting` until the mutation settles.
    /// The draft is cleared only when the mutation succeeds; a failure leaves
    /// it in place and is returned.
    pub async fn submit(&self) -> Result<bool> {
        let body = self.draft();
        if body.is_empty() {
            return Ok(false);
        }
        let started = self.state.update_if(|state| {
            if *state != ViewState::Idle {
                return false;
            }
            *state = ViewState::Submitting;
            true
        });
        if !started {
            return Ok(false);
        }
        let _idle = IdleOnDrop(self.state.clone());

        let args = SendMessageArgs {
            user: self.name.to_string(),
            body,
        };
        self.send.call(args).await?;
        self.draft.set(String::new());
        Ok(true)
    }

    /// True when `message` was sent under this view's identity.
    pub fn is_mine(&self, message: &ChatMessage) -> bool {
        message.user == *self.name
    }

    /// Prints the messages `cursor` has not yet seen.  Returns how many were
    /// printed.
    pub fn render_tail(
        &self,
        cursor: &mut TailCursor,
        renderer: &mut dyn Renderer,
    ) -> Result<usize> {
        let messages = self.messages()?;
        let unseen = cursor.unseen(&messages);
        for message in unseen {
            renderer.print_message(message, self.is_mine(message));
        }
        Ok(unseen.len())
    }
}

impl fmt::Debug for ChatView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatView")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("draft", &self.draft())
            .finish_non_exhaustive()
    }
}

/// Remembers the last message a line-oriented display has printed.
///
/// Position is tracked by document id when the platform supplies one, then by
/// creation time, then by count.
#[derive(Clone, Debug, Default)]
pub struct TailCursor {
    last_id: Option<String>,
    last_time: Option<f64>,
    seen: usize,
}

impl TailCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the suffix of `messages` not returned by an earlier call, and
    /// advances past it.
    pub fn unseen<'a>(&mut self, messages: &'a [ChatMessage]) -> &'a [ChatMessage] {
        let by_id = self.last_id.as_deref().and_then(|id| {
            messages
                .iter()
                .rposition(|m| m.id.as_deref() == Some(id))
                .map(|i| i + 1)
        });
        let by_time = || {
            self.last_time.map(|last| {
                messages
                    .iter()
                    .position(|m| m.creation_time.is_some_and(|t| t > last))
                    .unwrap_or(messages.len())
            })
        };
        let start = by_id
            .or_else(by_time)
            .unwrap_or(self.seen)
            .min(messages.len());

        if let Some(last) = messages.last() {
            self.last_id = last.id.clone();
            self.last_time = last.creation_time;
        }
        self.seen = messages.len();
        &messages[start..]
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::error::Error;
    use crate::function::Function;
    use crate::test_support::ScriptedClient;

    #[derive(Default)]
    struct CountingScroll(AtomicUsize);

    impl ScrollTarget for CountingScroll {
        fn scroll_to_bottom(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn mount(client: &ScriptedClient, scope: &Scope) -> (ChatView, Arc<CountingScroll>) {
        let scroll = Arc::new(CountingScroll::default());
        let view = ChatView::mount(
            &Convex::new(client.clone()),
            scope,
            "Ann",
            Arc::clone(&scroll) as Arc<dyn ScrollTarget>,
        )
        .unwrap();
        (view, scroll)
    }

    fn stamped(id: &str, time: f64, user: &str, body: &str) -> ChatMessage {
        ChatMessage {
            id: Some(id.to_string()),
            creation_time: Some(time),
            user: user.to_string(),
            body: body.to_string(),
        }
    }

    #[tokio::test]
    async fn empty_draft_cannot_submit() {
        let client = ScriptedClient::new();
        let scope = Scope::new();
        let (view, _) = mount(&client, &scope);
        assert!(!view.can_submit());
        assert!(!view.submit().await.unwrap());
        assert!(client.mutations().is_empty());
    }

    #[tokio::test]
    async fn successful_submit_clears_draft() {
        let client = ScriptedClient::new();
        let scope = Scope::new();
        let (view, _) = mount(&client, &scope);
        view.set_draft("hello");
        assert!(view.can_submit());
        assert!(view.submit().await.unwrap());
        assert_eq!(view.draft(), "");
        assert_eq!(view.state(), ViewState::Idle);
        let calls = client.mutations();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].path, SendMessage::PATH);
        assert_eq!(calls[0].args, json!({"user": "Ann", "body": "hello"}));
    }

    #[tokio::test]
    async fn failed_submit_keeps_draft() {
        let client = ScriptedClient::new();
        client.reply_to_mutation(Err(Error::function("chat:sendMessage", "nope", None)));
        let scope = Scope::new();
        let (view, _) = mount(&client, &scope);
        view.set_draft("hello");
        let err = view.submit().await.unwrap_err();
        assert!(err.is_function());
        assert_eq!(view.draft(), "hello");
        assert_eq!(view.state(), ViewState::Idle);
        assert!(view.can_submit());
    }

    #[tokio::test]
    async fn second_submit_while_in_flight_is_refused() {
        let client = ScriptedClient::new();
        client.hold_mutations();
        let scope = Scope::new();
        let (view, _) = mount(&client, &scope);
        view.set_draft("one");

        let first = tokio::spawn({
            let view = view.clone();
            async move { view.submit().await }
        });
        while client.mutations().is_empty() {
            tokio::task::yield_now().await;
        }
        assert_eq!(view.state(), ViewState::Submitting);
        assert!(!view.can_submit());
        assert!(!view.submit().await.unwrap());
        assert_eq!(view.draft(), "one");

        client.release_mutation();
        assert!(first.await.unwrap().unwrap());
        assert_eq!(client.mutations().len(), 1);
        assert_eq!(view.state(), ViewState::Idle);
        assert_eq!(view.draft(), "");
    }

    #[tokio::test]
    async fn messages_follow_pushes_and_errors() {
        let client = ScriptedClient::new();
        let scope = Scope::new();
        let (view, _) = mount(&client, &scope);
        assert!(view.messages().unwrap().is_empty());

        client.push_to(GetMessages::PATH, json!([{"user": "Bo", "body": "yo"}]));
        let messages = view.messages().unwrap();
        assert_eq!(messages, vec![ChatMessage::new("Bo", "yo")]);
        assert!(!view.is_mine(&messages[0]));
        assert!(view.is_mine(&ChatMessage::new("Ann", "hi")));

        client.fail_to(GetMessages::PATH, Error::service_unavailable("down", None));
        assert!(view.messages().is_err());
    }

    #[tokio::test]
    async fn scrolls_after_mount_and_each_change() {
        let client = ScriptedClient::new();
        let scope = Scope::new();
        let (_view, scroll) = mount(&client, &scope);
        // Scrolling is deferred, never synchronous with the trigger.
        assert_eq!(scroll.0.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(scroll.0.load(Ordering::SeqCst), 1);

        client.push_to(GetMessages::PATH, json!([{"user": "Bo", "body": "yo"}]));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(scroll.0.load(Ordering::SeqCst), 2);

        scope.dispose();
        client.push_to(GetMessages::PATH, json!([]));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(scroll.0.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn tail_cursor_by_id() {
        let mut cursor = TailCursor::new();
        let first = vec![stamped("a", 1.0, "Ann", "hi")];
        assert_eq!(cursor.unseen(&first).len(), 1);
        assert!(cursor.unseen(&first).is_empty());

        let second = vec![
            stamped("a", 1.0, "Ann", "hi"),
            stamped("b", 2.0, "Bo", "yo"),
            stamped("c", 3.0, "Cy", "hey"),
        ];
        let unseen = cursor.unseen(&second);
        assert_eq!(unseen.len(), 2);
        assert_eq!(unseen[0].body, "yo");
        // A windowed list that dropped the oldest entries.
        let third = vec![stamped("c", 3.0, "Cy", "hey"), stamped("d", 4.0, "Di", "sup")];
        let unseen = cursor.unseen(&third);
        assert_eq!(unseen.len(), 1);
        assert_eq!(unseen[0].body, "sup");
    }

    #[test]
    fn tail_cursor_by_time_then_count() {
        let mut cursor = TailCursor::new();
        let mut a = stamped("x", 5.0, "Ann", "hi");
        a.id = None;
        assert_eq!(cursor.unseen(std::slice::from_ref(&a)).len(), 1);
        let mut b = stamped("y", 6.0, "Bo", "yo");
        b.id = None;
        assert_eq!(cursor.unseen(&[a.clone(), b.clone()]), &[b][..]);

        let mut plain = TailCursor::new();
        let list = vec![ChatMessage::new("Ann", "hi"), ChatMessage::new("Bo", "yo")];
        assert_eq!(plain.unseen(&list[..1]).len(), 1);
        assert_eq!(plain.unseen(&list), &list[1..]);
        assert!(plain.unseen(&list).is_empty());
    }
}
