use biometrics::{Collector, Counter, Moments};

pub(crate) static CLIENT_REQUESTS: Counter = Counter::new("livechat.client.requests");
pub(crate) static CLIENT_REQUEST_ERRORS: Counter = Counter::new("livechat.client.request_errors");
pub(crate) static CLIENT_REQUEST_DURATION: Moments =
    Moments::new("livechat.client.request_duration_seconds");
pub(crate) static CLIENT_POLLS: Counter = Counter::new("livechat.client.polls");
pub(crate) static CLIENT_POLLS_UNCHANGED: Counter = Counter::new("livechat.client.polls_unchanged");

pub(crate) static QUERY_SUBSCRIBES: Counter = Counter::new("livechat.query.subscribes");
pub(crate) static QUERY_UNSUBSCRIBES: Counter = Counter::new("livechat.query.unsubscribes");
pub(crate) static QUERY_PUSHES: Counter = Counter::new("livechat.query.pushes");
pub(crate) static QUERY_ERRORS: Counter = Counter::new("livechat.query.errors");
pub(crate) static QUERY_STALE_PUSHES: Counter = Counter::new("livechat.query.stale_pushes");

pub(crate) static MUTATION_CALLS: Counter = Counter::new("livechat.mutation.calls");
pub(crate) static MUTATION_ERRORS: Counter = Counter::new("livechat.mutation.errors");
pub(crate) static MUTATION_DURATION: Moments =
    Moments::new("livechat.mutation.duration_seconds");
pub(crate) static ACTION_CALLS: Counter = Counter::new("livechat.action.calls");
pub(crate) static ACTION_ERRORS: Counter = Counter::new("livechat.action.errors");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&CLIENT_REQUESTS);
    collector.register_counter(&CLIENT_REQUEST_ERRORS);
    collector.register_moments(&CLIENT_REQUEST_DURATION);
    collector.register_counter(&CLIENT_POLLS);
    collector.register_counter(&CLIENT_POLLS_UNCHANGED);

    collector.register_counter(&QUERY_SUBSCRIBES);
    collector.register_counter(&QUERY_UNSUBSCRIBES);
    collector.register_counter(&QUERY_PUSHES);
    collector.register_counter(&QUERY_ERRORS);
    collector.register_counter(&QUERY_STALE_PUSHES);

    collector.register_counter(&MUTATION_CALLS);
    collector.register_counter(&MUTATION_ERRORS);
    collector.register_moments(&MUTATION_DURATION);
    collector.register_counter(&ACTION_CALLS);
    collector.register_counter(&ACTION_ERRORS);
}
