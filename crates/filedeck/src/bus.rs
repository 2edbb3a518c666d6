//! Type-keyed publish/subscribe dispatcher.
//!
//! Subscribers are stored per event type in subscription order. Every
//! publish works on a snapshot of that list, so subscribing or
//! unsubscribing while a publish is in flight never disturbs it (and the
//! in-flight publish is not guaranteed to observe the change).
//!
//! ```text
//! publish(e)                         publish_concurrent(e)
//!   sync   S1 -> S2 -> S4              sync   S1 -> S2 -> S4
//!   async  A3 -> A5  (one at a time)   async  A3 ┐
//!                                             A5 ┴─ join_all
//! ```
//!
//! A handler that returns an error or panics is logged and skipped; the
//! remaining handlers still run and the publisher never sees the failure.

use std::any::{Any, TypeId};
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use futures::future::join_all;
use futures::FutureExt;
use smallvec::SmallVec;
use tokio::runtime::{Builder, Handle, Runtime, RuntimeFlavor};
use tracing::{debug, error, trace};

use crate::core::{Event, EventKey, HandlerKind, SubscriptionId};
use crate::error::{FiledeckError, Result};
use crate::handler::{AsyncEventHandler, EventHandler};

type SubscriberList<E> = SmallVec<[Subscriber<E>; 4]>;

enum Handler<E: Event> {
    Sync(Arc<dyn EventHandler<E>>),
    Async(Arc<dyn AsyncEventHandler<E>>),
}

impl<E: Event> Clone for Handler<E> {
    fn clone(&self) -> Self {
        match self {
            Self::Sync(handler) => Self::Sync(Arc::clone(handler)),
            Self::Async(handler) => Self::Async(Arc::clone(handler)),
        }
    }
}

impl<E: Event> Handler<E> {
    /// Address of the handler allocation, ignoring vtables.
    fn data_ptr(&self) -> *const () {
        match self {
            Self::Sync(handler) => Arc::as_ptr(handler).cast::<()>(),
            Self::Async(handler) => Arc::as_ptr(handler).cast::<()>(),
        }
    }

    fn kind(&self) -> HandlerKind {
        match self {
            Self::Sync(_) => HandlerKind::Sync,
            Self::Async(_) => HandlerKind::Async,
        }
    }
}

struct Subscriber<E: Event> {
    id: SubscriptionId,
    handler: Handler<E>,
}

impl<E: Event> Clone for Subscriber<E> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            handler: self.handler.clone(),
        }
    }
}

/// Subscriber list for one event type, type-erased so one map holds them all.
struct RegistryEntry {
    key: EventKey,
    list: Arc<dyn Any + Send + Sync>,
    len: usize,
}

impl RegistryEntry {
    fn new<E: Event>() -> Self {
        Self {
            key: EventKey::of::<E>(),
            list: Arc::new(SubscriberList::<E>::new()),
            len: 0,
        }
    }

    fn typed<E: Event>(&self) -> Result<Arc<SubscriberList<E>>> {
        Arc::clone(&self.list)
            .downcast::<SubscriberList<E>>()
            .map_err(|_| {
                FiledeckError::Internal(format!(
                    "subscriber list for {} does not hold {}",
                    self.key.name(),
                    EventKey::of::<E>().name()
                ))
            })
    }

    fn replace<E: Event>(&mut self, list: SubscriberList<E>) {
        self.len = list.len();
        self.list = Arc::new(list);
    }
}

/// In-process event bus.
///
/// Cloning yields another handle to the same registry, so one bus can be
/// shared across services for the lifetime of a session.
#[derive(Clone, Default)]
pub struct EventBus {
    registry: Arc<DashMap<TypeId, RegistryEntry>>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("event_types", &self.registry.len())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler invoked inline on every publish of `E`.
    pub fn subscribe<E, H>(&self, handler: Arc<H>) -> SubscriptionId
    where
        E: Event,
        H: EventHandler<E>,
    {
        self.insert(Handler::<E>::Sync(handler))
    }

    /// Register a closure as a sync handler.
    ///
    /// The closure cannot be unsubscribed by identity; keep the returned id.
    pub fn subscribe_fn<E, F>(&self, f: F) -> SubscriptionId
    where
        E: Event,
        F: Fn(&E) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.subscribe::<E, F>(Arc::new(f))
    }

    /// Register a handler whose work is awaited after the sync handlers.
    pub fn subscribe_async<E, H>(&self, handler: Arc<H>) -> SubscriptionId
    where
        E: Event,
        H: AsyncEventHandler<E>,
    {
        self.insert(Handler::<E>::Async(handler))
    }

    fn insert<E: Event>(&self, handler: Handler<E>) -> SubscriptionId {
        let id = SubscriptionId::new();
        let kind = handler.kind();
        let mut entry = self
            .registry
            .entry(TypeId::of::<E>())
            .or_insert_with(RegistryEntry::new::<E>);

        let mut next = match entry.typed::<E>() {
            Ok(current) => (*current).clone(),
            Err(err) => {
                error!(error = %err, "replacing corrupt subscriber list");
                SubscriberList::<E>::new()
            }
        };
        next.push(Subscriber { id, handler });
        entry.replace(next);

        debug!(
            event_type = entry.key.name(),
            subscription_id = %id,
            kind = ?kind,
            subscribers = entry.len,
            "subscribed"
        );
        id
    }

    /// Remove the first subscription of `E` whose handler is `handler`.
    ///
    /// Identity is the `Arc` allocation, so the same handler registered
    /// twice is removed one registration at a time. Returns `false` (and
    /// changes nothing) when no such subscription exists.
    pub fn unsubscribe<E, H>(&self, handler: &Arc<H>) -> bool
    where
        E: Event,
        H: ?Sized,
    {
        let target = Arc::as_ptr(handler).cast::<()>();
        self.remove_first::<E>(|sub| sub.handler.data_ptr() == target)
    }

    /// Remove the subscription of `E` identified by `id`.
    pub fn unsubscribe_id<E: Event>(&self, id: SubscriptionId) -> bool {
        self.remove_first::<E>(|sub| sub.id == id)
    }

    fn remove_first<E: Event>(&self, matches: impl Fn(&Subscriber<E>) -> bool) -> bool {
        let Some(mut entry) = self.registry.get_mut(&TypeId::of::<E>()) else {
            return false;
        };
        let current = match entry.typed::<E>() {
            Ok(current) => current,
            Err(err) => {
                error!(error = %err, "cannot unsubscribe from corrupt subscriber list");
                return false;
            }
        };
        let Some(position) = current.iter().position(|sub| matches(sub)) else {
            return false;
        };

        let mut next = (*current).clone();
        let removed = next.remove(position);
        entry.replace(next);

        debug!(
            event_type = entry.key.name(),
            subscription_id = %removed.id,
            subscribers = entry.len,
            "unsubscribed"
        );
        true
    }

    /// Number of sync plus async subscribers for `E`.
    pub fn subscriber_count<E: Event>(&self) -> usize {
        self.registry
            .get(&TypeId::of::<E>())
            .map(|entry| entry.len)
            .unwrap_or(0)
    }

    /// Drop every subscription for every event type.
    pub fn clear_all_subscribers(&self) {
        self.registry.clear();
        debug!("cleared all subscribers");
    }

    fn snapshot<E: Event>(&self, key: EventKey) -> Result<Option<Arc<SubscriberList<E>>>> {
        let Some(entry) = self.registry.get(&key.type_id()) else {
            return Ok(None);
        };
        let snapshot = entry.typed::<E>();
        drop(entry);

        snapshot.map(Some).inspect_err(|err| {
            error!(event_type = key.name(), error = %err, "event dispatch failed");
        })
    }

    /// Publish `event`: sync handlers in subscription order, then each async
    /// handler in subscription order, awaiting one before starting the next.
    ///
    /// Handler failures are logged and never returned. An error means the
    /// registry itself is broken.
    pub async fn publish<E: Event>(&self, event: E) -> Result<()> {
        let key = EventKey::of::<E>();
        let Some(subscribers) = self.snapshot::<E>(key)? else {
            trace!(event_type = key.name(), "no subscribers");
            return Ok(());
        };

        dispatch_sync(key, &subscribers, &event);

        for sub in subscribers.iter() {
            if let Handler::Async(handler) = &sub.handler {
                guarded(key, sub.id, &**handler, &event).await;
            }
        }
        Ok(())
    }

    /// Publish from non-async code, blocking the calling thread until every
    /// handler has finished.
    ///
    /// Async handlers run on a tokio runtime, so they may use tokio timers
    /// and IO. Outside any runtime a shared current-thread runtime drives the
    /// publish. Inside a multi-thread runtime the worker is handed off with
    /// `block_in_place`. A current-thread runtime cannot be blocked without
    /// deadlocking, so that case is rejected; await [`publish`] there.
    ///
    /// [`publish`]: EventBus::publish
    pub fn publish_blocking<E: Event>(&self, event: E) -> Result<()> {
        match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(|| handle.block_on(self.publish(event)))
            }
            Ok(_) => Err(FiledeckError::InvalidArgument(
                "publish_blocking called on a current-thread runtime; await publish instead"
                    .into(),
            )),
            Err(_) => blocking_runtime()?.block_on(self.publish(event)),
        }
    }

    /// Publish `event`: sync handlers in subscription order, then every
    /// async handler started in subscription order and awaited together.
    ///
    /// Returns once all async handlers have settled, whatever order they
    /// finish in.
    pub async fn publish_concurrent<E: Event>(&self, event: E) -> Result<()> {
        let key = EventKey::of::<E>();
        let Some(subscribers) = self.snapshot::<E>(key)? else {
            trace!(event_type = key.name(), "no subscribers");
            return Ok(());
        };

        dispatch_sync(key, &subscribers, &event);

        let pending: Vec<_> = subscribers
            .iter()
            .filter_map(|sub| match &sub.handler {
                Handler::Async(handler) => Some(guarded(key, sub.id, &**handler, &event)),
                Handler::Sync(_) => None,
            })
            .collect();
        join_all(pending).await;
        Ok(())
    }
}

/// Runtime used by `publish_blocking` when the caller is not inside one.
fn blocking_runtime() -> Result<&'static Runtime> {
    static RUNTIME: OnceLock<Runtime> = OnceLock::new();
    if let Some(runtime) = RUNTIME.get() {
        return Ok(runtime);
    }
    let runtime = Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| FiledeckError::Internal(format!("cannot start blocking runtime: {err}")))?;
    Ok(RUNTIME.get_or_init(|| runtime))
}

fn dispatch_sync<E: Event>(key: EventKey, subscribers: &[Subscriber<E>], event: &E) {
    for sub in subscribers {
        if let Handler::Sync(handler) = &sub.handler {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler.handle(event)));
            report(key, sub.id, outcome);
        }
    }
}

/// Start an async handler and return a future that settles without error.
///
/// The handler is invoked immediately; a panic while producing its future is
/// reported the same way as a failure of the future itself.
fn guarded<'a, E: Event>(
    key: EventKey,
    id: SubscriptionId,
    handler: &'a dyn AsyncEventHandler<E>,
    event: &'a E,
) -> impl Future<Output = ()> + Send + 'a {
    let started = panic::catch_unwind(AssertUnwindSafe(|| handler.handle(event)));
    async move {
        let outcome = match started {
            Ok(operation) => AssertUnwindSafe(operation).catch_unwind().await,
            Err(payload) => Err(payload),
        };
        report(key, id, outcome);
    }
}

fn report(
    key: EventKey,
    id: SubscriptionId,
    outcome: std::thread::Result<anyhow::Result<()>>,
) {
    let reason = match outcome {
        Ok(Ok(())) => return,
        Ok(Err(err)) => format!("{err:#}"),
        Err(payload) => panic_message(payload.as_ref()),
    };
    let failure = FiledeckError::HandlerFailed {
        event_type: key.name(),
        subscription_id: id.as_uuid(),
        reason,
    };
    error!(
        event_type = key.name(),
        subscription_id = %id,
        error = %failure,
        "event handler failed"
    );
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {message}")
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::async_handler;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Debug, Clone)]
    struct FileRenamed {
        from: String,
        to: String,
    }

    #[derive(Debug, Clone)]
    struct WatchStarted;

    fn renamed() -> FileRenamed {
        FileRenamed {
            from: "scan001.pdf".into(),
            to: "invoice-2024-03.pdf".into(),
        }
    }

    type Journal = Arc<Mutex<Vec<String>>>;

    fn journal() -> Journal {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn entries(journal: &Journal) -> Vec<String> {
        journal.lock().unwrap().clone()
    }

    fn record(
        journal: &Journal,
        label: &'static str,
    ) -> impl Fn(&FileRenamed) -> anyhow::Result<()> + Send + Sync + 'static {
        let journal = journal.clone();
        move |_| {
            journal.lock().unwrap().push(label.to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn failing_handler_does_not_stop_the_others() {
        let bus = EventBus::new();
        let log = journal();

        bus.subscribe_fn(record(&log, "s1"));
        let failing = log.clone();
        bus.subscribe_fn(move |_: &FileRenamed| {
            failing.lock().unwrap().push("s2".into());
            anyhow::bail!("index unavailable")
        });
        bus.subscribe_fn(record(&log, "s3"));

        bus.publish(renamed()).await.unwrap();

        assert_eq!(entries(&log), vec!["s1", "s2", "s3"]);
    }

    #[tokio::test]
    async fn panicking_handler_is_isolated() {
        let bus = EventBus::new();
        let log = journal();

        bus.subscribe_fn(|_: &FileRenamed| -> anyhow::Result<()> { panic!("boom") });
        bus.subscribe_fn(record(&log, "after"));

        bus.publish(renamed()).await.unwrap();

        assert_eq!(entries(&log), vec!["after"]);
    }

    #[tokio::test]
    async fn sync_handlers_run_before_async_handlers() {
        let bus = EventBus::new();
        let log = journal();

        let async_log = log.clone();
        bus.subscribe_async(async_handler(move |_: FileRenamed| {
            let log = async_log.clone();
            async move {
                log.lock().unwrap().push("async".into());
                anyhow::Ok(())
            }
        }));
        bus.subscribe_fn(record(&log, "sync"));

        bus.publish(renamed()).await.unwrap();

        assert_eq!(entries(&log), vec!["sync", "async"]);
    }

    #[tokio::test]
    async fn publish_runs_async_handlers_one_at_a_time() {
        let bus = EventBus::new();
        let log = journal();

        for (label, delay) in [("slow", 40u64), ("fast", 1)] {
            let log = log.clone();
            bus.subscribe_async(async_handler(move |_: FileRenamed| {
                let log = log.clone();
                async move {
                    log.lock().unwrap().push(format!("{label} start"));
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    log.lock().unwrap().push(format!("{label} end"));
                    anyhow::Ok(())
                }
            }));
        }

        bus.publish(renamed()).await.unwrap();

        assert_eq!(
            entries(&log),
            vec!["slow start", "slow end", "fast start", "fast end"]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn publish_concurrent_waits_for_every_async_handler() {
        let bus = EventBus::new();
        let log = journal();

        for (label, delay) in [("slow", 60u64), ("fast", 5)] {
            let log = log.clone();
            bus.subscribe_async(async_handler(move |_: FileRenamed| {
                let log = log.clone();
                async move {
                    log.lock().unwrap().push(format!("{label} start"));
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    log.lock().unwrap().push(format!("{label} end"));
                    anyhow::Ok(())
                }
            }));
        }

        bus.publish_concurrent(renamed()).await.unwrap();

        let log = entries(&log);
        assert_eq!(log.len(), 4);
        assert_eq!(&log[..2], ["slow start", "fast start"]);
        assert_eq!(&log[2..], ["fast end", "slow end"]);
    }

    #[tokio::test]
    async fn failing_async_handler_is_isolated_in_both_modes() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));

        bus.subscribe_async(async_handler(|_: FileRenamed| async {
            Err::<(), _>(anyhow::anyhow!("thumbnail cache full"))
        }));
        let counter = calls.clone();
        bus.subscribe_async(async_handler(move |_: FileRenamed| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                anyhow::Ok(())
            }
        }));

        bus.publish(renamed()).await.unwrap();
        bus.publish_concurrent(renamed()).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn handler_receives_the_published_event() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(None));

        let sink = seen.clone();
        bus.subscribe_fn(move |event: &FileRenamed| {
            *sink.lock().unwrap() = Some((event.from.clone(), event.to.clone()));
            Ok(())
        });

        bus.publish(renamed()).await.unwrap();

        assert_eq!(
            seen.lock().unwrap().clone(),
            Some(("scan001.pdf".to_string(), "invoice-2024-03.pdf".to_string()))
        );
    }

    #[tokio::test]
    async fn events_only_reach_subscribers_of_their_type() {
        let bus = EventBus::new();
        let log = journal();

        bus.subscribe_fn(record(&log, "renamed"));
        let other = log.clone();
        bus.subscribe_fn(move |_: &WatchStarted| {
            other.lock().unwrap().push("watch".into());
            Ok(())
        });

        bus.publish(WatchStarted).await.unwrap();

        assert_eq!(entries(&log), vec!["watch"]);
    }

    #[test]
    fn subscriber_count_sums_sync_and_async() {
        let bus = EventBus::new();
        assert_eq!(bus.subscriber_count::<FileRenamed>(), 0);

        bus.subscribe_fn(|_: &FileRenamed| Ok(()));
        bus.subscribe_async(async_handler(|_: FileRenamed| async { anyhow::Ok(()) }));

        assert_eq!(bus.subscriber_count::<FileRenamed>(), 2);
        assert_eq!(bus.subscriber_count::<WatchStarted>(), 0);
    }

    #[test]
    fn unsubscribing_unknown_handler_is_a_noop() {
        let bus = EventBus::new();
        bus.subscribe_fn(|_: &FileRenamed| Ok(()));

        let stranger = Arc::new(|_: &FileRenamed| -> anyhow::Result<()> { Ok(()) });
        assert!(!bus.unsubscribe::<FileRenamed, _>(&stranger));
        assert!(!bus.unsubscribe::<WatchStarted, _>(&stranger));
        assert_eq!(bus.subscriber_count::<FileRenamed>(), 1);
    }

    #[tokio::test]
    async fn duplicate_registrations_are_removed_one_at_a_time() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let handler = Arc::new(move |_: &FileRenamed| -> anyhow::Result<()> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        bus.subscribe::<FileRenamed, _>(handler.clone());
        bus.subscribe::<FileRenamed, _>(handler.clone());
        assert_eq!(bus.subscriber_count::<FileRenamed>(), 2);

        assert!(bus.unsubscribe::<FileRenamed, _>(&handler));
        assert_eq!(bus.subscriber_count::<FileRenamed>(), 1);

        bus.publish(renamed()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_matches_async_handlers_by_identity() {
        let bus = EventBus::new();
        let handler = async_handler(|_: FileRenamed| async { anyhow::Ok(()) });

        bus.subscribe_async(handler.clone());
        assert!(bus.unsubscribe::<FileRenamed, _>(&handler));
        assert_eq!(bus.subscriber_count::<FileRenamed>(), 0);
    }

    #[tokio::test]
    async fn unsubscribe_by_id_keeps_order_of_the_rest() {
        let bus = EventBus::new();
        let log = journal();

        bus.subscribe_fn(record(&log, "a"));
        let b = bus.subscribe_fn(record(&log, "b"));
        bus.subscribe_fn(record(&log, "c"));

        assert!(bus.unsubscribe_id::<FileRenamed>(b));
        assert!(!bus.unsubscribe_id::<FileRenamed>(b));
        bus.publish(renamed()).await.unwrap();

        assert_eq!(entries(&log), vec!["a", "c"]);
    }

    #[tokio::test]
    async fn clear_all_subscribers_silences_every_event_type() {
        let bus = EventBus::new();
        let log = journal();
        bus.subscribe_fn(record(&log, "renamed"));
        bus.subscribe_fn(|_: &WatchStarted| Ok(()));

        bus.clear_all_subscribers();

        bus.publish(renamed()).await.unwrap();
        bus.publish_concurrent(renamed()).await.unwrap();
        assert!(entries(&log).is_empty());
        assert_eq!(bus.subscriber_count::<FileRenamed>(), 0);
        assert_eq!(bus.subscriber_count::<WatchStarted>(), 0);
    }

    #[tokio::test]
    async fn subscription_made_during_publish_is_not_invoked_by_it() {
        let bus = EventBus::new();
        let late_calls = Arc::new(AtomicUsize::new(0));

        let inner_bus = bus.clone();
        let counter = late_calls.clone();
        bus.subscribe_fn(move |_: &FileRenamed| {
            let counter = counter.clone();
            inner_bus.subscribe_fn(move |_: &FileRenamed| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
            Ok(())
        });

        bus.publish(renamed()).await.unwrap();
        assert_eq!(late_calls.load(Ordering::SeqCst), 0);
        assert_eq!(bus.subscriber_count::<FileRenamed>(), 2);

        bus.publish(renamed()).await.unwrap();
        assert_eq!(late_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn handler_may_unsubscribe_itself_mid_publish() {
        let bus = EventBus::new();
        let log = journal();

        let inner_bus = bus.clone();
        let first_log = log.clone();
        let id = Arc::new(Mutex::new(None));
        let own_id = id.clone();
        let first = bus.subscribe_fn(move |_: &FileRenamed| {
            first_log.lock().unwrap().push("first".into());
            if let Some(id) = *own_id.lock().unwrap() {
                inner_bus.unsubscribe_id::<FileRenamed>(id);
            }
            Ok(())
        });
        *id.lock().unwrap() = Some(first);
        bus.subscribe_fn(record(&log, "second"));

        bus.publish(renamed()).await.unwrap();
        bus.publish(renamed()).await.unwrap();

        assert_eq!(entries(&log), vec!["first", "second", "second"]);
    }

    #[test]
    fn publish_blocking_drives_async_handlers_to_completion() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        bus.subscribe_async(async_handler(move |_: FileRenamed| {
            let counter = counter.clone();
            async move {
                futures::future::ready(()).await;
                counter.fetch_add(1, Ordering::SeqCst);
                anyhow::Ok(())
            }
        }));

        bus.publish_blocking(renamed()).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn publish_blocking_runs_handlers_that_use_tokio_timers() {
        let bus = EventBus::new();
        let log = journal();
        let handler_log = log.clone();
        bus.subscribe_async(async_handler(move |_: FileRenamed| {
            let log = handler_log.clone();
            async move {
                log.lock().unwrap().push("index start".into());
                tokio::time::sleep(Duration::from_millis(5)).await;
                log.lock().unwrap().push("index end".into());
                anyhow::Ok(())
            }
        }));

        bus.publish_blocking(renamed()).unwrap();
        bus.publish_blocking(renamed()).unwrap();

        assert_eq!(
            entries(&log),
            vec!["index start", "index end", "index start", "index end"]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn publish_blocking_inside_multi_thread_runtime() {
        let bus = EventBus::new();
        let log = journal();
        let handler_log = log.clone();
        bus.subscribe_async(async_handler(move |_: FileRenamed| {
            let log = handler_log.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                log.lock().unwrap().push("thumbnail".into());
                anyhow::Ok(())
            }
        }));

        bus.publish_blocking(renamed()).unwrap();

        assert_eq!(entries(&log), vec!["thumbnail"]);
    }

    #[tokio::test]
    async fn publish_blocking_on_current_thread_runtime_is_rejected() {
        let bus = EventBus::new();
        let log = journal();
        bus.subscribe_fn(record(&log, "never"));

        let err = bus.publish_blocking(renamed()).unwrap_err();

        assert!(matches!(err, FiledeckError::InvalidArgument(_)));
        assert!(entries(&log).is_empty());
    }

    struct PanicsBeforeFuture;

    impl AsyncEventHandler<FileRenamed> for PanicsBeforeFuture {
        fn handle<'a, 'b, 't>(
            &'a self,
            _event: &'b FileRenamed,
        ) -> std::pin::Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 't>>
        where
            'a: 't,
            'b: 't,
            Self: 't,
        {
            panic!("watcher handle closed")
        }
    }

    fn counting(calls: &Arc<AtomicUsize>) -> Arc<impl AsyncEventHandler<FileRenamed>> {
        let counter = calls.clone();
        async_handler(move |_: FileRenamed| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                anyhow::Ok(())
            }
        })
    }

    #[tokio::test]
    async fn async_handler_panicking_before_its_future_is_isolated() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        bus.subscribe_async::<FileRenamed, _>(Arc::new(PanicsBeforeFuture));
        bus.subscribe_async::<FileRenamed, _>(counting(&calls));

        bus.publish(renamed()).await.unwrap();
        bus.publish_concurrent(renamed()).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn async_handler_panicking_inside_its_future_is_isolated() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        bus.subscribe_async(async_handler(|_: FileRenamed| async {
            tokio::task::yield_now().await;
            if true {
                panic!("thumbnail decoder crashed");
            }
            anyhow::Ok(())
        }));
        bus.subscribe_async::<FileRenamed, _>(counting(&calls));

        bus.publish(renamed()).await.unwrap();
        bus.publish_concurrent(renamed()).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn publish_without_subscribers_is_ok() {
        let bus = EventBus::new();
        bus.publish_blocking(WatchStarted).unwrap();
    }

    #[test]
    fn panic_messages_are_extracted() {
        assert_eq!(panic_message(&"disk gone"), "panicked: disk gone");
        assert_eq!(
            panic_message(&String::from("index poisoned")),
            "panicked: index poisoned"
        );
        assert_eq!(panic_message(&42u8), "panicked");
    }
}
