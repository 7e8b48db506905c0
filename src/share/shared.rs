//! Connection state machine of a shared publisher.
//!
//! ```text
//!                   subscribe (live < threshold)
//!                 ┌───────────────────────────┐
//!                 ▼                           │
//! ┌──────────────────┐ live == threshold ┌────┴────────┐
//! │ armed            │ ────────────────► │ connected   │── upstream terminal ──► RefCount: cleared (next subscribe re-arms)
//! │ (sink, no relay  │                   │ (relay ⇄    │                         AutoConnect: kept (late joiners get
//! │  subscribed)     │ ◄──────────────── │  upstream)  │                         replay + terminal)
//! └──────────────────┘  RefCount: live   └─────────────┘
//!                       drops to 0 → disconnect, cleared
//! ```
//!
//! ## Rules
//! - Each connection owns one sink and one relay. A consumer is on the sink
//!   before it is counted as live, so whichever consumer completes the
//!   threshold, every counted consumer sees the first value.
//! - A connection with consumers still attaching is never disconnected.
//! - Live counts belong to a connection generation; releases from an older
//!   generation, or from a consumer that was never counted, are ignored.
//! - Upstream is subscribed outside the state lock: a synchronous upstream may
//!   run to completion inside `subscribe`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::debug;

use crate::error::StreamError;
use crate::protocol::{Publisher, SubscriberRef, Subscriber, Subscription, SubscriptionRef};
use crate::share::policy::{ConnectPolicy, ShareConfig};
use crate::share::relay::Relay;
use crate::sink::Sink;

struct Connection<T> {
    generation: u64,
    sink: Arc<Sink<T>>,
    relay: Arc<Relay<T>>,
    live: usize,
    /// Consumers between the sink attach and the live count.
    attaching: usize,
    connected: bool,
}

struct ShareState<T> {
    connection: Option<Connection<T>>,
    generation: u64,
    connects: u64,
}

pub(crate) struct Shared<T> {
    upstream: Arc<dyn Publisher<T>>,
    cfg: ShareConfig,
    state: Mutex<ShareState<T>>,
}

impl<T: Clone + Send + 'static> Shared<T> {
    fn arm(self: &Arc<Self>, state: &mut ShareState<T>) -> Connection<T> {
        state.generation += 1;
        let sink = Arc::new(Sink::without_warm_up(self.cfg.sink_policy()));
        let relay = Arc::new(Relay::new(
            state.generation,
            Arc::clone(&sink),
            Arc::downgrade(self),
            self.cfg.prefetch,
        ));
        Connection {
            generation: state.generation,
            sink,
            relay,
            live: 0,
            attaching: 0,
            connected: false,
        }
    }

    fn attach(self: &Arc<Self>, subscriber: SubscriberRef<T>) {
        let (sink, relay, generation) = {
            let mut state = self.state.lock();
            if state.connection.is_none() {
                let connection = self.arm(&mut state);
                state.connection = Some(connection);
            }
            let Some(connection) = state.connection.as_mut() else {
                return;
            };
            connection.attaching += 1;
            (
                Arc::clone(&connection.sink),
                Arc::clone(&connection.relay),
                connection.generation,
            )
        };

        let link = Arc::new(MemberLink {
            shared: Arc::downgrade(self),
            relay: Arc::clone(&relay),
            generation,
            released: AtomicBool::new(false),
            counted: AtomicBool::new(false),
        });
        sink.subscribe(Arc::new(Member {
            downstream: subscriber,
            link: Arc::clone(&link),
        }));

        let threshold = self.cfg.policy.threshold();
        let (connect_now, disconnect) = {
            let mut state = self.state.lock();
            let Some(connection) = state
                .connection
                .as_mut()
                .filter(|c| c.generation == generation)
            else {
                // the run ended while attaching; the sink delivered its terminal
                return;
            };
            connection.attaching -= 1;
            let mut connect_now = false;
            if !link.released.load(Ordering::Acquire) {
                connection.live += 1;
                link.counted.store(true, Ordering::Release);
                if !connection.connected && connection.live >= threshold {
                    connection.connected = true;
                    connect_now = true;
                }
            }
            if connect_now {
                state.connects += 1;
            }
            (connect_now, self.take_if_idle(&mut state))
        };

        if let Some(connection) = disconnect {
            self.disconnect(connection);
        }
        if connect_now {
            self.connect(generation, relay);
        }
    }

    fn connect(&self, generation: u64, relay: Arc<Relay<T>>) {
        debug!(
            policy = self.cfg.policy.label(),
            generation, "connecting to upstream"
        );
        self.upstream.subscribe(relay);
    }

    /// Connects right away; used by `AutoConnect(0)`.
    fn connect_eagerly(self: &Arc<Self>) {
        let (relay, generation) = {
            let mut state = self.state.lock();
            let mut connection = self.arm(&mut state);
            connection.connected = true;
            state.connects += 1;
            let snapshot = (Arc::clone(&connection.relay), connection.generation);
            state.connection = Some(connection);
            snapshot
        };
        self.connect(generation, relay);
    }

    fn release(&self, link: &MemberLink<T>) {
        let disconnect = {
            let mut state = self.state.lock();
            let Some(connection) = state.connection.as_mut() else {
                return;
            };
            if connection.generation != link.generation || !link.counted.load(Ordering::Acquire) {
                return;
            }
            connection.live = connection.live.saturating_sub(1);
            self.take_if_idle(&mut state)
        };
        if let Some(connection) = disconnect {
            self.disconnect(connection);
        }
    }

    /// Takes a connected `RefCount` connection nobody uses or is joining.
    fn take_if_idle(&self, state: &mut ShareState<T>) -> Option<Connection<T>> {
        if !matches!(self.cfg.policy, ConnectPolicy::RefCount(_)) {
            return None;
        }
        let idle = state
            .connection
            .as_ref()
            .is_some_and(|c| c.connected && c.live == 0 && c.attaching == 0);
        if idle { state.connection.take() } else { None }
    }

    fn disconnect(&self, connection: Connection<T>) {
        debug!(
            generation = connection.generation,
            "last consumer left: disconnecting"
        );
        connection.relay.disconnect();
    }

    pub(crate) fn upstream_terminated(&self, generation: u64) {
        if !matches!(self.cfg.policy, ConnectPolicy::RefCount(_)) {
            return;
        }
        let mut state = self.state.lock();
        if state
            .connection
            .as_ref()
            .is_some_and(|c| c.generation == generation)
        {
            state.connection = None;
        }
    }
}

/// Shares one upstream execution between consumers.
///
/// Cloning is cheap; clones share the same connection state.
///
/// # Example
/// ```
/// use flowvisor::{CollectProbe, ConnectPolicy, Publisher, ShareConfig, SharedPublisher, Sink, SinkPolicy};
/// use std::sync::Arc;
///
/// let source = Arc::new(Sink::new(SinkPolicy::multicast(16)));
/// let shared = SharedPublisher::share(source.clone());
///
/// let early = CollectProbe::new();
/// shared.subscribe(early.clone());
/// source.try_emit_next(1);
///
/// let late = CollectProbe::new();
/// shared.subscribe(late.clone());
/// source.try_emit_next(2);
///
/// assert_eq!(early.items(), vec![1, 2]);
/// assert_eq!(late.items(), vec![2]);
/// assert_eq!(shared.connections(), 1);
/// ```
pub struct SharedPublisher<T> {
    inner: Arc<Shared<T>>,
}

impl<T> Clone for SharedPublisher<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + 'static> SharedPublisher<T> {
    /// Wraps `upstream` according to `cfg`.
    ///
    /// `AutoConnect(0)` subscribes to upstream before this returns.
    pub fn new<P>(upstream: P, cfg: ShareConfig) -> Self
    where
        P: Publisher<T> + 'static,
    {
        let inner = Arc::new(Shared {
            upstream: Arc::new(upstream),
            cfg,
            state: Mutex::new(ShareState {
                connection: None,
                generation: 0,
                connects: 0,
            }),
        });
        if cfg.policy == ConnectPolicy::AutoConnect(0) {
            inner.connect_eagerly();
        }
        Self { inner }
    }

    /// `share()` = `RefCount(1)` with default buffering.
    pub fn share<P>(upstream: P) -> Self
    where
        P: Publisher<T> + 'static,
    {
        Self::new(upstream, ShareConfig::new(ConnectPolicy::share()))
    }

    pub fn ref_count<P>(upstream: P, n: usize) -> Self
    where
        P: Publisher<T> + 'static,
    {
        Self::new(upstream, ShareConfig::new(ConnectPolicy::RefCount(n)))
    }

    pub fn auto_connect<P>(upstream: P, n: usize) -> Self
    where
        P: Publisher<T> + 'static,
    {
        Self::new(upstream, ShareConfig::new(ConnectPolicy::AutoConnect(n)))
    }

    /// No sharing: every subscribe runs upstream from scratch.
    pub fn cold<P>(upstream: P) -> Self
    where
        P: Publisher<T> + 'static,
    {
        Self::new(upstream, ShareConfig::new(ConnectPolicy::Cold))
    }

    pub fn config(&self) -> ShareConfig {
        self.inner.cfg
    }

    /// Consumers attached to the current connection that have not left.
    pub fn live_count(&self) -> usize {
        self.inner
            .state
            .lock()
            .connection
            .as_ref()
            .map_or(0, |c| c.live)
    }

    pub fn is_connected(&self) -> bool {
        self.inner
            .state
            .lock()
            .connection
            .as_ref()
            .is_some_and(|c| c.connected)
    }

    /// How many times upstream was subscribed by a connection.
    pub fn connections(&self) -> u64 {
        self.inner.state.lock().connects
    }

    /// Values of the current connection dropped while nobody was attached.
    pub fn dropped(&self) -> u64 {
        self.inner
            .state
            .lock()
            .connection
            .as_ref()
            .map_or(0, |c| c.relay.dropped())
    }
}

impl<T: Clone + Send + 'static> Publisher<T> for SharedPublisher<T> {
    fn subscribe(&self, subscriber: SubscriberRef<T>) {
        match self.inner.cfg.policy {
            ConnectPolicy::Cold => self.inner.upstream.subscribe(subscriber),
            _ => self.inner.attach(subscriber),
        }
    }
}

struct MemberLink<T> {
    shared: Weak<Shared<T>>,
    relay: Arc<Relay<T>>,
    generation: u64,
    released: AtomicBool,
    /// Set once this member was added to the live count.
    counted: AtomicBool,
}

impl<T: Clone + Send + 'static> MemberLink<T> {
    fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(shared) = self.shared.upgrade() {
            shared.release(self);
        }
    }
}

/// Downstream consumer as seen by a connection's sink.
struct Member<T> {
    downstream: SubscriberRef<T>,
    link: Arc<MemberLink<T>>,
}

impl<T: Clone + Send + 'static> Subscriber<T> for Member<T> {
    fn on_subscribe(&self, subscription: SubscriptionRef) {
        self.downstream.on_subscribe(Arc::new(MemberSubscription {
            inner: subscription,
            link: Arc::clone(&self.link),
        }));
    }

    fn on_next(&self, item: T) {
        self.downstream.on_next(item);
    }

    fn on_error(&self, error: StreamError) {
        self.link.release();
        self.downstream.on_error(error);
    }

    fn on_complete(&self) {
        self.link.release();
        self.downstream.on_complete();
    }

    fn name(&self) -> &str {
        self.downstream.name()
    }
}

struct MemberSubscription<T> {
    inner: SubscriptionRef,
    link: Arc<MemberLink<T>>,
}

impl<T: Clone + Send + 'static> Subscription for MemberSubscription<T> {
    fn request(&self, n: u64) {
        self.inner.request(n);
        self.link.relay.resume();
    }

    fn cancel(&self) {
        self.inner.cancel();
        self.link.release();
        // a value parked for this consumer may now fit the others
        self.link.relay.resume();
    }
}
