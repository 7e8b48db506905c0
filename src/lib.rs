//! # flowvisor
//!
//! **Flowvisor** is a small backpressure-aware publish/subscribe core for Rust.
//!
//! It provides a demand-driven `Publisher`/`Subscriber`/`Subscription` protocol,
//! a bounded cold publisher, a broadcast sink engine with five overflow/replay
//! policies, and a connection-sharing wrapper that turns cold sources hot.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!  ┌──────────────────┐      ┌──────────────────┐      ┌──────────────────┐
//!  │ BoundedPublisher │      │   Sink (push)    │      │ Source + pump    │
//!  │ (cold, per-sub   │      │ try_emit_next /  │◄─────│ (tokio interval) │
//!  │  feed + demand)  │      │ emit_next(retry) │      └──────────────────┘
//!  └────────┬─────────┘      └────────┬─────────┘
//!           │                         │ SinkPolicy:
//!           │                         │ unicast | multicast | best-effort
//!           │                         │ all-or-nothing | replay(k)
//!           ▼                         ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  SharedPublisher (optional)                                       │
//! │  - ConnectPolicy: cold | refCount(n) | autoConnect(n)             │
//! │  - Relay: prefetch, replenish, park on overflow                   │
//! │  - internal Sink: multicast or replay(k)                          │
//! └──────┬──────────────────┬──────────────────┬──────────────────────┘
//!        ▼                  ▼                  ▼
//!   ┌──────────┐       ┌──────────┐       ┌───────────┐
//!   │ LogProbe │       │ Take(n)  │       │ Paced     │
//!   │ Collect  │       │  └► any  │       │  └► any   │
//!   │ Manual   │       │ consumer │       │ consumer  │
//!   └──────────┘       └──────────┘       └───────────┘
//! ```
//!
//! ### Signal flow
//! ```text
//! subscribe(consumer) ──► consumer.on_subscribe(subscription)
//!
//! subscription.request(n)
//!   ├─► on_next(item)               (at most n times, never before on_subscribe)
//!   └─► on_complete() | on_error(e) (at most once, then nothing)
//!
//! subscription.cancel()             (idempotent; nothing is delivered afterwards)
//! ```
//!
//! ## Features
//! | Area              | Description                                                        | Key types / traits                               |
//! |-------------------|--------------------------------------------------------------------|--------------------------------------------------|
//! | **Protocol**      | Demand-driven publish/subscribe contract.                          | [`Publisher`], [`Subscriber`], [`Subscription`]  |
//! | **Cold source**   | Bounded publisher rejecting excess demand.                         | [`BoundedPublisher`], [`Feed`]                   |
//! | **Sinks**         | Push point with unicast, multicast, direct and replay policies.    | [`Sink`], [`SinkPolicy`], [`EmitResult`]         |
//! | **Hot sources**   | Share one upstream run between consumers.                          | [`SharedPublisher`], [`ConnectPolicy`]           |
//! | **Probes**        | Observation endpoints and consumer wrappers.                       | [`LogProbe`], [`CollectProbe`], [`ManualProbe`]  |
//! | **Errors**        | Typed consumer-side and producer-side errors.                      | [`StreamError`], [`EmitError`]                   |
//! | **Configuration** | Central defaults for buffers, replay, prefetch and bounds.         | [`Config`], [`Capacity`]                         |
//!
//! ## Example
//! ```rust
//! use flowvisor::{
//!     BoundedPublisher, ConnectPolicy, LogProbe, Publisher, ShareConfig, SharedPublisher, SignalLog,
//! };
//!
//! let log = SignalLog::new();
//!
//! // nothing runs until two consumers are attached
//! let shared = SharedPublisher::new(
//!     BoundedPublisher::range(10),
//!     ShareConfig::new(ConnectPolicy::RefCount(2)),
//! );
//! shared.subscribe(LogProbe::new("sam", log.clone()));
//! assert!(log.items_of("sam").is_empty());
//!
//! shared.subscribe(LogProbe::new("mike", log.clone()));
//! assert_eq!(log.items_of("sam"), log.items_of("mike"));
//! assert_eq!(log.items_of("mike").len(), 10);
//! ```
mod config;
mod error;
mod probe;
mod protocol;
mod publisher;
mod share;
mod sink;

// ---- Public re-exports ----

pub use config::{Capacity, Config};
pub use error::{EmitError, StreamError};
pub use probe::{
    CollectProbe, LogProbe, ManualProbe, Paced, Record, Signal, SignalLog, SubscriberStream, Take,
    into_stream,
};
pub use protocol::{
    EmptySubscription, Publisher, Subscriber, SubscriberRef, Subscription, SubscriptionRef,
    UNBOUNDED,
};
pub use publisher::{BoundedPublisher, Feed, FeedSource, PumpExit, Source, feed, spawn_pump};
pub use share::{ConnectPolicy, ShareConfig, SharedPublisher};
pub use sink::{
    EmitFailureHandler, EmitResult, FailFast, RetryNonSerialized, RetryUntil, SignalType, Sink,
    SinkPhase, SinkPolicy,
};
