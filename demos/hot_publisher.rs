//! # Hot Publisher Example
//!
//! Turns cold sources hot with [`SharedPublisher`]:
//! - `share()`: late joiners only see future values
//! - `RefCount(2)`: nothing runs until two consumers are attached
//! - `AutoConnect(0)` with replay of 1: a "current value" broadcast
//! - A stock ticker pumped from a random feed, consumed through `take(2)`
//!
//! ## Run
//! ```bash
//! RUST_LOG=flowvisor=debug cargo run --example hot_publisher
//! ```

use std::{sync::Arc, time::Duration};

use flowvisor::{
    BoundedPublisher, ConnectPolicy, FeedSource, LogProbe, Publisher, ShareConfig,
    SharedPublisher, SignalLog, Sink, SinkPolicy, Take, feed, spawn_pump,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "flowvisor=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    share();
    ref_count();
    current_value();
    stock_ticker().await?;
    Ok(())
}

fn share() {
    let source: Arc<Sink<u32>> = Arc::new(Sink::new(SinkPolicy::multicast(16)));
    let shared = SharedPublisher::share(Arc::clone(&source));
    let log = SignalLog::new();

    shared.subscribe(LogProbe::new("sam", log.clone()));
    source.try_emit_next(1);
    source.try_emit_next(2);
    shared.subscribe(LogProbe::new("mike", log.clone()));
    source.try_emit_next(3);

    println!("share():");
    println!(" ├─► sam:         {:?}", log.items_of("sam"));
    println!(" ├─► mike:        {:?}", log.items_of("mike"));
    println!(" └─► connections: {}", shared.connections());
}

fn ref_count() {
    let shared = SharedPublisher::ref_count(BoundedPublisher::range(10), 2);
    let log = SignalLog::new();

    shared.subscribe(LogProbe::new("sam", log.clone()));
    println!("RefCount(2):");
    println!(" ├─► after sam:  connected={}", shared.is_connected());
    shared.subscribe(LogProbe::new("mike", log.clone()));
    println!(" ├─► sam:        {:?}", log.items_of("sam"));
    println!(" └─► mike:       {:?}", log.items_of("mike"));
}

fn current_value() {
    let source: Arc<Sink<u32>> = Arc::new(Sink::new(SinkPolicy::multicast(16)));
    let cfg = ShareConfig::new(ConnectPolicy::AutoConnect(0)).with_replay(1);
    let shared = SharedPublisher::new(Arc::clone(&source), cfg);
    for v in 1..=3 {
        source.try_emit_next(v);
    }

    let log = SignalLog::new();
    shared.subscribe(LogProbe::new("late", log.clone()));
    source.try_emit_next(4);

    println!("AutoConnect(0) + replay(1):");
    println!(" └─► late: {:?}", log.items_of("late"));
}

async fn stock_ticker() -> anyhow::Result<()> {
    let token = CancellationToken::new();
    let prices: Arc<Sink<i64>> = Arc::new(Sink::new(SinkPolicy::multicast(16)));
    let pump = spawn_pump(
        FeedSource::new(feed::random_in(90..110)),
        Arc::clone(&prices),
        Duration::from_millis(20),
        token.clone(),
    );

    let ticker = SharedPublisher::auto_connect(Arc::clone(&prices), 0);
    let log = SignalLog::new();
    ticker.subscribe(LogProbe::new("board", log.clone()));
    ticker.subscribe(Take::new(2, LogProbe::new("trader", log.clone())));

    tokio::time::sleep(Duration::from_millis(200)).await;
    token.cancel();
    let exit = pump.await?;

    println!("Stock ticker:");
    println!(" ├─► board:  {:?}", log.items_of("board"));
    println!(" ├─► trader: {:?} (completed: {})", log.items_of("trader"), log.completed("trader"));
    println!(" └─► pump:   {exit:?}");
    Ok(())
}
