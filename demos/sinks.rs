//! # Sink Policies Example
//!
//! Pushes values through each sink policy and prints what consumers saw:
//! - Unicast buffers until its single consumer arrives
//! - Multicast warms up for its first consumer, then paces to its slowest one
//! - Best-effort skips saturated consumers
//! - All-or-nothing delivers to everybody or nobody
//! - Replay hands history to late joiners
//! - Concurrent producers retrying on `FAIL_NON_SERIALIZED`
//!
//! ## Run
//! ```bash
//! RUST_LOG=flowvisor=debug cargo run --example sinks
//! ```

use std::{sync::Arc, thread, time::Duration};

use flowvisor::{
    Capacity, CollectProbe, LogProbe, ManualProbe, Paced, Publisher, RetryNonSerialized,
    SignalLog, Sink, SinkPolicy,
};
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

    unicast();
    multicast().await;
    best_effort();
    all_or_nothing();
    replay();
    concurrent_producers()?;
    Ok(())
}

fn unicast() {
    let sink: Sink<u32> = Sink::new(SinkPolicy::unicast());
    let log = SignalLog::new();
    sink.try_emit_next(1);
    sink.try_emit_next(2);

    sink.subscribe(LogProbe::new("sam", log.clone()));
    sink.try_emit_next(3);
    sink.subscribe(LogProbe::new("mike", log.clone()));

    println!("Unicast:");
    println!(" ├─► sam:  {:?}", log.items_of("sam"));
    println!(" └─► mike: {:?}", log.errors_of("mike"));
}

async fn multicast() {
    let sink: Sink<u32> = Sink::new(SinkPolicy::multicast(16));
    let log = SignalLog::new();
    println!("Multicast warm-up emit 0: {}", sink.try_emit_next(0).as_label());
    sink.subscribe(LogProbe::new("fast", log.clone()));
    sink.subscribe(Paced::new(
        Duration::from_millis(50),
        LogProbe::new("slow", log.clone()),
    ));

    for v in 1..=5 {
        let result = sink.try_emit_next(v);
        println!("Multicast emit {v}: {}", result.as_label());
    }
    sink.try_emit_complete();
    tokio::time::sleep(Duration::from_millis(400)).await;

    println!(" ├─► fast: {:?}", log.items_of("fast"));
    println!(" └─► slow: {:?}", log.items_of("slow"));
}

fn best_effort() {
    let sink: Sink<u32> = Sink::new(SinkPolicy::direct_best_effort());
    let log = SignalLog::new();
    sink.subscribe(LogProbe::new("fast", log.clone()));
    sink.subscribe(ManualProbe::with_initial_request("slow", log.clone(), 1));

    println!("Best effort:");
    for v in 1..=3 {
        println!(" ├─► emit {v}: {}", sink.try_emit_next(v).as_label());
    }
    println!(" ├─► fast: {:?}", log.items_of("fast"));
    println!(" └─► slow: {:?}", log.items_of("slow"));
}

fn all_or_nothing() {
    let sink: Sink<u32> = Sink::new(SinkPolicy::direct_all_or_nothing());
    let log = SignalLog::new();
    sink.subscribe(LogProbe::new("fast", log.clone()));
    let slow = ManualProbe::with_initial_request("slow", log.clone(), 1);
    sink.subscribe(slow.clone());

    println!("All or nothing:");
    println!(" ├─► emit 1: {}", sink.try_emit_next(1).as_label());
    println!(" ├─► emit 2: {}", sink.try_emit_next(2).as_label());
    slow.request(1);
    println!(" ├─► emit 3: {}", sink.try_emit_next(3).as_label());
    println!(" ├─► fast: {:?}", log.items_of("fast"));
    println!(" └─► slow: {:?}", log.items_of("slow"));
}

fn replay() {
    let all: Sink<u32> = Sink::new(SinkPolicy::replay_all());
    let last: Sink<u32> = Sink::new(SinkPolicy::replay_limit(1));
    for v in 1..=3 {
        all.try_emit_next(v);
        last.try_emit_next(v);
    }

    let log = SignalLog::new();
    all.subscribe(LogProbe::new("all", log.clone()));
    last.subscribe(LogProbe::new("limit1", log.clone()));

    println!("Replay:");
    println!(" ├─► replay all:    {:?}", log.items_of("all"));
    println!(" └─► replay last 1: {:?}", log.items_of("limit1"));
}

fn concurrent_producers() -> anyhow::Result<()> {
    const PRODUCERS: u64 = 4;
    const PER_PRODUCER: u64 = 250;

    let sink: Arc<Sink<u64>> = Arc::new(Sink::new(SinkPolicy::Multicast {
        buffer: Capacity::Unbounded,
    }));
    let probe = CollectProbe::new();
    sink.subscribe(probe.clone());

    let handles: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let sink = Arc::clone(&sink);
            thread::spawn(move || {
                for i in 0..PER_PRODUCER {
                    sink.emit_next(p * PER_PRODUCER + i, RetryNonSerialized)?;
                }
                Ok::<_, flowvisor::EmitError>(())
            })
        })
        .collect();
    for handle in handles {
        handle
            .join()
            .map_err(|_| anyhow::anyhow!("producer thread panicked"))??;
    }
    sink.emit_complete(RetryNonSerialized)?;

    println!("Concurrent producers:");
    println!(" ├─► received:  {}", probe.len());
    println!(" └─► completed: {}", probe.is_completed());
    Ok(())
}
