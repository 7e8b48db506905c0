//! # Bounded Publisher Example
//!
//! Walks through a cold publisher that never emits more than 10 items:
//! - Two consumers each get their own run
//! - Demand is served exactly, a piece at a time
//! - A request above the bound fails the subscription
//! - A cancelled subscription stays silent
//! - The same publisher consumed as an async stream
//!
//! ## Run
//! ```bash
//! RUST_LOG=flowvisor=debug cargo run --example bounded
//! ```

use flowvisor::{
    BoundedPublisher, LogProbe, ManualProbe, Publisher, Signal, SignalLog, StreamError,
    into_stream,
};
use futures::StreamExt;
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

    let publisher = BoundedPublisher::range(10);
    let log = SignalLog::new();

    println!("Cold runs:");
    publisher.subscribe(LogProbe::new("sam", log.clone()));
    publisher.subscribe(LogProbe::new("mike", log.clone()));
    println!(" ├─► sam:  {:?}", log.items_of("sam"));
    println!(" └─► mike: {:?}", log.items_of("mike"));

    println!();
    println!("Demand, three at a time:");
    let manual = ManualProbe::new("manual", log.clone());
    publisher.subscribe(manual.clone());
    for _ in 0..4 {
        manual.request(3);
        println!(" ├─► requested 3, seen so far: {:?}", log.items_of("manual"));
    }
    println!(" └─► completed: {}", log.completed("manual"));

    println!();
    println!("Excess demand:");
    let greedy = ManualProbe::new("greedy", log.clone());
    publisher.subscribe(greedy.clone());
    greedy.request(11);
    for signal in log.signals_of("greedy") {
        if let Signal::Error(StreamError::ExcessDemand { requested, max }) = signal {
            println!(" └─► rejected: requested {requested}, max {max}");
        }
    }

    println!();
    println!("Cancellation:");
    let quitter = ManualProbe::new("quitter", log.clone());
    publisher.subscribe(quitter.clone());
    quitter.request(2);
    quitter.cancel();
    quitter.request(5);
    println!(" ├─► items:    {:?}", log.items_of("quitter"));
    println!(" └─► terminal: {}", log.terminal_count("quitter"));

    println!();
    println!("As a stream (batches of 4):");
    let mut stream = into_stream(&publisher, 4);
    let mut items = Vec::new();
    while let Some(item) = stream.next().await {
        items.push(item?);
    }
    println!(" └─► {items:?}");

    Ok(())
}
