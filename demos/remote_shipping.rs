//! Remote shipping example
//!
//! Ships records to a collector over WebSocket. Credentials and endpoint
//! come from the environment:
//!
//! ```text
//! LOG_SHIPPER_PROJECT_ID=my-project \
//! LOG_SHIPPER_PROJECT_SECRET=s3cret \
//! LOG_SHIPPER_URL=ws://127.0.0.1:8765/v1/logs \
//! cargo run --example remote_shipping
//! ```
//!
//! Without credentials the shipper falls back to local-only mode.

use rust_log_shipper::prelude::*;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Internal diagnostics of the pipeline go through `tracing`
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!("=== Rust Log Shipper - Remote Shipping Example ===\n");

    let mut builder = ShipperConfig::builder()
        .queue_size(500)
        .max_batch_size(25)
        .flush_interval(Duration::from_millis(250))
        .backpressure_policy(BackpressurePolicy::DropOldest)
        .metadata(
            Payload::new()
                .with_field("service", "remote-shipping-demo")
                .with_field("version", env!("CARGO_PKG_VERSION")),
        );
    if let (Ok(id), Ok(secret)) = (
        std::env::var("LOG_SHIPPER_PROJECT_ID"),
        std::env::var("LOG_SHIPPER_PROJECT_SECRET"),
    ) {
        builder = builder.credentials(id, secret);
    }
    if let Ok(url) = std::env::var("LOG_SHIPPER_URL") {
        builder = builder.server_url(url);
    }

    let dropped = Arc::new(AtomicU64::new(0));
    let dropped_alerts = Arc::clone(&dropped);
    let shipper = Arc::new(
        Shipper::builder()
            .config(builder.build())
            .on_drop(Arc::new(move |total: u64| {
                dropped_alerts.store(total, Ordering::Relaxed);
            }))
            .start()?,
    );

    println!("Handshake: {}", shipper.handshake());
    println!("Connection: {}\n", shipper.connection_state());

    let workers: Vec<_> = (0..4)
        .map(|worker| {
            let shipper = Arc::clone(&shipper);
            thread::spawn(move || {
                for job in 0..50 {
                    shipper.log_with_payload(
                        LogLevel::Info,
                        format!("worker {} finished job {}", worker, job),
                        Payload::new()
                            .with_field("worker", worker)
                            .with_field("job", job),
                    );
                    thread::sleep(Duration::from_millis(5));
                }
            })
        })
        .collect();
    for worker in workers {
        let _ = worker.join();
    }

    let outcome = shipper.drain_and_close(DEFAULT_SHUTDOWN_TIMEOUT);
    let stats = shipper.stats();
    let link = shipper.connection_metrics();

    println!("\nShutdown: {:?}", outcome);
    println!(
        "Records: enqueued={} delivered={} dropped={} failed={} retried={}",
        stats.enqueued, stats.delivered, stats.dropped, stats.failed, stats.retried
    );
    println!(
        "Link: handshakes={} reconnects={} batches_sent={}",
        link.handshakes, link.reconnects, link.batches_sent
    );
    println!("Last drop alert total: {}", dropped.load(Ordering::Relaxed));

    Ok(())
}
