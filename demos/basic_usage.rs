//! Basic shipper usage example
//!
//! Runs in local-only mode (no credentials): records are rendered on the
//! console and never leave the process.
//!
//! Run with: cargo run --example basic_usage

use rust_log_shipper::prelude::*;
use rust_log_shipper::{info, warning};
use std::time::Duration;

fn main() -> Result<()> {
    println!("=== Rust Log Shipper - Basic Usage Example ===\n");

    let config = ShipperConfig::builder()
        .level(LogLevel::Debug)
        .date_format("%H:%M:%S")
        .build();
    let shipper = Shipper::start(config)?;
    println!("Handshake: {}\n", shipper.handshake());

    println!("1. Logging at different levels:");
    shipper.debug("This is a debug message");
    shipper.info("This is an info message");
    shipper.warning("This is a warning message");
    shipper.error("This is an error message");
    shipper.critical("This is a critical message");
    shipper.success("Deployment finished");
    shipper.failure("Smoke test failed");

    println!("\n2. Sections and formatted messages:");
    shipper.sep(Some("startup"));
    let port = 8080;
    info!(shipper, "Listening on port {}", port);
    warning!(shipper, "Cache warm-up took {} ms", 1250);
    shipper.sep(None);

    println!("\n3. Structured payloads:");
    shipper.log_with_payload(
        LogLevel::Error,
        "Payment failed",
        Payload::new()
            .with_field("order_id", 1234)
            .with_field("amount", 99.95)
            .with_field("gateway", "primary"),
    );
    shipper.emit(
        LogRecord::new(LogLevel::Info, "User signed in")
            .with_field("user_id", 42)
            .with_tag("auth"),
    );

    let stats = shipper.stats();
    println!(
        "\nStats: enqueued={}, queued={}, dropped={}",
        stats.enqueued, stats.queued, stats.dropped
    );

    // Nothing leaves the process in local-only mode; leftovers are discarded
    let outcome = shipper.drain_and_close(Duration::from_secs(1));
    println!("Shutdown: {:?}", outcome);

    println!("\n=== Example completed successfully! ===");

    Ok(())
}
