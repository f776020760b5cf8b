//! Basic retry + circuit breaker usage example
//!
//! Run with `RUST_LOG=retry_machines=debug` to see the retry loop's events.

use retry_machines::{
    CircuitBreaker, ExponentialBackoff, FixedBackoff, RetryConfig, RetryError, execute,
    execute_sync,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "retry_machines=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!("=== Retry Machines Basic Example ===\n");

    let breaker = Arc::new(
        CircuitBreaker::builder("payment_api")
            .failure_threshold(2)
            .reset_timeout(Duration::from_millis(300))
            .half_open_max_requests(1)
            .on_open(|name| println!("🔴 Circuit '{}' opened!", name))
            .on_close(|name| println!("🟢 Circuit '{}' closed!", name))
            .on_half_open(|name| println!("🟡 Circuit '{}' half-open, testing...", name))
            .build(),
    );

    let config = RetryConfig::new(
        ExponentialBackoff::new()
            .base_delay(Duration::from_millis(20))
            .max_delay(Duration::from_millis(200))
            .max_attempts(3),
    )
    .with_circuit_breaker(breaker.clone())
    .with_timeout(Duration::from_millis(100))
    .on_retry(|attempt, delay| println!("  attempt {} failed, retrying in {:?}", attempt, delay))
    .on_exhausted(|ctx| println!("  giving up after {} attempts", ctx.attempt));

    // Flaky service: fails twice, then recovers
    println!("--- Transient failures ---");
    let calls = AtomicU32::new(0);
    let result = execute(
        || async {
            match calls.fetch_add(1, Ordering::SeqCst) {
                0 | 1 => Err("gateway busy".to_string()),
                n => Ok(format!("payment #{} accepted", n + 1)),
            }
        },
        &config,
    )
    .await;
    report(&result);
    println!("State: {}\n", breaker.state());

    // Hard down: every call exhausts its retries and feeds the breaker
    println!("--- Persistent failures ---");
    for _ in 0..2 {
        let result: Result<String, _> =
            execute(|| async { Err("connection refused".to_string()) }, &config).await;
        report(&result);
    }
    println!("State: {} (circuit opened)\n", breaker.state());

    // Open circuit rejects without invoking the operation
    println!("--- Attempting call while open ---");
    let result = execute(|| async { Ok::<_, String>("never runs".to_string()) }, &config).await;
    report(&result);
    println!();

    // Slow attempts hit the per-attempt timeout
    println!("--- Waiting for reset timeout, then a slow probe ---");
    tokio::time::sleep(Duration::from_millis(300)).await;
    let result: Result<String, _> = execute(
        || async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok("too late".to_string())
        },
        &config,
    )
    .await;
    report(&result);
    println!("State: {}\n", breaker.state());

    // Recovery
    println!("--- Recovery ---");
    tokio::time::sleep(Duration::from_millis(300)).await;
    let result = execute(
        || async { Ok::<_, String>("payment accepted".to_string()) },
        &config,
    )
    .await;
    report(&result);
    println!("State: {}\n", breaker.state());

    // Blocking variant
    println!("--- Blocking call ---");
    let sync_config = RetryConfig::new(FixedBackoff::with_delay(Duration::from_millis(10)));
    let mut attempts = 0;
    let result = execute_sync(
        || {
            attempts += 1;
            if attempts < 2 {
                Err("disk busy".to_string())
            } else {
                Ok(format!("read after {} attempts", attempts))
            }
        },
        &sync_config,
    );
    report(&result);
}

fn report(result: &Result<String, RetryError<String>>) {
    match result {
        Ok(value) => println!("✓ {}", value),
        Err(e) if e.is_circuit_open() => println!("⛔ {}", e),
        Err(e) => println!("✗ {}", e),
    }
}
