//! Per-client rate limiting with background reclamation.
//!
//! Run with: `RUST_LOG=info cargo run --example keyed_limiting`

use corral::{
    KeyedLimiterConfig, KeyedRateLimiter, KeyedTokenBucket, SlidingWindow, SlidingWindowConfig,
    SystemClock, TokenBucketConfig,
};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let ips = [
        IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1)),
        IpAddr::V4(Ipv4Addr::new(192, 168, 1, 2)),
        IpAddr::V4(Ipv4Addr::new(192, 168, 1, 3)),
    ];

    let identities = KeyedLimiterConfig::default()
        .with_max_identities(1_000)
        .with_sweep_interval(Duration::from_millis(100))
        .with_idle_timeout(Duration::from_millis(500));

    let buckets: Arc<KeyedTokenBucket<IpAddr>> = Arc::new(
        KeyedTokenBucket::with_config(
            TokenBucketConfig::per_second(5),
            identities.clone(),
            SystemClock::shared(),
        )
        .expect("valid config"),
    );
    let window: Arc<SlidingWindow<IpAddr>> = Arc::new(
        SlidingWindow::with_config(
            SlidingWindowConfig::new(10, Duration::from_millis(300)).with_identities(identities),
            SystemClock::shared(),
        )
        .expect("valid config"),
    );

    let bucket_sweeper = buckets.start_sweeper().expect("sweeper thread");
    let window_sweeper = window.start_sweeper().expect("sweeper thread");

    println!("=== Token bucket per IP (burst 10, 5/s) ===");
    drive(buckets.as_ref(), &ips);

    println!("=== Sliding window per IP (10 per 300ms) ===");
    drive(window.as_ref(), &ips);
    if let Some(wait) = window.retry_after(&ips[0]) {
        println!("{} may retry in {:?}\n", ips[0], wait);
    }

    println!("Waiting for idle clients to be reclaimed...");
    thread::sleep(Duration::from_secs(2));
    println!(
        "Tracked after idling: {} buckets, {} windows\n",
        buckets.tracked_identities(),
        window.tracked_identities()
    );

    bucket_sweeper.stop();
    window_sweeper.stop();

    println!("{}\n", buckets.stats());
    println!("{}", window.stats());
}

fn drive(limiter: &dyn KeyedRateLimiter<IpAddr>, ips: &[IpAddr]) {
    for ip in ips {
        let allowed = (0..12).filter(|_| limiter.allow(ip)).count();
        println!("{} - {} of 12 requests allowed", ip, allowed);
    }
    println!("Tracking {} clients\n", limiter.tracked_identities());
}
