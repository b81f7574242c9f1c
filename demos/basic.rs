//! Basic usage of the single-instance primitives.
//!
//! Run with: `RUST_LOG=debug cargo run --example basic`

use corral::{
    BoundedQueue, LruCache, MemoryOrdering, TokenBucket, TokenBucketBuilder, TokenBucketConfig,
};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Basic Primitives Example ===\n");

    simple_bucket_example();
    separator();
    custom_config_example();
    separator();
    weighted_example();
    separator();
    refill_example();
    separator();
    cache_example();
    separator();
    queue_example();
}

fn separator() {
    println!("\n{}\n", "=".repeat(50));
}

fn simple_bucket_example() {
    println!("1. Simple Token Bucket:");

    let limiter = TokenBucket::new(10, 2.0).expect("valid bucket");
    println!("   Created bucket with 10 tokens, refilling 2 tokens/second");

    let (mut allowed, mut limited) = (0, 0);
    for i in 1..=15 {
        if limiter.allow() {
            allowed += 1;
            println!("   Request {} - allowed", i);
        } else {
            limited += 1;
            println!("   Request {} - rate limited", i);
        }
    }
    println!("   Results: {} allowed, {} rate limited", allowed, limited);
}

fn custom_config_example() {
    println!("2. Custom Configuration:");

    let config = TokenBucketConfig::per_second(100)
        .with_burst_multiplier(2)
        .with_ordering(MemoryOrdering::Relaxed);
    println!("   - Capacity: {}", config.capacity);
    println!("   - Refill rate: {} tokens/second", config.refill_rate);
    println!("   - Time to full: {:?}", config.time_to_full());

    let limiter = TokenBucketBuilder::new()
        .capacity(config.capacity)
        .refill_rate(config.refill_rate)
        .memory_ordering(config.ordering)
        .build()
        .expect("valid bucket");

    let mut burst = 0;
    while limiter.allow() {
        burst += 1;
    }
    println!("   Burst test: {} requests admitted immediately", burst);
}

fn weighted_example() {
    println!("3. Weighted Requests:");

    let limiter = TokenBucket::new(50, 10.0).expect("valid bucket");
    println!("   Initial tokens: {:.1}", limiter.available_tokens());

    if limiter.allow_n(10).expect("non-zero cost") {
        println!("   Admitted a request costing 10 tokens");
    }
    if !limiter.allow_n(50).expect("non-zero cost") {
        println!(
            "   Rejected a request costing 50 tokens ({:.1} available)",
            limiter.available_tokens()
        );
    }

    limiter.add_tokens(20);
    println!("   After adding 20 bonus tokens: {:.1}", limiter.available_tokens());
    println!("\n{}", limiter.metrics());
}

fn refill_example() {
    println!("4. Refill Over Time:");

    let limiter = TokenBucket::new(5, 10.0).expect("valid bucket");
    while limiter.allow() {}
    println!("   Drained: {:.1} tokens", limiter.available_tokens());

    for step in 1..=3 {
        thread::sleep(Duration::from_millis(200));
        println!(
            "   After {}ms: {:.1} tokens",
            step * 200,
            limiter.available_tokens()
        );
    }

    let metrics = limiter.metrics();
    println!(
        "   Health: {} ({})",
        metrics.health_status(),
        metrics.health_status().suggested_action()
    );
}

fn cache_example() {
    println!("5. LRU Cache:");

    let cache = LruCache::new(3).expect("valid cache");
    for (user, name) in [(1, "ada"), (2, "grace"), (3, "linus")] {
        cache.put(user, name.to_string());
    }

    // Touch 1 so that 2 becomes the eviction victim.
    cache.get(&1);
    if let Some((key, value)) = cache.put_and_evict(4, "barbara".to_string()) {
        println!("   Evicted {} => {}", key, value);
    }
    println!("   Recency order: {:?}", cache.keys_by_recency());
    cache.get(&2);
    println!("\n{}", cache.stats());
}

fn queue_example() {
    println!("6. Bounded Queue:");

    let queue = Arc::new(BoundedQueue::new(4).expect("valid queue"));

    let producer = {
        let queue = queue.clone();
        thread::spawn(move || {
            for job in 0..10 {
                queue.put(job, None).expect("queue open");
            }
            queue.close();
        })
    };

    let mut processed = Vec::new();
    while let Ok(job) = queue.get(Some(Duration::from_secs(1))) {
        processed.push(job);
        thread::sleep(Duration::from_millis(5));
    }
    producer.join().expect("producer finished");

    println!("   Processed in order: {:?}", processed);
    println!("\n{}", queue.stats());
}
