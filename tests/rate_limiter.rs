use corral::{
    Error, KeyedLimiterConfig, KeyedRateLimiter, KeyedTokenBucket, ManualClock, SlidingWindow,
    SlidingWindowConfig, TokenBucket, TokenBucketConfig,
};
use std::net::IpAddr;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
fn test_immediate_exhaustion() {
    let limiter = TokenBucket::new(5, 1.0).unwrap();

    for _ in 0..5 {
        assert!(limiter.allow());
    }
    assert!(!limiter.allow());
}

#[test]
fn test_long_run_rate_bound() {
    let clock = ManualClock::shared();
    let limiter =
        TokenBucket::with_config(TokenBucketConfig::new(10, 5.0), clock.clone()).unwrap();

    // Hammer the bucket every 10ms for 20 simulated seconds.
    let mut admitted = 0u64;
    for _ in 0..2_000 {
        for _ in 0..4 {
            if limiter.allow() {
                admitted += 1;
            }
        }
        clock.advance(Duration::from_millis(10));
    }

    // capacity + rate * T
    assert!(admitted <= 10 + 5 * 20, "admitted {}", admitted);
    assert!(admitted >= 5 * 20, "admitted {}", admitted);
}

#[test]
fn test_refill_timing_accuracy() {
    let limiter = TokenBucket::new(10, 100.0).unwrap();

    assert!(limiter.allow_n(10).unwrap());
    assert!(limiter.available_tokens() < 1.0);

    thread::sleep(Duration::from_millis(105));

    let available = limiter.available_tokens();
    assert!(available >= 9.0 && available <= 10.0, "available {}", available);
}

#[test]
fn test_sustained_load_scenario() {
    let limiter = Arc::new(TokenBucket::new(1000, 100.0).unwrap());

    let handles: Vec<_> = (0..20)
        .map(|_| {
            let limiter = limiter.clone();
            thread::spawn(move || {
                let (mut admitted, mut rejected) = (0u64, 0u64);
                for _ in 0..200 {
                    if limiter.allow() {
                        admitted += 1;
                    } else {
                        rejected += 1;
                    }
                }
                (admitted, rejected)
            })
        })
        .collect();

    let (admitted, rejected) = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .fold((0, 0), |(a, r), (da, dr)| (a + da, r + dr));

    assert!(admitted >= 1000);
    assert!(rejected > 0);

    let metrics = limiter.metrics();
    assert_eq!(metrics.total_admitted, admitted);
    assert_eq!(metrics.total_rejected, rejected);
}

#[test]
fn test_sliding_window_strictness() {
    let clock = ManualClock::shared();
    let limiter =
        SlidingWindow::with_config(SlidingWindowConfig::new(3, Duration::from_secs(1)), clock.clone())
            .unwrap();
    let id = "client";

    for _ in 0..3 {
        assert!(limiter.allow(&id));
    }

    clock.set(Duration::from_millis(500));
    assert!(!limiter.allow(&id));

    clock.set(Duration::from_millis(1100));
    assert!(limiter.allow(&id));
}

#[test]
fn test_sliding_window_concurrent_identity() {
    let limiter = Arc::new(SlidingWindow::new(100, Duration::from_secs(60)).unwrap());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let limiter = limiter.clone();
            thread::spawn(move || (0..50).filter(|_| limiter.allow(&42u64)).count())
        })
        .collect();

    let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(admitted, 100);
}

#[test]
fn test_per_ip_limits_are_independent() {
    let limiter = KeyedTokenBucket::new(TokenBucketConfig::new(10, 1.0)).unwrap();

    for i in 0..50 {
        let ip: IpAddr = format!("192.168.1.{}", i).parse().unwrap();
        for _ in 0..10 {
            assert!(limiter.allow(&ip));
        }
        assert!(!limiter.allow(&ip));
    }

    let stats = limiter.stats();
    assert_eq!(stats.tracked, 50);
    assert_eq!(stats.total_created, 50);
    assert_eq!(stats.total_admitted, 500);
    assert_eq!(stats.total_rejected, 50);
}

#[test]
fn test_identity_lifecycle_with_sweeper() {
    let limiter = Arc::new(
        SlidingWindow::with_config(
            SlidingWindowConfig::new(10, Duration::from_millis(100)).with_identities(
                KeyedLimiterConfig::default().with_sweep_interval(Duration::from_millis(20)),
            ),
            corral::SystemClock::shared(),
        )
        .unwrap(),
    );

    for i in 0..50u32 {
        assert!(limiter.allow(&i));
    }
    assert_eq!(limiter.tracked_identities(), 50);

    let handle = limiter.start_sweeper().unwrap();
    assert!(handle.is_running());

    // Keep ten identities busy while the rest age out of the window.
    for _ in 0..12 {
        thread::sleep(Duration::from_millis(25));
        for i in 0..10u32 {
            limiter.allow(&i);
        }
    }

    let remaining = limiter.tracked_identities();
    assert!(remaining < 50, "nothing reclaimed");
    assert!(remaining >= 10, "active identities reclaimed: {}", remaining);

    handle.stop();
    let stats = limiter.stats();
    assert!(stats.total_created >= 50);
    assert!(stats.total_reclaimed > 0);
}

#[test]
fn test_sweeper_exits_when_limiter_dropped() {
    let limiter = Arc::new(
        KeyedTokenBucket::<u32>::with_config(
            TokenBucketConfig::per_second(10),
            KeyedLimiterConfig::default().with_sweep_interval(Duration::from_millis(5)),
            corral::SystemClock::shared(),
        )
        .unwrap(),
    );

    let handle = limiter.start_sweeper().unwrap();
    drop(limiter);

    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while handle.is_running() && std::time::Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert!(!handle.is_running());
}

#[test]
fn test_limiters_behind_trait_object() {
    let clock = ManualClock::shared();
    let limiters: Vec<Box<dyn KeyedRateLimiter<String>>> = vec![
        Box::new(
            KeyedTokenBucket::with_config(
                TokenBucketConfig::new(2, 1.0),
                KeyedLimiterConfig::default(),
                clock.clone(),
            )
            .unwrap(),
        ),
        Box::new(
            SlidingWindow::with_config(SlidingWindowConfig::new(2, Duration::from_secs(1)), clock.clone())
                .unwrap(),
        ),
    ];

    let user = "user-1".to_string();
    for limiter in &limiters {
        assert!(limiter.allow_n(&user, 2).unwrap());
        assert!(!limiter.allow(&user));
        assert!(matches!(limiter.allow_n(&user, 0), Err(Error::InvalidArgument(_))));
    }

    clock.advance(Duration::from_secs(1));
    for limiter in &limiters {
        assert!(limiter.allow(&user));
        assert_eq!(limiter.tracked_identities(), 1);
    }
}

#[test]
fn test_invalid_configurations() {
    assert!(matches!(TokenBucket::new(0, 1.0), Err(Error::InvalidConfiguration(_))));
    assert!(matches!(TokenBucket::new(1, 0.0), Err(Error::InvalidConfiguration(_))));
    assert!(matches!(TokenBucket::new(1, f64::NAN), Err(Error::InvalidConfiguration(_))));
    assert!(matches!(
        SlidingWindow::<u32>::new(0, Duration::from_secs(1)),
        Err(Error::InvalidConfiguration(_))
    ));
    assert!(matches!(
        SlidingWindow::<u32>::new(1, Duration::ZERO),
        Err(Error::InvalidConfiguration(_))
    ));
    assert!(matches!(
        KeyedTokenBucket::<u32>::with_config(
            TokenBucketConfig::default(),
            KeyedLimiterConfig::default().with_max_identities(0),
            corral::SystemClock::shared(),
        ),
        Err(Error::InvalidConfiguration(_))
    ));
}
