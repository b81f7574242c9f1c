//! A pool of fake database connections shared by worker threads.
//!
//! Run with: `RUST_LOG=debug cargo run --example connection_pool`

use corral::{BoxError, Error, ResourcePool};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
struct Connection {
    id: usize,
    healthy: bool,
    queries: usize,
}

impl Connection {
    fn query(&mut self, sql: &str) -> usize {
        self.queries += 1;
        // Every 25th query leaves the connection broken.
        if self.queries % 25 == 0 {
            self.healthy = false;
        }
        sql.len()
    }
}

static NEXT_ID: AtomicUsize = AtomicUsize::new(0);

fn connect() -> Result<Connection, BoxError> {
    thread::sleep(Duration::from_millis(10));
    Ok(Connection {
        id: NEXT_ID.fetch_add(1, Ordering::SeqCst),
        healthy: true,
        queries: 0,
    })
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let pool = ResourcePool::builder(connect)
        .max_size(4)
        .min_idle(2)
        .validator(|conn: &Connection| conn.healthy)
        .destructor(|conn: Connection| {
            println!("closing connection {} after {} queries", conn.id, conn.queries);
        })
        .build()
        .expect("pool");

    println!("Warm pool: {} idle connections\n", pool.idle_count());

    let workers: Vec<_> = (0..8)
        .map(|worker| {
            let pool = pool.clone();
            thread::spawn(move || {
                let mut timeouts = 0;
                for _ in 0..20 {
                    match pool.acquire(Some(Duration::from_millis(50))) {
                        Ok(mut conn) => {
                            conn.query("SELECT 1");
                            thread::sleep(Duration::from_millis(2));
                        }
                        Err(Error::Timeout(_)) => timeouts += 1,
                        Err(err) => panic!("worker {} failed: {}", worker, err),
                    }
                }
                timeouts
            })
        })
        .collect();

    let timeouts: usize = workers
        .into_iter()
        .map(|w| w.join().expect("worker finished"))
        .sum();
    println!("\nWorkers hit {} timeouts", timeouts);

    match pool.try_acquire() {
        Ok(conn) => println!("Spare connection {} available", conn.id),
        Err(err) => println!("No spare connection: {}", err),
    }

    pool.close();
    println!("\n{}", pool.stats());
}
